//! Orchestrator
//!
//! Runs local send and receive legs and drives player and recorder nodes
//! through multi-step workflows. A workflow that fails part-way unwinds the
//! steps it already completed before returning the original error.

mod workflows;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::audio::WavFileSink;
use crate::config::OrchestratorConfig;
use crate::control::ControlHandler;
use crate::error::{Error, ResourceKind, Result};
use crate::network::{listen_addr, transport_for, Transport};
use crate::player::{PlayerControl, RemotePlayer};
use crate::protocol::{OrchestratorRequest, OrchestratorResponse};
use crate::recorder::{RecorderControl, RemoteRecorder};
use crate::session::{Cancel, SessionHandle, SessionTable};

/// Local receive leg that records into a WAV file
pub struct RecordingLeg {
    handle: SessionHandle,
    sink: Arc<WavFileSink>,
}

impl RecordingLeg {
    pub fn sink(&self) -> &Arc<WavFileSink> {
        &self.sink
    }
}

impl Cancel for RecordingLeg {
    /// Stop receiving and finalize the WAV header
    fn cancel(&self) {
        self.handle.cancel();
        match self.sink.finish() {
            Ok(recording) => debug!("Receive leg closed after {} bytes", recording.bytes),
            Err(e) => warn!("Finalizing {} failed: {}", self.sink.path().display(), e),
        }
    }
}

/// Snapshot of the orchestrator's own session tables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalState {
    /// Live send legs by `host:port`
    pub sending: Vec<String>,
    /// Live receive legs by port
    pub receiving: Vec<String>,
    /// Remote devices owned by a running workflow, as `out:device@node` or
    /// `in:device@node`
    pub remote_devices: Vec<String>,
}

pub struct Orchestrator<P, R> {
    config: OrchestratorConfig,
    transport: Arc<dyn Transport>,
    player: P,
    recorder: R,
    sending: SessionTable<String>,
    receiving: SessionTable<String, RecordingLeg>,
    remote: SessionTable<String, ()>,
}

impl Orchestrator<RemotePlayer, RemoteRecorder> {
    /// Orchestrator reaching nodes over their control APIs
    pub fn from_config(config: OrchestratorConfig) -> Self {
        let transport = transport_for(&config.transport);
        let player = RemotePlayer::new(config.player_control_port, config.call_timeout);
        let recorder = RemoteRecorder::new(config.recorder_control_port, config.call_timeout);
        Self::new(config, transport, player, recorder)
    }
}

impl<P, R> Orchestrator<P, R>
where
    P: PlayerControl,
    R: RecorderControl,
{
    pub fn new(config: OrchestratorConfig, transport: Arc<dyn Transport>, player: P, recorder: R) -> Self {
        Self {
            config,
            transport,
            player,
            recorder,
            sending: SessionTable::new(ResourceKind::Destination),
            receiving: SessionTable::new(ResourceKind::Port),
            remote: SessionTable::new(ResourceKind::RemoteDevice),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn player(&self) -> &P {
        &self.player
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    /// Give up ownership of remote devices after a failed workflow
    async fn release(&self, keys: &[&String]) {
        for key in keys {
            rolled_back("release device", self.remote.remove(key).await.map(drop));
        }
    }

    pub async fn local_state(&self) -> LocalState {
        LocalState {
            sending: self.sending.keys().await,
            receiving: self.receiving.keys().await,
            remote_devices: self.remote.keys().await,
        }
    }

    /// Stop every local leg; WAV recordings are finalized.
    ///
    /// Sessions on remote nodes are left running.
    pub async fn shutdown(&self) {
        let sending = self.sending.stop_all().await;
        let receiving = self.receiving.stop_all().await;
        info!(
            "Orchestrator shutdown stopped {} send and {} receive legs",
            sending, receiving
        );

        let remote = self.remote.keys().await;
        if !remote.is_empty() {
            warn!("Remote sessions left running: {}", remote.join(", "));
        }
    }
}

/// Which side of a node's audio hardware a workflow owns.
///
/// Output and input devices share names on common hosts (ALSA `hw:0,0`), so
/// ownership is tracked per direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Player device
    Output,
    /// Recorder device
    Input,
}

/// Ownership key for a device on a node, e.g. `out:hw:0,0@10.0.0.7`
fn device_key(direction: Direction, device: &str, node: &str) -> String {
    let prefix = match direction {
        Direction::Output => "out",
        Direction::Input => "in",
    };
    format!("{}:{}@{}", prefix, device, node)
}

/// Numeric port from `"9000"`, `":9000"` or `"ip:9000"`
fn port_number(port: &str) -> Result<u16> {
    Ok(listen_addr(port)?.port())
}

/// Collects the outcome of best-effort teardown steps.
///
/// Every step runs; the first error is kept for the caller and later ones are
/// logged.
#[derive(Default)]
struct Teardown {
    first: Option<Error>,
}

impl Teardown {
    fn step(&mut self, name: &str, result: Result<()>) {
        if let Err(e) = result {
            if self.first.is_none() {
                self.first = Some(e);
            } else {
                warn!("Teardown step {} failed: {}", name, e);
            }
        }
    }

    fn finish(self) -> Result<()> {
        match self.first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Log a failed compensating step; its error never replaces the original one
fn rolled_back(step: &str, result: Result<()>) {
    if let Err(e) = result {
        warn!("Rollback step {} failed: {}", step, e);
    }
}

#[async_trait]
impl<P, R> ControlHandler for Orchestrator<P, R>
where
    P: PlayerControl + 'static,
    R: RecorderControl + 'static,
{
    type Request = OrchestratorRequest;
    type Response = OrchestratorResponse;

    async fn handle(&self, request: OrchestratorRequest) -> Result<OrchestratorResponse> {
        match request {
            OrchestratorRequest::FilePlay {
                file,
                player_node,
                player_port,
                device,
            } => {
                let playback = self
                    .play_file(&file, &player_node, &player_port, &device)
                    .await?;
                Ok(OrchestratorResponse::FilePlay(playback))
            }
            OrchestratorRequest::FileStop {
                player_node,
                player_port,
                device,
                storage_id,
            } => {
                self.stop_file(&player_node, &player_port, &device, &storage_id)
                    .await?;
                Ok(OrchestratorResponse::Ack)
            }
            OrchestratorRequest::StartFileRecording {
                recorder_node,
                device,
                format,
                receive_port,
                file,
            } => {
                self.start_file_recording(&recorder_node, &device, format, &receive_port, &file)
                    .await?;
                Ok(OrchestratorResponse::Ack)
            }
            OrchestratorRequest::StopFileRecording {
                recorder_node,
                device,
                receive_port,
            } => {
                self.stop_file_recording(&recorder_node, &device, &receive_port)
                    .await?;
                Ok(OrchestratorResponse::Ack)
            }
            OrchestratorRequest::PlayFromRecorder {
                player_node,
                player_port,
                player_device,
                format,
                recorder_node,
                recorder_device,
            } => {
                let storage_id = self
                    .play_from_recorder(
                        &player_node,
                        &player_port,
                        &player_device,
                        format,
                        &recorder_node,
                        &recorder_device,
                    )
                    .await?;
                Ok(OrchestratorResponse::Storage { storage_id })
            }
            OrchestratorRequest::StopFromRecorder {
                player_node,
                player_port,
                player_device,
                storage_id,
                recorder_node,
                recorder_device,
            } => {
                self.stop_from_recorder(
                    &player_node,
                    &player_port,
                    &player_device,
                    &storage_id,
                    &recorder_node,
                    &recorder_device,
                )
                .await?;
                Ok(OrchestratorResponse::Ack)
            }
            OrchestratorRequest::PlayerState { node } => {
                Ok(OrchestratorResponse::PlayerState(self.player_state(&node).await?))
            }
            OrchestratorRequest::RecorderState { node } => {
                Ok(OrchestratorResponse::RecorderState(self.recorder_state(&node).await?))
            }
            OrchestratorRequest::PlayerReceiveStart {
                node,
                port,
                storage_id,
            } => {
                let storage_id = self
                    .player_receive_start(&node, &port, storage_id.as_deref())
                    .await?;
                Ok(OrchestratorResponse::Storage { storage_id })
            }
            OrchestratorRequest::PlayerReceiveStop { node, port } => {
                self.player_receive_stop(&node, &port).await?;
                Ok(OrchestratorResponse::Ack)
            }
            OrchestratorRequest::PlayerPlay {
                node,
                storage_id,
                device,
                format,
            } => {
                self.player_play(&node, &storage_id, &device, format).await?;
                Ok(OrchestratorResponse::Ack)
            }
            OrchestratorRequest::PlayerStop { node, device } => {
                self.player_stop(&node, &device).await?;
                Ok(OrchestratorResponse::Ack)
            }
            OrchestratorRequest::PlayerClearStorage { node, storage_id } => {
                self.player_clear_storage(&node, &storage_id).await?;
                Ok(OrchestratorResponse::Ack)
            }
            OrchestratorRequest::RecorderStart {
                node,
                device,
                format,
                dest_addr,
            } => {
                self.recorder_start(&node, &device, format, &dest_addr).await?;
                Ok(OrchestratorResponse::Ack)
            }
            OrchestratorRequest::RecorderStop { node, device } => {
                self.recorder_stop(&node, &device).await?;
                Ok(OrchestratorResponse::Ack)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_device_key_carries_direction() {
        assert_eq!(
            device_key(Direction::Output, "hw:1,0", "10.0.0.7"),
            "out:hw:1,0@10.0.0.7"
        );
        assert_eq!(
            device_key(Direction::Input, "hw:1,0", "10.0.0.7"),
            "in:hw:1,0@10.0.0.7"
        );
    }

    #[test]
    fn test_port_number() {
        assert_eq!(port_number("9000").unwrap(), 9000);
        assert_eq!(port_number(":9000").unwrap(), 9000);
        assert_eq!(port_number("0.0.0.0:9000").unwrap(), 9000);
        assert_eq!(port_number("nine").unwrap_err().code(), ErrorCode::Transport);
    }

    #[test]
    fn test_teardown_keeps_first_error() {
        let mut teardown = Teardown::default();
        teardown.step("a", Ok(()));
        teardown.step("b", Err(Error::not_found(ResourceKind::Port, "9000")));
        teardown.step("c", Err(Error::Control("later".into())));
        let err = teardown.finish().unwrap_err();
        assert!(err.is_not_found());
    }
}
