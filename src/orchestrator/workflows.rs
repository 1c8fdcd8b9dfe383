use std::sync::Arc;

use tracing::info;

use super::{
    device_key, port_number, rolled_back, Direction, Orchestrator, RecordingLeg, Teardown,
};
use crate::audio::{read_wav_file, AudioError, DecodedAudio, StreamFormat, WavFileSink};
use crate::config::host_port;
use crate::error::{Error, ResourceKind, Result};
use crate::network::MemorySource;
use crate::player::PlayerControl;
use crate::protocol::{FilePlayback, PlayerState, RecorderState};
use crate::recorder::RecorderControl;
use crate::session::SessionHandle;

/// Read a WAV file for playback.
///
/// A missing file is reported as not found and a malformed container as a
/// decode error; other filesystem failures keep their I/O cause.
fn load_wav(file: &str) -> Result<DecodedAudio> {
    read_wav_file(file).map_err(|e| match e {
        AudioError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
            Error::not_found(ResourceKind::File, file)
        }
        AudioError::Decode(msg) => Error::Decode(format!("{}: {}", file, msg)),
        other => Error::Device(other),
    })
}

impl<P, R> Orchestrator<P, R>
where
    P: PlayerControl,
    R: RecorderControl,
{
    /// Stream a WAV file to a player and play it on `device`.
    ///
    /// Steps: decode, player receive-start, local send, player play. A failure
    /// after receive-start stops the local send, the player's receive leg and
    /// clears the allocated buffer.
    pub async fn play_file(
        &self,
        file: &str,
        player_node: &str,
        player_port: &str,
        device: &str,
    ) -> Result<FilePlayback> {
        let decoded = load_wav(file)?;
        let format = decoded.format;
        let destination = host_port(player_node, port_number(player_port)?);

        let key = device_key(Direction::Output, device, player_node);
        self.remote.reserve(key.clone(), ()).await?;

        let storage_id = match self.player.receive_start(player_node, player_port, None).await {
            Ok(id) => id,
            Err(e) => {
                self.release(&[&key]).await;
                return Err(e);
            }
        };

        let source = MemorySource::new(decoded.pcm, self.config.send_chunk_size);
        let addr = destination.as_str();
        let sent = self
            .sending
            .start(destination.clone(), move || async move {
                let handle = SessionHandle::new();
                self.transport
                    .send(addr, Box::new(source), handle.token())
                    .await?;
                Ok((handle, ()))
            })
            .await;

        // Only a leg this call inserted may be stopped on rollback
        let send_started = sent.is_ok();
        let played = match sent {
            Ok(()) => self.player.play(player_node, &storage_id, device, format).await,
            Err(e) => Err(e),
        };

        if let Err(e) = played {
            if send_started {
                rolled_back("stop send", self.sending.stop(&destination).await.map(drop));
            }
            rolled_back(
                "receive stop",
                self.player.receive_stop(player_node, player_port).await,
            );
            rolled_back(
                "clear storage",
                self.player.clear_storage(player_node, &storage_id).await,
            );
            self.release(&[&key]).await;
            return Err(e);
        }

        info!(
            "Playing {} on {} at {} (storage {})",
            file, device, player_node, storage_id
        );
        Ok(FilePlayback { storage_id, format })
    }

    /// Tear down a file playback. Every step is attempted; the first error is
    /// returned, so a repeated call reports the already-released resources.
    pub async fn stop_file(
        &self,
        player_node: &str,
        player_port: &str,
        device: &str,
        storage_id: &str,
    ) -> Result<()> {
        let mut teardown = Teardown::default();

        let destination = port_number(player_port).map(|port| host_port(player_node, port));
        match destination {
            Ok(destination) => {
                teardown.step("stop send", self.sending.stop(&destination).await.map(drop))
            }
            Err(e) => teardown.step("stop send", Err(e)),
        }
        teardown.step(
            "receive stop",
            self.player.receive_stop(player_node, player_port).await,
        );
        teardown.step("play stop", self.player.stop(player_node, device).await);
        teardown.step(
            "clear storage",
            self.player.clear_storage(player_node, storage_id).await,
        );
        teardown.step(
            "release device",
            self.remote
                .remove(&device_key(Direction::Output, device, player_node))
                .await
                .map(drop),
        );

        info!("Stopped file playback on {} at {}", device, player_node);
        teardown.finish()
    }

    /// Record a remote device into a local WAV file.
    ///
    /// The recorder streams to this host's advertised address on
    /// `receive_port`. A recorder failure stops the local receive leg.
    pub async fn start_file_recording(
        &self,
        recorder_node: &str,
        device: &str,
        format: StreamFormat,
        receive_port: &str,
        file: &str,
    ) -> Result<()> {
        let receive_addr = host_port(&self.config.advertise_ip.to_string(), port_number(receive_port)?);

        let key = device_key(Direction::Input, device, recorder_node);
        self.remote.reserve(key.clone(), ()).await?;

        let started = self
            .receiving
            .start(receive_port.to_string(), move || async move {
                let sink = Arc::new(WavFileSink::create(file, format)?);
                let handle = SessionHandle::new();
                if let Err(e) = self
                    .transport
                    .receive(receive_port, sink.clone(), handle.token())
                    .await
                {
                    rolled_back("finalize file", sink.finish().map(drop).map_err(Error::from));
                    return Err(e.into());
                }
                Ok((RecordingLeg { handle, sink }, ()))
            })
            .await;
        if let Err(e) = started {
            self.release(&[&key]).await;
            return Err(e);
        }

        if let Err(e) = self
            .recorder
            .start(recorder_node, device, format, &receive_addr)
            .await
        {
            rolled_back(
                "stop receive",
                self.receiving.stop(&receive_port.to_string()).await.map(drop),
            );
            self.release(&[&key]).await;
            return Err(e);
        }

        info!(
            "Recording {} at {} into {} via {}",
            device, recorder_node, file, receive_addr
        );
        Ok(())
    }

    /// Stop a file recording and finalize the file; best-effort
    pub async fn stop_file_recording(
        &self,
        recorder_node: &str,
        device: &str,
        receive_port: &str,
    ) -> Result<()> {
        let mut teardown = Teardown::default();

        teardown.step("recorder stop", self.recorder.stop(recorder_node, device).await);
        teardown.step(
            "stop receive",
            self.receiving
                .stop(&receive_port.to_string())
                .await
                .map(drop),
        );
        teardown.step(
            "release device",
            self.remote
                .remove(&device_key(Direction::Input, device, recorder_node))
                .await
                .map(drop),
        );

        info!("Stopped recording {} at {}", device, recorder_node);
        teardown.finish()
    }

    /// Bridge a recorder straight into a player. Returns the player's storage id.
    ///
    /// Steps: player receive-start, player play, recorder start towards the
    /// player's receive port. Failures unwind in reverse order.
    pub async fn play_from_recorder(
        &self,
        player_node: &str,
        player_port: &str,
        player_device: &str,
        format: StreamFormat,
        recorder_node: &str,
        recorder_device: &str,
    ) -> Result<String> {
        let destination = host_port(player_node, port_number(player_port)?);

        let player_key = device_key(Direction::Output, player_device, player_node);
        let recorder_key = device_key(Direction::Input, recorder_device, recorder_node);
        self.remote.reserve(player_key.clone(), ()).await?;
        if let Err(e) = self.remote.reserve(recorder_key.clone(), ()).await {
            self.release(&[&player_key]).await;
            return Err(e);
        }
        let keys = [&player_key, &recorder_key];

        let storage_id = match self.player.receive_start(player_node, player_port, None).await {
            Ok(id) => id,
            Err(e) => {
                self.release(&keys).await;
                return Err(e);
            }
        };

        if let Err(e) = self
            .player
            .play(player_node, &storage_id, player_device, format)
            .await
        {
            rolled_back(
                "receive stop",
                self.player.receive_stop(player_node, player_port).await,
            );
            rolled_back(
                "clear storage",
                self.player.clear_storage(player_node, &storage_id).await,
            );
            self.release(&keys).await;
            return Err(e);
        }

        if let Err(e) = self
            .recorder
            .start(recorder_node, recorder_device, format, &destination)
            .await
        {
            rolled_back("play stop", self.player.stop(player_node, player_device).await);
            rolled_back(
                "receive stop",
                self.player.receive_stop(player_node, player_port).await,
            );
            rolled_back(
                "clear storage",
                self.player.clear_storage(player_node, &storage_id).await,
            );
            self.release(&keys).await;
            return Err(e);
        }

        info!(
            "Bridging {} at {} to {} at {} (storage {})",
            recorder_device, recorder_node, player_device, player_node, storage_id
        );
        Ok(storage_id)
    }

    /// Tear down a bridge; best-effort, first error returned
    pub async fn stop_from_recorder(
        &self,
        player_node: &str,
        player_port: &str,
        player_device: &str,
        storage_id: &str,
        recorder_node: &str,
        recorder_device: &str,
    ) -> Result<()> {
        let mut teardown = Teardown::default();

        teardown.step(
            "receive stop",
            self.player.receive_stop(player_node, player_port).await,
        );
        teardown.step("play stop", self.player.stop(player_node, player_device).await);
        teardown.step(
            "clear storage",
            self.player.clear_storage(player_node, storage_id).await,
        );
        teardown.step(
            "recorder stop",
            self.recorder.stop(recorder_node, recorder_device).await,
        );
        for key in [
            device_key(Direction::Output, player_device, player_node),
            device_key(Direction::Input, recorder_device, recorder_node),
        ] {
            teardown.step("release device", self.remote.remove(&key).await.map(drop));
        }

        info!(
            "Stopped bridge {} at {} to {} at {}",
            recorder_device, recorder_node, player_device, player_node
        );
        teardown.finish()
    }

    pub async fn player_state(&self, node: &str) -> Result<PlayerState> {
        self.player.state(node).await
    }

    pub async fn recorder_state(&self, node: &str) -> Result<RecorderState> {
        self.recorder.state(node).await
    }

    // Direct node operations. These bypass the workflow bookkeeping: nothing
    // is reserved locally and nothing is unwound on failure.

    pub async fn player_receive_start(
        &self,
        node: &str,
        port: &str,
        storage_id: Option<&str>,
    ) -> Result<String> {
        self.player.receive_start(node, port, storage_id).await
    }

    pub async fn player_receive_stop(&self, node: &str, port: &str) -> Result<()> {
        self.player.receive_stop(node, port).await
    }

    pub async fn player_play(
        &self,
        node: &str,
        storage_id: &str,
        device: &str,
        format: StreamFormat,
    ) -> Result<()> {
        self.player.play(node, storage_id, device, format).await
    }

    pub async fn player_stop(&self, node: &str, device: &str) -> Result<()> {
        self.player.stop(node, device).await
    }

    pub async fn player_clear_storage(&self, node: &str, storage_id: &str) -> Result<()> {
        self.player.clear_storage(node, storage_id).await
    }

    pub async fn recorder_start(
        &self,
        node: &str,
        device: &str,
        format: StreamFormat,
        dest_addr: &str,
    ) -> Result<()> {
        self.recorder.start(node, device, format, dest_addr).await
    }

    pub async fn recorder_stop(&self, node: &str, device: &str) -> Result<()> {
        self.recorder.stop(node, device).await
    }
}
