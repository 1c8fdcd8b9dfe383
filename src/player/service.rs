//! Player node: network receive legs into buffers, buffers onto devices

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::audio::{CpalBackend, PlaybackDevice, StreamFormat};
use crate::config::PlayerConfig;
use crate::control::ControlHandler;
use crate::error::{ResourceKind, Result};
use crate::network::{transport_for, Transport};
use crate::protocol::{PlayerRequest, PlayerResponse, PlayerState};
use crate::session::{Cancel, SessionHandle, SessionTable};
use crate::storage::StorageTable;

/// Player node service.
///
/// Ports and devices are independent session tables; a buffer outlives the
/// sessions that fill or drain it until it is cleared.
pub struct PlayerService {
    ports: SessionTable<String>,
    devices: SessionTable<String>,
    storage: StorageTable,
    transport: Arc<dyn Transport>,
    device: Arc<dyn PlaybackDevice>,
}

impl PlayerService {
    pub fn new(transport: Arc<dyn Transport>, device: Arc<dyn PlaybackDevice>) -> Self {
        Self {
            ports: SessionTable::new(ResourceKind::Port),
            devices: SessionTable::new(ResourceKind::Device),
            storage: StorageTable::new(),
            transport,
            device,
        }
    }

    /// Service on the configured transport and the host's audio devices
    pub fn from_config(config: &PlayerConfig) -> Self {
        Self::new(transport_for(&config.transport), Arc::new(CpalBackend::new()))
    }

    /// Start receiving on `port` into the buffer `storage_id`, or into a new
    /// buffer when the id is absent or unknown. Returns the buffer's id.
    pub async fn receive_start(&self, port: &str, storage_id: Option<&str>) -> Result<String> {
        self.ports
            .start(port.to_string(), move || async move {
                let storage = self.storage.resolve(storage_id);
                let handle = SessionHandle::new();

                if let Err(e) = self
                    .transport
                    .receive(port, storage.buffer.clone(), handle.token())
                    .await
                {
                    handle.cancel();
                    if storage.created {
                        let _ = self.storage.remove(&storage.id);
                    }
                    return Err(e.into());
                }

                info!("Receiving on port {} into storage {}", port, storage.id);
                Ok((handle, storage.id))
            })
            .await
    }

    /// Stop the receive leg on `port`. Its buffer stays addressable.
    pub async fn receive_stop(&self, port: &str) -> Result<()> {
        self.ports.stop(&port.to_string()).await?;
        info!("Stopped receiving on port {}", port);
        Ok(())
    }

    /// Play the buffer `storage_id` on `device`
    pub async fn play_start(&self, storage_id: &str, device: &str, format: StreamFormat) -> Result<()> {
        format.validate()?;
        let buffer = self.storage.get(storage_id)?;

        self.devices
            .start(device.to_string(), move || async move {
                let handle = SessionHandle::new();
                if let Err(e) = self.device.play(device, format, buffer, handle.token()).await {
                    handle.cancel();
                    return Err(e.into());
                }

                info!(
                    "Playing storage {} on {} ({} ch, {} Hz)",
                    storage_id, device, format.channels, format.rate
                );
                Ok((handle, ()))
            })
            .await
    }

    pub async fn play_stop(&self, device: &str) -> Result<()> {
        self.devices.stop(&device.to_string()).await?;
        info!("Stopped playback on {}", device);
        Ok(())
    }

    /// Release a buffer.
    ///
    /// Live sessions still holding it are not checked; callers stop them first.
    pub async fn clear_storage(&self, storage_id: &str) -> Result<()> {
        self.storage.remove(storage_id)?;
        info!("Cleared storage {}", storage_id);
        Ok(())
    }

    pub async fn state(&self) -> PlayerState {
        PlayerState {
            ports: self.ports.keys().await,
            storages: self.storage.ids(),
            devices: self.devices.keys().await,
        }
    }

    /// Cancel every live session
    pub async fn shutdown(&self) {
        let ports = self.ports.stop_all().await;
        let devices = self.devices.stop_all().await;
        if ports + devices > 0 {
            info!(
                "Player shutdown cancelled {} receive and {} playback sessions",
                ports, devices
            );
        }
    }
}

#[async_trait]
impl ControlHandler for PlayerService {
    type Request = PlayerRequest;
    type Response = PlayerResponse;

    async fn handle(&self, request: PlayerRequest) -> Result<PlayerResponse> {
        match request {
            PlayerRequest::ReceiveStart { port, storage_id } => {
                let storage_id = self.receive_start(&port, storage_id.as_deref()).await?;
                Ok(PlayerResponse::Storage { storage_id })
            }
            PlayerRequest::ReceiveStop { port } => {
                self.receive_stop(&port).await?;
                Ok(PlayerResponse::Ack)
            }
            PlayerRequest::Play {
                storage_id,
                device,
                format,
            } => {
                self.play_start(&storage_id, &device, format).await?;
                Ok(PlayerResponse::Ack)
            }
            PlayerRequest::Stop { device } => {
                self.play_stop(&device).await?;
                Ok(PlayerResponse::Ack)
            }
            PlayerRequest::ClearStorage { storage_id } => {
                self.clear_storage(&storage_id).await?;
                Ok(PlayerResponse::Ack)
            }
            PlayerRequest::State => Ok(PlayerResponse::State(self.state().await)),
        }
    }
}
