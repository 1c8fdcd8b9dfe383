//! How the orchestrator reaches a player node

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::service::PlayerService;
use crate::audio::StreamFormat;
use crate::control::ControlClient;
use crate::error::{Error, Result};
use crate::protocol::{PlayerRequest, PlayerResponse, PlayerState};

/// Player operations addressed to a node
#[async_trait]
pub trait PlayerControl: Send + Sync {
    async fn receive_start(&self, node: &str, port: &str, storage_id: Option<&str>) -> Result<String>;

    async fn receive_stop(&self, node: &str, port: &str) -> Result<()>;

    async fn play(&self, node: &str, storage_id: &str, device: &str, format: StreamFormat) -> Result<()>;

    async fn stop(&self, node: &str, device: &str) -> Result<()>;

    async fn clear_storage(&self, node: &str, storage_id: &str) -> Result<()>;

    async fn state(&self, node: &str) -> Result<PlayerState>;
}

/// In-process player; the node name is ignored
#[derive(Clone)]
pub struct LocalPlayer {
    service: Arc<PlayerService>,
}

impl LocalPlayer {
    pub fn new(service: Arc<PlayerService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<PlayerService> {
        &self.service
    }
}

#[async_trait]
impl PlayerControl for LocalPlayer {
    async fn receive_start(&self, _node: &str, port: &str, storage_id: Option<&str>) -> Result<String> {
        self.service.receive_start(port, storage_id).await
    }

    async fn receive_stop(&self, _node: &str, port: &str) -> Result<()> {
        self.service.receive_stop(port).await
    }

    async fn play(&self, _node: &str, storage_id: &str, device: &str, format: StreamFormat) -> Result<()> {
        self.service.play_start(storage_id, device, format).await
    }

    async fn stop(&self, _node: &str, device: &str) -> Result<()> {
        self.service.play_stop(device).await
    }

    async fn clear_storage(&self, _node: &str, storage_id: &str) -> Result<()> {
        self.service.clear_storage(storage_id).await
    }

    async fn state(&self, _node: &str) -> Result<PlayerState> {
        Ok(self.service.state().await)
    }
}

/// Player reached over its control API at `node:port`
#[derive(Debug, Clone)]
pub struct RemotePlayer {
    port: u16,
    timeout: Duration,
}

impl RemotePlayer {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    async fn call(&self, node: &str, request: PlayerRequest) -> Result<PlayerResponse> {
        ControlClient::new(node, self.port, self.timeout)
            .call(request)
            .await
    }

    async fn ack(&self, node: &str, request: PlayerRequest) -> Result<()> {
        match self.call(node, request).await? {
            PlayerResponse::Ack => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: PlayerResponse) -> Error {
    Error::Control(format!("Unexpected player response: {:?}", response))
}

#[async_trait]
impl PlayerControl for RemotePlayer {
    async fn receive_start(&self, node: &str, port: &str, storage_id: Option<&str>) -> Result<String> {
        let request = PlayerRequest::ReceiveStart {
            port: port.to_string(),
            storage_id: storage_id.map(str::to_string),
        };
        match self.call(node, request).await? {
            PlayerResponse::Storage { storage_id } => Ok(storage_id),
            other => Err(unexpected(other)),
        }
    }

    async fn receive_stop(&self, node: &str, port: &str) -> Result<()> {
        self.ack(node, PlayerRequest::ReceiveStop { port: port.to_string() })
            .await
    }

    async fn play(&self, node: &str, storage_id: &str, device: &str, format: StreamFormat) -> Result<()> {
        let request = PlayerRequest::Play {
            storage_id: storage_id.to_string(),
            device: device.to_string(),
            format,
        };
        self.ack(node, request).await
    }

    async fn stop(&self, node: &str, device: &str) -> Result<()> {
        self.ack(node, PlayerRequest::Stop { device: device.to_string() })
            .await
    }

    async fn clear_storage(&self, node: &str, storage_id: &str) -> Result<()> {
        let request = PlayerRequest::ClearStorage {
            storage_id: storage_id.to_string(),
        };
        self.ack(node, request).await
    }

    async fn state(&self, node: &str) -> Result<PlayerState> {
        match self.call(node, PlayerRequest::State).await? {
            PlayerResponse::State(state) => Ok(state),
            other => Err(unexpected(other)),
        }
    }
}
