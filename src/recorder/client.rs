//! How the orchestrator reaches a recorder node

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::service::RecorderService;
use crate::audio::StreamFormat;
use crate::control::ControlClient;
use crate::error::{Error, Result};
use crate::protocol::{RecorderRequest, RecorderResponse, RecorderState};

/// Recorder operations addressed to a node
#[async_trait]
pub trait RecorderControl: Send + Sync {
    async fn start(&self, node: &str, device: &str, format: StreamFormat, dest_addr: &str) -> Result<()>;

    async fn stop(&self, node: &str, device: &str) -> Result<()>;

    async fn state(&self, node: &str) -> Result<RecorderState>;
}

/// In-process recorder; the node name is ignored
#[derive(Clone)]
pub struct LocalRecorder {
    service: Arc<RecorderService>,
}

impl LocalRecorder {
    pub fn new(service: Arc<RecorderService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<RecorderService> {
        &self.service
    }
}

#[async_trait]
impl RecorderControl for LocalRecorder {
    async fn start(&self, _node: &str, device: &str, format: StreamFormat, dest_addr: &str) -> Result<()> {
        self.service.start(device, format, dest_addr).await
    }

    async fn stop(&self, _node: &str, device: &str) -> Result<()> {
        self.service.stop(device).await
    }

    async fn state(&self, _node: &str) -> Result<RecorderState> {
        Ok(self.service.state().await)
    }
}

/// Recorder reached over its control API at `node:port`
#[derive(Debug, Clone)]
pub struct RemoteRecorder {
    port: u16,
    timeout: Duration,
}

impl RemoteRecorder {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    async fn call(&self, node: &str, request: RecorderRequest) -> Result<RecorderResponse> {
        ControlClient::new(node, self.port, self.timeout)
            .call(request)
            .await
    }
}

#[async_trait]
impl RecorderControl for RemoteRecorder {
    async fn start(&self, node: &str, device: &str, format: StreamFormat, dest_addr: &str) -> Result<()> {
        let request = RecorderRequest::Start {
            device: device.to_string(),
            format,
            dest_addr: dest_addr.to_string(),
        };
        match self.call(node, request).await? {
            RecorderResponse::Ack => Ok(()),
            other => Err(Error::Control(format!("Unexpected recorder response: {:?}", other))),
        }
    }

    async fn stop(&self, node: &str, device: &str) -> Result<()> {
        let request = RecorderRequest::Stop {
            device: device.to_string(),
        };
        match self.call(node, request).await? {
            RecorderResponse::Ack => Ok(()),
            other => Err(Error::Control(format!("Unexpected recorder response: {:?}", other))),
        }
    }

    async fn state(&self, node: &str) -> Result<RecorderState> {
        match self.call(node, RecorderRequest::State).await? {
            RecorderResponse::State(state) => Ok(state),
            other => Err(Error::Control(format!("Unexpected recorder response: {:?}", other))),
        }
    }
}
