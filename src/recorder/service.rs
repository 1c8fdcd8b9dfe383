//! Recorder node: capture a device and stream it to a destination

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::audio::{CaptureDevice, CpalBackend, StreamFormat};
use crate::config::RecorderConfig;
use crate::control::ControlHandler;
use crate::error::{ResourceKind, Result};
use crate::network::{transport_for, ChannelSource, Transport};
use crate::protocol::{RecorderRequest, RecorderResponse, RecorderState};
use crate::session::{Cancel, SessionHandle, SessionTable};

/// Recorder node service; one capture session per device
pub struct RecorderService {
    devices: SessionTable<String>,
    transport: Arc<dyn Transport>,
    capture: Arc<dyn CaptureDevice>,
}

impl RecorderService {
    pub fn new(transport: Arc<dyn Transport>, capture: Arc<dyn CaptureDevice>) -> Self {
        Self {
            devices: SessionTable::new(ResourceKind::Device),
            transport,
            capture,
        }
    }

    pub fn from_config(config: &RecorderConfig) -> Self {
        Self::new(transport_for(&config.transport), Arc::new(CpalBackend::new()))
    }

    /// Capture `device` and stream it to `dest_addr` until stopped
    pub async fn start(&self, device: &str, format: StreamFormat, dest_addr: &str) -> Result<()> {
        format.validate()?;

        self.devices
            .start(device.to_string(), move || async move {
                let handle = SessionHandle::new();

                let captured = match self.capture.capture(device, format, handle.token()).await {
                    Ok(rx) => rx,
                    Err(e) => {
                        handle.cancel();
                        return Err(e.into());
                    }
                };

                // Closes the capture stream too if the destination is unreachable
                if let Err(e) = self
                    .transport
                    .send(dest_addr, Box::new(ChannelSource::new(captured)), handle.token())
                    .await
                {
                    handle.cancel();
                    return Err(e.into());
                }

                info!(
                    "Recording {} ({} ch, {} Hz) to {}",
                    device, format.channels, format.rate, dest_addr
                );
                Ok((handle, ()))
            })
            .await
    }

    pub async fn stop(&self, device: &str) -> Result<()> {
        self.devices.stop(&device.to_string()).await?;
        info!("Stopped recording {}", device);
        Ok(())
    }

    pub async fn state(&self) -> RecorderState {
        RecorderState {
            devices: self.devices.keys().await,
        }
    }

    /// Cancel every live capture session
    pub async fn shutdown(&self) {
        let stopped = self.devices.stop_all().await;
        if stopped > 0 {
            info!("Recorder shutdown cancelled {} capture sessions", stopped);
        }
    }
}

#[async_trait]
impl ControlHandler for RecorderService {
    type Request = RecorderRequest;
    type Response = RecorderResponse;

    async fn handle(&self, request: RecorderRequest) -> Result<RecorderResponse> {
        match request {
            RecorderRequest::Start {
                device,
                format,
                dest_addr,
            } => {
                self.start(&device, format, &dest_addr).await?;
                Ok(RecorderResponse::Ack)
            }
            RecorderRequest::Stop { device } => {
                self.stop(&device).await?;
                Ok(RecorderResponse::Ack)
            }
            RecorderRequest::State => Ok(RecorderResponse::State(self.state().await)),
        }
    }
}
