use super::job::CaptureSlot;
use crate::camera::{CameraEvent, CameraHost};
use crate::config::CameraPosition;
use crate::error::{CameraError, CaptureError, ScancamError};
use crate::events::EventBus;
use crate::storage::FileSink;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

/// Session resources a capture job runs against
#[derive(Clone)]
pub struct CaptureContext {
    pub host: Arc<dyn CameraHost>,
    pub sink: Arc<dyn FileSink>,
    pub slot: Arc<CaptureSlot>,
    pub event_bus: EventBus,
    pub position: CameraPosition,
    /// Cancelled when the owning session is torn down
    pub token: CancellationToken,
}

/// Wait for the camera to report that it opened. Other events are skipped.
pub(crate) async fn wait_for_open(
    events: &mut broadcast::Receiver<CameraEvent>,
) -> Result<(), ScancamError> {
    loop {
        match events.recv().await {
            Ok(CameraEvent::Opened) => return Ok(()),
            Ok(other) => trace!("Waiting for camera open, skipping {:?}", other),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Missed {} camera events while waiting for open", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => {
                return Err(CameraError::Unavailable {
                    details: "camera event stream closed before open".to_string(),
                }
                .into())
            }
        }
    }
}

pub(crate) fn abandoned() -> ScancamError {
    CaptureError::Abandoned {
        reason: "session stopped".to_string(),
    }
    .into()
}

pub(crate) fn output_error(e: std::io::Error) -> ScancamError {
    CaptureError::Output {
        details: e.to_string(),
    }
    .into()
}
