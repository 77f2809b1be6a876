use crate::decoder::{DecodeDispatcher, DispatchOutcome};
use crate::events::{EventBus, ScannerEvent};
use crate::frame_slot::FrameSlot;

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

/// Counters for the frames handled by one analyzer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzerMetrics {
    pub frames_analyzed: u64,
    pub frames_dropped: u64,
    pub detections: u64,
    pub failures: u64,
}

/// Consumes the latest-only frame slot and feeds the decode dispatcher,
/// forwarding detections to the event bus in the order frames were taken
pub struct FrameAnalyzer {
    slot: Arc<FrameSlot>,
    token: CancellationToken,
    metrics: Arc<Mutex<AnalyzerMetrics>>,
    task: Option<JoinHandle<()>>,
}

impl FrameAnalyzer {
    /// Start analyzing frames for `session_id` until `parent` is cancelled
    pub fn spawn(
        session_id: u64,
        slot: Arc<FrameSlot>,
        dispatcher: Arc<DecodeDispatcher>,
        event_bus: EventBus,
        parent: &CancellationToken,
    ) -> Self {
        let token = parent.child_token();
        let metrics = Arc::new(Mutex::new(AnalyzerMetrics::default()));

        let task = {
            let slot = Arc::clone(&slot);
            let token = token.clone();
            let metrics = Arc::clone(&metrics);

            tokio::spawn(async move {
                info!("Frame analysis started for session {}", session_id);

                loop {
                    let frame = tokio::select! {
                        _ = token.cancelled() => break,
                        frame = slot.next() => match frame {
                            Some(frame) => frame,
                            None => break,
                        },
                    };
                    let frame_id = frame.id;

                    // A cancelled decode drops the frame, which releases it
                    let outcome = tokio::select! {
                        _ = token.cancelled() => {
                            debug!("Session {} torn down during decode of frame {}", session_id, frame_id);
                            break;
                        }
                        outcome = dispatcher.analyze(frame) => outcome,
                    };

                    Self::deliver(session_id, frame_id, outcome, &event_bus, &metrics);
                }

                info!("Frame analysis ended for session {}", session_id);
            })
        };

        Self {
            slot,
            token,
            metrics,
            task: Some(task),
        }
    }

    fn deliver(
        session_id: u64,
        frame_id: u64,
        outcome: DispatchOutcome,
        event_bus: &EventBus,
        metrics: &Mutex<AnalyzerMetrics>,
    ) {
        let mut metrics = metrics.lock();
        match outcome {
            DispatchOutcome::Dropped => {
                metrics.frames_dropped += 1;
                return;
            }
            DispatchOutcome::Duplicate | DispatchOutcome::Empty => {
                trace!("Frame {} produced nothing new", frame_id);
            }
            DispatchOutcome::Detected(detection) => {
                metrics.detections += 1;
                if let Some(message) = detection.image_error {
                    event_bus.publish(ScannerEvent::Error { message });
                }
                let (image_path, image_width, image_height) = match detection.image {
                    Some(image) => (Some(image.path), Some(image.width), Some(image.height)),
                    None => (None, None, None),
                };
                event_bus.publish(ScannerEvent::BarcodesDetected {
                    session_id,
                    barcodes: detection.barcodes,
                    image_path,
                    image_width,
                    image_height,
                });
            }
            DispatchOutcome::Failed(e) => {
                metrics.failures += 1;
                error!("Decode failed for frame {}: {}", frame_id, e);
                event_bus.publish(ScannerEvent::Error {
                    message: e.to_string(),
                });
            }
        }
        metrics.frames_analyzed += 1;
    }

    /// Slot the camera delivers frames into
    pub fn slot(&self) -> &Arc<FrameSlot> {
        &self.slot
    }

    pub fn metrics(&self) -> AnalyzerMetrics {
        self.metrics.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Stop the analysis task, releasing any pending frame
    pub async fn stop(mut self) {
        self.token.cancel();
        self.slot.close();

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Error stopping frame analysis task: {}", e);
            }
        }
    }
}

impl Drop for FrameAnalyzer {
    fn drop(&mut self) {
        self.token.cancel();
        self.slot.close();
    }
}
