use crate::barcode::BarcodeResult;
use crate::capture::CaptureKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

/// Outbound notifications delivered to the application layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScannerEvent {
    /// One or more barcodes passed the dispatcher and scan window
    BarcodesDetected {
        session_id: u64,
        barcodes: Vec<BarcodeResult>,
        image_path: Option<PathBuf>,
        image_width: Option<u32>,
        image_height: Option<u32>,
    },
    /// Non-fatal runtime error (decode failure, thumbnail write failure)
    Error { message: String },
    /// Torch state reported by the camera
    TorchChanged { enabled: bool },
    /// Linear zoom reported by the camera
    ZoomChanged { value: f32 },
    /// A photo or recording produced an output file
    CaptureFinished {
        kind: CaptureKind,
        path: PathBuf,
        rotation_degrees: u16,
    },
    /// A photo or recording ended without output
    CaptureFailed { kind: CaptureKind, reason: String },
}

impl ScannerEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            ScannerEvent::BarcodesDetected {
                barcodes,
                image_path,
                ..
            } => match image_path {
                Some(path) => format!(
                    "{} barcode(s) detected with image {}",
                    barcodes.len(),
                    path.display()
                ),
                None => format!("{} barcode(s) detected", barcodes.len()),
            },
            ScannerEvent::Error { message } => format!("Scanner error: {}", message),
            ScannerEvent::TorchChanged { enabled } => {
                format!("Torch {}", if *enabled { "on" } else { "off" })
            }
            ScannerEvent::ZoomChanged { value } => format!("Zoom changed to {:.2}", value),
            ScannerEvent::CaptureFinished { kind, path, .. } => {
                format!("{:?} capture finished: {}", kind, path.display())
            }
            ScannerEvent::CaptureFailed { kind, reason } => {
                format!("{:?} capture failed: {}", kind, reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            ScannerEvent::BarcodesDetected { .. } => "barcodes_detected",
            ScannerEvent::Error { .. } => "error",
            ScannerEvent::TorchChanged { .. } => "torch_changed",
            ScannerEvent::ZoomChanged { .. } => "zoom_changed",
            ScannerEvent::CaptureFinished { .. } => "capture_finished",
            ScannerEvent::CaptureFailed { .. } => "capture_failed",
        }
    }
}

/// Broadcast channel carrying [`ScannerEvent`]s to every subscriber
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ScannerEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<ScannerEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers, returning how many received it
    pub fn publish(&self, event: ScannerEvent) -> usize {
        match &event {
            ScannerEvent::Error { message } => warn!("Scanner error: {}", message),
            ScannerEvent::CaptureFailed { kind, reason } => {
                error!("{:?} capture failed: {}", kind, reason)
            }
            ScannerEvent::CaptureFinished { .. } => info!("{}", event.description()),
            ScannerEvent::BarcodesDetected { .. } => debug!("{}", event.description()),
            _ => trace!("{}", event.description()),
        }

        match self.sender.send(event) {
            Ok(count) => count,
            Err(_) => {
                debug!("Event dropped, no subscribers");
                0
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &ScannerEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<ScannerEvent>,
    filter: EventFilter,
}

impl EventReceiver {
    pub fn new(receiver: broadcast::Receiver<ScannerEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next matching event, skipping over lag. `None` once the
    /// bus is closed.
    pub async fn recv(&mut self) -> Option<ScannerEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Event receiver lagged behind by {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive a matching event without waiting
    pub fn try_recv(&mut self) -> Option<ScannerEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Event receiver lagged behind by {} events", n);
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let delivered = event_bus.publish(ScannerEvent::TorchChanged { enabled: true });
        assert_eq!(delivered, 1);

        match receiver.recv().await.unwrap() {
            ScannerEvent::TorchChanged { enabled } => assert!(enabled),
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let event_bus = EventBus::new(4);
        assert_eq!(
            event_bus.publish(ScannerEvent::Error {
                message: "nobody listening".to_string()
            }),
            0
        );
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let mut receiver = EventReceiver::new(
            event_bus.subscribe(),
            EventFilter::EventTypes(vec!["zoom_changed"]),
        );

        event_bus.publish(ScannerEvent::TorchChanged { enabled: false });
        event_bus.publish(ScannerEvent::ZoomChanged { value: 0.5 });

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, ScannerEvent::ZoomChanged { value: 0.5 });
        assert!(receiver.try_recv().is_none());
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = ScannerEvent::CaptureFailed {
            kind: CaptureKind::Video,
            reason: "encoder".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "capture_failed");
        assert_eq!(json["kind"], "video");
    }
}
