use super::Decoder;
use crate::barcode::BarcodeResult;
use crate::config::{DetectionSpeed, StartConfig, ThumbnailOptions};
use crate::error::DecodeError;
use crate::frame::Frame;
use crate::geometry::{self, ScanWindow};
use crate::storage::FileSink;
use crate::thumbnail::{self, Thumbnail};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Per-session dispatch policy
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSettings {
    pub detection_speed: DetectionSpeed,
    pub detection_timeout: Duration,
    pub scan_window: Option<ScanWindow>,
    pub return_image: bool,
    pub thumbnail: ThumbnailOptions,
    /// Rotation applied to thumbnails
    pub sensor_rotation_degrees: u16,
}

impl DispatchSettings {
    pub fn new(config: &StartConfig, sensor_rotation_degrees: u16) -> Self {
        Self {
            detection_speed: config.detection_speed,
            detection_timeout: config.detection_timeout,
            scan_window: config.scan_window,
            return_image: config.return_image,
            thumbnail: config.thumbnail,
            sensor_rotation_degrees,
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::new(&StartConfig::default(), thumbnail::DEFAULT_SENSOR_ROTATION)
    }
}

/// Barcodes that survived filtering, with the optional still image
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub barcodes: Vec<BarcodeResult>,
    pub image: Option<Thumbnail>,
    /// Set when the still image was requested but could not be written
    pub image_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Gate closed or dispatcher closed; the decoder was not called
    Dropped,
    /// Same value set as the previous detection
    Duplicate,
    /// Nothing decoded, or everything fell outside the scan window
    Empty,
    Detected(Detection),
    Failed(DecodeError),
}

#[derive(Debug, Default)]
struct DispatchState {
    /// Normal mode gate, closed until this instant
    gate_closed_until: Option<Instant>,
    /// Sorted values of the last non-empty detection
    last_scanned: Option<Vec<String>>,
}

/// Wraps the decode capability and applies the detection-speed policy,
/// duplicate suppression and the scan window
pub struct DecodeDispatcher {
    decoder: Arc<dyn Decoder>,
    sink: Arc<dyn FileSink>,
    settings: DispatchSettings,
    state: Mutex<DispatchState>,
    closed: AtomicBool,
}

impl DecodeDispatcher {
    pub fn new(decoder: Arc<dyn Decoder>, sink: Arc<dyn FileSink>, settings: DispatchSettings) -> Self {
        Self {
            decoder,
            sink,
            settings,
            state: Mutex::new(DispatchState::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// Run one frame through the pipeline. The frame is released exactly once
    /// on every path.
    pub async fn analyze(&self, frame: Frame) -> DispatchOutcome {
        let outcome = self.dispatch(&frame).await;
        frame.release();
        outcome
    }

    async fn dispatch(&self, frame: &Frame) -> DispatchOutcome {
        if self.is_closed() {
            return DispatchOutcome::Dropped;
        }
        if !self.admit() {
            trace!("Detection gate closed, dropping frame {}", frame.id);
            return DispatchOutcome::Dropped;
        }

        let barcodes = match self.decoder.process(frame).await {
            Ok(barcodes) => barcodes,
            Err(e) => {
                debug!("Decode failed for frame {}: {}", frame.id, e);
                return DispatchOutcome::Failed(e);
            }
        };

        if self.settings.detection_speed == DetectionSpeed::NoDuplicates && self.is_duplicate(&barcodes) {
            trace!("Suppressing duplicate detection in frame {}", frame.id);
            return DispatchOutcome::Duplicate;
        }

        let barcodes = self.within_scan_window(frame, barcodes);
        if barcodes.is_empty() {
            return DispatchOutcome::Empty;
        }

        let (image, image_error) = if barcodes.len() == 1 && self.settings.return_image {
            match thumbnail::render_to_sink(
                frame,
                self.settings.sensor_rotation_degrees,
                self.settings.thumbnail,
                Arc::clone(&self.sink),
            )
            .await
            {
                Ok(image) => (Some(image), None),
                Err(e) => {
                    warn!("Could not write detection image: {}", e);
                    (None, Some(e.to_string()))
                }
            }
        } else {
            (None, None)
        };

        debug!("Frame {} produced {} barcode(s)", frame.id, barcodes.len());
        DispatchOutcome::Detected(Detection {
            barcodes,
            image,
            image_error,
        })
    }

    /// Check and close the Normal mode gate in one step
    fn admit(&self) -> bool {
        if self.settings.detection_speed != DetectionSpeed::Normal {
            return true;
        }

        let now = Instant::now();
        let mut state = self.state.lock();
        match state.gate_closed_until {
            Some(until) if now < until => false,
            _ => {
                state.gate_closed_until = Some(now + self.settings.detection_timeout);
                true
            }
        }
    }

    fn is_duplicate(&self, barcodes: &[BarcodeResult]) -> bool {
        let mut values: Vec<String> = barcodes
            .iter()
            .filter_map(|b| b.value())
            .map(str::to_owned)
            .collect();
        if values.is_empty() {
            return false;
        }
        values.sort();

        let mut state = self.state.lock();
        if state.last_scanned.as_ref() == Some(&values) {
            return true;
        }
        state.last_scanned = Some(values);
        false
    }

    /// The window is scaled to the upright frame the bounding boxes refer to
    fn within_scan_window(&self, frame: &Frame, mut barcodes: Vec<BarcodeResult>) -> Vec<BarcodeResult> {
        if let Some(window) = &self.settings.scan_window {
            let size = geometry::upright_size(frame.width, frame.height, frame.rotation_degrees);
            barcodes.retain(|b| {
                geometry::contains(window, size.width, size.height, b.bounding_box.as_ref())
            });
        }
        barcodes
    }

    /// Stop dispatching and close the decoder
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Closing decode dispatcher");
            self.decoder.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
