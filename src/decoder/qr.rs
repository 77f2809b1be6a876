use super::Decoder;
use crate::barcode::{BarcodeFormat, BarcodeResult, Point};
use crate::error::DecodeError;
use crate::frame::Frame;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

/// QR code decoder backed by `rqrr`
#[derive(Debug, Default)]
pub struct QrDecoder {
    closed: AtomicBool,
}

impl QrDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Decoder for QrDecoder {
    async fn process(&self, frame: &Frame) -> Result<Vec<BarcodeResult>, DecodeError> {
        if self.is_closed() {
            return Err(DecodeError::Closed);
        }

        let luma = frame.luma().ok_or_else(|| DecodeError::UnsupportedFrame {
            details: format!(
                "{:?} frame {} has {} bytes for {}x{}",
                frame.format,
                frame.id,
                frame.data.len(),
                frame.width,
                frame.height
            ),
        })?;
        let (width, height, rotation) = (frame.width, frame.height, frame.rotation_degrees);

        // Detection is CPU bound
        tokio::task::spawn_blocking(move || detect(&luma, width, height, rotation))
            .await
            .map_err(|e| DecodeError::Failed {
                message: format!("QR detection task failed: {}", e),
            })
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn detect(luma: &[u8], width: u32, height: u32, rotation_degrees: u16) -> Vec<BarcodeResult> {
    let w = width as usize;
    let mut prepared =
        rqrr::PreparedImage::prepare_from_greyscale(w, height as usize, |x, y| luma[y * w + x]);
    let grids = prepared.detect_grids();
    trace!("Found {} QR grid candidates", grids.len());

    let mut results = Vec::with_capacity(grids.len());
    for grid in grids {
        match grid.decode() {
            Ok((_meta, content)) => {
                let corners = grid
                    .bounds
                    .iter()
                    .map(|p| upright(p.x as f32, p.y as f32, width, height, rotation_degrees))
                    .collect();
                results.push(
                    BarcodeResult::from_text(BarcodeFormat::QrCode, content).with_corners(corners),
                );
            }
            Err(e) => debug!("Failed to decode QR grid: {}", e),
        }
    }
    results
}

/// Map a sensor-space point into the frame rotated clockwise by `degrees`
fn upright(x: f32, y: f32, width: u32, height: u32, degrees: u16) -> Point {
    let (w, h) = (width as f32, height as f32);
    let (x, y) = match degrees % 360 {
        90 => (h - y, x),
        180 => (w - x, h - y),
        270 => (y, w - x),
        _ => (x, y),
    };
    Point { x, y }
}
