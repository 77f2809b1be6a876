//! Barcode decode capability and the dispatcher that throttles it.

mod dispatcher;
mod qr;
mod scripted;


pub use dispatcher::{DecodeDispatcher, Detection, DispatchOutcome, DispatchSettings};
pub use qr::QrDecoder;
pub use scripted::ScriptedDecoder;

use crate::barcode::BarcodeResult;
use crate::error::DecodeError;
use crate::frame::Frame;
use async_trait::async_trait;
use std::sync::Arc;

/// Opaque decode capability. Bounding boxes and corners of the returned
/// barcodes are in upright image coordinates.
#[async_trait]
pub trait Decoder: Send + Sync {
    async fn process(&self, frame: &Frame) -> Result<Vec<BarcodeResult>, DecodeError>;

    /// Release decoder resources. Later calls to `process` may fail.
    fn close(&self) {}
}

/// Creates a fresh decoder for each scanning session
pub trait DecoderFactory: Send + Sync {
    fn create(&self) -> Arc<dyn Decoder>;
}

impl<F> DecoderFactory for F
where
    F: Fn() -> Arc<dyn Decoder> + Send + Sync,
{
    fn create(&self) -> Arc<dyn Decoder> {
        self()
    }
}
