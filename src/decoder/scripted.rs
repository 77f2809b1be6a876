use super::Decoder;
use crate::barcode::BarcodeResult;
use crate::error::DecodeError;
use crate::frame::Frame;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

type Response = Result<Vec<BarcodeResult>, DecodeError>;

/// Decoder replaying queued responses, for tests and simulation. Once the
/// queue is empty every frame decodes to the fallback response.
pub struct ScriptedDecoder {
    responses: Mutex<VecDeque<Response>>,
    fallback: Mutex<Response>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    closes: AtomicUsize,
}

impl ScriptedDecoder {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Ok(Vec::new())),
            delay: None,
            calls: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    /// Simulate decode latency
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Answer every frame with `barcodes` once the queue is drained
    pub fn always(self, barcodes: Vec<BarcodeResult>) -> Self {
        *self.fallback.lock() = Ok(barcodes);
        self
    }

    pub fn push_ok(&self, barcodes: Vec<BarcodeResult>) {
        self.responses.lock().push_back(Ok(barcodes));
    }

    pub fn push_err(&self, error: DecodeError) {
        self.responses.lock().push_back(Err(error));
    }

    /// Number of frames submitted so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Decoder for ScriptedDecoder {
    async fn process(&self, _frame: &Frame) -> Result<Vec<BarcodeResult>, DecodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.responses.lock().pop_front();
        match next {
            Some(response) => response,
            None => self.fallback.lock().clone(),
        }
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
