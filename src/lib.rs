pub mod analyzer;
pub mod barcode;
pub mod camera;
pub mod capture;
pub mod config;
pub mod decoder;
pub mod error;
pub mod events;
pub mod frame;
pub mod frame_slot;
pub mod geometry;
pub mod session;
pub mod storage;
pub mod thumbnail;

pub use analyzer::{AnalyzerMetrics, FrameAnalyzer};
pub use barcode::{BarcodeFormat, BarcodePayload, BarcodeResult, BarcodeType};
pub use camera::{CameraEvent, CameraHost, MockCameraHost};
pub use capture::{CaptureHandle, CaptureKind, CaptureOutcome};
pub use config::{DetectionSpeed, ScancamConfig, StartConfig};
pub use decoder::{DecodeDispatcher, Decoder, DecoderFactory, QrDecoder, ScriptedDecoder};
pub use error::{CameraError, CaptureError, DecodeError, Result, ScancamError};
pub use events::{EventBus, EventFilter, EventReceiver, ScannerEvent};
pub use frame::{Frame, PixelFormat};
pub use frame_slot::FrameSlot;
pub use geometry::{DisplayRotation, Rect, Resolution, ScanWindow};
pub use session::{SessionController, SessionMode, SessionState, StartInfo};
pub use storage::{DirectorySink, FileSink};
