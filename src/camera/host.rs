use crate::config::CameraPosition;
use crate::error::CameraError;
use crate::frame_slot::FrameSlot;
use crate::geometry::{DisplayRotation, Resolution};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// Recorder quality levels, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Quality {
    Lowest,
    Sd,
    Hd,
    FullHd,
    Uhd,
    Highest,
}

/// What to do when the preferred quality is not supported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackStrategy {
    /// Prefer a higher quality, else the closest one below the given level
    HigherQualityOrLowerThan(Quality),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualitySelector {
    pub preferred: Quality,
    pub fallback: FallbackStrategy,
}

impl QualitySelector {
    /// Lowest acceptable quality, falling back upward from SD
    pub fn lowest_with_sd_fallback() -> Self {
        Self {
            preferred: Quality::Lowest,
            fallback: FallbackStrategy::HigherQualityOrLowerThan(Quality::Sd),
        }
    }
}

/// Camera use case bound exclusively to the device
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UseCase {
    /// Preview plus latest-only frame analysis
    Analysis {
        target_resolution: Option<Resolution>,
    },
    /// Preview plus still capture
    Photo { target_resolution: Resolution },
    /// Preview plus video recording
    Video { quality: QualitySelector },
}

impl UseCase {
    pub fn name(&self) -> &'static str {
        match self {
            UseCase::Analysis { .. } => "analysis",
            UseCase::Photo { .. } => "photo",
            UseCase::Video { .. } => "video",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BindRequest {
    pub position: CameraPosition,
    pub use_case: UseCase,
}

/// Result of a successful bind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHandle {
    /// Stream width in sensor orientation
    pub width: u32,
    /// Stream height in sensor orientation
    pub height: u32,
    pub has_flash: bool,
    /// Preview surface identifier
    pub texture_id: i64,
    /// Sensor mounting rotation, when the device reports one
    pub sensor_rotation_degrees: Option<u16>,
}

/// Notifications raised by the camera host
#[derive(Debug, Clone, PartialEq)]
pub enum CameraEvent {
    Opened,
    TorchState { enabled: bool },
    ZoomState { linear: f32 },
    DisplayChanged { rotation: DisplayRotation },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordingRequest {
    pub output: PathBuf,
    pub size_limit_bytes: u64,
    pub audio_enabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FinalizeError {
    /// Recording stopped because the output reached its size limit; the
    /// file is complete
    FileSizeLimitReached { path: PathBuf },
    Failed { message: String },
}

/// Events reported by an active recording
#[derive(Debug, Clone, PartialEq)]
pub enum RecordEvent {
    Started,
    Finalized(Result<PathBuf, FinalizeError>),
}

/// Control surface of an active recording
pub trait Recording: Send + Sync {
    /// Request the recording to stop; finalize arrives as a [`RecordEvent`]
    fn stop(&self);
}

pub type RecordingStart = (Box<dyn Recording>, mpsc::UnboundedReceiver<RecordEvent>);

/// Camera device owned by the session controller
#[async_trait]
pub trait CameraHost: Send + Sync {
    /// Bind exclusively to a use case, replacing any previous binding
    async fn bind(&self, request: BindRequest) -> Result<SessionHandle, CameraError>;

    /// Unbind every use case
    async fn unbind(&self);

    /// Give back the preview surface created by `bind`
    fn release_surface(&self, texture_id: i64);

    /// Register (or clear) the slot analysis frames are delivered into
    fn set_frame_slot(&self, slot: Option<Arc<FrameSlot>>);

    /// Subscribe to camera notifications
    fn subscribe(&self) -> broadcast::Receiver<CameraEvent>;

    fn display_rotation(&self) -> DisplayRotation;

    /// Retarget the analysis stream after a display rotation
    async fn set_target_resolution(&self, resolution: Resolution) -> Result<(), CameraError>;

    async fn enable_torch(&self, enabled: bool) -> Result<(), CameraError>;

    async fn set_linear_zoom(&self, value: f32) -> Result<(), CameraError>;

    async fn set_zoom_ratio(&self, ratio: f32) -> Result<(), CameraError>;

    /// Capture a still into `output`, resolving once the file is written
    async fn take_picture(&self, output: &Path) -> Result<(), CameraError>;

    fn has_audio_permission(&self) -> bool;

    async fn start_recording(&self, request: RecordingRequest)
        -> Result<RecordingStart, CameraError>;
}
