use thiserror::Error;

/// Errors raised by the camera host while binding or controlling the device
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("Camera provider unavailable: {details}")]
    Unavailable { details: String },

    #[error("No camera available for the requested position")]
    NoCamera,

    #[error("Camera control failed: {details}")]
    Control { details: String },

    #[error("No use case bound to the camera")]
    NotBound,
}

/// Errors from the external decode capability
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Decoder failed: {message}")]
    Failed { message: String },

    #[error("Unsupported pixel data: {details}")]
    UnsupportedFrame { details: String },

    #[error("Decoder is closed")]
    Closed,
}

/// Errors from photo and video capture jobs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("Output file error: {details}")]
    Output { details: String },

    #[error("Audio recording permission not granted")]
    AudioPermissionDenied,

    #[error("Encoder failed: {details}")]
    Encoder { details: String },

    #[error("Capture abandoned: {reason}")]
    Abandoned { reason: String },

    #[error("Illegal capture transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },
}

#[derive(Error, Debug)]
pub enum ScancamError {
    #[error("Scanner is already started")]
    AlreadyStarted,

    #[error("Scanner is already stopped")]
    AlreadyStopped,

    #[error("Zoom value must be within 0.0 and 1.0")]
    ZoomNotInRange,

    #[error("Zoom cannot be changed while the scanner is stopped")]
    ZoomWhenStopped,

    #[error("A capture is already in progress")]
    CaptureInProgress,

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl ScancamError {
    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Identifier surfaced to the application layer
    pub fn code(&self) -> &'static str {
        match self {
            ScancamError::AlreadyStarted => "AlreadyStarted",
            ScancamError::AlreadyStopped => "AlreadyStopped",
            ScancamError::ZoomNotInRange => "ZoomNotInRange",
            ScancamError::ZoomWhenStopped => "ZoomWhenStopped",
            ScancamError::CaptureInProgress => "CaptureInProgress",
            ScancamError::Camera(CameraError::NoCamera) => "NoCamera",
            ScancamError::Camera(_) => "CameraError",
            ScancamError::Decode(_) => "DecodeError",
            ScancamError::Capture(_) => "CaptureError",
            ScancamError::Config(_) => "ConfigError",
            ScancamError::Io(_) => "IoError",
            ScancamError::Image(_) => "ImageError",
            ScancamError::Component { .. } => "ComponentError",
        }
    }
}

pub type Result<T> = std::result::Result<T, ScancamError>;
