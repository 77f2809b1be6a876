mod host;
pub mod mock;
mod subscription;
#[cfg(test)]
mod tests;

pub use host::{
    BindRequest, CameraEvent, CameraHost, FallbackStrategy, FinalizeError, Quality,
    QualitySelector, RecordEvent, Recording, RecordingRequest, RecordingStart, SessionHandle,
    UseCase,
};
pub use mock::{MockCameraHost, RecordingScript};
pub use subscription::Subscription;
