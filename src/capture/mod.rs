mod context;
mod job;
mod photo;
mod recording;

#[cfg(test)]
mod tests;

pub use context::CaptureContext;
pub use job::{CaptureHandle, CaptureJob, CaptureKind, CaptureOutcome, CaptureSlot, CaptureState};
pub use photo::{photo_resolution, spawn_photo};
pub use recording::spawn_recording;
