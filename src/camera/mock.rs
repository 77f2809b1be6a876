use super::host::{
    BindRequest, CameraEvent, CameraHost, FinalizeError, RecordEvent, Recording,
    RecordingRequest, RecordingStart, SessionHandle, UseCase,
};
use crate::error::CameraError;
use crate::frame::Frame;
use crate::frame_slot::FrameSlot;
use crate::geometry::{DisplayRotation, Resolution};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

/// How the mock behaves when a recording runs
#[derive(Debug, Clone, Default)]
pub struct RecordingScript {
    /// Finalize with `FileSizeLimitReached` after this long
    pub size_limit_after: Option<Duration>,
    /// Finalize with this error when stopped
    pub finalize_error: Option<String>,
}

#[derive(Debug)]
struct MockState {
    stream: Resolution,
    has_flash: bool,
    sensor_rotation: Option<u16>,
    display_rotation: DisplayRotation,
    bound: Option<UseCase>,
    bind_requests: Vec<BindRequest>,
    fail_bind: Option<CameraError>,
    auto_open: bool,
    next_texture_id: i64,
    texture_id: Option<i64>,
    released_surfaces: Vec<i64>,
    unbind_count: usize,
    torch: bool,
    linear_zoom: f32,
    zoom_ratio: f32,
    target_resolutions: Vec<Resolution>,
    audio_permission: bool,
    picture_error: Option<CameraError>,
    pictures: Vec<PathBuf>,
    recording_script: RecordingScript,
    recordings: Vec<RecordingRequest>,
}

/// In-memory camera host for tests and simulation runs
pub struct MockCameraHost {
    state: Mutex<MockState>,
    frame_slot: Mutex<Option<Arc<FrameSlot>>>,
    events: broadcast::Sender<CameraEvent>,
    finalize_count: Arc<AtomicU32>,
}

impl MockCameraHost {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(MockState {
                stream: Resolution::new(640, 480),
                has_flash: true,
                sensor_rotation: Some(90),
                display_rotation: DisplayRotation::Rotation0,
                bound: None,
                bind_requests: Vec::new(),
                fail_bind: None,
                auto_open: true,
                next_texture_id: 1,
                texture_id: None,
                released_surfaces: Vec::new(),
                unbind_count: 0,
                torch: false,
                linear_zoom: 0.0,
                zoom_ratio: 1.0,
                target_resolutions: Vec::new(),
                audio_permission: true,
                picture_error: None,
                pictures: Vec::new(),
                recording_script: RecordingScript::default(),
                recordings: Vec::new(),
            }),
            frame_slot: Mutex::new(None),
            events,
            finalize_count: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn with_stream(self, stream: Resolution) -> Self {
        self.state.lock().stream = stream;
        self
    }

    pub fn with_flash(self, has_flash: bool) -> Self {
        self.state.lock().has_flash = has_flash;
        self
    }

    pub fn with_sensor_rotation(self, degrees: Option<u16>) -> Self {
        self.state.lock().sensor_rotation = degrees;
        self
    }

    /// Do not raise `Opened` after binding; tests call [`Self::emit`] instead
    pub fn without_auto_open(self) -> Self {
        self.state.lock().auto_open = false;
        self
    }

    pub fn fail_next_bind(&self, error: CameraError) {
        self.state.lock().fail_bind = Some(error);
    }

    pub fn set_audio_permission(&self, granted: bool) {
        self.state.lock().audio_permission = granted;
    }

    pub fn fail_pictures(&self, error: Option<CameraError>) {
        self.state.lock().picture_error = error;
    }

    pub fn set_recording_script(&self, script: RecordingScript) {
        self.state.lock().recording_script = script;
    }

    /// Rotate the display and notify observers
    pub fn rotate_display(&self, rotation: DisplayRotation) {
        self.state.lock().display_rotation = rotation;
        self.emit(CameraEvent::DisplayChanged { rotation });
    }

    /// Raise a camera event
    pub fn emit(&self, event: CameraEvent) {
        let _ = self.events.send(event);
    }

    /// Deliver a frame as the camera would. Frames are released immediately
    /// when no analyzer is registered.
    pub fn push_frame(&self, frame: Frame) -> bool {
        let slot = self.frame_slot.lock().clone();
        match slot {
            Some(slot) => slot.push(frame),
            None => {
                frame.release();
                false
            }
        }
    }

    pub fn has_frame_slot(&self) -> bool {
        self.frame_slot.lock().is_some()
    }

    pub fn bound_use_case(&self) -> Option<UseCase> {
        self.state.lock().bound
    }

    pub fn bind_requests(&self) -> Vec<BindRequest> {
        self.state.lock().bind_requests.clone()
    }

    pub fn unbind_count(&self) -> usize {
        self.state.lock().unbind_count
    }

    pub fn released_surfaces(&self) -> Vec<i64> {
        self.state.lock().released_surfaces.clone()
    }

    pub fn torch(&self) -> bool {
        self.state.lock().torch
    }

    pub fn linear_zoom(&self) -> f32 {
        self.state.lock().linear_zoom
    }

    pub fn zoom_ratio(&self) -> f32 {
        self.state.lock().zoom_ratio
    }

    pub fn target_resolutions(&self) -> Vec<Resolution> {
        self.state.lock().target_resolutions.clone()
    }

    pub fn pictures(&self) -> Vec<PathBuf> {
        self.state.lock().pictures.clone()
    }

    pub fn recordings(&self) -> Vec<RecordingRequest> {
        self.state.lock().recordings.clone()
    }

    /// Number of finalize events raised across all recordings
    pub fn finalize_count(&self) -> u32 {
        self.finalize_count.load(Ordering::SeqCst)
    }

    pub fn observer_count(&self) -> usize {
        self.events.receiver_count()
    }
}

impl Default for MockCameraHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraHost for MockCameraHost {
    async fn bind(&self, request: BindRequest) -> Result<SessionHandle, CameraError> {
        let (handle, auto_open) = {
            let mut state = self.state.lock();
            state.bind_requests.push(request);
            if let Some(error) = state.fail_bind.take() {
                return Err(error);
            }

            let stream = match request.use_case {
                UseCase::Analysis {
                    target_resolution: Some(resolution),
                } => resolution,
                UseCase::Photo { target_resolution } => target_resolution,
                _ => state.stream,
            };

            // Rebinding keeps the preview surface until it is released
            let texture_id = match state.texture_id {
                Some(id) => id,
                None => {
                    let id = state.next_texture_id;
                    state.next_texture_id += 1;
                    state.texture_id = Some(id);
                    id
                }
            };
            state.bound = Some(request.use_case);

            (
                SessionHandle {
                    width: stream.width,
                    height: stream.height,
                    has_flash: state.has_flash,
                    texture_id,
                    sensor_rotation_degrees: state.sensor_rotation,
                },
                state.auto_open,
            )
        };

        debug!("Mock camera bound to {}", request.use_case.name());
        if auto_open {
            self.emit(CameraEvent::Opened);
        }
        Ok(handle)
    }

    async fn unbind(&self) {
        let mut state = self.state.lock();
        state.bound = None;
        state.unbind_count += 1;
    }

    fn release_surface(&self, texture_id: i64) {
        let mut state = self.state.lock();
        if state.texture_id == Some(texture_id) {
            state.texture_id = None;
        }
        state.released_surfaces.push(texture_id);
    }

    fn set_frame_slot(&self, slot: Option<Arc<FrameSlot>>) {
        *self.frame_slot.lock() = slot;
    }

    fn subscribe(&self) -> broadcast::Receiver<CameraEvent> {
        self.events.subscribe()
    }

    fn display_rotation(&self) -> DisplayRotation {
        self.state.lock().display_rotation
    }

    async fn set_target_resolution(&self, resolution: Resolution) -> Result<(), CameraError> {
        let mut state = self.state.lock();
        if state.bound.is_none() {
            return Err(CameraError::NotBound);
        }
        state.target_resolutions.push(resolution);
        Ok(())
    }

    async fn enable_torch(&self, enabled: bool) -> Result<(), CameraError> {
        self.state.lock().torch = enabled;
        self.emit(CameraEvent::TorchState { enabled });
        Ok(())
    }

    async fn set_linear_zoom(&self, value: f32) -> Result<(), CameraError> {
        self.state.lock().linear_zoom = value;
        self.emit(CameraEvent::ZoomState { linear: value });
        Ok(())
    }

    async fn set_zoom_ratio(&self, ratio: f32) -> Result<(), CameraError> {
        {
            let mut state = self.state.lock();
            state.zoom_ratio = ratio;
            state.linear_zoom = 0.0;
        }
        self.emit(CameraEvent::ZoomState { linear: 0.0 });
        Ok(())
    }

    async fn take_picture(&self, output: &Path) -> Result<(), CameraError> {
        let error = {
            let state = self.state.lock();
            if !matches!(state.bound, Some(UseCase::Photo { .. })) {
                return Err(CameraError::NotBound);
            }
            state.picture_error.clone()
        };
        if let Some(error) = error {
            return Err(error);
        }

        tokio::fs::write(output, b"mock-jpeg")
            .await
            .map_err(|e| CameraError::Control {
                details: e.to_string(),
            })?;
        self.state.lock().pictures.push(output.to_path_buf());
        Ok(())
    }

    fn has_audio_permission(&self) -> bool {
        self.state.lock().audio_permission
    }

    async fn start_recording(
        &self,
        request: RecordingRequest,
    ) -> Result<RecordingStart, CameraError> {
        let script = {
            let mut state = self.state.lock();
            if !matches!(state.bound, Some(UseCase::Video { .. })) {
                return Err(CameraError::NotBound);
            }
            state.recordings.push(request.clone());
            state.recording_script.clone()
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let recording = Arc::new(MockRecording {
            tx: tx.clone(),
            path: request.output.clone(),
            finalized: AtomicBool::new(false),
            finalize_error: script.finalize_error,
            finalize_count: Arc::clone(&self.finalize_count),
        });

        let _ = tx.send(RecordEvent::Started);

        if let Some(after) = script.size_limit_after {
            let recording = Arc::clone(&recording);
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                let path = recording.path.clone();
                recording.finalize(Err(FinalizeError::FileSizeLimitReached { path }));
            });
        }

        Ok((Box::new(MockRecordingControl(recording)), rx))
    }
}

struct MockRecording {
    tx: mpsc::UnboundedSender<RecordEvent>,
    path: PathBuf,
    finalized: AtomicBool,
    finalize_error: Option<String>,
    finalize_count: Arc<AtomicU32>,
}

impl MockRecording {
    fn finalize(&self, outcome: Result<PathBuf, FinalizeError>) {
        if self.finalized.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = std::fs::write(&self.path, b"mock-mp4");
        self.finalize_count.fetch_add(1, Ordering::SeqCst);
        let _ = self.tx.send(RecordEvent::Finalized(outcome));
    }
}

struct MockRecordingControl(Arc<MockRecording>);

impl Recording for MockRecordingControl {
    fn stop(&self) {
        let outcome = match &self.0.finalize_error {
            Some(message) => Err(FinalizeError::Failed {
                message: message.clone(),
            }),
            None => Ok(self.0.path.clone()),
        };
        self.0.finalize(outcome);
    }
}
