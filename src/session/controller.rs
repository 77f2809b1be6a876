use crate::analyzer::FrameAnalyzer;
use crate::barcode::BarcodeResult;
use crate::camera::{BindRequest, CameraEvent, CameraHost, SessionHandle, Subscription, UseCase};
use crate::capture::{self, CaptureContext, CaptureHandle, CaptureSlot};
use crate::config::{RecordingOptions, StartConfig};
use crate::decoder::{DecodeDispatcher, DecoderFactory, DispatchSettings};
use crate::error::{Result, ScancamError};
use crate::events::{EventBus, ScannerEvent};
use crate::frame::{Frame, PixelFormat};
use crate::frame_slot::FrameSlot;
use crate::geometry::{reported_size, target_resolution, Resolution};
use crate::storage::FileSink;
use crate::thumbnail::DEFAULT_SENSOR_ROTATION;

use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Use case currently bound to the camera. Modes are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Scanning,
    Photo,
    Video,
}

/// What `start` reports back to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartInfo {
    pub session_id: u64,
    /// Stream width, portrait oriented for 90/270 degree sensors
    pub width: u32,
    pub height: u32,
    pub has_flash: bool,
    pub texture_id: i64,
}

struct ActiveSession {
    id: u64,
    config: StartConfig,
    handle: SessionHandle,
    mode: SessionMode,
    token: CancellationToken,
    dispatcher: Arc<DecodeDispatcher>,
    analyzer: Option<FrameAnalyzer>,
    observers: Vec<Subscription>,
    captures: Arc<CaptureSlot>,
}

struct Inner {
    state: SessionState,
    session: Option<ActiveSession>,
    next_session_id: u64,
}

/// Owns the camera session and decides which use case is bound to it
pub struct SessionController {
    host: Arc<dyn CameraHost>,
    decoders: Arc<dyn DecoderFactory>,
    sink: Arc<dyn FileSink>,
    event_bus: EventBus,
    recording: RecordingOptions,
    scan_image_width: u32,
    inner: Mutex<Inner>,
}

impl SessionController {
    pub fn new(
        host: Arc<dyn CameraHost>,
        decoders: Arc<dyn DecoderFactory>,
        sink: Arc<dyn FileSink>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            host,
            decoders,
            sink,
            event_bus,
            recording: RecordingOptions::default(),
            scan_image_width: 480,
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                session: None,
                next_session_id: 1,
            }),
        }
    }

    pub fn with_recording_options(mut self, options: RecordingOptions) -> Self {
        self.recording = options;
        self
    }

    /// Default width used by [`Self::capture_photo`] callers that have none
    pub fn with_scan_image_width(mut self, width: u32) -> Self {
        self.scan_image_width = width;
        self
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub async fn mode(&self) -> Option<SessionMode> {
        self.inner.lock().await.session.as_ref().map(|s| s.mode)
    }

    pub async fn is_running(&self) -> bool {
        self.state().await == SessionState::Running
    }

    /// Bind the camera for scanning and start analyzing frames
    pub async fn start(&self, config: StartConfig) -> Result<StartInfo> {
        let mut inner = self.inner.lock().await;
        if inner.session.is_some() || inner.state != SessionState::Idle {
            return Err(ScancamError::AlreadyStarted);
        }
        inner.state = SessionState::Starting;
        info!("Starting scanner session");

        let slot = Arc::new(FrameSlot::new());
        let handle = match self.bind_analysis(&config, &slot).await {
            Ok(handle) => handle,
            Err(e) => {
                self.host.set_frame_slot(None);
                slot.close();
                inner.state = SessionState::Idle;
                warn!("Camera binding failed: {}", e);
                return Err(e);
            }
        };

        let id = inner.next_session_id;
        inner.next_session_id += 1;
        let token = CancellationToken::new();
        let sensor_rotation = handle
            .sensor_rotation_degrees
            .unwrap_or(DEFAULT_SENSOR_ROTATION);

        let dispatcher = Arc::new(DecodeDispatcher::new(
            self.decoders.create(),
            Arc::clone(&self.sink),
            DispatchSettings::new(&config, sensor_rotation),
        ));
        let analyzer = FrameAnalyzer::spawn(
            id,
            Arc::clone(&slot),
            Arc::clone(&dispatcher),
            self.event_bus.clone(),
            &token,
        );

        if handle.has_flash && config.torch {
            if let Err(e) = self.host.enable_torch(true).await {
                warn!("Could not enable torch: {}", e);
            }
        }
        let observers = self.register_observers(&config, &token);

        let size = reported_size(Resolution::new(handle.width, handle.height), sensor_rotation);
        let info = StartInfo {
            session_id: id,
            width: size.width,
            height: size.height,
            has_flash: handle.has_flash,
            texture_id: handle.texture_id,
        };

        inner.session = Some(ActiveSession {
            id,
            config,
            handle,
            mode: SessionMode::Scanning,
            token,
            dispatcher,
            analyzer: Some(analyzer),
            observers,
            captures: Arc::new(CaptureSlot::new()),
        });
        inner.state = SessionState::Running;

        info!(
            "Scanner session {} running at {}x{} (flash: {})",
            id, info.width, info.height, info.has_flash
        );
        Ok(info)
    }

    async fn bind_analysis(&self, config: &StartConfig, slot: &Arc<FrameSlot>) -> Result<SessionHandle> {
        let target = config
            .camera_resolution
            .map(|resolution| target_resolution(resolution, self.host.display_rotation()));

        self.host.set_frame_slot(Some(Arc::clone(slot)));
        let handle = self
            .host
            .bind(BindRequest {
                position: config.camera_position,
                use_case: UseCase::Analysis {
                    target_resolution: target,
                },
            })
            .await?;
        Ok(handle)
    }

    fn register_observers(&self, config: &StartConfig, token: &CancellationToken) -> Vec<Subscription> {
        let event_bus = self.event_bus.clone();
        let state = Subscription::spawn("camera_state", self.host.subscribe(), token, move |event| {
            let event_bus = event_bus.clone();
            async move {
                match event {
                    CameraEvent::TorchState { enabled } => {
                        event_bus.publish(ScannerEvent::TorchChanged { enabled });
                    }
                    CameraEvent::ZoomState { linear } => {
                        event_bus.publish(ScannerEvent::ZoomChanged { value: linear });
                    }
                    _ => {}
                }
            }
        });

        let mut observers = vec![state];

        // Rotation only matters when a resolution was requested
        if let Some(resolution) = config.camera_resolution {
            let host = Arc::clone(&self.host);
            let display = Subscription::spawn("display", self.host.subscribe(), token, move |event| {
                let host = Arc::clone(&host);
                async move {
                    if let CameraEvent::DisplayChanged { rotation } = event {
                        let target = target_resolution(resolution, rotation);
                        debug!("Display rotated to {:?}, retargeting {:?}", rotation, target);
                        if let Err(e) = host.set_target_resolution(target).await {
                            warn!("Could not retarget analysis resolution: {}", e);
                        }
                    }
                }
            });
            observers.push(display);
        }

        observers
    }

    /// Tear the session down. Safe while a capture is in flight; the job
    /// reports failure to its caller.
    pub async fn stop(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let session = match inner.session.take() {
            Some(session) => session,
            None => return Err(ScancamError::AlreadyStopped),
        };
        inner.state = SessionState::Stopping;
        info!("Stopping scanner session {}", session.id);

        session.token.cancel();
        for observer in session.observers {
            debug!("Unregistering observer '{}'", observer.name());
            observer.unsubscribe();
        }
        if let Some(analyzer) = session.analyzer {
            analyzer.stop().await;
        }
        self.host.set_frame_slot(None);
        session.dispatcher.close();

        if let Some(job) = session.captures.abandon() {
            info!("Abandoning {:?} capture {}", job.kind, job.id);
        }

        self.host.unbind().await;
        self.host.release_surface(session.handle.texture_id);
        inner.state = SessionState::Idle;

        info!("Scanner session {} stopped", session.id);
        Ok(())
    }

    /// Forward the torch state. Without a session or flash unit this is a
    /// no-op.
    pub async fn set_torch(&self, enabled: bool) -> Result<()> {
        let inner = self.inner.lock().await;
        match inner.session.as_ref() {
            Some(session) if session.handle.has_flash => {
                self.host.enable_torch(enabled).await?;
            }
            _ => debug!("No torch to switch"),
        }
        Ok(())
    }

    /// Apply a linear zoom in `[0, 1]`
    pub async fn set_zoom(&self, value: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&value) {
            return Err(ScancamError::ZoomNotInRange);
        }

        let inner = self.inner.lock().await;
        if inner.session.is_none() {
            return Err(ScancamError::ZoomWhenStopped);
        }
        self.host.set_linear_zoom(value).await?;
        Ok(())
    }

    /// Reset to a zoom ratio of 1.0
    pub async fn reset_zoom(&self) -> Result<()> {
        let inner = self.inner.lock().await;
        if inner.session.is_none() {
            return Err(ScancamError::ZoomWhenStopped);
        }
        self.host.set_zoom_ratio(1.0).await?;
        Ok(())
    }

    /// Rebind for still capture at `scan_image_width`, or the configured width
    /// when none is given. Scanning stops until [`Self::resume_scanning`].
    pub async fn capture_photo(&self, scan_image_width: Option<u32>) -> Result<CaptureHandle> {
        let mut inner = self.inner.lock().await;
        let session = inner.session.as_mut().ok_or(ScancamError::AlreadyStopped)?;
        if session.captures.is_busy() {
            return Err(ScancamError::CaptureInProgress);
        }

        self.leave_scanning(session).await;
        let width = scan_image_width.unwrap_or(self.scan_image_width);
        let resolution = capture::photo_resolution(width, self.host.display_rotation());
        let handle = capture::spawn_photo(self.capture_context(session), resolution)?;
        session.mode = SessionMode::Photo;

        info!("Photo capture {} requested at {:?}", handle.id(), resolution);
        Ok(handle)
    }

    /// Rebind for video. Scanning stops until [`Self::resume_scanning`].
    pub async fn record_video(&self) -> Result<CaptureHandle> {
        let mut inner = self.inner.lock().await;
        let session = inner.session.as_mut().ok_or(ScancamError::AlreadyStopped)?;
        if session.captures.is_busy() {
            return Err(ScancamError::CaptureInProgress);
        }

        self.leave_scanning(session).await;
        let handle = capture::spawn_recording(self.capture_context(session), self.recording)?;
        session.mode = SessionMode::Video;

        info!("Video capture {} requested", handle.id());
        Ok(handle)
    }

    /// Rebind the analysis use case after a capture ended
    pub async fn resume_scanning(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let session = inner.session.as_mut().ok_or(ScancamError::AlreadyStopped)?;
        if session.mode == SessionMode::Scanning {
            debug!("Session {} is already scanning", session.id);
            return Ok(());
        }
        if session.captures.is_busy() {
            return Err(ScancamError::CaptureInProgress);
        }

        let slot = Arc::new(FrameSlot::new());
        let handle = match self.bind_analysis(&session.config, &slot).await {
            Ok(handle) => handle,
            Err(e) => {
                self.host.set_frame_slot(None);
                return Err(e);
            }
        };
        session.handle = SessionHandle {
            texture_id: session.handle.texture_id,
            ..handle
        };
        session.analyzer = Some(FrameAnalyzer::spawn(
            session.id,
            slot,
            Arc::clone(&session.dispatcher),
            self.event_bus.clone(),
            &session.token,
        ));
        session.mode = SessionMode::Scanning;

        info!("Session {} resumed scanning", session.id);
        Ok(())
    }

    async fn leave_scanning(&self, session: &mut ActiveSession) {
        if let Some(analyzer) = session.analyzer.take() {
            analyzer.stop().await;
            self.host.set_frame_slot(None);
        }
    }

    fn capture_context(&self, session: &ActiveSession) -> CaptureContext {
        CaptureContext {
            host: Arc::clone(&self.host),
            sink: Arc::clone(&self.sink),
            slot: Arc::clone(&session.captures),
            event_bus: self.event_bus.clone(),
            position: session.config.camera_position,
            token: session.token.child_token(),
        }
    }

    /// Decode a still image from disk. No session is needed. Returns `None`
    /// when nothing was found.
    pub async fn analyze_image(&self, path: &Path) -> Result<Option<Vec<BarcodeResult>>> {
        let path = path.to_path_buf();
        let frame = tokio::task::spawn_blocking(move || -> Result<Frame> {
            let image = image::open(&path)?.to_luma8();
            let (width, height) = image.dimensions();
            Ok(Frame::new(0, image.into_raw(), width, height, 0, PixelFormat::Luma8))
        })
        .await
        .map_err(|e| ScancamError::component("analyze_image", e.to_string().as_str()))??;

        let decoder = self.decoders.create();
        let result = decoder.process(&frame).await;
        decoder.close();
        frame.release();

        match result {
            Ok(barcodes) if barcodes.is_empty() => Ok(None),
            Ok(barcodes) => Ok(Some(barcodes)),
            Err(e) => {
                self.event_bus.publish(ScannerEvent::Error {
                    message: e.to_string(),
                });
                Err(e.into())
            }
        }
    }
}
