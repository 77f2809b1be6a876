use super::recording::finalize;
use super::*;
use crate::camera::{
    CameraEvent, CameraHost, FinalizeError, MockCameraHost, RecordingScript, UseCase,
};
use crate::config::{CameraPosition, RecordingOptions};
use crate::error::{CameraError, CaptureError, ScancamError};
use crate::events::{EventBus, ScannerEvent};
use crate::geometry::{DisplayRotation, Resolution};
use crate::storage::{DirectorySink, FileSink};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;

struct Fixture {
    host: Arc<MockCameraHost>,
    ctx: CaptureContext,
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new(host: MockCameraHost) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(host);
        let camera: Arc<dyn CameraHost> = host.clone();
        let sink: Arc<dyn FileSink> = Arc::new(DirectorySink::new(dir.path()));
        let ctx = CaptureContext {
            host: camera,
            sink,
            slot: Arc::new(CaptureSlot::new()),
            event_bus: EventBus::new(16),
            position: CameraPosition::Back,
            token: CancellationToken::new(),
        };
        Self { host, ctx, dir }
    }
}

async fn wait_for_binds(host: &MockCameraHost, count: usize) {
    timeout(Duration::from_secs(1), async {
        while host.bind_requests().len() < count {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
}

#[test]
fn test_photo_resolution_follows_display() {
    assert_eq!(
        photo_resolution(480, DisplayRotation::Rotation0),
        Resolution::new(480, 640)
    );
    assert_eq!(
        photo_resolution(480, DisplayRotation::Rotation90),
        Resolution::new(640, 480)
    );
}

#[test]
fn test_capture_state_moves_forward() {
    let mut job = CaptureJob {
        id: 1,
        kind: CaptureKind::Photo,
        state: CaptureState::Idle,
        output: None,
    };

    assert!(job.advance(CaptureState::InProgress).is_err());
    job.advance(CaptureState::AwaitingCameraOpen).unwrap();
    job.advance(CaptureState::InProgress).unwrap();
    assert!(matches!(
        job.advance(CaptureState::Finalizing),
        Err(CaptureError::IllegalTransition { .. })
    ));
    assert!(job.advance(CaptureState::AwaitingCameraOpen).is_err());
    job.advance(CaptureState::Idle).unwrap();
    assert!(job.advance(CaptureState::Idle).is_err());
}

#[test]
fn test_video_may_finalize() {
    let state = CaptureState::InProgress;
    assert!(state.can_advance_to(CaptureState::Finalizing, CaptureKind::Video));
    assert!(!state.can_advance_to(CaptureState::Finalizing, CaptureKind::Photo));
}

#[test]
fn test_capture_slot_holds_one_job() {
    let slot = CaptureSlot::new();
    let id = slot.begin(CaptureKind::Photo).unwrap();

    assert!(matches!(
        slot.begin(CaptureKind::Video),
        Err(ScancamError::CaptureInProgress)
    ));
    // Stale ids are ignored
    assert_eq!(slot.advance(id + 1, CaptureState::AwaitingCameraOpen), Ok(false));
    assert!(slot.finish(id + 1).is_none());

    assert_eq!(slot.advance(id, CaptureState::AwaitingCameraOpen), Ok(true));
    assert_eq!(slot.finish(id).map(|job| job.state), Some(CaptureState::Idle));
    assert!(!slot.is_busy());

    let next = slot.begin(CaptureKind::Video).unwrap();
    assert!(next > id);
}

#[tokio::test]
async fn test_photo_capture_reports_path_and_rotation() {
    let fixture = Fixture::new(MockCameraHost::new().with_sensor_rotation(Some(270)));
    let mut events = fixture.ctx.event_bus.subscribe();

    let handle = spawn_photo(fixture.ctx.clone(), Resolution::new(480, 640)).unwrap();
    assert_eq!(handle.kind(), CaptureKind::Photo);
    let outcome = timeout(Duration::from_secs(1), handle.wait()).await.unwrap();

    match &outcome {
        CaptureOutcome::Finished {
            path,
            rotation_degrees,
        } => {
            assert_eq!(*rotation_degrees, 270);
            assert!(path.starts_with(fixture.dir.path()));
            assert_eq!(std::fs::read(path).unwrap(), b"mock-jpeg");
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(
        fixture.host.bound_use_case(),
        Some(UseCase::Photo {
            target_resolution: Resolution::new(480, 640)
        })
    );
    assert!(!fixture.ctx.slot.is_busy());

    match events.recv().await.unwrap() {
        ScannerEvent::CaptureFinished { kind, path, .. } => {
            assert_eq!(kind, CaptureKind::Photo);
            assert_eq!(Some(&path), outcome.path());
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_photo_defaults_rotation_when_unreported() {
    let fixture = Fixture::new(MockCameraHost::new().with_sensor_rotation(None));

    let handle = spawn_photo(fixture.ctx.clone(), Resolution::new(480, 640)).unwrap();
    match timeout(Duration::from_secs(1), handle.wait()).await.unwrap() {
        CaptureOutcome::Finished {
            rotation_degrees, ..
        } => assert_eq!(rotation_degrees, 90),
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn test_second_open_does_not_capture_twice() {
    let fixture = Fixture::new(MockCameraHost::new().without_auto_open());

    let handle = spawn_photo(fixture.ctx.clone(), Resolution::new(480, 640)).unwrap();
    wait_for_binds(&fixture.host, 1).await;
    fixture.host.emit(CameraEvent::Opened);
    fixture.host.emit(CameraEvent::Opened);

    assert!(timeout(Duration::from_secs(1), handle.wait()).await.unwrap().is_success());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(fixture.host.pictures().len(), 1);
}

#[tokio::test]
async fn test_capture_while_busy_is_rejected() {
    let fixture = Fixture::new(MockCameraHost::new().without_auto_open());

    let _pending = spawn_photo(fixture.ctx.clone(), Resolution::new(480, 640)).unwrap();
    assert!(matches!(
        spawn_recording(fixture.ctx.clone(), RecordingOptions::default()),
        Err(ScancamError::CaptureInProgress)
    ));
    fixture.ctx.token.cancel();
}

#[tokio::test]
async fn test_photo_failure_reports_without_path() {
    let fixture = Fixture::new(MockCameraHost::new());
    fixture.host.fail_pictures(Some(CameraError::Control {
        details: "shutter jammed".to_string(),
    }));

    let handle = spawn_photo(fixture.ctx.clone(), Resolution::new(480, 640)).unwrap();
    let outcome = timeout(Duration::from_secs(1), handle.wait()).await.unwrap();

    assert!(outcome.path().is_none());
    assert!(!fixture.ctx.slot.is_busy());
    // No retry
    assert_eq!(fixture.host.bind_requests().len(), 1);
}

#[tokio::test]
async fn test_photo_bind_failure_reports_failure() {
    let fixture = Fixture::new(MockCameraHost::new());
    fixture.host.fail_next_bind(CameraError::NoCamera);

    let handle = spawn_photo(fixture.ctx.clone(), Resolution::new(480, 640)).unwrap();
    let outcome = timeout(Duration::from_secs(1), handle.wait()).await.unwrap();
    assert!(!outcome.is_success());
}

#[tokio::test(start_paused = true)]
async fn test_recording_watchdog_stops_at_max_duration() {
    let fixture = Fixture::new(MockCameraHost::new());
    let started = Instant::now();

    let handle = spawn_recording(fixture.ctx.clone(), RecordingOptions::default()).unwrap();
    let outcome = handle.wait().await;

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(5000), "stopped after {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(5100), "stopped after {:?}", elapsed);
    match outcome {
        CaptureOutcome::Finished {
            path,
            rotation_degrees,
        } => {
            assert!(path.to_string_lossy().ends_with(".mp4"));
            assert_eq!(rotation_degrees, 90);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(fixture.host.finalize_count(), 1);

    let requests = fixture.host.recordings();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].size_limit_bytes, 2_621_440);
    assert!(requests[0].audio_enabled);
}

#[tokio::test(start_paused = true)]
async fn test_size_limit_finalizes_once() {
    let fixture = Fixture::new(MockCameraHost::new());
    fixture.host.set_recording_script(RecordingScript {
        size_limit_after: Some(Duration::from_millis(1800)),
        finalize_error: None,
    });
    let started = Instant::now();

    let handle = spawn_recording(fixture.ctx.clone(), RecordingOptions::default()).unwrap();
    let outcome = handle.wait().await;

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(1800) && elapsed < Duration::from_millis(5000));
    assert!(outcome.is_success());

    // The watchdog is gone with the job
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(fixture.host.finalize_count(), 1);
    assert!(!fixture.ctx.slot.is_busy());
}

#[tokio::test(start_paused = true)]
async fn test_finalize_error_reports_failure() {
    let fixture = Fixture::new(MockCameraHost::new());
    fixture.host.set_recording_script(RecordingScript {
        size_limit_after: None,
        finalize_error: Some("encoder crashed".to_string()),
    });

    let handle = spawn_recording(fixture.ctx.clone(), RecordingOptions::default()).unwrap();
    match handle.wait().await {
        CaptureOutcome::Failed { reason } => assert!(reason.contains("encoder crashed")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(!fixture.ctx.slot.is_busy());
}

#[tokio::test]
async fn test_missing_audio_permission_fails_fast() {
    let fixture = Fixture::new(MockCameraHost::new());
    fixture.host.set_audio_permission(false);
    let mut events = fixture.ctx.event_bus.subscribe();

    let handle = spawn_recording(fixture.ctx.clone(), RecordingOptions::default()).unwrap();
    let outcome = timeout(Duration::from_secs(1), handle.wait()).await.unwrap();

    assert!(!outcome.is_success());
    assert!(fixture.host.recordings().is_empty());
    assert!(matches!(
        events.recv().await.unwrap(),
        ScannerEvent::CaptureFailed {
            kind: CaptureKind::Video,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_abandons_recording() {
    let fixture = Fixture::new(MockCameraHost::new());

    let handle = spawn_recording(fixture.ctx.clone(), RecordingOptions::default()).unwrap();
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(fixture.host.recordings().len(), 1);

    fixture.ctx.token.cancel();
    match handle.wait().await {
        CaptureOutcome::Failed { reason } => assert!(reason.contains("abandoned")),
        other => panic!("unexpected outcome {:?}", other),
    }
    // The recorder was told to stop
    assert_eq!(fixture.host.finalize_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_recording_binds_back_camera() {
    let mut fixture = Fixture::new(MockCameraHost::new());
    fixture.ctx.position = CameraPosition::Front;

    let handle = spawn_recording(fixture.ctx.clone(), RecordingOptions::default()).unwrap();
    assert!(handle.wait().await.is_success());

    let requests = fixture.host.bind_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].position, CameraPosition::Back);
}

fn recording_in_progress(slot: &CaptureSlot) -> u64 {
    let id = slot.begin(CaptureKind::Video).unwrap();
    slot.advance(id, CaptureState::AwaitingCameraOpen).unwrap();
    slot.advance(id, CaptureState::InProgress).unwrap();
    id
}

#[test]
fn test_size_limit_passes_through_finalizing() {
    let slot = CaptureSlot::new();
    let id = recording_in_progress(&slot);

    let outcome = finalize(
        &slot,
        id,
        false,
        Err(FinalizeError::FileSizeLimitReached {
            path: PathBuf::from("clip.mp4"),
        }),
        90,
    )
    .unwrap();

    assert!(outcome.is_success());
    // Finalizing may only be entered once
    assert!(matches!(
        slot.advance(id, CaptureState::Finalizing),
        Err(CaptureError::IllegalTransition { .. })
    ));
}

#[test]
fn test_finalize_error_passes_through_finalizing() {
    let slot = CaptureSlot::new();
    let id = recording_in_progress(&slot);

    let outcome = finalize(
        &slot,
        id,
        false,
        Err(FinalizeError::Failed {
            message: "muxer lost".to_string(),
        }),
        90,
    )
    .unwrap();

    assert!(!outcome.is_success());
    assert!(slot.advance(id, CaptureState::Finalizing).is_err());
}

#[test]
fn test_watchdog_finalize_does_not_advance_twice() {
    let slot = CaptureSlot::new();
    let id = recording_in_progress(&slot);
    slot.advance(id, CaptureState::Finalizing).unwrap();

    let outcome = finalize(&slot, id, true, Ok(PathBuf::from("clip.mp4")), 270).unwrap();
    assert_eq!(
        outcome,
        CaptureOutcome::Finished {
            path: PathBuf::from("clip.mp4"),
            rotation_degrees: 270
        }
    );
}
