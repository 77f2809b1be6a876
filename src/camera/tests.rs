use super::*;
use crate::config::CameraPosition;
use crate::error::CameraError;
use crate::frame::{Frame, PixelFormat};
use crate::frame_slot::FrameSlot;
use crate::geometry::{DisplayRotation, Resolution};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn analysis_request() -> BindRequest {
    BindRequest {
        position: CameraPosition::Back,
        use_case: UseCase::Analysis {
            target_resolution: None,
        },
    }
}

#[tokio::test]
async fn test_mock_bind_reports_handle() {
    let host = MockCameraHost::new().with_stream(Resolution::new(1280, 720));

    let handle = host.bind(analysis_request()).await.unwrap();
    assert_eq!(handle.width, 1280);
    assert_eq!(handle.height, 720);
    assert!(handle.has_flash);
    assert_eq!(handle.sensor_rotation_degrees, Some(90));
    assert_eq!(host.bound_use_case(), Some(analysis_request().use_case));

    // Rebinding keeps the surface, a new one is created once it is released
    let rebound = host.bind(analysis_request()).await.unwrap();
    assert_eq!(handle.texture_id, rebound.texture_id);
    host.release_surface(handle.texture_id);
    let fresh = host.bind(analysis_request()).await.unwrap();
    assert_ne!(handle.texture_id, fresh.texture_id);
}

#[tokio::test]
async fn test_mock_bind_failure_is_one_shot() {
    let host = MockCameraHost::new();
    host.fail_next_bind(CameraError::NoCamera);

    assert_eq!(
        host.bind(analysis_request()).await.unwrap_err(),
        CameraError::NoCamera
    );
    assert!(host.bound_use_case().is_none());
    assert!(host.bind(analysis_request()).await.is_ok());
}

#[tokio::test]
async fn test_mock_raises_opened_on_bind() {
    let host = MockCameraHost::new();
    let mut events = host.subscribe();

    host.bind(analysis_request()).await.unwrap();
    assert_eq!(events.recv().await.unwrap(), CameraEvent::Opened);
}

#[tokio::test]
async fn test_push_frame_without_slot_releases() {
    let host = MockCameraHost::new();
    let released = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&released);
    let frame = Frame::new(1, vec![0u8; 4], 2, 2, 0, PixelFormat::Luma8).with_release(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(!host.push_frame(frame));
    assert_eq!(released.load(Ordering::SeqCst), 1);

    let slot = Arc::new(FrameSlot::new());
    host.set_frame_slot(Some(Arc::clone(&slot)));
    assert!(host.push_frame(Frame::new(2, vec![0u8; 4], 2, 2, 0, PixelFormat::Luma8)));
    assert_eq!(slot.try_take().map(|f| f.id), Some(2));
}

#[tokio::test]
async fn test_take_picture_requires_photo_binding() {
    let dir = tempfile::tempdir().unwrap();
    let host = MockCameraHost::new();
    let output = dir.path().join("photo.jpg");

    assert_eq!(
        host.take_picture(&output).await.unwrap_err(),
        CameraError::NotBound
    );

    host.bind(BindRequest {
        position: CameraPosition::Back,
        use_case: UseCase::Photo {
            target_resolution: Resolution::new(480, 640),
        },
    })
    .await
    .unwrap();
    host.take_picture(&output).await.unwrap();
    assert!(output.exists());
    assert_eq!(host.pictures(), vec![output]);
}

#[tokio::test(start_paused = true)]
async fn test_mock_recording_finalizes_once() {
    let dir = tempfile::tempdir().unwrap();
    let host = MockCameraHost::new();
    host.set_recording_script(RecordingScript {
        size_limit_after: Some(Duration::from_millis(100)),
        finalize_error: None,
    });
    host.bind(BindRequest {
        position: CameraPosition::Back,
        use_case: UseCase::Video {
            quality: QualitySelector::lowest_with_sd_fallback(),
        },
    })
    .await
    .unwrap();

    let output = dir.path().join("clip.mp4");
    let (recording, mut events) = host
        .start_recording(RecordingRequest {
            output: output.clone(),
            size_limit_bytes: 1024,
            audio_enabled: true,
        })
        .await
        .unwrap();

    assert_eq!(events.recv().await, Some(RecordEvent::Started));
    match events.recv().await {
        Some(RecordEvent::Finalized(Err(FinalizeError::FileSizeLimitReached { path }))) => {
            assert_eq!(path, output)
        }
        other => panic!("Unexpected record event: {:?}", other),
    }

    recording.stop();
    assert_eq!(host.finalize_count(), 1);
}

#[tokio::test]
async fn test_subscription_forwards_until_unsubscribed() {
    let host = MockCameraHost::new();
    let seen = Arc::new(AtomicUsize::new(0));
    let parent = CancellationToken::new();

    let counter = Arc::clone(&seen);
    let subscription = Subscription::spawn("torch", host.subscribe(), &parent, move |event| {
        let counter = Arc::clone(&counter);
        async move {
            if let CameraEvent::TorchState { .. } = event {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }
    });
    assert_eq!(subscription.name(), "torch");

    host.enable_torch(true).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert!(subscription.is_active());

    subscription.unsubscribe();
    tokio::time::sleep(Duration::from_millis(20)).await;
    host.enable_torch(false).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(host.observer_count(), 0);
}

#[tokio::test]
async fn test_rotate_display_notifies() {
    let host = MockCameraHost::new();
    let mut events = host.subscribe();

    host.rotate_display(DisplayRotation::Rotation90);
    assert_eq!(host.display_rotation(), DisplayRotation::Rotation90);
    assert_eq!(
        events.recv().await.unwrap(),
        CameraEvent::DisplayChanged {
            rotation: DisplayRotation::Rotation90
        }
    );
}
