use super::context::{abandoned, output_error, wait_for_open, CaptureContext};
use super::job::{
    CaptureHandle, CaptureKind, CaptureOutcome, CaptureReporter, CaptureSlot, CaptureState,
};
use crate::camera::{BindRequest, FinalizeError, QualitySelector, RecordEvent, RecordingRequest, UseCase};
use crate::config::{CameraPosition, RecordingOptions};
use crate::error::{CaptureError, Result};
use crate::storage::timestamp_prefix;
use std::path::PathBuf;
use crate::thumbnail::DEFAULT_SENSOR_ROTATION;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Rebind the camera for video and record one clip once it opens. The clip
/// ends at the size limit, when the watchdog fires, or on teardown.
pub fn spawn_recording(ctx: CaptureContext, options: RecordingOptions) -> Result<CaptureHandle> {
    let id = ctx.slot.begin(CaptureKind::Video)?;
    let (reporter, handle) = CaptureReporter::channel(id, CaptureKind::Video, ctx.event_bus.clone());

    tokio::spawn(async move {
        let outcome = match record(&ctx, id, options).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Video capture {} failed: {}", id, e);
                CaptureOutcome::failed(e)
            }
        };

        // The in-flight job is cleared whatever the outcome
        ctx.slot.finish(id);
        reporter.report(outcome);
    });

    Ok(handle)
}

async fn record(ctx: &CaptureContext, id: u64, options: RecordingOptions) -> Result<CaptureOutcome> {
    let mut events = ctx.host.subscribe();
    ctx.slot.advance(id, CaptureState::AwaitingCameraOpen)?;

    // Clips always come from the back camera
    let request = BindRequest {
        position: CameraPosition::Back,
        use_case: UseCase::Video {
            quality: QualitySelector::lowest_with_sd_fallback(),
        },
    };
    let handle = tokio::select! {
        _ = ctx.token.cancelled() => return Err(abandoned()),
        bound = ctx.host.bind(request) => bound?,
    };
    tokio::select! {
        _ = ctx.token.cancelled() => return Err(abandoned()),
        opened = wait_for_open(&mut events) => opened?,
    }

    if !ctx.host.has_audio_permission() {
        return Err(CaptureError::AudioPermissionDenied.into());
    }
    if !ctx.slot.advance(id, CaptureState::InProgress)? {
        return Err(abandoned());
    }

    let path = ctx
        .sink
        .create_temp_file(&timestamp_prefix(), ".mp4")
        .map_err(output_error)?;
    let (recording, mut record_events) = ctx
        .host
        .start_recording(RecordingRequest {
            output: path.clone(),
            size_limit_bytes: options.size_limit_bytes,
            audio_enabled: true,
        })
        .await?;
    ctx.slot.set_output(id, path);
    let rotation_degrees = handle
        .sensor_rotation_degrees
        .unwrap_or(DEFAULT_SENSOR_ROTATION);

    let watchdog = tokio::time::sleep(options.max_duration);
    tokio::pin!(watchdog);
    let mut armed = false;
    let mut finalizing = false;

    loop {
        tokio::select! {
            _ = ctx.token.cancelled() => {
                recording.stop();
                return Err(abandoned());
            }
            _ = &mut watchdog, if armed => {
                armed = false;
                debug!("Recording {} reached {:?}, stopping", id, options.max_duration);
                ctx.slot.advance(id, CaptureState::Finalizing)?;
                finalizing = true;
                recording.stop();
            }
            event = record_events.recv() => match event {
                Some(RecordEvent::Started) => {
                    info!("Recording {} started", id);
                    watchdog.as_mut().reset(Instant::now() + options.max_duration);
                    armed = true;
                }
                Some(RecordEvent::Finalized(result)) => {
                    return finalize(&ctx.slot, id, finalizing, result, rotation_degrees);
                }
                None => {
                    return Err(CaptureError::Encoder {
                        details: "recorder closed without finalizing".to_string(),
                    }
                    .into());
                }
            },
        }
    }
}

/// Classify the finalize event of recording `id`. The job passes through
/// `Finalizing` whichever way the clip ended.
pub(crate) fn finalize(
    slot: &CaptureSlot,
    id: u64,
    finalizing: bool,
    result: std::result::Result<PathBuf, FinalizeError>,
    rotation_degrees: u16,
) -> Result<CaptureOutcome> {
    if !finalizing {
        slot.advance(id, CaptureState::Finalizing)?;
    }

    Ok(match result {
        Ok(path) | Err(FinalizeError::FileSizeLimitReached { path }) => {
            info!("Recording {} finalized to {}", id, path.display());
            CaptureOutcome::Finished {
                path,
                rotation_degrees,
            }
        }
        Err(FinalizeError::Failed { message }) => {
            CaptureOutcome::failed(CaptureError::Encoder { details: message })
        }
    })
}
