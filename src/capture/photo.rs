use super::context::{abandoned, output_error, wait_for_open, CaptureContext};
use super::job::{CaptureHandle, CaptureKind, CaptureOutcome, CaptureReporter, CaptureState};
use crate::camera::{BindRequest, UseCase};
use crate::error::Result;
use crate::geometry::{target_resolution, DisplayRotation, Resolution};
use crate::storage::timestamp_prefix;
use crate::thumbnail::DEFAULT_SENSOR_ROTATION;
use tracing::{info, warn};

/// Still capture resolution for a requested scan image width, 3:4 portrait
/// before display rotation
pub fn photo_resolution(scan_image_width: u32, rotation: DisplayRotation) -> Resolution {
    let portrait = Resolution::new(scan_image_width, scan_image_width.saturating_mul(4) / 3);
    target_resolution(portrait, rotation)
}

/// Rebind the camera for still capture and take one picture once it opens
pub fn spawn_photo(ctx: CaptureContext, resolution: Resolution) -> Result<CaptureHandle> {
    let id = ctx.slot.begin(CaptureKind::Photo)?;
    let (reporter, handle) = CaptureReporter::channel(id, CaptureKind::Photo, ctx.event_bus.clone());

    tokio::spawn(async move {
        let outcome = tokio::select! {
            _ = ctx.token.cancelled() => CaptureOutcome::failed(abandoned()),
            result = take_photo(&ctx, id, resolution) => match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Photo capture {} failed: {}", id, e);
                    CaptureOutcome::failed(e)
                }
            },
        };

        ctx.slot.finish(id);
        reporter.report(outcome);
    });

    Ok(handle)
}

async fn take_photo(ctx: &CaptureContext, id: u64, resolution: Resolution) -> Result<CaptureOutcome> {
    // Subscribe before binding so the open event cannot be missed
    let mut events = ctx.host.subscribe();
    ctx.slot.advance(id, CaptureState::AwaitingCameraOpen)?;

    let handle = ctx
        .host
        .bind(BindRequest {
            position: ctx.position,
            use_case: UseCase::Photo {
                target_resolution: resolution,
            },
        })
        .await?;

    // Only the first open triggers a capture; later ones are never read
    wait_for_open(&mut events).await?;
    if !ctx.slot.advance(id, CaptureState::InProgress)? {
        return Err(abandoned());
    }

    let path = ctx
        .sink
        .create_temp_file(&timestamp_prefix(), ".jpg")
        .map_err(output_error)?;
    ctx.host.take_picture(&path).await?;
    ctx.slot.set_output(id, path.clone());

    info!("Photo capture {} written to {}", id, path.display());
    Ok(CaptureOutcome::Finished {
        path,
        rotation_degrees: handle
            .sensor_rotation_degrees
            .unwrap_or(DEFAULT_SENSOR_ROTATION),
    })
}
