//! Still image rendering for detections. Frames are rotated upright and
//! downscaled before JPEG encoding.

use crate::config::ThumbnailOptions;
use crate::error::{DecodeError, Result, ScancamError};
use crate::frame::{Frame, PixelFormat};
use crate::geometry::{fit_within, Resolution};
use crate::storage::{timestamp_prefix, FileSink};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Rotation applied when the camera does not report its sensor orientation
pub const DEFAULT_SENSOR_ROTATION: u16 = 90;

/// Thumbnail written to disk for a detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// Pixel data detached from the frame so rendering can run off the async
/// runtime
struct RenderInput {
    data: Arc<Vec<u8>>,
    width: u32,
    height: u32,
    format: PixelFormat,
}

/// Render `frame` and persist it through `sink`
pub async fn render_to_sink(
    frame: &Frame,
    rotation_degrees: u16,
    options: ThumbnailOptions,
    sink: Arc<dyn FileSink>,
) -> Result<Thumbnail> {
    let input = RenderInput {
        data: Arc::clone(&frame.data),
        width: frame.width,
        height: frame.height,
        format: frame.format,
    };

    tokio::task::spawn_blocking(move || -> Result<Thumbnail> {
        let (jpeg, size) = render_jpeg(&input, rotation_degrees, options)?;
        let path = sink.create_temp_file(&timestamp_prefix(), ".jpg")?;
        std::fs::write(&path, jpeg)?;
        debug!(
            "Wrote {}x{} thumbnail to {}",
            size.width,
            size.height,
            path.display()
        );
        Ok(Thumbnail {
            path,
            width: size.width,
            height: size.height,
        })
    })
    .await
    .map_err(|e| ScancamError::component("thumbnail", e.to_string().as_str()))?
}

fn render_jpeg(
    input: &RenderInput,
    rotation_degrees: u16,
    options: ThumbnailOptions,
) -> Result<(Vec<u8>, Resolution)> {
    let rgb = to_rgb(input)?;
    let rotated = rotate(rgb, rotation_degrees);

    let source = Resolution::new(rotated.width(), rotated.height());
    let target = fit_within(source, options.max_width, options.max_height);
    let scaled = if target == source {
        rotated
    } else {
        imageops::resize(&rotated, target.width, target.height, FilterType::Triangle)
    };

    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, options.quality);
    encoder.encode_image(&scaled)?;

    Ok((buf, Resolution::new(scaled.width(), scaled.height())))
}

fn rotate(image: RgbImage, degrees: u16) -> RgbImage {
    match degrees % 360 {
        90 => imageops::rotate90(&image),
        180 => imageops::rotate180(&image),
        270 => imageops::rotate270(&image),
        _ => image,
    }
}

fn unsupported(details: String) -> ScancamError {
    DecodeError::UnsupportedFrame { details }.into()
}

fn to_rgb(input: &RenderInput) -> Result<RgbImage> {
    let (width, height) = (input.width, input.height);
    let expected = input.format.buffer_len(width, height);
    if input.data.len() < expected {
        return Err(unsupported(format!(
            "{:?} buffer of {} bytes is shorter than {} for {}x{}",
            input.format,
            input.data.len(),
            expected,
            width,
            height
        )));
    }

    let pixels = width as usize * height as usize;
    let data = input.data.as_slice();
    let rgb = match input.format {
        PixelFormat::Rgb8 => data[..pixels * 3].to_vec(),
        PixelFormat::Rgba8 => data
            .chunks_exact(4)
            .take(pixels)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect(),
        PixelFormat::Luma8 => data[..pixels].iter().flat_map(|&y| [y, y, y]).collect(),
        PixelFormat::Nv21 => nv21_to_rgb(data, width as usize, height as usize),
    };

    RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| unsupported(format!("Cannot build {}x{} RGB image", width, height)))
}

/// BT.601 limited-range YUV to RGB for NV21 (Y plane, then interleaved V/U)
fn nv21_to_rgb(data: &[u8], width: usize, height: usize) -> Vec<u8> {
    let chroma = &data[width * height..];
    let chroma_stride = width.div_ceil(2) * 2;
    let mut rgb = Vec::with_capacity(width * height * 3);

    for row in 0..height {
        for col in 0..width {
            let y = data[row * width + col] as f32;
            let offset = (row / 2) * chroma_stride + (col / 2) * 2;
            let v = chroma[offset] as f32 - 128.0;
            let u = chroma[offset + 1] as f32 - 128.0;
            let c = 1.164 * (y - 16.0);

            rgb.push((c + 1.596 * v).clamp(0.0, 255.0) as u8);
            rgb.push((c - 0.813 * v - 0.391 * u).clamp(0.0, 255.0) as u8);
            rgb.push((c + 2.018 * u).clamp(0.0, 255.0) as u8);
        }
    }

    rgb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DirectorySink;

    fn options() -> ThumbnailOptions {
        ThumbnailOptions {
            max_width: 240,
            max_height: 320,
            quality: 70,
        }
    }

    #[tokio::test]
    async fn test_render_rotates_and_downscales() {
        let dir = tempfile::tempdir().unwrap();
        let sink: Arc<dyn FileSink> = Arc::new(DirectorySink::new(dir.path()));
        let frame = Frame::new(1, vec![128u8; 640 * 480 * 3], 640, 480, 90, PixelFormat::Rgb8);

        let thumbnail = render_to_sink(&frame, 90, options(), sink).await.unwrap();

        // 640x480 rotated to 480x640, fit into 240x320
        assert_eq!((thumbnail.width, thumbnail.height), (240, 320));
        assert!(thumbnail.path.starts_with(dir.path()));
        let decoded = image::open(&thumbnail.path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (240, 320));
    }

    #[tokio::test]
    async fn test_render_nv21_without_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let sink: Arc<dyn FileSink> = Arc::new(DirectorySink::new(dir.path()));
        let len = PixelFormat::Nv21.buffer_len(64, 48);
        let frame = Frame::new(2, vec![100u8; len], 64, 48, 0, PixelFormat::Nv21);

        let thumbnail = render_to_sink(&frame, 0, options(), sink).await.unwrap();
        assert_eq!((thumbnail.width, thumbnail.height), (64, 48));
    }

    #[test]
    fn test_nv21_grey_conversion() {
        // Y=128 with neutral chroma is mid grey
        let rgb = nv21_to_rgb(&[128, 128, 128, 128, 128, 128], 2, 2);
        assert_eq!(rgb.len(), 12);
        assert!(rgb.iter().all(|&c| (128..=132).contains(&c)));
    }

    #[tokio::test]
    async fn test_short_buffer_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sink: Arc<dyn FileSink> = Arc::new(DirectorySink::new(dir.path()));
        let frame = Frame::new(3, vec![0u8; 10], 64, 48, 0, PixelFormat::Rgb8);

        assert!(render_to_sink(&frame, 0, options(), sink).await.is_err());
    }
}
