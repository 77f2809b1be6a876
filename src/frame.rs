use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// Pixel layouts delivered by the camera pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit greyscale, one byte per pixel
    Luma8,
    /// Packed RGB, three bytes per pixel
    Rgb8,
    /// Packed RGBA, four bytes per pixel
    Rgba8,
    /// YUV 4:2:0 semi-planar: full Y plane followed by interleaved V/U
    Nv21,
}

impl PixelFormat {
    /// Expected buffer length for a frame of the given size
    pub fn buffer_len(&self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            PixelFormat::Luma8 => pixels,
            PixelFormat::Rgb8 => pixels * 3,
            PixelFormat::Rgba8 => pixels * 4,
            PixelFormat::Nv21 => {
                let chroma = (width as usize).div_ceil(2) * (height as usize).div_ceil(2) * 2;
                pixels + chroma
            }
        }
    }
}

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// Returns a frame buffer to the camera pipeline. Runs exactly once, either
/// through [`Frame::release`] or when the frame is dropped.
#[derive(Default)]
pub struct ReleaseHandle {
    release: Mutex<Option<ReleaseFn>>,
}

impl ReleaseHandle {
    pub fn new<F>(release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    fn fire(&self) {
        if let Some(release) = self.release.lock().take() {
            release();
        }
    }
}

impl Drop for ReleaseHandle {
    fn drop(&mut self) {
        self.fire();
    }
}

impl fmt::Debug for ReleaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseHandle")
            .field("pending", &self.release.lock().is_some())
            .finish()
    }
}

/// A camera frame owned by the pipeline until released
#[derive(Debug)]
pub struct Frame {
    /// Monotonic frame identifier assigned by the host
    pub id: u64,
    /// Capture time
    pub timestamp: SystemTime,
    /// Pixel data in `format`
    pub data: Arc<Vec<u8>>,
    /// Buffer width in sensor orientation
    pub width: u32,
    /// Buffer height in sensor orientation
    pub height: u32,
    /// Clockwise rotation needed to present the frame upright
    pub rotation_degrees: u16,
    pub format: PixelFormat,
    release: ReleaseHandle,
}

impl Frame {
    pub fn new(
        id: u64,
        data: Vec<u8>,
        width: u32,
        height: u32,
        rotation_degrees: u16,
        format: PixelFormat,
    ) -> Self {
        Self {
            id,
            timestamp: SystemTime::now(),
            data: Arc::new(data),
            width,
            height,
            rotation_degrees,
            format,
            release: ReleaseHandle::default(),
        }
    }

    /// Attach the callback that hands the buffer back to the camera
    pub fn with_release<F>(mut self, release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.release = ReleaseHandle::new(release);
        self
    }

    /// Check the buffer length against the declared format
    pub fn validate_size(&self) -> bool {
        self.data.len() >= self.format.buffer_len(self.width, self.height)
    }

    /// Give the buffer back to the camera pipeline
    pub fn release(self) {
        self.release.fire();
    }

    /// Greyscale view of the frame, one byte per pixel in sensor orientation
    pub fn luma(&self) -> Option<Vec<u8>> {
        if !self.validate_size() {
            return None;
        }

        let pixels = self.width as usize * self.height as usize;
        let data = self.data.as_slice();
        let luma = match self.format {
            PixelFormat::Luma8 | PixelFormat::Nv21 => data[..pixels].to_vec(),
            PixelFormat::Rgb8 => data
                .chunks_exact(3)
                .take(pixels)
                .map(|px| rgb_to_luma(px[0], px[1], px[2]))
                .collect(),
            PixelFormat::Rgba8 => data
                .chunks_exact(4)
                .take(pixels)
                .map(|px| rgb_to_luma(px[0], px[1], px[2]))
                .collect(),
        };

        Some(luma)
    }
}

fn rgb_to_luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counted_frame(counter: &Arc<AtomicUsize>) -> Frame {
        let counter = Arc::clone(counter);
        Frame::new(1, vec![0u8; 16], 4, 4, 90, PixelFormat::Luma8).with_release(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_pixel_format_buffer_len() {
        assert_eq!(PixelFormat::Luma8.buffer_len(640, 480), 640 * 480);
        assert_eq!(PixelFormat::Rgb8.buffer_len(640, 480), 640 * 480 * 3);
        assert_eq!(PixelFormat::Rgba8.buffer_len(640, 480), 640 * 480 * 4);
        assert_eq!(PixelFormat::Nv21.buffer_len(640, 480), 640 * 480 * 3 / 2);
        assert_eq!(PixelFormat::Nv21.buffer_len(3, 3), 9 + 2 * 2 * 2);
    }

    #[test]
    fn test_explicit_release_fires_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        counted_frame(&counter).release();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases_frame() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let _frame = counted_frame(&counter);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_luma_from_rgb() {
        let frame = Frame::new(
            7,
            vec![255, 255, 255, 0, 0, 0],
            2,
            1,
            0,
            PixelFormat::Rgb8,
        );
        assert_eq!(frame.luma(), Some(vec![255, 0]));
    }

    #[test]
    fn test_luma_rejects_short_buffer() {
        let frame = Frame::new(8, vec![0u8; 10], 640, 480, 0, PixelFormat::Nv21);
        assert!(!frame.validate_size());
        assert!(frame.luma().is_none());
    }
}
