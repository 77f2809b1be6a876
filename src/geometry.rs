//! Pure geometry helpers: scan window containment, resolution orientation
//! and thumbnail sizing.

use serde::{Deserialize, Serialize};

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn swapped(&self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }
}

/// Axis-aligned integer rectangle, edges inclusive on the left/top and
/// exclusive on the right/bottom
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    /// True when `other` lies entirely inside this rectangle. An empty
    /// rectangle contains nothing.
    pub fn contains(&self, other: &Rect) -> bool {
        !self.is_empty()
            && self.left <= other.left
            && self.top <= other.top
            && self.right >= other.right
            && self.bottom >= other.bottom
    }
}

/// Normalized region of interest, every edge in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanWindow {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl ScanWindow {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn from_slice(values: &[f32]) -> Option<Self> {
        match values {
            [left, top, right, bottom] => Some(Self::new(*left, *top, *right, *bottom)),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        let edges = [self.left, self.top, self.right, self.bottom];
        edges.iter().all(|v| (0.0..=1.0).contains(v))
            && self.left <= self.right
            && self.top <= self.bottom
    }

    /// Scale to pixel space, rounding each edge to the nearest integer
    pub fn scaled(&self, image_width: u32, image_height: u32) -> Rect {
        let w = image_width as f32;
        let h = image_height as f32;
        Rect::new(
            (self.left * w).round() as i32,
            (self.top * h).round() as i32,
            (self.right * w).round() as i32,
            (self.bottom * h).round() as i32,
        )
    }
}

/// Test whether a barcode bounding box falls within the scan window scaled
/// to the given image size. A barcode without a bounding box never matches.
pub fn contains(
    scan_window: &ScanWindow,
    image_width: u32,
    image_height: u32,
    bounding_box: Option<&Rect>,
) -> bool {
    match bounding_box {
        Some(bbox) => scan_window.scaled(image_width, image_height).contains(bbox),
        None => false,
    }
}

/// Display rotation as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DisplayRotation {
    #[default]
    Rotation0,
    Rotation90,
    Rotation180,
    Rotation270,
}

impl DisplayRotation {
    pub fn degrees(&self) -> u16 {
        match self {
            DisplayRotation::Rotation0 => 0,
            DisplayRotation::Rotation90 => 90,
            DisplayRotation::Rotation180 => 180,
            DisplayRotation::Rotation270 => 270,
        }
    }

    pub fn is_landscape(&self) -> bool {
        matches!(self, DisplayRotation::Rotation90 | DisplayRotation::Rotation270)
    }
}

/// Target resolution for the current display rotation. Portrait rotations
/// keep the requested size, landscape rotations swap it so the aspect ratio
/// is preserved.
pub fn target_resolution(source: Resolution, rotation: DisplayRotation) -> Resolution {
    if rotation.is_landscape() {
        source.swapped()
    } else {
        source
    }
}

/// Dimensions reported to the application after binding. Sensors mounted at
/// 90/270 degrees deliver landscape buffers for a portrait device.
pub fn reported_size(stream: Resolution, sensor_rotation_degrees: u16) -> Resolution {
    if sensor_rotation_degrees % 180 == 0 {
        stream
    } else {
        stream.swapped()
    }
}

/// Dimensions of a frame after it is rotated upright
pub fn upright_size(width: u32, height: u32, rotation_degrees: u16) -> Resolution {
    reported_size(Resolution::new(width, height), rotation_degrees)
}

/// Fit `source` inside `max_width` x `max_height` preserving the aspect
/// ratio. Sources already inside the bounds are kept as they are; otherwise
/// the bounding edge is exact and the other one is truncated.
pub fn fit_within(source: Resolution, max_width: u32, max_height: u32) -> Resolution {
    if source.width == 0 || source.height == 0 || max_width == 0 || max_height == 0 {
        return Resolution::new(0, 0);
    }
    if source.width <= max_width && source.height <= max_height {
        return source;
    }

    let source_ratio = source.width as f32 / source.height as f32;
    let target_ratio = max_width as f32 / max_height as f32;

    if target_ratio > source_ratio {
        Resolution::new(((max_height as f32 * source_ratio) as u32).max(1), max_height)
    } else {
        Resolution::new(max_width, ((max_width as f32 / source_ratio) as u32).max(1))
    }
}
