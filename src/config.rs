use crate::geometry::{Resolution, ScanWindow};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ScancamConfig {
    pub scanner: ScannerConfig,
    pub camera: CameraConfig,
    pub capture: CaptureConfig,
}

/// How the decode dispatcher throttles or deduplicates per-frame work
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSpeed {
    /// Suppress results identical to the previous non-empty set
    #[default]
    NoDuplicates,
    /// At most one decode per detection timeout window
    Normal,
    /// Decode every delivered frame and report everything
    Unrestricted,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CameraPosition {
    Front,
    #[default]
    Back,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ScannerConfig {
    /// Detection speed policy
    #[serde(default)]
    pub detection_speed: DetectionSpeed,

    /// Gate duration for the normal detection speed
    #[serde(default = "default_detection_timeout_ms")]
    pub detection_timeout_ms: u64,

    /// Attach a thumbnail of the frame to single-barcode detections
    #[serde(default)]
    pub return_image: bool,

    /// Normalized region of interest `[left, top, right, bottom]`
    #[serde(default)]
    pub scan_window: Option<Vec<f32>>,

    /// Thumbnail bounding box width in pixels
    #[serde(default = "default_thumbnail_max_width")]
    pub thumbnail_max_width: u32,

    /// Thumbnail bounding box height in pixels
    #[serde(default = "default_thumbnail_max_height")]
    pub thumbnail_max_height: u32,

    /// JPEG quality for thumbnails (1-100)
    #[serde(default = "default_thumbnail_quality")]
    pub thumbnail_quality: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CameraConfig {
    /// Which camera to bind
    #[serde(default)]
    pub position: CameraPosition,

    /// Optional target analysis resolution (width, height)
    #[serde(default)]
    pub resolution: Option<(u32, u32)>,

    /// Enable the torch when the session starts
    #[serde(default)]
    pub torch: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CaptureConfig {
    /// Directory for thumbnails, photos and recordings (system temp dir when unset)
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Width of verification photos; height is derived at 4:3
    #[serde(default = "default_scan_image_width")]
    pub scan_image_width: u32,

    /// Recording file size limit in bytes
    #[serde(default = "default_video_size_limit_bytes")]
    pub video_size_limit_bytes: u64,

    /// Recording watchdog duration
    #[serde(default = "default_video_max_duration_ms")]
    pub video_max_duration_ms: u64,
}

/// Options applied to a single `start` call
#[derive(Debug, Clone, PartialEq)]
pub struct StartConfig {
    pub detection_speed: DetectionSpeed,
    pub detection_timeout: Duration,
    pub return_image: bool,
    pub scan_window: Option<ScanWindow>,
    pub camera_resolution: Option<Resolution>,
    pub camera_position: CameraPosition,
    pub torch: bool,
    pub thumbnail: ThumbnailOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailOptions {
    pub max_width: u32,
    pub max_height: u32,
    pub quality: u8,
}

impl Default for ThumbnailOptions {
    fn default() -> Self {
        Self {
            max_width: default_thumbnail_max_width(),
            max_height: default_thumbnail_max_height(),
            quality: default_thumbnail_quality(),
        }
    }
}

impl Default for StartConfig {
    fn default() -> Self {
        Self {
            detection_speed: DetectionSpeed::default(),
            detection_timeout: Duration::from_millis(default_detection_timeout_ms()),
            return_image: false,
            scan_window: None,
            camera_resolution: None,
            camera_position: CameraPosition::default(),
            torch: false,
            thumbnail: ThumbnailOptions::default(),
        }
    }
}

/// Options used by the recording state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingOptions {
    pub size_limit_bytes: u64,
    pub max_duration: Duration,
}

impl Default for RecordingOptions {
    fn default() -> Self {
        Self {
            size_limit_bytes: default_video_size_limit_bytes(),
            max_duration: Duration::from_millis(default_video_max_duration_ms()),
        }
    }
}

impl ScancamConfig {
    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("scanner.detection_speed", "no_duplicates")?
            .set_default(
                "scanner.detection_timeout_ms",
                default_detection_timeout_ms() as i64,
            )?
            .set_default("scanner.return_image", false)?
            .set_default(
                "scanner.thumbnail_max_width",
                default_thumbnail_max_width(),
            )?
            .set_default(
                "scanner.thumbnail_max_height",
                default_thumbnail_max_height(),
            )?
            .set_default(
                "scanner.thumbnail_quality",
                default_thumbnail_quality() as u32,
            )?
            .set_default("camera.position", "back")?
            .set_default("camera.torch", false)?
            .set_default("capture.scan_image_width", default_scan_image_width())?
            .set_default(
                "capture.video_size_limit_bytes",
                default_video_size_limit_bytes() as i64,
            )?
            .set_default(
                "capture.video_max_duration_ms",
                default_video_max_duration_ms() as i64,
            )?
            .add_source(File::with_name(&path_str).required(false))
            .add_source(Environment::with_prefix("SCANCAM").separator("__"))
            .build()?;

        let config: ScancamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(values) = &self.scanner.scan_window {
            let window = ScanWindow::from_slice(values).ok_or_else(|| {
                ConfigError::Message("Scan window must have exactly four values".to_string())
            })?;
            if !window.is_valid() {
                return Err(ConfigError::Message(
                    "Scan window edges must be within 0.0 and 1.0 with left <= right and top <= bottom"
                        .to_string(),
                ));
            }
        }

        if self.scanner.detection_speed == DetectionSpeed::Normal
            && self.scanner.detection_timeout_ms == 0
        {
            return Err(ConfigError::Message(
                "Detection timeout must be greater than 0 for normal detection speed".to_string(),
            ));
        }

        if self.scanner.thumbnail_max_width == 0 || self.scanner.thumbnail_max_height == 0 {
            return Err(ConfigError::Message(
                "Thumbnail bounds must be greater than 0".to_string(),
            ));
        }

        if !(1..=100).contains(&self.scanner.thumbnail_quality) {
            return Err(ConfigError::Message(
                "Thumbnail quality must be within 1 and 100".to_string(),
            ));
        }

        if let Some((width, height)) = self.camera.resolution {
            if width == 0 || height == 0 {
                return Err(ConfigError::Message(
                    "Camera resolution must be greater than 0".to_string(),
                ));
            }
        }

        if self.capture.scan_image_width == 0 {
            return Err(ConfigError::Message(
                "Scan image width must be greater than 0".to_string(),
            ));
        }

        if self.capture.video_size_limit_bytes == 0 {
            return Err(ConfigError::Message(
                "Video size limit must be greater than 0".to_string(),
            ));
        }

        if self.capture.video_max_duration_ms == 0 {
            return Err(ConfigError::Message(
                "Video max duration must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Options for `SessionController::start`
    pub fn start_config(&self) -> StartConfig {
        StartConfig {
            detection_speed: self.scanner.detection_speed,
            detection_timeout: Duration::from_millis(self.scanner.detection_timeout_ms),
            return_image: self.scanner.return_image,
            scan_window: self
                .scanner
                .scan_window
                .as_deref()
                .and_then(ScanWindow::from_slice),
            camera_resolution: self
                .camera
                .resolution
                .map(|(width, height)| Resolution::new(width, height)),
            camera_position: self.camera.position,
            torch: self.camera.torch,
            thumbnail: ThumbnailOptions {
                max_width: self.scanner.thumbnail_max_width,
                max_height: self.scanner.thumbnail_max_height,
                quality: self.scanner.thumbnail_quality,
            },
        }
    }

    pub fn recording_options(&self) -> RecordingOptions {
        RecordingOptions {
            size_limit_bytes: self.capture.video_size_limit_bytes,
            max_duration: Duration::from_millis(self.capture.video_max_duration_ms),
        }
    }

    /// Directory where capture output lands
    pub fn output_dir(&self) -> PathBuf {
        self.capture
            .output_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

impl Default for ScancamConfig {
    fn default() -> Self {
        Self {
            scanner: ScannerConfig {
                detection_speed: DetectionSpeed::default(),
                detection_timeout_ms: default_detection_timeout_ms(),
                return_image: false,
                scan_window: None,
                thumbnail_max_width: default_thumbnail_max_width(),
                thumbnail_max_height: default_thumbnail_max_height(),
                thumbnail_quality: default_thumbnail_quality(),
            },
            camera: CameraConfig {
                position: CameraPosition::default(),
                resolution: None,
                torch: false,
            },
            capture: CaptureConfig {
                output_dir: None,
                scan_image_width: default_scan_image_width(),
                video_size_limit_bytes: default_video_size_limit_bytes(),
                video_max_duration_ms: default_video_max_duration_ms(),
            },
        }
    }
}

// Default value functions
fn default_detection_timeout_ms() -> u64 {
    250
}
fn default_thumbnail_max_width() -> u32 {
    240
}
fn default_thumbnail_max_height() -> u32 {
    320
}
fn default_thumbnail_quality() -> u8 {
    70
}

fn default_scan_image_width() -> u32 {
    480
}
fn default_video_size_limit_bytes() -> u64 {
    2_621_440
}
fn default_video_max_duration_ms() -> u64 {
    5000
}
