use crate::frame::PixelFormat;
use crate::recorder::ArtifactNamer;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MotioncamConfig {
    pub camera: CameraConfig,
    pub detector: DetectorConfig,
    pub recording: RecordingConfig,
    pub notification: NotificationConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CameraConfig {
    /// Full-resolution stream used for recording and stills (width, height)
    #[serde(default = "default_main_resolution")]
    pub main_resolution: (u32, u32),

    /// Downscaled stream used for motion scoring (width, height)
    #[serde(default = "default_analysis_resolution")]
    pub analysis_resolution: (u32, u32),

    /// Sensor frame rate
    #[serde(default = "default_camera_fps")]
    pub fps: u32,

    /// Pixel layout of the analysis stream
    #[serde(default = "default_analysis_format")]
    pub analysis_format: PixelFormat,

    /// GStreamer source element (e.g. "libcamerasrc" or "v4l2src device=/dev/video0")
    #[serde(default = "default_camera_device")]
    pub device: String,
}

/// Change metric used to score two analysis frames
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Mean squared per-pixel difference
    Mse,
    /// Count of pixels whose absolute difference exceeds `pixel_delta`
    NonzeroDiff,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DetectorConfig {
    #[serde(default = "default_metric")]
    pub metric: MetricKind,

    /// Threshold applied when `metric = "mse"`
    #[serde(default = "default_mse_threshold")]
    pub mse_threshold: f64,

    /// Threshold applied when `metric = "nonzero_diff"` (pixel count)
    #[serde(default = "default_changed_pixel_threshold")]
    pub changed_pixel_threshold: f64,

    /// Per-pixel luma delta counted as a change in nonzero-diff mode
    #[serde(default = "default_pixel_delta")]
    pub pixel_delta: u8,

    /// Gaussian smoothing sigma applied to both frames before comparison
    #[serde(default = "default_blur_sigma")]
    pub blur_sigma: f32,
}

/// Encoder quality preset
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Low,
    Medium,
    High,
    VeryHigh,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RecordingConfig {
    /// Consecutive motion frames required before a segment opens
    #[serde(default = "default_debounce_frames")]
    pub debounce_frames: u32,

    /// Motion frames in an episode before the operator is notified
    #[serde(default = "default_notify_after_frames")]
    pub notify_after_frames: u32,

    /// Seconds recording continues after the last motion frame
    #[serde(default = "default_tail_seconds")]
    pub tail_seconds: f64,

    /// Maximum segment length before rollover; 0 records until the tail gap
    #[serde(default = "default_max_segment_seconds")]
    pub max_segment_seconds: f64,

    #[serde(default = "default_video_dir")]
    pub video_dir: String,

    #[serde(default = "default_video_extension")]
    pub video_extension: String,

    /// Encoder bitrate in bits per second
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,

    #[serde(default = "default_quality")]
    pub quality: Quality,

    /// Write a JSON sidecar next to each closed segment
    #[serde(default = "default_save_metadata")]
    pub save_metadata: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NotificationConfig {
    #[serde(default = "default_notification_enabled")]
    pub enabled: bool,

    #[serde(default = "default_image_dir")]
    pub image_dir: String,

    /// Pending notifications kept before new ones are dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// External mailer program; empty only logs the still path
    #[serde(default)]
    pub command: String,

    #[serde(default = "default_subject")]
    pub subject: String,

    #[serde(default)]
    pub sender: String,

    #[serde(default)]
    pub recipient: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    /// Timezone used for artifact names ("local" or an IANA name)
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Consecutive failed frame fetches before the loop gives up
    #[serde(default = "default_max_capture_failures")]
    pub max_capture_failures: u32,

    /// Arm the camera as soon as the service starts
    #[serde(default = "default_start_armed")]
    pub start_armed: bool,

    /// Optional log file written in addition to stdout
    #[serde(default)]
    pub log_file: String,
}

impl MotioncamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("motioncam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .add_source(Config::try_from(&Self::default())?)
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables, e.g. MOTIONCAM_RECORDING__TAIL_SECONDS
            .add_source(
                Environment::with_prefix("MOTIONCAM")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: MotioncamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Render as a TOML document, as accepted by `load_from_file`
    pub fn to_toml(&self) -> crate::error::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let camera = &self.camera;
        if camera.main_resolution.0 == 0 || camera.main_resolution.1 == 0 {
            return Err(message("Main resolution must be greater than 0"));
        }
        if camera.analysis_resolution.0 == 0 || camera.analysis_resolution.1 == 0 {
            return Err(message("Analysis resolution must be greater than 0"));
        }
        if camera.analysis_resolution.0 > camera.main_resolution.0
            || camera.analysis_resolution.1 > camera.main_resolution.1
        {
            return Err(message(
                "Analysis resolution must not exceed the main resolution",
            ));
        }
        if camera.fps == 0 {
            return Err(message("Camera fps must be greater than 0"));
        }

        let threshold = self.detector.threshold();
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(ConfigError::Message(format!(
                "Threshold for metric {:?} must be a positive number, got {}",
                self.detector.metric, threshold
            )));
        }
        if !self.detector.blur_sigma.is_finite() || self.detector.blur_sigma <= 0.0 {
            return Err(message("Detector blur_sigma must be greater than 0"));
        }

        let recording = &self.recording;
        if recording.debounce_frames == 0 {
            return Err(message("Recording debounce_frames must be greater than 0"));
        }
        if recording.notify_after_frames == 0 {
            return Err(message(
                "Recording notify_after_frames must be greater than 0",
            ));
        }
        if Duration::try_from_secs_f64(recording.tail_seconds).is_err() {
            return Err(ConfigError::Message(format!(
                "Recording tail_seconds must be a representable non-negative duration, got {}",
                recording.tail_seconds
            )));
        }
        if Duration::try_from_secs_f64(recording.max_segment_seconds).is_err() {
            return Err(ConfigError::Message(format!(
                "Recording max_segment_seconds must be a representable non-negative duration, got {}",
                recording.max_segment_seconds
            )));
        }
        if recording.bitrate == 0 {
            return Err(message("Recording bitrate must be greater than 0"));
        }

        if self.notification.queue_capacity == 0 {
            return Err(message(
                "Notification queue_capacity must be greater than 0",
            ));
        }
        ArtifactNamer::new(&self.system.timezone)?;
        if self.system.event_bus_capacity == 0 {
            return Err(message("Event bus capacity must be greater than 0"));
        }
        if self.system.max_capture_failures == 0 {
            return Err(message(
                "System max_capture_failures must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl DetectorConfig {
    /// Threshold that applies to the selected metric
    pub fn threshold(&self) -> f64 {
        match self.metric {
            MetricKind::Mse => self.mse_threshold,
            MetricKind::NonzeroDiff => self.changed_pixel_threshold,
        }
    }
}

impl RecordingConfig {
    /// Out-of-range values, which `validate` rejects, saturate instead of panicking
    pub fn tail_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.tail_seconds.max(0.0)).unwrap_or(Duration::MAX)
    }

    /// `None` selects the unbounded recording policy
    pub fn max_segment_duration(&self) -> Option<Duration> {
        if self.max_segment_seconds > 0.0 {
            Some(Duration::try_from_secs_f64(self.max_segment_seconds).unwrap_or(Duration::MAX))
        } else {
            None
        }
    }
}

impl NotificationConfig {
    pub fn image_dir(&self) -> PathBuf {
        PathBuf::from(&self.image_dir)
    }
}

impl SystemConfig {
    pub fn log_file(&self) -> Option<PathBuf> {
        if self.log_file.trim().is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.log_file))
        }
    }
}

fn message(text: &str) -> ConfigError {
    ConfigError::Message(text.to_string())
}

impl Default for MotioncamConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                main_resolution: default_main_resolution(),
                analysis_resolution: default_analysis_resolution(),
                fps: default_camera_fps(),
                analysis_format: default_analysis_format(),
                device: default_camera_device(),
            },
            detector: DetectorConfig {
                metric: default_metric(),
                mse_threshold: default_mse_threshold(),
                changed_pixel_threshold: default_changed_pixel_threshold(),
                pixel_delta: default_pixel_delta(),
                blur_sigma: default_blur_sigma(),
            },
            recording: RecordingConfig {
                debounce_frames: default_debounce_frames(),
                notify_after_frames: default_notify_after_frames(),
                tail_seconds: default_tail_seconds(),
                max_segment_seconds: default_max_segment_seconds(),
                video_dir: default_video_dir(),
                video_extension: default_video_extension(),
                bitrate: default_bitrate(),
                quality: default_quality(),
                save_metadata: default_save_metadata(),
            },
            notification: NotificationConfig {
                enabled: default_notification_enabled(),
                image_dir: default_image_dir(),
                queue_capacity: default_queue_capacity(),
                command: String::new(),
                subject: default_subject(),
                sender: String::new(),
                recipient: String::new(),
            },
            system: SystemConfig {
                timezone: default_timezone(),
                event_bus_capacity: default_event_bus_capacity(),
                max_capture_failures: default_max_capture_failures(),
                start_armed: default_start_armed(),
                log_file: String::new(),
            },
        }
    }
}

// Default value functions
fn default_main_resolution() -> (u32, u32) {
    (1920, 1080)
}
fn default_analysis_resolution() -> (u32, u32) {
    (640, 480)
}
fn default_camera_fps() -> u32 {
    30
}
fn default_analysis_format() -> PixelFormat {
    PixelFormat::I420
}
fn default_camera_device() -> String {
    "libcamerasrc".to_string()
}

fn default_metric() -> MetricKind {
    MetricKind::Mse
}
fn default_mse_threshold() -> f64 {
    0.6
}
fn default_changed_pixel_threshold() -> f64 {
    1000.0
}
fn default_pixel_delta() -> u8 {
    25
}
fn default_blur_sigma() -> f32 {
    3.5
} // Matches a 21x21 kernel with automatically derived sigma

fn default_debounce_frames() -> u32 {
    3
}
fn default_notify_after_frames() -> u32 {
    10
}
fn default_tail_seconds() -> f64 {
    5.0
}
fn default_max_segment_seconds() -> f64 {
    30.0
}
fn default_video_dir() -> String {
    "video".to_string()
}
fn default_video_extension() -> String {
    "h264".to_string()
}
fn default_bitrate() -> u32 {
    10_000_000
}
fn default_quality() -> Quality {
    Quality::High
}
fn default_save_metadata() -> bool {
    false
}

fn default_notification_enabled() -> bool {
    true
}
fn default_image_dir() -> String {
    "image".to_string()
}
fn default_queue_capacity() -> usize {
    4
}
fn default_subject() -> String {
    "Motion Detected".to_string()
}

fn default_timezone() -> String {
    "local".to_string()
}
fn default_event_bus_capacity() -> usize {
    100
}
fn default_max_capture_failures() -> u32 {
    30
}
fn default_start_armed() -> bool {
    true
}
