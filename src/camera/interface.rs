use crate::config::{CameraConfig, Quality, RecordingConfig};
use crate::error::{CameraError, EncoderError};
use crate::frame::{AnalysisFrame, PixelFormat};
use std::path::{Path, PathBuf};

/// Stream layout requested from the sensor
#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    pub main_resolution: (u32, u32),
    pub analysis_resolution: (u32, u32),
    pub analysis_format: PixelFormat,
    pub fps: u32,
}

impl CameraSettings {
    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            main_resolution: config.main_resolution,
            analysis_resolution: config.analysis_resolution,
            analysis_format: config.analysis_format,
            fps: config.fps,
        }
    }
}

/// Encoder parameters for one recording segment
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentSettings {
    pub bitrate: u32,
    pub quality: Quality,
}

impl SegmentSettings {
    pub fn from_config(config: &RecordingConfig) -> Self {
        Self {
            bitrate: config.bitrate,
            quality: config.quality,
        }
    }
}

/// Token for an open segment; only the encoder knows what backs it
#[derive(Debug, PartialEq, Eq)]
pub struct SegmentHandle {
    pub(crate) id: u64,
    pub(crate) path: PathBuf,
}

impl SegmentHandle {
    pub fn new(id: u64, path: PathBuf) -> Self {
        Self { id, path }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Boundary to the camera hardware: frame source, still capture and video sink.
///
/// Methods take `&self` so the processing loop and notification tasks can share
/// one device; implementations synchronize internally.
pub trait CameraDevice: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Apply stream resolutions and formats; must be called before `start`
    fn configure(&self, settings: &CameraSettings) -> Result<(), CameraError>;

    fn start(&self) -> Result<(), CameraError>;

    fn stop(&self) -> Result<(), CameraError>;

    /// Block until the next analysis frame is available
    fn capture_analysis_frame(&self) -> Result<AnalysisFrame, CameraError>;

    /// Write one full-resolution JPEG still to `path`
    fn capture_still(&self, path: &Path) -> Result<(), CameraError>;

    /// Begin encoding the main stream into `path`
    fn start_segment(
        &self,
        path: &Path,
        settings: &SegmentSettings,
    ) -> Result<SegmentHandle, EncoderError>;

    /// Finish the segment and return the written file
    fn stop_segment(&self, handle: SegmentHandle) -> Result<PathBuf, EncoderError>;
}
