use crate::config::DetectorConfig;
use crate::error::DetectorError;
use crate::frame::AnalysisFrame;
use config::ConfigError;
use image::GrayImage;
use imageproc::filter::gaussian_blur_f32;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use super::metric::{metric_from_config, ChangeMetric};

/// Outcome of comparing two consecutive analysis frames
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    pub magnitude: f64,
    pub is_motion: bool,
}

/// Analysis frame after noise suppression, ready for comparison
#[derive(Debug, Clone)]
pub struct PreparedFrame {
    pub sequence: u64,
    smoothed: GrayImage,
}

impl PreparedFrame {
    pub fn dimensions(&self) -> (u32, u32) {
        self.smoothed.dimensions()
    }
}

/// Frame-differencing motion detector.
///
/// Both frames are smoothed with a Gaussian pass, then scored by the configured
/// [`ChangeMetric`]. Detection is a pure function of its two inputs.
#[derive(Debug)]
pub struct MotionDetector {
    metric: Box<dyn ChangeMetric>,
    threshold: f64,
    blur_sigma: f32,
}

impl MotionDetector {
    /// Create a detector with an explicit metric strategy
    pub fn new(
        metric: Box<dyn ChangeMetric>,
        threshold: f64,
        blur_sigma: f32,
    ) -> Result<Self, ConfigError> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(ConfigError::Message(format!(
                "Motion threshold for {} must be a positive number, got {}",
                metric.name(),
                threshold
            )));
        }
        if !blur_sigma.is_finite() || blur_sigma <= 0.0 {
            return Err(ConfigError::Message(format!(
                "Blur sigma must be greater than 0, got {}",
                blur_sigma
            )));
        }

        info!(
            "Motion detector using {} metric (threshold {}, blur sigma {})",
            metric.name(),
            threshold,
            blur_sigma
        );

        Ok(Self {
            metric,
            threshold,
            blur_sigma,
        })
    }

    /// Create a detector from the `[detector]` configuration section
    pub fn from_config(config: &DetectorConfig) -> Result<Self, ConfigError> {
        Self::new(metric_from_config(config), config.threshold(), config.blur_sigma)
    }

    /// Smooth a frame so it can be compared against its neighbours
    pub fn prepare(&self, frame: &AnalysisFrame) -> Result<PreparedFrame, DetectorError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(DetectorError::EmptyFrame);
        }

        Ok(PreparedFrame {
            sequence: frame.sequence,
            smoothed: gaussian_blur_f32(frame.luma(), self.blur_sigma),
        })
    }

    /// Score two prepared frames
    pub fn compare(
        &self,
        previous: &PreparedFrame,
        current: &PreparedFrame,
    ) -> Result<MotionSample, DetectorError> {
        if previous.dimensions() != current.dimensions() {
            return Err(DetectorError::DimensionMismatch {
                previous: previous.dimensions(),
                current: current.dimensions(),
            });
        }

        let magnitude = self
            .metric
            .magnitude(&previous.smoothed, &current.smoothed);
        let is_motion = magnitude > self.threshold;

        if is_motion {
            debug!(
                "Motion between frames {} and {}: {} = {:.3}",
                previous.sequence,
                current.sequence,
                self.metric.name(),
                magnitude
            );
        } else {
            trace!(
                "Frames {} and {}: {} = {:.3}",
                previous.sequence,
                current.sequence,
                self.metric.name(),
                magnitude
            );
        }

        Ok(MotionSample {
            magnitude,
            is_motion,
        })
    }

    /// Compare two consecutive analysis frames
    pub fn detect(
        &self,
        previous: &AnalysisFrame,
        current: &AnalysisFrame,
    ) -> Result<MotionSample, DetectorError> {
        if previous.dimensions() != current.dimensions() {
            return Err(DetectorError::DimensionMismatch {
                previous: previous.dimensions(),
                current: current.dimensions(),
            });
        }

        let previous = self.prepare(previous)?;
        let current = self.prepare(current)?;
        self.compare(&previous, &current)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn metric_name(&self) -> &'static str {
        self.metric.name()
    }
}
