use crate::config::{DetectorConfig, MetricKind};
use image::GrayImage;

/// Scalar change magnitude between two equally sized luma images.
///
/// Metrics have different natural scales, so every metric is paired with its
/// own threshold in [`DetectorConfig`].
pub trait ChangeMetric: Send + Sync + std::fmt::Debug {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Compute the change magnitude; callers guarantee equal dimensions
    fn magnitude(&self, previous: &GrayImage, current: &GrayImage) -> f64;
}

/// Mean squared per-pixel difference ("MSE" mode)
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanSquaredError;

impl ChangeMetric for MeanSquaredError {
    fn name(&self) -> &'static str {
        "mse"
    }

    fn magnitude(&self, previous: &GrayImage, current: &GrayImage) -> f64 {
        let pixels = previous.as_raw().len();
        if pixels == 0 {
            return 0.0;
        }

        let sum: f64 = previous
            .as_raw()
            .iter()
            .zip(current.as_raw())
            .map(|(&a, &b)| {
                let diff = a as f64 - b as f64;
                diff * diff
            })
            .sum();

        sum / pixels as f64
    }
}

/// Number of pixels whose absolute difference exceeds `pixel_delta` ("nonzero-diff" mode)
#[derive(Debug, Clone, Copy)]
pub struct ChangedPixelCount {
    pub pixel_delta: u8,
}

impl ChangedPixelCount {
    pub fn new(pixel_delta: u8) -> Self {
        Self { pixel_delta }
    }
}

impl ChangeMetric for ChangedPixelCount {
    fn name(&self) -> &'static str {
        "nonzero_diff"
    }

    fn magnitude(&self, previous: &GrayImage, current: &GrayImage) -> f64 {
        previous
            .as_raw()
            .iter()
            .zip(current.as_raw())
            .filter(|&(&a, &b)| a.abs_diff(b) > self.pixel_delta)
            .count() as f64
    }
}

/// Build the metric selected in the configuration
pub(crate) fn metric_from_config(config: &DetectorConfig) -> Box<dyn ChangeMetric> {
    match config.metric {
        MetricKind::Mse => Box::new(MeanSquaredError),
        MetricKind::NonzeroDiff => Box::new(ChangedPixelCount::new(config.pixel_delta)),
    }
}
