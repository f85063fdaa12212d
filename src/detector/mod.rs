mod metric;
mod motion;

pub use metric::{ChangeMetric, ChangedPixelCount, MeanSquaredError};
pub use motion::{MotionDetector, MotionSample, PreparedFrame};
