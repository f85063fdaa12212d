mod interface;
#[cfg(all(feature = "camera", target_os = "linux"))]
mod pipeline;
mod synthetic;
#[cfg(test)]
mod tests;

pub use interface::{CameraDevice, CameraSettings, SegmentHandle, SegmentSettings};
#[cfg(all(feature = "camera", target_os = "linux"))]
pub use pipeline::GstCamera;
pub use synthetic::{Scene, SegmentEvent, SyntheticCamera, SyntheticCameraBuilder};
