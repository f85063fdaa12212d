pub mod app;
pub mod camera;
pub mod config;
pub mod controller;
pub mod detector;
pub mod error;
pub mod events;
pub mod frame;
pub mod keyboard_input;
pub mod notify;
pub mod recorder;

pub use app::{ComponentState, MotioncamApp, ShutdownReason};
#[cfg(all(feature = "camera", target_os = "linux"))]
pub use camera::GstCamera;
pub use camera::{CameraDevice, CameraSettings, Scene, SegmentSettings, SyntheticCamera};
pub use config::MotioncamConfig;
pub use controller::{ArmingController, ControllerStatus};
pub use detector::{ChangeMetric, MotionDetector, MotionSample};
pub use error::{MotioncamError, Result};
pub use events::{EventBus, EventFilter, EventReceiver, MotionEvent};
pub use frame::{AnalysisFrame, PixelFormat};
pub use notify::{CommandMailer, LogMailer, Mailer, NotificationDispatcher, NotificationService};
pub use recorder::{
    Recorder, RecorderAction, RecorderState, RecordingPolicy, RecordingStateMachine, StopReason,
};
