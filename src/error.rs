use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MotioncamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Detector error: {0}")]
    Detector(#[from] DetectorError),

    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),

    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl MotioncamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Failures of the sensor side of the camera collaborator
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Camera configuration failed: {details}")]
    Configuration { details: String },

    #[error("Camera failed to start: {details}")]
    Start { details: String },

    #[error("Frame capture failed: {details}")]
    Capture { details: String },

    #[error("Frame buffer holds {actual} bytes, expected {expected} for {width}x{height}")]
    FrameSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Still capture to {path} failed: {details}")]
    Still { path: PathBuf, details: String },
}

/// Contract violations between two analysis frames
#[derive(Error, Debug, PartialEq)]
pub enum DetectorError {
    #[error("Frame dimensions differ: previous {previous:?}, current {current:?}")]
    DimensionMismatch {
        previous: (u32, u32),
        current: (u32, u32),
    },

    #[error("Frame is empty")]
    EmptyFrame,
}

/// Failures opening or closing a recording segment
#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("Failed to start segment {path}: {details}")]
    Start { path: PathBuf, details: String },

    #[error("Failed to stop segment {path}: {details}")]
    Stop { path: PathBuf, details: String },

    #[error("Encoder is busy with segment {path}")]
    Busy { path: PathBuf },
}

/// Failures on the notification path; these are logged and dropped
#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Still capture failed: {details}")]
    StillCapture { details: String },

    #[error("Mail delivery failed: {details}")]
    Delivery { details: String },

    #[error("Notification queue is full")]
    QueueFull,

    #[error("Notification worker is not running")]
    WorkerStopped,
}

#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event receiver closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, MotioncamError>;
