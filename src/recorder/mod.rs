mod metadata;
mod naming;
mod session;
mod state;

pub use metadata::SegmentMetadata;
pub use naming::{ArtifactNamer, ARTIFACT_TIMESTAMP_FORMAT};
pub use session::{Recorder, RecorderStats};
pub use state::{
    Episode, RecorderAction, RecorderState, RecordingPolicy, RecordingStateMachine, StopReason,
};
