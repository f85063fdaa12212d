use crate::camera::{CameraDevice, SegmentHandle, SegmentSettings};
use crate::config::RecordingConfig;
use crate::detector::MotionSample;
use crate::error::EncoderError;
use crate::events::{EventBus, MotionEvent};
use crate::notify::{NotificationDispatcher, NotificationRequest};
use crate::recorder::{
    ArtifactNamer, Episode, RecorderAction, RecordingPolicy, RecordingStateMachine,
    SegmentMetadata, StopReason,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Running totals since the recorder was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderStats {
    pub episodes: u64,
    pub segments: u64,
    pub notifications: u64,
}

struct OpenSegment {
    handle: SegmentHandle,
    episode: Uuid,
    opened_at: DateTime<Utc>,
}

/// Carries out the state machine's commands against the camera's encoder and
/// the notification queue.
///
/// Segment open and close calls block the caller; notifications never do.
pub struct Recorder {
    machine: RecordingStateMachine,
    camera: Arc<dyn CameraDevice>,
    dispatcher: Option<NotificationDispatcher>,
    event_bus: EventBus,
    namer: ArtifactNamer,
    segment_settings: SegmentSettings,
    video_dir: PathBuf,
    extension: String,
    save_metadata: bool,
    open: Option<OpenSegment>,
    // Last seen episode counters, kept for the metadata of the closing segment
    episode_snapshot: Option<Episode>,
    stats: RecorderStats,
}

impl Recorder {
    pub fn new(
        config: &RecordingConfig,
        camera: Arc<dyn CameraDevice>,
        event_bus: EventBus,
        namer: ArtifactNamer,
    ) -> Self {
        Self {
            machine: RecordingStateMachine::new(RecordingPolicy::from_config(config)),
            camera,
            dispatcher: None,
            event_bus,
            namer,
            segment_settings: SegmentSettings::from_config(config),
            video_dir: PathBuf::from(&config.video_dir),
            extension: config.video_extension.clone(),
            save_metadata: config.save_metadata,
            open: None,
            episode_snapshot: None,
            stats: RecorderStats::default(),
        }
    }

    /// Replace the policy derived from configuration
    pub fn with_policy(mut self, policy: RecordingPolicy) -> Self {
        self.machine = RecordingStateMachine::new(policy);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: NotificationDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn machine(&self) -> &RecordingStateMachine {
        &self.machine
    }

    pub fn is_recording(&self) -> bool {
        self.machine.is_recording()
    }

    pub fn has_open_segment(&self) -> bool {
        self.open.is_some()
    }

    pub fn stats(&self) -> RecorderStats {
        self.stats
    }

    /// Feed one observation through the state machine and execute the result.
    ///
    /// Returns the commands the machine produced, including any that were
    /// skipped because the episode was aborted by an encoder failure.
    pub fn observe(&mut self, sample: Option<MotionSample>, now: Instant) -> Vec<RecorderAction> {
        let actions = self.machine.step(sample, now);
        if let Some(episode) = self.machine.episode() {
            self.episode_snapshot = Some(episode.clone());
        }

        let mut aborted = false;
        for action in &actions {
            if aborted {
                debug!("Skipping {:?} for aborted episode", action);
                continue;
            }
            aborted = !self.execute(action.clone());
        }

        actions
    }

    /// Close any open segment because the camera is being disarmed
    pub fn disarm(&mut self) {
        if let Some(action) = self.machine.disarm() {
            self.execute(action);
        }
        self.close_orphan(StopReason::Disarmed);
    }

    /// Close any open segment because the processing loop is terminating
    pub fn abort(&mut self, reason: StopReason) {
        if let Some(episode) = self.machine.abort_episode() {
            self.execute(RecorderAction::StopSegment {
                episode: episode.id,
                reason,
            });
        }
        self.close_orphan(reason);
    }

    /// Returns false when the episode had to be abandoned
    fn execute(&mut self, action: RecorderAction) -> bool {
        match action {
            RecorderAction::StartSegment { episode } => match self.open_segment(episode) {
                Ok(segment) => {
                    self.stats.episodes += 1;
                    info!("Recording episode {} to {}", episode, segment.display());
                    let _ = self
                        .event_bus
                        .publish(MotionEvent::RecordingStarted { episode, segment });
                    true
                }
                Err(e) => {
                    self.fail_episode(episode, e);
                    false
                }
            },
            RecorderAction::RolloverSegment {
                episode,
                segment_length,
            } => {
                let closed = match self.close_segment(StopReason::Rollover) {
                    Ok(Some(closed)) => closed,
                    Ok(None) => {
                        warn!("Rollover requested for episode {} with no open segment", episode);
                        PathBuf::new()
                    }
                    Err(e) => {
                        self.fail_episode(episode, e);
                        return false;
                    }
                };

                match self.open_segment(episode) {
                    Ok(opened) => {
                        info!(
                            "Segment {} closed after {:.1}s, continuing in {}",
                            closed.display(),
                            segment_length.as_secs_f64(),
                            opened.display()
                        );
                        let _ = self.event_bus.publish(MotionEvent::SegmentRolledOver {
                            episode,
                            closed,
                            opened,
                        });
                        true
                    }
                    Err(e) => {
                        self.fail_episode(episode, e);
                        false
                    }
                }
            }
            RecorderAction::StopSegment { episode, reason } => {
                let reason = match self.close_segment(reason) {
                    Ok(_) => reason,
                    Err(e) => {
                        error!("Failed to close segment of episode {}: {}", episode, e);
                        let _ = self.event_bus.publish(MotionEvent::SystemError {
                            component: "encoder".to_string(),
                            error: e.to_string(),
                        });
                        StopReason::EncoderFailure
                    }
                };
                self.episode_snapshot = None;
                let _ = self
                    .event_bus
                    .publish(MotionEvent::RecordingStopped { episode, reason });
                true
            }
            RecorderAction::Notify {
                episode,
                motion_frames,
            } => {
                self.notify(episode, motion_frames);
                true
            }
        }
    }

    fn notify(&mut self, episode: Uuid, motion_frames: u32) {
        let Some(dispatcher) = &self.dispatcher else {
            debug!("Notifications disabled, not alerting for episode {}", episode);
            return;
        };

        match dispatcher.dispatch(NotificationRequest::new(episode, motion_frames)) {
            Ok(()) => {
                self.stats.notifications += 1;
                info!(
                    "Queued notification for episode {} after {} motion frames",
                    episode, motion_frames
                );
                let _ = self
                    .event_bus
                    .publish(MotionEvent::NotificationQueued { episode });
            }
            Err(e) => {
                let _ = self.event_bus.publish(MotionEvent::NotificationFailed {
                    episode,
                    error: e.to_string(),
                });
            }
        }
    }

    fn open_segment(&mut self, episode: Uuid) -> Result<PathBuf, EncoderError> {
        if let Some(open) = &self.open {
            return Err(EncoderError::Busy {
                path: open.handle.path().to_path_buf(),
            });
        }

        let opened_at = Utc::now();
        let path = self
            .namer
            .next_path(&self.video_dir, &self.extension, opened_at)
            .map_err(|e| EncoderError::Start {
                path: self.video_dir.clone(),
                details: e.to_string(),
            })?;

        let handle = self.camera.start_segment(&path, &self.segment_settings)?;
        self.stats.segments += 1;
        self.open = Some(OpenSegment {
            handle,
            episode,
            opened_at,
        });
        Ok(path)
    }

    fn close_segment(&mut self, reason: StopReason) -> Result<Option<PathBuf>, EncoderError> {
        let Some(open) = self.open.take() else {
            return Ok(None);
        };

        let path = self.camera.stop_segment(open.handle)?;
        debug!("Closed segment {} ({:?})", path.display(), reason);

        if self.save_metadata {
            let (motion_frames, peak_magnitude) = self
                .episode_snapshot
                .as_ref()
                .map(|e| (e.consecutive_motion_frames, e.peak_magnitude))
                .unwrap_or_default();
            let metadata = SegmentMetadata {
                segment: path.clone(),
                episode: open.episode,
                started_at: open.opened_at,
                ended_at: Utc::now(),
                reason,
                motion_frames,
                peak_magnitude,
            };
            if let Err(e) = metadata.save() {
                warn!("{}", e);
            }
        }

        Ok(Some(path))
    }

    /// Encoder failure: drop the episode and any segment left behind
    fn fail_episode(&mut self, episode: Uuid, cause: EncoderError) {
        error!("Encoder failure in episode {}: {}", episode, cause);
        self.machine.abort_episode();
        self.close_orphan(StopReason::EncoderFailure);
        self.episode_snapshot = None;

        let _ = self.event_bus.publish(MotionEvent::SystemError {
            component: "encoder".to_string(),
            error: cause.to_string(),
        });
        let _ = self.event_bus.publish(MotionEvent::RecordingStopped {
            episode,
            reason: StopReason::EncoderFailure,
        });
    }

    fn close_orphan(&mut self, reason: StopReason) {
        if self.open.is_some() {
            if let Err(e) = self.close_segment(reason) {
                error!("Failed to close leftover segment: {}", e);
            }
        }
    }
}
