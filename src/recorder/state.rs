use crate::config::RecordingConfig;
use crate::detector::MotionSample;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

/// Thresholds and durations that drive the recording state machine
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingPolicy {
    /// Consecutive motion frames required to open a segment
    pub debounce_frames: u32,
    /// Motion frames in an episode before the operator is notified
    pub notify_after_frames: u32,
    /// Grace period after the last motion frame
    pub tail: Duration,
    /// Segment length that triggers a rollover; `None` never rolls over
    pub max_segment: Option<Duration>,
}

impl RecordingPolicy {
    pub fn from_config(config: &RecordingConfig) -> Self {
        Self {
            debounce_frames: config.debounce_frames.max(1),
            notify_after_frames: config.notify_after_frames.max(1),
            tail: config.tail_duration(),
            max_segment: config.max_segment_duration(),
        }
    }
}

impl Default for RecordingPolicy {
    fn default() -> Self {
        Self {
            debounce_frames: 3,
            notify_after_frames: 10,
            tail: Duration::from_secs(5),
            max_segment: Some(Duration::from_secs(30)),
        }
    }
}

/// Why a recording segment was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// No motion for longer than the tail duration
    MotionEnded,
    /// Maximum segment duration reached; a new segment follows immediately
    Rollover,
    /// The operator disarmed the camera
    Disarmed,
    /// The encoder failed to open or close a segment
    EncoderFailure,
    /// The processing loop stopped on an unrecoverable error
    LoopError,
}

/// A contiguous run of motion, from debounce entry to tail-timeout exit
#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    pub id: Uuid,
    /// Start of the currently open segment; reset on rollover
    pub start_time: Instant,
    pub last_motion_time: Instant,
    /// Motion frames seen in this episode; survives rollover
    pub consecutive_motion_frames: u32,
    pub notified: bool,
    pub peak_magnitude: f64,
    pub segments: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecorderState {
    Idle { consecutive_motion_frames: u32 },
    Recording(Episode),
}

/// Command for the video sink or notification path, produced by one step
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderAction {
    StartSegment { episode: Uuid },
    RolloverSegment { episode: Uuid, segment_length: Duration },
    StopSegment { episode: Uuid, reason: StopReason },
    Notify { episode: Uuid, motion_frames: u32 },
}

/// Debounced idle/recording controller.
///
/// Pure with respect to I/O: each step takes an observation and a timestamp and
/// returns the commands the caller must carry out.
#[derive(Debug, Clone)]
pub struct RecordingStateMachine {
    policy: RecordingPolicy,
    state: RecorderState,
}

impl RecordingStateMachine {
    pub fn new(policy: RecordingPolicy) -> Self {
        Self {
            policy,
            state: RecorderState::Idle {
                consecutive_motion_frames: 0,
            },
        }
    }

    pub fn policy(&self) -> &RecordingPolicy {
        &self.policy
    }

    pub fn state(&self) -> &RecorderState {
        &self.state
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, RecorderState::Recording(_))
    }

    pub fn episode(&self) -> Option<&Episode> {
        match &self.state {
            RecorderState::Recording(episode) => Some(episode),
            RecorderState::Idle { .. } => None,
        }
    }

    pub fn consecutive_motion_frames(&self) -> u32 {
        match &self.state {
            RecorderState::Idle {
                consecutive_motion_frames,
            } => *consecutive_motion_frames,
            RecorderState::Recording(episode) => episode.consecutive_motion_frames,
        }
    }

    /// Advance one frame. `None` means there was no previous frame to compare
    /// against and no decision was made.
    pub fn step(&mut self, observation: Option<MotionSample>, now: Instant) -> Vec<RecorderAction> {
        let Some(sample) = observation else {
            return Vec::new();
        };

        let mut actions = Vec::new();

        match &mut self.state {
            RecorderState::Idle {
                consecutive_motion_frames,
            } => {
                if !sample.is_motion {
                    *consecutive_motion_frames = 0;
                    return actions;
                }

                *consecutive_motion_frames = consecutive_motion_frames.saturating_add(1);
                if *consecutive_motion_frames < self.policy.debounce_frames {
                    debug!(
                        "Motion frame {}/{} before recording",
                        consecutive_motion_frames, self.policy.debounce_frames
                    );
                    return actions;
                }

                let mut episode = Episode {
                    id: Uuid::new_v4(),
                    start_time: now,
                    last_motion_time: now,
                    consecutive_motion_frames: *consecutive_motion_frames,
                    notified: false,
                    peak_magnitude: sample.magnitude,
                    segments: 1,
                };

                info!(
                    "New motion episode {} after {} consecutive frames",
                    episode.id, episode.consecutive_motion_frames
                );
                actions.push(RecorderAction::StartSegment {
                    episode: episode.id,
                });
                Self::maybe_notify(&self.policy, &mut episode, &mut actions);
                self.state = RecorderState::Recording(episode);
            }
            RecorderState::Recording(episode) => {
                if sample.is_motion {
                    episode.last_motion_time = now;
                    episode.consecutive_motion_frames =
                        episode.consecutive_motion_frames.saturating_add(1);
                    episode.peak_magnitude = episode.peak_magnitude.max(sample.magnitude);

                    Self::maybe_notify(&self.policy, episode, &mut actions);

                    if let Some(max_segment) = self.policy.max_segment {
                        let segment_length = now.saturating_duration_since(episode.start_time);
                        if segment_length > max_segment {
                            info!(
                                "Rolling over segment of episode {} after {:.3}s",
                                episode.id,
                                segment_length.as_secs_f64()
                            );
                            episode.start_time = now;
                            episode.segments += 1;
                            actions.push(RecorderAction::RolloverSegment {
                                episode: episode.id,
                                segment_length,
                            });
                        }
                    }
                } else {
                    let quiet_for = now.saturating_duration_since(episode.last_motion_time);
                    if quiet_for > self.policy.tail {
                        info!(
                            "No motion for {:.3}s, ending episode {}",
                            quiet_for.as_secs_f64(),
                            episode.id
                        );
                        actions.push(RecorderAction::StopSegment {
                            episode: episode.id,
                            reason: StopReason::MotionEnded,
                        });
                        self.state = RecorderState::Idle {
                            consecutive_motion_frames: 0,
                        };
                    }
                }
            }
        }

        actions
    }

    fn maybe_notify(
        policy: &RecordingPolicy,
        episode: &mut Episode,
        actions: &mut Vec<RecorderAction>,
    ) {
        if !episode.notified && episode.consecutive_motion_frames >= policy.notify_after_frames {
            episode.notified = true;
            actions.push(RecorderAction::Notify {
                episode: episode.id,
                motion_frames: episode.consecutive_motion_frames,
            });
        }
    }

    /// Return to `Idle`, closing the open segment if there is one
    pub fn disarm(&mut self) -> Option<RecorderAction> {
        let previous = std::mem::replace(
            &mut self.state,
            RecorderState::Idle {
                consecutive_motion_frames: 0,
            },
        );

        match previous {
            RecorderState::Recording(episode) => Some(RecorderAction::StopSegment {
                episode: episode.id,
                reason: StopReason::Disarmed,
            }),
            RecorderState::Idle { .. } => None,
        }
    }

    /// Force `Idle` after an encoder failure; the episode is abandoned without
    /// a further segment command
    pub fn abort_episode(&mut self) -> Option<Episode> {
        let previous = std::mem::replace(
            &mut self.state,
            RecorderState::Idle {
                consecutive_motion_frames: 0,
            },
        );

        match previous {
            RecorderState::Recording(episode) => Some(episode),
            RecorderState::Idle { .. } => None,
        }
    }
}
