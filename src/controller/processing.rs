use crate::camera::CameraDevice;
use crate::detector::{MotionDetector, PreparedFrame};
use crate::events::{EventBus, MotionEvent};
use crate::recorder::{Recorder, RecorderStats, StopReason};
use crossbeam::channel::{Receiver, TryRecvError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};

/// Pause after a failed frame fetch before trying again
const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Commands accepted by a running processing loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCommand {
    Disarm,
}

/// State shared between the controller and its loop thread
#[derive(Debug, Default)]
pub(crate) struct SharedState {
    pub armed: AtomicBool,
    pub recording: AtomicBool,
    pub stats: Mutex<RecorderStats>,
}

enum LoopExit {
    Disarmed,
    Failed { component: &'static str, error: String },
}

/// The frame acquisition, detection and recording loop.
///
/// Runs on its own thread; the blocking frame fetch paces it to the sensor.
pub(crate) struct ProcessingLoop {
    pub camera: Arc<dyn CameraDevice>,
    pub detector: MotionDetector,
    pub recorder: Recorder,
    pub commands: Receiver<LoopCommand>,
    pub shared: Arc<SharedState>,
    pub event_bus: EventBus,
    pub max_capture_failures: u32,
}

impl ProcessingLoop {
    pub fn run(mut self) {
        info!(
            "Processing loop started on {} camera ({} metric, threshold {})",
            self.camera.name(),
            self.detector.metric_name(),
            self.detector.threshold()
        );

        let exit = self.process();

        match exit {
            LoopExit::Disarmed => self.recorder.disarm(),
            LoopExit::Failed { component, error } => {
                error!("Processing loop stopping: {} error: {}", component, error);
                self.recorder.abort(StopReason::LoopError);
                let _ = self.event_bus.publish(MotionEvent::SystemError {
                    component: component.to_string(),
                    error,
                });
            }
        }

        if let Err(e) = self.camera.stop() {
            warn!("Failed to stop camera: {}", e);
        }

        self.sync_status();
        self.shared.armed.store(false, Ordering::SeqCst);
        let _ = self.event_bus.publish(MotionEvent::Disarmed {
            timestamp: SystemTime::now(),
        });
        info!("Processing loop stopped");
    }

    fn process(&mut self) -> LoopExit {
        let mut previous: Option<PreparedFrame> = None;
        let mut capture_failures = 0u32;

        loop {
            match self.commands.try_recv() {
                Ok(LoopCommand::Disarm) | Err(TryRecvError::Disconnected) => {
                    return LoopExit::Disarmed;
                }
                Err(TryRecvError::Empty) => {}
            }

            let frame = match self.camera.capture_analysis_frame() {
                Ok(frame) => {
                    capture_failures = 0;
                    frame
                }
                Err(e) => {
                    capture_failures += 1;
                    warn!(
                        "Frame capture failed ({}/{}): {}",
                        capture_failures, self.max_capture_failures, e
                    );
                    // The next good frame starts a new comparison pair
                    previous = None;
                    if capture_failures >= self.max_capture_failures {
                        return LoopExit::Failed {
                            component: "camera",
                            error: format!(
                                "{} consecutive capture failures, last: {}",
                                capture_failures, e
                            ),
                        };
                    }
                    std::thread::sleep(CAPTURE_RETRY_DELAY);
                    continue;
                }
            };

            let current = match self.detector.prepare(&frame) {
                Ok(prepared) => prepared,
                Err(e) => {
                    return LoopExit::Failed {
                        component: "detector",
                        error: e.to_string(),
                    }
                }
            };

            let sample = match previous.as_ref() {
                Some(previous) => match self.detector.compare(previous, &current) {
                    Ok(sample) => Some(sample),
                    Err(e) => {
                        return LoopExit::Failed {
                            component: "detector",
                            error: e.to_string(),
                        }
                    }
                },
                None => {
                    debug!("Frame {} has no predecessor, skipping decision", frame.sequence);
                    None
                }
            };

            let actions = self.recorder.observe(sample, frame.captured_at);
            if !actions.is_empty() {
                self.sync_status();
            }
            previous = Some(current);
        }
    }

    fn sync_status(&self) {
        self.shared
            .recording
            .store(self.recorder.is_recording(), Ordering::SeqCst);
        *self.shared.stats.lock() = self.recorder.stats();
    }
}
