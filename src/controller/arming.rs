use crate::camera::{CameraDevice, CameraSettings};
use crate::config::MotioncamConfig;
use crate::controller::processing::{LoopCommand, ProcessingLoop, SharedState};
use crate::detector::MotionDetector;
use crate::error::{MotioncamError, Result};
use crate::events::{EventBus, MotionEvent};
use crate::notify::NotificationDispatcher;
use crate::recorder::{ArtifactNamer, Recorder};
use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::SystemTime;
use tracing::{debug, error, info};

/// Snapshot for the control surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub armed: bool,
    pub recording: bool,
    pub episodes: u64,
    pub segments: u64,
    pub notifications: u64,
}

struct LoopHandle {
    commands: Sender<LoopCommand>,
    thread: JoinHandle<()>,
}

/// Starts and stops the processing loop.
///
/// `arm` and `disarm` are idempotent and may be called from any thread; at most
/// one loop exists at a time.
pub struct ArmingController {
    config: MotioncamConfig,
    camera: Arc<dyn CameraDevice>,
    event_bus: EventBus,
    dispatcher: Option<NotificationDispatcher>,
    shared: Arc<SharedState>,
    handle: Mutex<Option<LoopHandle>>,
}

impl ArmingController {
    pub fn new(config: MotioncamConfig, camera: Arc<dyn CameraDevice>, event_bus: EventBus) -> Self {
        Self {
            config,
            camera,
            event_bus,
            dispatcher: None,
            shared: Arc::new(SharedState::default()),
            handle: Mutex::new(None),
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: NotificationDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Start the camera and the processing loop.
    ///
    /// Returns `Ok(false)` when a loop is already running.
    pub fn arm(&self) -> Result<bool> {
        let mut handle = self.handle.lock();

        if let Some(existing) = handle.as_ref() {
            if !existing.thread.is_finished() {
                debug!("Arm requested while already armed, ignoring");
                return Ok(false);
            }
        }
        if let Some(finished) = handle.take() {
            debug!("Reaping stopped processing loop");
            if finished.thread.join().is_err() {
                error!("Previous processing loop panicked");
            }
        }

        let detector = MotionDetector::from_config(&self.config.detector)?;
        let namer = ArtifactNamer::new(&self.config.system.timezone)?;
        let mut recorder = Recorder::new(
            &self.config.recording,
            Arc::clone(&self.camera),
            self.event_bus.clone(),
            namer,
        );
        if let Some(dispatcher) = &self.dispatcher {
            recorder = recorder.with_dispatcher(dispatcher.clone());
        }

        self.camera
            .configure(&CameraSettings::from_config(&self.config.camera))?;
        self.camera.start()?;

        let (commands, receiver) = channel::bounded(1);
        let processing = ProcessingLoop {
            camera: Arc::clone(&self.camera),
            detector,
            recorder,
            commands: receiver,
            shared: Arc::clone(&self.shared),
            event_bus: self.event_bus.clone(),
            max_capture_failures: self.config.system.max_capture_failures.max(1),
        };

        self.shared.recording.store(false, Ordering::SeqCst);
        self.shared.armed.store(true, Ordering::SeqCst);

        let thread = std::thread::Builder::new()
            .name("motion-loop".to_string())
            .spawn(move || processing.run())
            .map_err(|e| {
                self.shared.armed.store(false, Ordering::SeqCst);
                let _ = self.camera.stop();
                MotioncamError::component("controller", &format!("Failed to spawn loop: {}", e))
            })?;

        *handle = Some(LoopHandle { commands, thread });
        let _ = self.event_bus.publish(MotionEvent::Armed {
            timestamp: SystemTime::now(),
        });
        Ok(true)
    }

    /// Stop the loop, closing any open segment first.
    ///
    /// Blocks until the loop thread has exited. Returns `false` when nothing was running.
    pub fn disarm(&self) -> bool {
        let mut handle = self.handle.lock();
        let Some(running) = handle.take() else {
            debug!("Disarm requested while not armed, ignoring");
            return false;
        };

        let was_running = !running.thread.is_finished();
        // A loop that already exited has dropped its receiver
        let _ = running.commands.send(LoopCommand::Disarm);
        if running.thread.join().is_err() {
            error!("Processing loop panicked");
            self.shared.armed.store(false, Ordering::SeqCst);
            self.shared.recording.store(false, Ordering::SeqCst);
        }

        if was_running {
            info!("Camera disarmed");
        }
        was_running
    }

    pub fn is_armed(&self) -> bool {
        self.shared.armed.load(Ordering::SeqCst)
    }

    pub fn is_recording(&self) -> bool {
        self.shared.recording.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> ControllerStatus {
        let stats = *self.shared.stats.lock();
        ControllerStatus {
            armed: self.is_armed(),
            recording: self.is_recording(),
            episodes: stats.episodes,
            segments: stats.segments,
            notifications: stats.notifications,
        }
    }
}

impl Drop for ArmingController {
    fn drop(&mut self) {
        self.disarm();
    }
}
