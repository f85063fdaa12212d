use crate::camera::CameraDevice;
use crate::config::NotificationConfig;
use crate::error::NotificationError;
use crate::events::{EventBus, MotionEvent};
use crate::notify::Mailer;
use crate::recorder::ArtifactNamer;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One pending operator alert
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRequest {
    pub episode: Uuid,
    pub motion_frames: u32,
    pub requested_at: DateTime<Utc>,
}

impl NotificationRequest {
    pub fn new(episode: Uuid, motion_frames: u32) -> Self {
        Self {
            episode,
            motion_frames,
            requested_at: Utc::now(),
        }
    }
}

/// Non-blocking handle used by the processing loop to queue notifications
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    sender: mpsc::Sender<NotificationRequest>,
}

impl NotificationDispatcher {
    /// Queue a request without waiting; a full queue drops it
    pub fn dispatch(&self, request: NotificationRequest) -> Result<(), NotificationError> {
        self.sender.try_send(request).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => NotificationError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => NotificationError::WorkerStopped,
        })
    }
}

struct NotificationWorker {
    receiver: mpsc::Receiver<NotificationRequest>,
    camera: Arc<dyn CameraDevice>,
    mailer: Arc<dyn Mailer>,
    namer: ArtifactNamer,
    image_dir: PathBuf,
    event_bus: EventBus,
    cancel: CancellationToken,
}

impl NotificationWorker {
    async fn run(mut self) {
        info!("Notification worker started (mailer: {})", self.mailer.name());

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                request = self.receiver.recv() => match request {
                    Some(request) => self.deliver(request).await,
                    None => break,
                },
            }
        }

        self.receiver.close();
        let mut dropped = 0;
        while self.receiver.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!("Dropped {} pending notifications on shutdown", dropped);
        }
        info!("Notification worker stopped");
    }

    async fn deliver(&self, request: NotificationRequest) {
        debug!(
            "Delivering notification for episode {} ({} motion frames)",
            request.episode, request.motion_frames
        );

        let camera = Arc::clone(&self.camera);
        let mailer = Arc::clone(&self.mailer);
        let namer = self.namer.clone();
        let image_dir = self.image_dir.clone();
        let requested_at = request.requested_at;

        let outcome = tokio::task::spawn_blocking(move || -> Result<PathBuf, NotificationError> {
            let path = namer
                .next_path(&image_dir, "jpeg", requested_at)
                .map_err(|e| NotificationError::StillCapture {
                    details: format!("Cannot prepare {}: {}", image_dir.display(), e),
                })?;
            camera
                .capture_still(&path)
                .map_err(|e| NotificationError::StillCapture {
                    details: e.to_string(),
                })?;
            mailer.send(&path)?;
            Ok(path)
        })
        .await;

        let event = match outcome {
            Ok(Ok(image)) => {
                info!("Notification for episode {} sent", request.episode);
                MotionEvent::NotificationSent {
                    episode: request.episode,
                    image,
                }
            }
            Ok(Err(e)) => MotionEvent::NotificationFailed {
                episode: request.episode,
                error: e.to_string(),
            },
            Err(e) => {
                error!("Notification task for {} panicked: {}", request.episode, e);
                MotionEvent::NotificationFailed {
                    episode: request.episode,
                    error: e.to_string(),
                }
            }
        };

        let _ = self.event_bus.publish(event);
    }
}

/// Owns the notification worker task
pub struct NotificationService {
    dispatcher: NotificationDispatcher,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl NotificationService {
    /// Spawn the worker on the current tokio runtime
    pub fn start(
        config: &NotificationConfig,
        camera: Arc<dyn CameraDevice>,
        mailer: Arc<dyn Mailer>,
        namer: ArtifactNamer,
        event_bus: EventBus,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let cancel = CancellationToken::new();

        let worker = NotificationWorker {
            receiver,
            camera,
            mailer,
            namer,
            image_dir: config.image_dir(),
            event_bus,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(worker.run());

        Self {
            dispatcher: NotificationDispatcher { sender },
            cancel,
            handle,
        }
    }

    pub fn dispatcher(&self) -> NotificationDispatcher {
        self.dispatcher.clone()
    }

    /// Stop the worker; an in-flight delivery finishes first
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            error!("Notification worker ended abnormally: {}", e);
        }
    }
}
