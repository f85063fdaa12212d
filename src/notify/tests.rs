use super::*;
use crate::camera::{CameraDevice, CameraSettings, SyntheticCamera};
use crate::config::{MotioncamConfig, NotificationConfig};
use crate::error::NotificationError;
use crate::events::{EventBus, EventFilter, MotionEvent};
use crate::frame::PixelFormat;
use crate::recorder::ArtifactNamer;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;
use uuid::Uuid;

/// Mailer that records what it was asked to send
#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<PathBuf>>,
    fail: bool,
    delay: Duration,
}

impl Mailer for RecordingMailer {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn send(&self, image: &Path) -> Result<(), NotificationError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail {
            return Err(NotificationError::Delivery {
                details: "smtp unreachable".to_string(),
            });
        }
        self.sent.lock().push(image.to_path_buf());
        Ok(())
    }
}

fn camera() -> Arc<SyntheticCamera> {
    let camera = SyntheticCamera::builder().build();
    camera
        .configure(&CameraSettings {
            main_resolution: (64, 48),
            analysis_resolution: (64, 48),
            analysis_format: PixelFormat::Gray8,
            fps: 30,
        })
        .unwrap();
    camera.start().unwrap();
    Arc::new(camera)
}

fn notification_config(dir: &TempDir, queue_capacity: usize) -> NotificationConfig {
    NotificationConfig {
        image_dir: dir.path().join("image").to_string_lossy().to_string(),
        queue_capacity,
        ..MotioncamConfig::default().notification
    }
}

fn start(
    config: &NotificationConfig,
    camera: &Arc<SyntheticCamera>,
    mailer: Arc<RecordingMailer>,
    bus: &EventBus,
) -> NotificationService {
    NotificationService::start(
        config,
        Arc::clone(camera) as Arc<dyn CameraDevice>,
        mailer,
        ArtifactNamer::new("UTC").unwrap(),
        bus.clone(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_still_is_captured_and_mailed() {
    let dir = TempDir::new().unwrap();
    let camera = camera();
    let mailer = Arc::new(RecordingMailer::default());
    let bus = EventBus::new(16);
    let mut sent = bus.subscribe_filtered(EventFilter::EventTypes(vec!["notification_sent"]), "test");

    let service = start(&notification_config(&dir, 4), &camera, Arc::clone(&mailer), &bus);
    let episode = Uuid::new_v4();
    service
        .dispatcher()
        .dispatch(NotificationRequest::new(episode, 10))
        .unwrap();

    let event = timeout(Duration::from_secs(5), sent.recv())
        .await
        .unwrap()
        .unwrap();
    let (sent_for, image) = match event {
        MotionEvent::NotificationSent { episode, image } => (episode, image),
        other => panic!("unexpected event {:?}", other),
    };
    assert_eq!(sent_for, episode);
    assert!(image.exists());
    assert!(image.starts_with(dir.path().join("image")));
    assert_eq!(image.extension().and_then(|e| e.to_str()), Some("jpeg"));
    assert_eq!(*mailer.sent.lock(), vec![image]);

    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delivery_failure_is_reported_not_raised() {
    let dir = TempDir::new().unwrap();
    let camera = camera();
    let mailer = Arc::new(RecordingMailer {
        fail: true,
        ..RecordingMailer::default()
    });
    let bus = EventBus::new(16);
    let mut failed =
        bus.subscribe_filtered(EventFilter::EventTypes(vec!["notification_failed"]), "test");

    let service = start(&notification_config(&dir, 4), &camera, mailer, &bus);
    let dispatcher = service.dispatcher();
    dispatcher
        .dispatch(NotificationRequest::new(Uuid::new_v4(), 10))
        .unwrap();

    let event = timeout(Duration::from_secs(5), failed.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(event.description().contains("smtp unreachable"));

    // The worker keeps serving after a failure
    camera.fail_stills(1);
    dispatcher
        .dispatch(NotificationRequest::new(Uuid::new_v4(), 10))
        .unwrap();
    let event = timeout(Duration::from_secs(5), failed.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(event.description().contains("Still capture failed"));

    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_queue_drops_instead_of_blocking() {
    let dir = TempDir::new().unwrap();
    let camera = camera();
    let mailer = Arc::new(RecordingMailer {
        delay: Duration::from_millis(300),
        ..RecordingMailer::default()
    });
    let bus = EventBus::new(16);

    let service = start(&notification_config(&dir, 1), &camera, mailer, &bus);
    let dispatcher = service.dispatcher();

    let results: Vec<_> = (0..5)
        .map(|_| dispatcher.dispatch(NotificationRequest::new(Uuid::new_v4(), 10)))
        .collect();
    assert!(results[0].is_ok());
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(NotificationError::QueueFull))));

    service.shutdown().await;
}

#[tokio::test]
async fn test_dispatch_after_shutdown_reports_stopped_worker() {
    let dir = TempDir::new().unwrap();
    let camera = camera();
    let bus = EventBus::new(16);

    let service = start(
        &notification_config(&dir, 4),
        &camera,
        Arc::new(RecordingMailer::default()),
        &bus,
    );
    let dispatcher = service.dispatcher();
    service.shutdown().await;

    assert!(matches!(
        dispatcher.dispatch(NotificationRequest::new(Uuid::new_v4(), 10)),
        Err(NotificationError::WorkerStopped)
    ));
}

#[test]
fn test_mailer_selection_follows_command() {
    let mut config = MotioncamConfig::default().notification;
    assert_eq!(mailer_from_config(&config).name(), "log");

    config.command = "/usr/local/bin/send-still".to_string();
    assert_eq!(mailer_from_config(&config).name(), "command");
}

#[cfg(unix)]
#[test]
fn test_command_mailer_reports_exit_status() {
    let image = Path::new("image/still.jpeg");
    assert!(CommandMailer::new("true").send(image).is_ok());

    let failure = CommandMailer::new("false")
        .with_subject("Motion Detected")
        .with_addresses("cam@example.com", "me@example.com")
        .send(image);
    assert!(matches!(failure, Err(NotificationError::Delivery { .. })));

    assert!(CommandMailer::new("/nonexistent/mailer").send(image).is_err());
}
