use super::*;
use crate::camera::{CameraDevice, Scene, SegmentEvent, SyntheticCamera};
use crate::config::MotioncamConfig;
use crate::events::{EventBus, EventFilter, MotionEvent};
use crate::notify::{LogMailer, NotificationService};
use crate::recorder::{ArtifactNamer, StopReason};
use image::{GrayImage, Luma};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn config(dir: &TempDir) -> MotioncamConfig {
    let mut config = MotioncamConfig::default();
    config.camera.main_resolution = (64, 48);
    config.camera.analysis_resolution = (64, 48);
    config.recording.video_dir = dir.path().join("video").to_string_lossy().to_string();
    config.notification.image_dir = dir.path().join("image").to_string_lossy().to_string();
    config.system.max_capture_failures = 3;
    config
}

/// A target that moves on every frame
fn moving() -> Scene {
    Scene::Bursts {
        every: u64::MAX,
        length: u64::MAX,
    }
}

fn synthetic(scene: Scene) -> Arc<SyntheticCamera> {
    Arc::new(
        SyntheticCamera::builder()
            .scene(scene)
            .frame_interval(Duration::from_millis(2))
            .build(),
    )
}

fn controller(config: MotioncamConfig, camera: &Arc<SyntheticCamera>, bus: &EventBus) -> ArmingController {
    ArmingController::new(config, Arc::clone(camera) as Arc<dyn CameraDevice>, bus.clone())
}

fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_arm_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let camera = synthetic(Scene::Static);
    let bus = EventBus::new(64);
    let mut armed_events = bus.subscribe_filtered(EventFilter::EventTypes(vec!["armed"]), "test");
    let controller = controller(config(&dir), &camera, &bus);

    assert!(controller.arm().unwrap());
    assert!(!controller.arm().unwrap());
    assert!(!controller.arm().unwrap());
    assert!(controller.is_armed());

    wait_until("frames", || camera.frames_served() > 5);
    assert!(controller.disarm());
    assert!(!controller.is_armed());

    // Exactly one loop was started
    assert!(armed_events.try_recv().unwrap().is_some());
    assert!(armed_events.try_recv().unwrap().is_none());
}

#[test]
fn test_disarm_when_idle_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let camera = synthetic(Scene::Static);
    let controller = controller(config(&dir), &camera, &EventBus::new(16));

    assert!(!controller.disarm());
    assert!(controller.arm().unwrap());
    assert!(controller.disarm());
    assert!(!controller.disarm());
    assert_eq!(controller.status(), ControllerStatus::default());
}

#[test]
fn test_static_scene_never_records() {
    let dir = TempDir::new().unwrap();
    let camera = synthetic(Scene::Static);
    let controller = controller(config(&dir), &camera, &EventBus::new(16));

    controller.arm().unwrap();
    wait_until("frames", || camera.frames_served() > 30);
    assert!(!controller.is_recording());
    controller.disarm();

    assert!(camera.segment_log().is_empty());
}

#[test]
fn test_disarm_closes_open_segment() {
    let dir = TempDir::new().unwrap();
    let camera = synthetic(moving());
    let bus = EventBus::new(256);
    let mut stopped =
        bus.subscribe_filtered(EventFilter::EventTypes(vec!["recording_stopped"]), "test");
    let controller = controller(config(&dir), &camera, &bus);

    controller.arm().unwrap();
    wait_until("recording", || controller.is_recording());
    assert!(camera.has_open_segment());

    let status = controller.status();
    assert!(status.armed);
    assert_eq!(status.episodes, 1);
    assert_eq!(status.segments, 1);

    controller.disarm();
    assert!(!camera.has_open_segment());
    assert!(!controller.is_recording());
    assert!(matches!(
        camera.segment_log().last(),
        Some(SegmentEvent::Stopped(_))
    ));
    assert!(matches!(
        stopped.try_recv().unwrap(),
        Some(MotionEvent::RecordingStopped {
            reason: StopReason::Disarmed,
            ..
        })
    ));
}

#[test]
fn test_capture_failures_end_the_loop() {
    let dir = TempDir::new().unwrap();
    let camera = synthetic(Scene::Static);
    let bus = EventBus::new(64);
    let mut errors = bus.subscribe_filtered(EventFilter::Components(vec!["camera".to_string()]), "test");
    let controller = controller(config(&dir), &camera, &bus);

    controller.arm().unwrap();
    wait_until("frames", || camera.frames_served() > 2);
    // Pull the sensor out from under the loop
    camera.stop().unwrap();
    wait_until("loop exit", || !controller.is_armed());
    assert!(errors.try_recv().unwrap().is_some());

    // A self-terminated loop is reaped and can be re-armed
    assert!(controller.arm().unwrap());
    assert!(controller.is_armed());
    controller.disarm();
}

#[test]
fn test_mismatched_frames_stop_the_loop() {
    let dir = TempDir::new().unwrap();
    let camera = synthetic(Scene::Script(vec![
        GrayImage::from_pixel(64, 48, Luma([90])),
        GrayImage::from_pixel(32, 24, Luma([90])),
    ]));
    let bus = EventBus::new(64);
    let mut errors =
        bus.subscribe_filtered(EventFilter::Components(vec!["detector".to_string()]), "test");
    let controller = controller(config(&dir), &camera, &bus);

    controller.arm().unwrap();
    wait_until("loop exit", || !controller.is_armed());
    assert!(errors.try_recv().unwrap().is_some());
    assert!(!controller.disarm());
}

#[test]
fn test_invalid_detector_configuration_fails_arm() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    config.detector.blur_sigma = 0.0;
    let camera = synthetic(Scene::Static);
    let controller = controller(config, &camera, &EventBus::new(16));

    assert!(controller.arm().is_err());
    assert!(!controller.is_armed());
    assert_eq!(camera.frames_served(), 0);
}

#[test]
fn test_unknown_timezone_fails_arm() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    config.system.timezone = "Not/AZone".to_string();
    let camera = synthetic(Scene::Static);
    let controller = controller(config, &camera, &EventBus::new(16));

    assert!(controller.arm().is_err());
    assert!(!controller.is_armed());
    assert_eq!(camera.frames_served(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_motion_records_and_notifies_once() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let camera = synthetic(moving());
    let bus = EventBus::new(512);
    let mut sent = bus.subscribe_filtered(EventFilter::EventTypes(vec!["notification_sent"]), "test");

    let service = NotificationService::start(
        &config.notification,
        Arc::clone(&camera) as Arc<dyn CameraDevice>,
        Arc::new(LogMailer),
        ArtifactNamer::new("UTC").unwrap(),
        bus.clone(),
    );
    let controller = Arc::new(
        ArmingController::new(config, Arc::clone(&camera) as Arc<dyn CameraDevice>, bus.clone())
            .with_dispatcher(service.dispatcher()),
    );

    controller.arm().unwrap();
    let event = tokio::time::timeout(Duration::from_secs(10), sent.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event, MotionEvent::NotificationSent { .. }));

    let stopper = Arc::clone(&controller);
    tokio::task::spawn_blocking(move || stopper.disarm())
        .await
        .unwrap();

    let status = controller.status();
    assert_eq!(status.episodes, 1);
    assert_eq!(status.notifications, 1);
    assert_eq!(camera.stills().len(), 1);

    service.shutdown().await;
}
