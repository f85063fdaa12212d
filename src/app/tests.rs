use super::*;
use crate::camera::{CameraDevice, Scene, SyntheticCamera};
use crate::config::MotioncamConfig;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn create_test_config(dir: &TempDir) -> MotioncamConfig {
    let mut config = MotioncamConfig::default();
    config.camera.main_resolution = (64, 48);
    config.camera.analysis_resolution = (64, 48);
    config.recording.video_dir = dir.path().join("video").to_string_lossy().to_string();
    config.notification.image_dir = dir.path().join("image").to_string_lossy().to_string();
    config
}

fn camera(scene: Scene) -> Arc<dyn CameraDevice> {
    Arc::new(
        SyntheticCamera::builder()
            .scene(scene)
            .frame_interval(Duration::from_millis(5))
            .build(),
    )
}

#[tokio::test]
async fn test_invalid_configuration_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.recording.debounce_frames = 0;

    assert!(MotioncamApp::new(config, camera(Scene::Static)).is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_armed_and_shutdown() {
    let dir = TempDir::new().unwrap();
    let mut app = MotioncamApp::new(create_test_config(&dir), camera(Scene::Static)).unwrap();
    app.initialize().await.unwrap();
    app.start().await.unwrap();

    let controller = app.controller().unwrap();
    assert!(controller.is_armed());
    assert_eq!(
        app.get_component_state("notification").await,
        Some(ComponentState::Running)
    );

    assert_eq!(app.shutdown().await.unwrap(), 0);
    assert!(!controller.is_armed());
    assert_eq!(
        app.get_component_state("controller").await,
        Some(ComponentState::Stopped)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_disarmed_without_notifications() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.notification.enabled = false;

    let mut app = MotioncamApp::new(config, camera(Scene::Static)).unwrap();
    app.set_start_armed(false);
    app.initialize().await.unwrap();
    app.start().await.unwrap();

    assert!(!app.controller().unwrap().is_armed());
    assert_eq!(
        app.get_component_state("notification").await,
        Some(ComponentState::Stopped)
    );
    assert_eq!(app.shutdown().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_token_ends_run() {
    let dir = TempDir::new().unwrap();
    let mut app = MotioncamApp::new(create_test_config(&dir), camera(Scene::Static)).unwrap();
    app.initialize().await.unwrap();
    app.start().await.unwrap();

    let token = app.shutdown_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let exit_code = tokio::time::timeout(Duration::from_secs(10), app.run())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit_code, 0);
}
