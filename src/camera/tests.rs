use super::*;
use crate::config::{MotioncamConfig, Quality};
use crate::error::{CameraError, EncoderError};
use crate::frame::PixelFormat;
use image::{GrayImage, Luma};
use tempfile::TempDir;

fn settings() -> CameraSettings {
    CameraSettings {
        main_resolution: (64, 48),
        analysis_resolution: (32, 24),
        analysis_format: PixelFormat::Gray8,
        fps: 30,
    }
}

fn segment_settings() -> SegmentSettings {
    SegmentSettings {
        bitrate: 1_000_000,
        quality: Quality::Medium,
    }
}

fn started(scene: Scene) -> SyntheticCamera {
    let camera = SyntheticCamera::builder().scene(scene).build();
    camera.configure(&settings()).unwrap();
    camera.start().unwrap();
    camera
}

#[test]
fn test_settings_follow_configuration() {
    let config = MotioncamConfig::default();
    let settings = CameraSettings::from_config(&config.camera);
    assert_eq!(settings.main_resolution, config.camera.main_resolution);
    assert_eq!(settings.analysis_resolution, config.camera.analysis_resolution);

    let segment = SegmentSettings::from_config(&config.recording);
    assert_eq!(segment.bitrate, config.recording.bitrate);
    assert_eq!(segment.quality, config.recording.quality);
}

#[test]
fn test_capture_requires_start() {
    let camera = SyntheticCamera::builder().build();
    assert!(matches!(camera.start(), Err(CameraError::Start { .. })));

    camera.configure(&settings()).unwrap();
    assert!(matches!(
        camera.capture_analysis_frame(),
        Err(CameraError::Capture { .. })
    ));

    camera.start().unwrap();
    let frame = camera.capture_analysis_frame().unwrap();
    assert_eq!(frame.dimensions(), (32, 24));
    assert_eq!(frame.sequence, 0);

    camera.stop().unwrap();
    assert!(camera.capture_analysis_frame().is_err());
}

#[test]
fn test_static_scene_is_stable() {
    let camera = started(Scene::Static);
    let first = camera.capture_analysis_frame().unwrap();
    let second = camera.capture_analysis_frame().unwrap();
    assert_eq!(first.luma(), second.luma());
    assert_eq!(second.sequence, 1);
    assert_eq!(camera.frames_served(), 2);
}

#[test]
fn test_script_repeats_last_frame() {
    let frames = vec![
        GrayImage::from_pixel(32, 24, Luma([10])),
        GrayImage::from_pixel(32, 24, Luma([200])),
    ];
    let camera = started(Scene::Script(frames));

    let values: Vec<u8> = (0..4)
        .map(|_| camera.capture_analysis_frame().unwrap().luma().get_pixel(0, 0)[0])
        .collect();
    assert_eq!(values, vec![10, 200, 200, 200]);
}

#[test]
fn test_bursts_alternate_with_quiet_frames() {
    let camera = started(Scene::Bursts {
        every: 4,
        length: 2,
    });
    let frames: Vec<GrayImage> = (0..4)
        .map(|_| camera.capture_analysis_frame().unwrap().into_luma())
        .collect();

    // Target frames differ from the quiet background
    assert_ne!(frames[0], frames[2]);
    assert_eq!(frames[2], frames[3]);
}

#[test]
fn test_only_one_segment_open_at_a_time() {
    let dir = TempDir::new().unwrap();
    let camera = started(Scene::Static);

    let first = camera
        .start_segment(&dir.path().join("a.h264"), &segment_settings())
        .unwrap();
    let second = camera.start_segment(&dir.path().join("b.h264"), &segment_settings());
    assert!(matches!(second, Err(EncoderError::Busy { .. })));

    camera.capture_analysis_frame().unwrap();
    let path = camera.stop_segment(first).unwrap();
    // One 32x24 luma frame was written while the segment was open
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 32 * 24);
    assert!(!camera.has_open_segment());
}

#[test]
fn test_stop_unknown_segment_is_rejected() {
    let dir = TempDir::new().unwrap();
    let camera = started(Scene::Static);
    let handle = camera
        .start_segment(&dir.path().join("a.h264"), &segment_settings())
        .unwrap();

    let stale = SegmentHandle::new(handle.id() + 1, dir.path().join("x.h264"));
    assert!(matches!(
        camera.stop_segment(stale),
        Err(EncoderError::Stop { .. })
    ));
    assert!(camera.has_open_segment());
    camera.stop_segment(handle).unwrap();
}

#[test]
fn test_injected_failures() {
    let dir = TempDir::new().unwrap();
    let camera = started(Scene::Static);

    camera.fail_segment_starts(1);
    assert!(matches!(
        camera.start_segment(&dir.path().join("a.h264"), &segment_settings()),
        Err(EncoderError::Start { .. })
    ));
    assert!(camera
        .start_segment(&dir.path().join("a.h264"), &segment_settings())
        .is_ok());

    camera.fail_stills(1);
    let still = dir.path().join("still.jpeg");
    assert!(matches!(
        camera.capture_still(&still),
        Err(CameraError::Still { .. })
    ));
    camera.capture_still(&still).unwrap();
    assert!(still.exists());
    assert_eq!(camera.stills(), vec![still]);
}
