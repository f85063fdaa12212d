use crate::camera::{CameraDevice, CameraSettings, SegmentHandle, SegmentSettings};
use crate::error::{CameraError, EncoderError};
use crate::frame::AnalysisFrame;
use image::{GrayImage, Luma};
use parking_lot::Mutex;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// What the synthetic sensor shows
#[derive(Debug, Clone)]
pub enum Scene {
    /// A fixed background; never produces motion
    Static,
    /// Frames played in order; the last frame repeats once the script runs out
    Script(Vec<GrayImage>),
    /// A bright target crosses the view for `length` frames out of every `every`
    Bursts { every: u64, length: u64 },
}

/// Segment lifecycle as seen by the synthetic encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentEvent {
    Started(PathBuf),
    Stopped(PathBuf),
}

struct OpenSegment {
    id: u64,
    path: PathBuf,
    file: File,
}

struct SyntheticState {
    settings: Option<CameraSettings>,
    running: bool,
    sequence: u64,
    latest: Option<GrayImage>,
    open_segment: Option<OpenSegment>,
    next_segment_id: u64,
    segment_log: Vec<SegmentEvent>,
    stills: Vec<PathBuf>,
    failing_starts: u32,
    failing_stops: u32,
    failing_stills: u32,
}

/// Software camera for dry runs and tests.
///
/// Analysis frames come from a [`Scene`]; stills are written as JPEG and
/// segments as raw luma dumps of the frames captured while they are open.
pub struct SyntheticCamera {
    scene: Scene,
    frame_interval: Duration,
    state: Mutex<SyntheticState>,
}

impl SyntheticCamera {
    pub fn builder() -> SyntheticCameraBuilder {
        SyntheticCameraBuilder::new()
    }

    /// Number of analysis frames handed out so far
    pub fn frames_served(&self) -> u64 {
        self.state.lock().sequence
    }

    pub fn segment_log(&self) -> Vec<SegmentEvent> {
        self.state.lock().segment_log.clone()
    }

    pub fn has_open_segment(&self) -> bool {
        self.state.lock().open_segment.is_some()
    }

    pub fn stills(&self) -> Vec<PathBuf> {
        self.state.lock().stills.clone()
    }

    /// Make the next `count` segment starts fail as if the encoder were busy
    pub fn fail_segment_starts(&self, count: u32) {
        self.state.lock().failing_starts = count;
    }

    /// Make the next `count` segment stops fail; the failed segment is torn down regardless
    pub fn fail_segment_stops(&self, count: u32) {
        self.state.lock().failing_stops = count;
    }

    /// Make the next `count` still captures fail
    pub fn fail_stills(&self, count: u32) {
        self.state.lock().failing_stills = count;
    }

    fn render(&self, sequence: u64, width: u32, height: u32) -> GrayImage {
        match &self.scene {
            Scene::Static => background(width, height),
            Scene::Script(frames) => match frames.get(sequence as usize).or(frames.last()) {
                Some(frame) => frame.clone(),
                None => background(width, height),
            },
            Scene::Bursts { every, length } => {
                let mut image = background(width, height);
                let phase = sequence % (*every).max(1);
                if phase < *length {
                    let size = (width.min(height) / 4).max(1);
                    let travel = width.saturating_sub(size).max(1) as u64;
                    let left = ((phase * 8) % travel) as u32;
                    let top = (height - size) / 2;
                    for y in top..top + size {
                        for x in left..left + size {
                            image.put_pixel(x, y, Luma([235]));
                        }
                    }
                }
                image
            }
        }
    }
}

fn background(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        Luma([(60 + (x * 40 / width.max(1)) + (y * 20 / height.max(1))) as u8])
    })
}

impl CameraDevice for SyntheticCamera {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn configure(&self, settings: &CameraSettings) -> Result<(), CameraError> {
        let (width, height) = settings.analysis_resolution;
        if width == 0 || height == 0 {
            return Err(CameraError::Configuration {
                details: "Analysis resolution must be greater than 0".to_string(),
            });
        }

        info!(
            "Synthetic camera configured: main {:?}, analysis {:?}",
            settings.main_resolution, settings.analysis_resolution
        );
        self.state.lock().settings = Some(settings.clone());
        Ok(())
    }

    fn start(&self) -> Result<(), CameraError> {
        let mut state = self.state.lock();
        if state.settings.is_none() {
            return Err(CameraError::Start {
                details: "Camera must be configured before starting".to_string(),
            });
        }
        state.running = true;
        debug!("Synthetic camera started");
        Ok(())
    }

    fn stop(&self) -> Result<(), CameraError> {
        self.state.lock().running = false;
        debug!("Synthetic camera stopped");
        Ok(())
    }

    fn capture_analysis_frame(&self) -> Result<AnalysisFrame, CameraError> {
        if !self.frame_interval.is_zero() {
            std::thread::sleep(self.frame_interval);
        }

        let mut state = self.state.lock();
        if !state.running {
            return Err(CameraError::Capture {
                details: "Camera is not running".to_string(),
            });
        }
        let (width, height) = state
            .settings
            .as_ref()
            .map(|settings| settings.analysis_resolution)
            .ok_or_else(|| CameraError::Capture {
                details: "Camera is not configured".to_string(),
            })?;

        let sequence = state.sequence;
        state.sequence += 1;
        let image = self.render(sequence, width, height);

        if let Some(segment) = state.open_segment.as_mut() {
            if let Err(e) = segment.file.write_all(image.as_raw()) {
                warn!(
                    "Synthetic segment {} write failed: {}",
                    segment.path.display(),
                    e
                );
            }
        }

        state.latest = Some(image.clone());
        trace!("Synthetic frame {}", sequence);
        Ok(AnalysisFrame::new(sequence, Instant::now(), image))
    }

    fn capture_still(&self, path: &Path) -> Result<(), CameraError> {
        let mut state = self.state.lock();
        if state.failing_stills > 0 {
            state.failing_stills -= 1;
            return Err(CameraError::Still {
                path: path.to_path_buf(),
                details: "Injected still failure".to_string(),
            });
        }

        let (width, height) = state
            .settings
            .as_ref()
            .map(|settings| settings.analysis_resolution)
            .unwrap_or((64, 48));
        let image = match &state.latest {
            Some(image) => image.clone(),
            None => self.render(state.sequence, width, height),
        };

        image.save(path).map_err(|e| CameraError::Still {
            path: path.to_path_buf(),
            details: e.to_string(),
        })?;

        state.stills.push(path.to_path_buf());
        debug!("Synthetic still written to {}", path.display());
        Ok(())
    }

    fn start_segment(
        &self,
        path: &Path,
        settings: &SegmentSettings,
    ) -> Result<SegmentHandle, EncoderError> {
        let mut state = self.state.lock();
        if let Some(open) = &state.open_segment {
            return Err(EncoderError::Busy {
                path: open.path.clone(),
            });
        }
        if state.failing_starts > 0 {
            state.failing_starts -= 1;
            return Err(EncoderError::Start {
                path: path.to_path_buf(),
                details: "Injected encoder failure".to_string(),
            });
        }

        let file = File::create(path).map_err(|e| EncoderError::Start {
            path: path.to_path_buf(),
            details: e.to_string(),
        })?;

        let id = state.next_segment_id;
        state.next_segment_id += 1;
        state.open_segment = Some(OpenSegment {
            id,
            path: path.to_path_buf(),
            file,
        });
        state.segment_log.push(SegmentEvent::Started(path.to_path_buf()));

        debug!(
            "Synthetic segment {} opened at {} ({} bps, {:?})",
            id,
            path.display(),
            settings.bitrate,
            settings.quality
        );
        Ok(SegmentHandle::new(id, path.to_path_buf()))
    }

    fn stop_segment(&self, handle: SegmentHandle) -> Result<PathBuf, EncoderError> {
        let mut state = self.state.lock();
        match state.open_segment.take() {
            Some(mut segment) if segment.id == handle.id => {
                let flushed = segment.file.flush();
                state
                    .segment_log
                    .push(SegmentEvent::Stopped(segment.path.clone()));
                if state.failing_stops > 0 {
                    state.failing_stops -= 1;
                    return Err(EncoderError::Stop {
                        path: segment.path,
                        details: "Injected encoder failure".to_string(),
                    });
                }
                flushed.map_err(|e| EncoderError::Stop {
                    path: segment.path.clone(),
                    details: e.to_string(),
                })?;
                Ok(segment.path)
            }
            other => {
                state.open_segment = other;
                Err(EncoderError::Stop {
                    path: handle.path,
                    details: "Segment is not open".to_string(),
                })
            }
        }
    }
}

/// Builder for [`SyntheticCamera`]
pub struct SyntheticCameraBuilder {
    scene: Scene,
    frame_interval: Duration,
}

impl SyntheticCameraBuilder {
    pub fn new() -> Self {
        Self {
            scene: Scene::Static,
            frame_interval: Duration::ZERO,
        }
    }

    pub fn scene(mut self, scene: Scene) -> Self {
        self.scene = scene;
        self
    }

    /// Pace frame delivery like a real sensor
    pub fn frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Pace frame delivery at `fps` frames per second
    pub fn fps(self, fps: u32) -> Self {
        let interval = Duration::from_secs(1) / fps.max(1);
        self.frame_interval(interval)
    }

    pub fn build(self) -> SyntheticCamera {
        SyntheticCamera {
            scene: self.scene,
            frame_interval: self.frame_interval,
            state: Mutex::new(SyntheticState {
                settings: None,
                running: false,
                sequence: 0,
                latest: None,
                open_segment: None,
                next_segment_id: 0,
                segment_log: Vec::new(),
                stills: Vec::new(),
                failing_starts: 0,
                failing_stops: 0,
                failing_stills: 0,
            }),
        }
    }
}

impl Default for SyntheticCameraBuilder {
    fn default() -> Self {
        Self::new()
    }
}
