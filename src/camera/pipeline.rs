use crate::camera::{CameraDevice, CameraSettings, SegmentHandle, SegmentSettings};
use crate::config::Quality;
use crate::error::{CameraError, EncoderError};
use crate::frame::{AnalysisFrame, PixelFormat};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::{AppSink, AppSinkCallbacks, AppSrc};
use gstreamer_video::prelude::*;
use gstreamer_video::{VideoFrame, VideoInfo};

/// Seconds to wait for a frame before reporting a stalled sensor
const CAPTURE_TIMEOUT_SECS: u64 = 5;
/// Seconds to wait for the encoder to flush on segment close
const EOS_TIMEOUT_SECS: u64 = 10;

struct Streams {
    pipeline: Pipeline,
    analysis: AppSink,
}

struct ActiveSegment {
    id: u64,
    path: PathBuf,
    pipeline: Pipeline,
    appsrc: AppSrc,
}

/// GStreamer camera with a downscaled analysis branch and a full-resolution
/// branch that feeds stills and the segment encoder
pub struct GstCamera {
    device: String,
    settings: Mutex<Option<CameraSettings>>,
    streams: Mutex<Option<Streams>>,
    latest_main: Arc<Mutex<Option<gstreamer::Sample>>>,
    segment: Arc<Mutex<Option<ActiveSegment>>>,
    sequence: AtomicU64,
    next_segment_id: AtomicU64,
}

impl GstCamera {
    /// Create a camera around a GStreamer source description such as `libcamerasrc`
    pub fn new(device: impl Into<String>) -> Result<Self, CameraError> {
        gstreamer::init().map_err(|e| CameraError::Configuration {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        Ok(Self {
            device: device.into(),
            settings: Mutex::new(None),
            streams: Mutex::new(None),
            latest_main: Arc::new(Mutex::new(None)),
            segment: Arc::new(Mutex::new(None)),
            sequence: AtomicU64::new(0),
            next_segment_id: AtomicU64::new(0),
        })
    }

    fn build_pipeline_string(&self, settings: &CameraSettings) -> String {
        let (main_width, main_height) = settings.main_resolution;
        let (analysis_width, analysis_height) = settings.analysis_resolution;

        format!(
            "{} ! video/x-raw,width={},height={},framerate={}/1 ! tee name=t \
             t. ! queue leaky=downstream max-size-buffers=2 ! videoconvert ! videoscale ! \
             video/x-raw,format={},width={},height={} ! \
             appsink name=analysis sync=false max-buffers=1 drop=true \
             t. ! queue leaky=downstream max-size-buffers=2 ! videoconvert ! \
             video/x-raw,format=RGB ! \
             appsink name=main sync=false max-buffers=1 drop=true",
            self.device,
            main_width,
            main_height,
            settings.fps,
            settings.analysis_format.gst_format(),
            analysis_width,
            analysis_height
        )
    }

    fn build_encoder_string(&self, settings: &CameraSettings, segment: &SegmentSettings) -> String {
        let (width, height) = settings.main_resolution;
        let preset = match segment.quality {
            Quality::Low => "ultrafast",
            Quality::Medium => "superfast",
            Quality::High => "veryfast",
            Quality::VeryHigh => "medium",
        };

        format!(
            "appsrc name=src is-live=true format=time do-timestamp=true \
             caps=video/x-raw,format=RGB,width={},height={},framerate={}/1 ! \
             queue max-size-buffers=30 ! videoconvert ! video/x-raw,format=I420 ! \
             x264enc bitrate={} speed-preset={} tune=zerolatency key-int-max={} ! \
             video/x-h264,stream-format=byte-stream ! h264parse ! \
             filesink name=sink",
            width,
            height,
            settings.fps,
            (segment.bitrate / 1000).max(1),
            preset,
            settings.fps * 2
        )
    }

    fn element<T: IsA<gstreamer::Element>>(pipeline: &Pipeline, name: &str) -> Option<T> {
        pipeline.by_name(name)?.downcast::<T>().ok()
    }
}

/// Copy the first plane of a sample into tightly packed rows
fn packed_plane(
    sample: &gstreamer::Sample,
    bytes_per_row: impl Fn(u32) -> usize,
) -> Result<(u32, u32, Vec<u8>), String> {
    let caps = sample.caps().ok_or("No caps in sample")?;
    let info = VideoInfo::from_caps(caps).map_err(|e| format!("Invalid caps: {}", e))?;
    let buffer = sample.buffer_owned().ok_or("No buffer in sample")?;
    let frame = VideoFrame::from_buffer_readable(buffer, &info)
        .map_err(|_| "Failed to map video frame".to_string())?;

    let (width, height) = (frame.width(), frame.height());
    let stride = frame.plane_stride()[0] as usize;
    let data = frame
        .plane_data(0)
        .map_err(|e| format!("Failed to read plane: {}", e))?;

    let row_bytes = bytes_per_row(width);
    let mut packed = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let line = data
            .get(start..start + row_bytes)
            .ok_or("Plane shorter than its caps")?;
        packed.extend_from_slice(line);
    }

    Ok((width, height, packed))
}

impl CameraDevice for GstCamera {
    fn name(&self) -> &'static str {
        "gstreamer"
    }

    fn configure(&self, settings: &CameraSettings) -> Result<(), CameraError> {
        let pipeline_desc = self.build_pipeline_string(settings);
        info!("Creating GStreamer camera pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| CameraError::Configuration {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let analysis: AppSink =
            Self::element(&pipeline, "analysis").ok_or_else(|| CameraError::Configuration {
                details: "Failed to get analysis appsink".to_string(),
            })?;
        let main: AppSink =
            Self::element(&pipeline, "main").ok_or_else(|| CameraError::Configuration {
                details: "Failed to get main appsink".to_string(),
            })?;

        let latest = Arc::clone(&self.latest_main);
        let segment = Arc::clone(&self.segment);
        main.set_callbacks(
            AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gstreamer::FlowError::Eos)?;

                    if let Some(active) = segment.lock().as_ref() {
                        if let Some(buffer) = sample.buffer() {
                            // The encoder branch stamps its own running time
                            let mut copy = buffer.copy();
                            if let Some(copy) = copy.get_mut() {
                                copy.set_pts(gstreamer::ClockTime::NONE);
                                copy.set_dts(gstreamer::ClockTime::NONE);
                            }
                            if let Err(e) = active.appsrc.push_buffer(copy) {
                                warn!(
                                    "Failed to feed segment {}: {:?}",
                                    active.path.display(),
                                    e
                                );
                            }
                        }
                    }

                    *latest.lock() = Some(sample);
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        let previous = self.streams.lock().replace(Streams { pipeline, analysis });
        if let Some(previous) = previous {
            let _ = previous.pipeline.set_state(gstreamer::State::Null);
        }
        *self.settings.lock() = Some(settings.clone());
        Ok(())
    }

    fn start(&self) -> Result<(), CameraError> {
        let streams = self.streams.lock();
        let streams = streams.as_ref().ok_or_else(|| CameraError::Start {
            details: "Pipeline not configured".to_string(),
        })?;

        streams
            .pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| CameraError::Start {
                details: format!("Failed to start camera pipeline: {}", e),
            })?;

        info!("GStreamer camera pipeline started");
        Ok(())
    }

    fn stop(&self) -> Result<(), CameraError> {
        if let Some(active) = self.segment.lock().take() {
            warn!(
                "Camera stopping with segment {} still open",
                active.path.display()
            );
            let _ = active.appsrc.end_of_stream();
            let _ = active.pipeline.set_state(gstreamer::State::Null);
        }

        if let Some(streams) = self.streams.lock().as_ref() {
            streams
                .pipeline
                .set_state(gstreamer::State::Null)
                .map_err(|e| CameraError::Configuration {
                    details: format!("Failed to stop camera pipeline: {}", e),
                })?;
        }

        info!("GStreamer camera pipeline stopped");
        Ok(())
    }

    fn capture_analysis_frame(&self) -> Result<AnalysisFrame, CameraError> {
        let (analysis, format) = {
            let streams = self.streams.lock();
            let settings = self.settings.lock();
            match (streams.as_ref(), settings.as_ref()) {
                (Some(streams), Some(settings)) => {
                    (streams.analysis.clone(), settings.analysis_format)
                }
                _ => {
                    return Err(CameraError::Capture {
                        details: "Pipeline not configured".to_string(),
                    })
                }
            }
        };

        let sample = analysis
            .try_pull_sample(gstreamer::ClockTime::from_seconds(CAPTURE_TIMEOUT_SECS))
            .ok_or_else(|| CameraError::Capture {
                details: if analysis.is_eos() {
                    "Analysis stream ended".to_string()
                } else {
                    format!("No analysis frame within {}s", CAPTURE_TIMEOUT_SECS)
                },
            })?;

        let (row_format, packed_format) = match format {
            PixelFormat::I420 | PixelFormat::Gray8 => (PixelFormat::Gray8, PixelFormat::Gray8),
            other => (other, other),
        };
        let (width, height, data) = packed_plane(&sample, |width| {
            row_format.frame_size(width, 1)
        })
        .map_err(|details| CameraError::Capture { details })?;

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        trace!("Analysis frame {} ({}x{})", sequence, width, height);
        AnalysisFrame::from_raw(
            sequence,
            Instant::now(),
            width,
            height,
            packed_format,
            &data,
        )
    }

    fn capture_still(&self, path: &Path) -> Result<(), CameraError> {
        let sample = self
            .latest_main
            .lock()
            .clone()
            .ok_or_else(|| CameraError::Still {
                path: path.to_path_buf(),
                details: "No full-resolution frame available yet".to_string(),
            })?;

        let (width, height, data) = packed_plane(&sample, |width| width as usize * 3)
            .map_err(|details| CameraError::Still {
                path: path.to_path_buf(),
                details,
            })?;

        let image =
            image::RgbImage::from_raw(width, height, data).ok_or_else(|| CameraError::Still {
                path: path.to_path_buf(),
                details: "Frame does not match its dimensions".to_string(),
            })?;

        image.save(path).map_err(|e| CameraError::Still {
            path: path.to_path_buf(),
            details: e.to_string(),
        })?;

        debug!("Still written to {}", path.display());
        Ok(())
    }

    fn start_segment(
        &self,
        path: &Path,
        segment: &SegmentSettings,
    ) -> Result<SegmentHandle, EncoderError> {
        if let Some(active) = self.segment.lock().as_ref() {
            return Err(EncoderError::Busy {
                path: active.path.clone(),
            });
        }

        let settings = self
            .settings
            .lock()
            .clone()
            .ok_or_else(|| EncoderError::Start {
                path: path.to_path_buf(),
                details: "Camera not configured".to_string(),
            })?;

        let start_error = |details: String| EncoderError::Start {
            path: path.to_path_buf(),
            details,
        };

        let pipeline_desc = self.build_encoder_string(&settings, segment);
        debug!("Encoder pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| start_error(format!("Failed to create encoder pipeline: {}", e)))?
            .downcast::<Pipeline>()
            .map_err(|_| start_error("Failed to downcast to Pipeline".to_string()))?;

        let appsrc: AppSrc = Self::element(&pipeline, "src")
            .ok_or_else(|| start_error("Failed to get appsrc element".to_string()))?;
        let filesink = pipeline
            .by_name("sink")
            .ok_or_else(|| start_error("Failed to get filesink element".to_string()))?;
        filesink.set_property("location", path.to_string_lossy().to_string());

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| start_error(format!("Failed to start encoder: {}", e)))?;

        let id = self.next_segment_id.fetch_add(1, Ordering::Relaxed);
        *self.segment.lock() = Some(ActiveSegment {
            id,
            path: path.to_path_buf(),
            pipeline,
            appsrc,
        });

        info!("Encoding segment {} to {}", id, path.display());
        Ok(SegmentHandle::new(id, path.to_path_buf()))
    }

    fn stop_segment(&self, handle: SegmentHandle) -> Result<PathBuf, EncoderError> {
        let active = {
            let mut segment = self.segment.lock();
            match segment.take() {
                Some(active) if active.id == handle.id => active,
                other => {
                    *segment = other;
                    return Err(EncoderError::Stop {
                        path: handle.path,
                        details: "Segment is not open".to_string(),
                    });
                }
            }
        };

        let stop_error = |details: String| EncoderError::Stop {
            path: active.path.clone(),
            details,
        };

        if let Err(e) = active.appsrc.end_of_stream() {
            let _ = active.pipeline.set_state(gstreamer::State::Null);
            return Err(stop_error(format!("Failed to signal EOS: {:?}", e)));
        }

        let mut failure = None;
        if let Some(bus) = active.pipeline.bus() {
            for msg in bus.iter_timed(gstreamer::ClockTime::from_seconds(EOS_TIMEOUT_SECS)) {
                match msg.view() {
                    gstreamer::MessageView::Eos(..) => break,
                    gstreamer::MessageView::Error(err) => {
                        failure = Some(format!(
                            "{} ({})",
                            err.error(),
                            err.debug().unwrap_or_default()
                        ));
                        break;
                    }
                    _ => {}
                }
            }
        }

        if let Err(e) = active.pipeline.set_state(gstreamer::State::Null) {
            error!("Failed to tear down encoder pipeline: {}", e);
        }

        match failure {
            Some(details) => Err(stop_error(details)),
            None => {
                info!("Segment {} closed", active.path.display());
                Ok(active.path.clone())
            }
        }
    }
}
