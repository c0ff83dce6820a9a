//! Background writer draining the recording queue into an AAV file.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::aav::{standard_layouts, AavError, AavFileWriter, TagType};
use crate::capture::{CameraConfig, RecordingConfig};
use crate::integration::IntegratedFrame;
use crate::timing::{
    aav_timestamp, exposure_tenths_of_ms, TimestampDecoder, TICKS_PER_MILLISECOND,
};

use super::queue::{QueueError, RecordingQueue};

/// Recorder name written to every file.
pub const RECORDER_NAME: &str = "ASTRO ANALOGUE VIDEO";

/// Errors from the recorder lifecycle.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// The AAV file could not be written.
    #[error("AAV file error: {0}")]
    Aav(#[from] AavError),

    /// The recording queue rejected a frame.
    #[error("recording queue error: {0}")]
    Queue(#[from] QueueError),

    /// The writer thread could not be started.
    #[error("failed to spawn writer thread: {0}")]
    Spawn(std::io::Error),

    /// The writer thread panicked.
    #[error("writer thread panicked")]
    WorkerPanicked,
}

/// Sees every integrated frame before it is written.
///
/// Tracking and timestamp-reading plug-ins attach here.
pub trait FrameObserver: Send + Sync {
    /// Called on the writer thread with each frame before it is written.
    fn observe(&self, frame: &IntegratedFrame);
}

/// Outcome of a finished recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSummary {
    /// File the recording was written to.
    pub path: PathBuf,
    /// Frames sealed into the file.
    pub frames_written: usize,
}

/// Status tag ids defined in every recording.
#[derive(Debug, Clone, Copy)]
struct StatusTags {
    system_time: u16,
    integrated_frames: u16,
    start_frame: u16,
    end_frame: u16,
    integrated_frame_no: u16,
}

/// Defines header tags, image layouts and status tags on a fresh writer.
fn define_recording(
    writer: &mut AavFileWriter,
    camera: &CameraConfig,
    recording: &RecordingConfig,
    user_tags: &[(String, String)],
) -> Result<StatusTags, AavError> {
    writer.add_file_tag("AAVR-SOFTWARE-VERSION", crate::VERSION)?;
    writer.add_file_tag("RECORDER", RECORDER_NAME)?;
    writer.add_file_tag("FSTF-TYPE", "AAV")?;
    writer.add_file_tag("AAV-VERSION", "1")?;
    writer.add_file_tag("CAMERA-MODEL", &camera.model)?;
    writer.add_file_tag("RECORDING-START-UTC", &chrono::Utc::now().to_rfc3339())?;
    for (key, value) in user_tags {
        writer.add_user_tag(key, value)?;
    }

    writer.define_image_section(camera.width, camera.height, 8)?;
    for layout in standard_layouts(recording.key_frame_interval) {
        writer.define_image_layout(layout)?;
    }
    writer.add_image_section_tag("IMAGE-MONOCHROME-MODE", camera.mono_mode.as_str())?;
    let detection = if camera.is_integrating {
        format!(
            "FACTOR={} MIN-DIFFERENCE={}",
            camera.signature_difference_factor, camera.minimum_signature_difference
        )
    } else {
        "DISABLED".to_string()
    };
    writer.add_image_section_tag("INTEGRATION-DETECTION", &detection)?;

    Ok(StatusTags {
        system_time: writer.define_status_tag("SystemTime", TagType::UInt64)?,
        integrated_frames: writer.define_status_tag("IntegratedFrames", TagType::UInt16)?,
        start_frame: writer.define_status_tag("StartFrame", TagType::UInt64)?,
        end_frame: writer.define_status_tag("EndFrame", TagType::UInt64)?,
        integrated_frame_no: writer.define_status_tag("IntegratedFrameNo", TagType::UInt64)?,
    })
}

/// State owned by the writer thread.
struct FrameWriter {
    writer: AavFileWriter,
    tags: StatusTags,
    layout_id: u8,
    decoder: Arc<dyn TimestampDecoder>,
    first_start_ticks: Option<i64>,
}

impl FrameWriter {
    fn write(&mut self, frame: &IntegratedFrame) -> Result<(), AavError> {
        let first = *self.first_start_ticks.get_or_insert(frame.start_ticks);
        let elapsed_ms = ((frame.end_ticks - first) / TICKS_PER_MILLISECOND)
            .clamp(0, i64::from(u32::MAX)) as u32;
        let mid = frame.mid_ticks();
        let timestamp = aav_timestamp(mid, self.decoder.decode_time(mid));
        let exposure = exposure_tenths_of_ms(frame.start_ticks, frame.end_ticks);

        self.writer.begin_frame(timestamp, elapsed_ms, exposure)?;
        let result = self.write_body(frame, mid);
        if result.is_err() {
            self.writer.discard_frame();
            return result;
        }
        self.writer.end_frame()
    }

    fn write_body(&mut self, frame: &IntegratedFrame, mid_ticks: i64) -> Result<(), AavError> {
        let w = &mut self.writer;
        w.add_image(self.layout_id, frame.pixels())?;
        w.add_status_tag_u64(self.tags.system_time, mid_ticks.max(0) as u64)?;
        w.add_status_tag_u16(
            self.tags.integrated_frames,
            frame.frame_count.min(u32::from(u16::MAX)) as u16,
        )?;
        w.add_status_tag_u64(self.tags.start_frame, frame.start_frame)?;
        w.add_status_tag_u64(self.tags.end_frame, frame.end_frame)?;
        w.add_status_tag_u64(self.tags.integrated_frame_no, frame.frame_number)?;
        Ok(())
    }
}

/// Everything the writer thread needs besides the queue.
pub struct RecorderSettings<'a> {
    /// Camera geometry and mono mode.
    pub camera: &'a CameraConfig,
    /// Layout, key frame and queue settings.
    pub recording: &'a RecordingConfig,
    /// Extra header tags.
    pub user_tags: &'a [(String, String)],
    /// Turns mid-exposure ticks into a time of day.
    pub decoder: Arc<dyn TimestampDecoder>,
    /// Sees each frame before it is written.
    pub observer: Option<Arc<dyn FrameObserver>>,
}

/// A running recording: the writer thread plus its file.
pub struct RecorderWorker {
    path: PathBuf,
    queue: Arc<RecordingQueue>,
    handle: Option<JoinHandle<Result<RecordingSummary, RecorderError>>>,
    frames_written: Arc<AtomicU64>,
}

impl RecorderWorker {
    /// Creates the file, writes its definitions, clears the queue and
    /// starts the writer thread.
    pub fn start(
        path: impl AsRef<Path>,
        settings: RecorderSettings<'_>,
        queue: Arc<RecordingQueue>,
    ) -> Result<Self, RecorderError> {
        let path = path.as_ref().to_path_buf();
        let mut writer = AavFileWriter::create(&path)?;
        let tags = define_recording(
            &mut writer,
            settings.camera,
            settings.recording,
            settings.user_tags,
        )?;

        let dropped = queue.reset();
        if dropped > 0 {
            warn!(dropped, "Discarded stale frames from recording queue");
        }

        let frames_written = Arc::new(AtomicU64::new(0));
        let mut state = FrameWriter {
            writer,
            tags,
            layout_id: settings.recording.image_layout.layout_id(),
            decoder: settings.decoder,
            first_start_ticks: None,
        };
        let observer = settings.observer;
        let thread_queue = Arc::clone(&queue);
        let counter = Arc::clone(&frames_written);

        let handle = std::thread::Builder::new()
            .name("aav-writer".to_string())
            .spawn(move || {
                while let Some(frame) = thread_queue.pop_blocking() {
                    if let Some(observer) = &observer {
                        observer.observe(&frame);
                    }
                    if let Err(e) = state.write(&frame) {
                        thread_queue.close();
                        let dropped = thread_queue.clear() + 1;
                        error!(
                            error = %e,
                            frame = frame.frame_number,
                            dropped,
                            "Failed to write frame, stopping recording"
                        );
                        if let Err(seal) = state.writer.finish() {
                            error!(error = %seal, "Failed to seal AAV file");
                        }
                        return Err(RecorderError::Aav(e));
                    }
                    counter.fetch_add(1, Ordering::Relaxed);
                    debug!(frame = frame.frame_number, "Frame written");
                }

                let path = state.writer.path().to_path_buf();
                let frames_written = state.writer.finish()?;
                Ok(RecordingSummary {
                    path,
                    frames_written,
                })
            })
            .map_err(RecorderError::Spawn)?;

        info!(path = %path.display(), "Recording started");
        Ok(Self {
            path,
            queue,
            handle: Some(handle),
            frames_written,
        })
    }

    /// File being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frames written so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written.load(Ordering::Relaxed)
    }

    /// Stops accepting frames, waits for the writer to drain the queue and
    /// seal the file.
    pub fn stop(mut self) -> Result<RecordingSummary, RecorderError> {
        self.queue.close();
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => return Err(RecorderError::WorkerPanicked),
        };
        let summary = handle.join().map_err(|_| RecorderError::WorkerPanicked)??;
        info!(
            path = %summary.path.display(),
            frames = summary.frames_written,
            "Recording stopped"
        );
        Ok(summary)
    }
}

impl Drop for RecorderWorker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.queue.close();
            if handle.join().is_err() {
                error!(path = %self.path.display(), "Writer thread panicked during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aav::{AavFileReader, StatusValue};
    use crate::timing::{ClockTimestampDecoder, TICKS_PER_SECOND};
    use parking_lot::Mutex;
    use tempfile::tempdir;

    fn frame(number: u64, start_ticks: i64, end_ticks: i64, value: u8) -> IntegratedFrame {
        let mut frame = IntegratedFrame::new(vec![value; 16], 4, 4);
        frame.frame_number = number;
        frame.frame_count = 2;
        frame.start_frame = number * 2 - 1;
        frame.end_frame = number * 2;
        frame.start_ticks = start_ticks;
        frame.end_ticks = end_ticks;
        frame
    }

    fn settings<'a>(
        camera: &'a CameraConfig,
        recording: &'a RecordingConfig,
        observer: Option<Arc<dyn FrameObserver>>,
    ) -> RecorderSettings<'a> {
        RecorderSettings {
            camera,
            recording,
            user_tags: &[],
            decoder: Arc::new(ClockTimestampDecoder),
            observer,
        }
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<u64>>);

    impl FrameObserver for Collect {
        fn observe(&self, frame: &IntegratedFrame) {
            self.0.lock().push(frame.frame_number);
        }
    }

    #[test]
    fn test_drains_queue_before_sealing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rec.aav");
        let camera = CameraConfig {
            model: "WAT-910HX".to_string(),
            ..CameraConfig::with_dimensions(4, 4)
        };
        let recording = RecordingConfig::default();
        let queue = Arc::new(RecordingQueue::new(16));
        let observer = Arc::new(Collect::default());

        let worker = RecorderWorker::start(
            &path,
            settings(&camera, &recording, Some(observer.clone())),
            Arc::clone(&queue),
        )
        .unwrap();

        let base = 63_800_000_000 * TICKS_PER_SECOND;
        let step = 400_000;
        for n in 1..=5u64 {
            let start = base + (n as i64 - 1) * 2 * step;
            queue.push(frame(n, start, start + step, n as u8 * 10)).unwrap();
        }
        let summary = worker.stop().unwrap();

        assert_eq!(summary.frames_written, 5);
        assert_eq!(*observer.0.lock(), vec![1, 2, 3, 4, 5]);

        let mut reader = AavFileReader::open(&path).unwrap();
        assert_eq!(reader.file_tag("RECORDER"), Some(RECORDER_NAME));
        assert_eq!(reader.file_tag("CAMERA-MODEL"), Some("WAT-910HX"));
        assert_eq!(reader.frame_count(), 5);

        let elapsed: Vec<u32> = reader.index().iter().map(|e| e.elapsed_ms).collect();
        assert_eq!(elapsed, vec![40, 120, 200, 280, 360]);

        let frames_tag = reader.status_tag_id("IntegratedFrames").unwrap();
        let number_tag = reader.status_tag_id("IntegratedFrameNo").unwrap();
        let third = reader.read_frame(2).unwrap();
        assert_eq!(third.pixels, vec![30u8; 16]);
        assert_eq!(third.exposure, 400);
        assert_eq!(third.value(frames_tag), Some(&StatusValue::UInt16(2)));
        assert_eq!(third.value(number_tag), Some(&StatusValue::UInt64(3)));
    }

    #[test]
    fn test_existing_file_fails_start() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("taken.aav");
        std::fs::write(&path, b"").unwrap();
        let camera = CameraConfig::with_dimensions(4, 4);
        let recording = RecordingConfig::default();

        let result = RecorderWorker::start(
            &path,
            settings(&camera, &recording, None),
            Arc::new(RecordingQueue::new(4)),
        );
        assert!(matches!(result, Err(RecorderError::Aav(AavError::Io(_)))));
    }

    #[test]
    fn test_bad_frame_stops_writer_and_seals() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.aav");
        let camera = CameraConfig::with_dimensions(4, 4);
        let recording = RecordingConfig::default();
        let queue = Arc::new(RecordingQueue::new(16));
        let worker =
            RecorderWorker::start(&path, settings(&camera, &recording, None), Arc::clone(&queue))
                .unwrap();

        queue.push(frame(1, 0, 400_000, 1)).unwrap();
        let mut wrong = IntegratedFrame::new(vec![0u8; 9], 3, 3);
        wrong.frame_number = 2;
        queue.push(wrong).unwrap();

        assert!(matches!(
            worker.stop(),
            Err(RecorderError::Aav(AavError::InvalidImageSize { .. }))
        ));
        let reader = AavFileReader::open(&path).unwrap();
        assert!(reader.is_sealed());
        assert_eq!(reader.frame_count(), 1);
    }
}
