//! The recorder session: one owned context for the whole capture pipeline.
//!
//! A [`Session`] holds the camera configuration, the frame accumulator and
//! the recorder. Capture drivers call [`Session::process_frame`] once per
//! video frame; display code reads snapshots through
//! [`Session::get_current_image`] and [`Session::get_current_image_status`]
//! from any thread.

use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::capture::{CameraConfig, ConfigError, RecordingConfig};
use crate::integration::{FrameAccumulator, FrameProcessingStatus, ImageStatus};
use crate::metrics::MetricsSnapshot;
use crate::recording::{
    FrameObserver, QueueError, RecorderError, RecorderSettings, RecorderWorker, RecordingQueue,
    RecordingSummary,
};
use crate::timing::{ClockTimestampDecoder, TimestampDecoder};

/// Errors returned by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The camera configuration is invalid.
    #[error("invalid camera configuration: {0}")]
    Configuration(#[from] ConfigError),

    /// The camera cannot be reconfigured while recording.
    #[error("cannot reconfigure the camera while recording")]
    ReconfigureWhileRecording,

    /// No camera configuration has been set.
    #[error("camera is not configured")]
    NotConfigured,

    /// A recording is already running.
    #[error("a recording is already in progress")]
    AlreadyRecording,

    /// Starting, running or sealing the recording failed.
    #[error(transparent)]
    Recorder(#[from] RecorderError),
}

/// Capture-side state, replaced wholesale on reconfiguration.
struct CaptureState {
    config: CameraConfig,
    accumulator: FrameAccumulator,
    last_status: FrameProcessingStatus,
}

/// The recorder context.
pub struct Session {
    capture: Mutex<Option<CaptureState>>,
    recorder: Mutex<Option<RecorderWorker>>,
    queue: Arc<RecordingQueue>,
    recording_config: RecordingConfig,
    decoder: Arc<dyn TimestampDecoder>,
    observer: Option<Arc<dyn FrameObserver>>,
    user_tags: Vec<(String, String)>,

    recording: AtomicBool,
    locked: AtomicBool,
    overflowed: AtomicBool,

    frames_processed: AtomicU64,
    integrated_frames: AtomicU64,
    frames_recorded: AtomicU64,
}

impl Default for Session {
    fn default() -> Self {
        Self::with_recording_config(RecordingConfig::default())
    }
}

impl Session {
    /// Creates an unconfigured session with default recording settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an unconfigured session.
    pub fn with_recording_config(recording_config: RecordingConfig) -> Self {
        Self {
            capture: Mutex::new(None),
            recorder: Mutex::new(None),
            queue: Arc::new(RecordingQueue::new(recording_config.queue_capacity)),
            recording_config,
            decoder: Arc::new(ClockTimestampDecoder),
            observer: None,
            user_tags: Vec::new(),
            recording: AtomicBool::new(false),
            locked: AtomicBool::new(false),
            overflowed: AtomicBool::new(false),
            frames_processed: AtomicU64::new(0),
            integrated_frames: AtomicU64::new(0),
            frames_recorded: AtomicU64::new(0),
        }
    }

    /// Replaces the time-of-day decoder used for frame timestamps.
    pub fn with_timestamp_decoder(mut self, decoder: Arc<dyn TimestampDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Attaches an observer that sees every recorded frame.
    pub fn with_frame_observer(mut self, observer: Arc<dyn FrameObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Adds a user tag to every recording started by this session.
    pub fn with_user_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_tags.push((key.into(), value.into()));
        self
    }

    /// (Re)initializes the camera and resets all derived buffers.
    pub fn configure_camera(&self, config: CameraConfig) -> Result<(), SessionError> {
        let recorder = self.recorder.lock();
        if recorder.is_some() {
            return Err(SessionError::ReconfigureWhileRecording);
        }
        config.validate()?;

        let mut accumulator = FrameAccumulator::new(&config);
        accumulator.lock_integration(self.locked.load(Ordering::SeqCst));

        info!(
            width = config.width,
            height = config.height,
            model = %config.model,
            mono_mode = config.mono_mode.as_str(),
            integrating = config.is_integrating,
            "Camera configured"
        );
        *self.capture.lock() = Some(CaptureState {
            config,
            accumulator,
            last_status: FrameProcessingStatus::default(),
        });
        Ok(())
    }

    /// Feeds one 24-bit bottom-up frame captured at `ticks`.
    ///
    /// Always returns telemetry. A frame that cannot be processed (no
    /// camera configured or a buffer of the wrong size) is logged and
    /// yields default telemetry.
    pub fn process_frame(&self, pixels: &[u8], ticks: i64) -> FrameProcessingStatus {
        let mut capture = self.capture.lock();
        let Some(state) = capture.as_mut() else {
            error!("Frame received before the camera was configured");
            return FrameProcessingStatus::default();
        };
        if pixels.len() != state.config.source_len() {
            error!(
                expected = state.config.source_len(),
                actual = pixels.len(),
                "Frame buffer size does not match camera configuration"
            );
            return FrameProcessingStatus::default();
        }

        let outcome = state.accumulator.add_frame(pixels, ticks);
        state.last_status = outcome.status;
        self.frames_processed.fetch_add(1, Ordering::Relaxed);

        if let Some(frame) = outcome.frame {
            self.integrated_frames.fetch_add(1, Ordering::Relaxed);
            if self.recording.load(Ordering::SeqCst) {
                match self.queue.push(frame) {
                    Ok(depth) => trace!(depth, "Integrated frame queued"),
                    Err(QueueError::CapacityExceeded { capacity }) => {
                        error!(capacity, "Recording queue overflow, aborting recording");
                        self.overflowed.store(true, Ordering::SeqCst);
                        self.recording.store(false, Ordering::SeqCst);
                        self.queue.close();
                    }
                    Err(QueueError::Closed) => {
                        warn!("Writer has stopped, integrated frame not recorded");
                        self.recording.store(false, Ordering::SeqCst);
                    }
                }
            }
        }

        outcome.status
    }

    /// Latest integrated image, with the configured display flips.
    ///
    /// Empty when no camera is configured.
    pub fn get_current_image(&self) -> Vec<u8> {
        self.capture.lock().as_ref().map_or_else(Vec::new, |state| {
            state
                .accumulator
                .oriented_preview(state.config.flip_horizontal, state.config.flip_vertical)
        })
    }

    /// Exposure metadata of the last confirmed integration period.
    pub fn get_current_image_status(&self) -> ImageStatus {
        self.capture
            .lock()
            .as_ref()
            .map(|state| state.accumulator.image_status())
            .unwrap_or_default()
    }

    /// Starts recording integrated frames into a new file at `path`.
    pub fn start_recording(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let mut recorder = self.recorder.lock();
        if recorder.is_some() {
            return Err(SessionError::AlreadyRecording);
        }
        let camera = self
            .capture
            .lock()
            .as_ref()
            .map(|state| state.config.clone())
            .ok_or(SessionError::NotConfigured)?;

        let worker = RecorderWorker::start(
            path,
            RecorderSettings {
                camera: &camera,
                recording: &self.recording_config,
                user_tags: &self.user_tags,
                decoder: Arc::clone(&self.decoder),
                observer: self.observer.clone(),
            },
            Arc::clone(&self.queue),
        )?;

        self.overflowed.store(false, Ordering::SeqCst);
        *recorder = Some(worker);
        self.recording.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stops recording and blocks until every queued frame is written and
    /// the file is sealed.
    ///
    /// Returns `Ok(None)` when no recording is in progress.
    pub fn stop_recording(&self) -> Result<Option<RecordingSummary>, SessionError> {
        let mut recorder = self.recorder.lock();
        let Some(worker) = recorder.take() else {
            debug!("Stop requested while not recording");
            return Ok(None);
        };

        self.recording.store(false, Ordering::SeqCst);
        let result = worker.stop();
        if let Ok(summary) = &result {
            self.frames_recorded
                .fetch_add(summary.frames_written as u64, Ordering::Relaxed);
        }
        let summary = result?;

        if self.overflowed.swap(false, Ordering::SeqCst) {
            return Err(SessionError::Recorder(RecorderError::Queue(
                QueueError::CapacityExceeded {
                    capacity: self.queue.capacity(),
                },
            )));
        }
        Ok(Some(summary))
    }

    /// Locks or unlocks integration.
    pub fn lock_integration(&self, lock: bool) {
        self.locked.store(lock, Ordering::SeqCst);
        if let Some(state) = self.capture.lock().as_mut() {
            state.accumulator.lock_integration(lock);
        }
    }

    /// True while integration is locked.
    pub fn is_integration_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    /// True while integrated frames are being handed to a recorder.
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Current camera configuration, if any.
    pub fn camera_config(&self) -> Option<CameraConfig> {
        self.capture.lock().as_ref().map(|state| state.config.clone())
    }

    /// Collects the telemetry exported as metrics.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        let (last_signature, cutoff_ratio) = self
            .capture
            .lock()
            .as_ref()
            .map(|state| {
                (
                    state.last_status.frame_diff_signature,
                    state.accumulator.image_status().cutoff_ratio,
                )
            })
            .unwrap_or((0.0, 0.0));
        let in_progress = self
            .recorder
            .try_lock()
            .and_then(|r| r.as_ref().map(RecorderWorker::frames_written))
            .unwrap_or(0);

        MetricsSnapshot {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            integrated_frames: self.integrated_frames.load(Ordering::Relaxed),
            frames_recorded: self.frames_recorded.load(Ordering::Relaxed) + in_progress,
            queue_depth: self.queue.len(),
            last_signature,
            cutoff_ratio,
            integration_locked: self.is_integration_locked(),
            recording: self.is_recording(),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.stop_recording() {
            error!(error = %e, "Failed to stop recording while dropping session");
        }
    }
}
