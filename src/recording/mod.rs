//! Hand-off of integrated frames from the capture path to disk.
//!
//! The capture thread pushes finished frames into a [`RecordingQueue`];
//! a [`RecorderWorker`] thread drains it into an AAV file until stopped.

mod queue;
mod worker;

pub use queue::{QueueError, RecordingQueue, DEFAULT_QUEUE_CAPACITY};
pub use worker::{
    FrameObserver, RecorderError, RecorderSettings, RecorderWorker, RecordingSummary,
    RECORDER_NAME,
};
