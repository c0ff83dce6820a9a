//! Frame integration.
//!
//! Combines consecutive video frames of one camera exposure into a single
//! integrated frame and keeps the exposure timing that goes with it.

mod accumulator;
mod frame;

pub use accumulator::{FrameAccumulator, FrameOutcome, MonochromeMode};
pub use frame::{FrameProcessingStatus, ImageStatus, IntegratedFrame};
