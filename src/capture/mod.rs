//! Camera input and frame handling.
//!
//! This module provides the frame source abstraction, the raw frame type
//! handed over by capture drivers, and the camera and recorder
//! configuration.

mod camera;
mod config;
mod frame;

pub use camera::{CameraError, FrameSource, MockCamera};
pub use config::{CameraConfig, ConfigError, FileConfig, MetricsConfig, RecordingConfig};
pub use frame::RawFrame;
