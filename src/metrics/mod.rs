//! Prometheus metrics exporter for recorder monitoring.
//!
//! # Metrics Exposed
//!
//! ## Pipeline Metrics
//! - `aav_recorder_frames_processed_total` - Source video frames processed
//! - `aav_recorder_integrated_frames_total` - Integrated frames produced
//! - `aav_recorder_frames_recorded_total` - Integrated frames written to disk
//!
//! ## Recording Metrics
//! - `aav_recorder_queue_depth` - Frames waiting for the writer thread
//! - `aav_recorder_recording` - Recording state (1=recording, 0=idle)
//!
//! ## Integration Detection Metrics
//! - `aav_recorder_diff_signature` - Latest frame difference signature
//! - `aav_recorder_cutoff_ratio` - Cut-off ratio at the last boundary
//! - `aav_recorder_integration_locked` - Integration lock state
//!
//! The HTTP exporter (`/metrics`, `/health`) needs the `metrics` feature.
//!
//! # Example
//!
//! ```no_run
//! use aav_recorder::metrics::MetricsRegistry;
//! use aav_recorder::Session;
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//! let session = Session::new();
//!
//! registry.update(&session.metrics_snapshot());
//! println!("{}", registry.encode().unwrap());
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, MetricsState, ServerError};
