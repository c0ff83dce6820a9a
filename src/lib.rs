//! AAV Recorder Library
//!
//! Frame integration and recording core for analogue-video occultation
//! timing. Integrating analogue cameras repeat one exposure over several
//! video frames; this crate finds the exposure boundaries, averages each
//! exposure into one integrated frame and records the frames, with their
//! timing, into AAV files.
//!
//! # Architecture
//!
//! The system follows an explicit data flow:
//!
//! ```text
//! capture → analysis → integration → recording → aav
//!              (boundary)  (averaging)   (queue, writer thread)
//! ```
//!
//! A [`Session`] owns the whole pipeline. The capture side calls
//! [`Session::process_frame`] for every video frame; completed frames are
//! handed to a background writer thread while a recording is running.
//!
//! # Design Principles
//!
//! - **No lost frames**: stopping a recording drains every queued frame
//!   before the file is sealed
//! - **Crash tolerant files**: every frame is flushed when written, and
//!   unsealed files can still be read
//! - **Stable display metadata**: exposure status only changes on confirmed
//!   integration boundaries
//!
//! # Example
//!
//! ```no_run
//! use aav_recorder::{
//!     capture::{CameraConfig, FrameSource, MockCamera},
//!     Session,
//! };
//!
//! let config = CameraConfig::with_dimensions(720, 576);
//! let mut camera = MockCamera::new(4);
//! camera.open(&config).unwrap();
//!
//! let session = Session::new();
//! session.configure_camera(config).unwrap();
//! session.start_recording("occultation.aav").unwrap();
//!
//! for _ in 0..100 {
//!     let frame = camera.capture().unwrap();
//!     session.process_frame(frame.pixels(), frame.ticks());
//! }
//!
//! let summary = session.stop_recording().unwrap();
//! println!("{:?}", summary);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod aav;
pub mod analysis;
pub mod capture;
pub mod integration;
pub mod metrics;
pub mod recording;
pub mod session;
pub mod timing;

// Re-export commonly used types at crate root
pub use aav::{AavError, AavFileReader, AavFileWriter, ImageLayoutChoice};
pub use analysis::{DiffSignature, SignatureTracker};
pub use capture::{CameraConfig, FileConfig, FrameSource, MockCamera, RawFrame};
pub use integration::{
    FrameAccumulator, FrameProcessingStatus, ImageStatus, IntegratedFrame, MonochromeMode,
};
pub use recording::{FrameObserver, RecordingQueue, RecordingSummary};
pub use session::{Session, SessionError};
pub use timing::TimestampDecoder;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
