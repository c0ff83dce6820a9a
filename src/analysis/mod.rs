//! Integration period detection.
//!
//! Analogue integrating cameras repeat the same exposure across several
//! video frames. This module turns each frame into a difference signature
//! and decides from the signature history where one exposure ends and the
//! next begins.

mod signature;
mod tracker;

pub use signature::{DiffSignature, SIGNATURE_WINDOW};
pub use tracker::{IntegrationThresholds, SignatureTracker, MAX_INTEGRATION};
