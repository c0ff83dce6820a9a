//! Metrics collection and registry.

use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// The Prometheus registry rejected a metric.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of recorder state for metrics update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    /// Source video frames processed since the session was created.
    pub frames_processed: u64,
    /// Integrated frames produced by the accumulator.
    pub integrated_frames: u64,
    /// Integrated frames written to recordings.
    pub frames_recorded: u64,
    /// Frames waiting for the writer.
    pub queue_depth: usize,
    /// Diff signature of the latest frame.
    pub last_signature: f32,
    /// Cut-off ratio of the last confirmed integration boundary.
    pub cutoff_ratio: f32,
    /// Whether integration is locked.
    pub integration_locked: bool,
    /// Whether a recording is in progress.
    pub recording: bool,
}

/// Prometheus metrics registry for recorder monitoring.
pub struct MetricsRegistry {
    registry: Registry,

    // Pipeline counters
    frames_processed_total: IntCounter,
    integrated_frames_total: IntCounter,
    frames_recorded_total: IntCounter,

    // Recording state
    queue_depth: IntGauge,
    recording: IntGauge,

    // Integration detection
    last_signature: Gauge,
    cutoff_ratio: Gauge,
    integration_locked: IntGauge,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all recorder metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let frames_processed_total = IntCounter::new(
            "aav_recorder_frames_processed_total",
            "Total source video frames processed",
        )?;
        let integrated_frames_total = IntCounter::new(
            "aav_recorder_integrated_frames_total",
            "Total integrated frames produced",
        )?;
        let frames_recorded_total = IntCounter::new(
            "aav_recorder_frames_recorded_total",
            "Total integrated frames written to AAV files",
        )?;

        let queue_depth = IntGauge::new(
            "aav_recorder_queue_depth",
            "Integrated frames waiting for the writer thread",
        )?;
        let recording = IntGauge::new(
            "aav_recorder_recording",
            "Recording state (1=recording, 0=idle)",
        )?;

        let last_signature = Gauge::new(
            "aav_recorder_diff_signature",
            "Frame difference signature of the latest frame",
        )?;
        let cutoff_ratio = Gauge::new(
            "aav_recorder_cutoff_ratio",
            "Signature cut-off ratio at the last integration boundary",
        )?;
        let integration_locked = IntGauge::new(
            "aav_recorder_integration_locked",
            "Integration lock state (1=locked, 0=automatic)",
        )?;

        registry.register(Box::new(frames_processed_total.clone()))?;
        registry.register(Box::new(integrated_frames_total.clone()))?;
        registry.register(Box::new(frames_recorded_total.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(recording.clone()))?;
        registry.register(Box::new(last_signature.clone()))?;
        registry.register(Box::new(cutoff_ratio.clone()))?;
        registry.register(Box::new(integration_locked.clone()))?;

        Ok(Self {
            registry,
            frames_processed_total,
            integrated_frames_total,
            frames_recorded_total,
            queue_depth,
            recording,
            last_signature,
            cutoff_ratio,
            integration_locked,
        })
    }

    /// Updates all metrics from a snapshot of recorder state.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        // Counters only move forward, so increment by the difference
        advance(&self.frames_processed_total, snapshot.frames_processed);
        advance(&self.integrated_frames_total, snapshot.integrated_frames);
        advance(&self.frames_recorded_total, snapshot.frames_recorded);

        self.queue_depth.set(snapshot.queue_depth as i64);
        self.recording.set(i64::from(snapshot.recording));

        self.last_signature.set(f64::from(snapshot.last_signature));
        self.cutoff_ratio.set(f64::from(snapshot.cutoff_ratio));
        self.integration_locked
            .set(i64::from(snapshot.integration_locked));
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        let registry = MetricsRegistry::new();
        assert!(registry.is_ok());
    }

    #[test]
    fn test_metrics_update() {
        let registry = MetricsRegistry::new().unwrap();

        let snapshot = MetricsSnapshot {
            frames_processed: 50,
            integrated_frames: 12,
            frames_recorded: 10,
            queue_depth: 2,
            last_signature: 1.5,
            cutoff_ratio: 4.0,
            integration_locked: false,
            recording: true,
        };

        registry.update(&snapshot);

        let output = registry.encode().unwrap();
        assert!(output.contains("aav_recorder_frames_processed_total 50"));
        assert!(output.contains("aav_recorder_frames_recorded_total 10"));
        assert!(output.contains("aav_recorder_queue_depth 2"));
        assert!(output.contains("aav_recorder_recording 1"));
    }

    #[test]
    fn test_counters_never_decrease() {
        let registry = MetricsRegistry::new().unwrap();
        registry.update(&MetricsSnapshot {
            frames_processed: 30,
            ..Default::default()
        });
        registry.update(&MetricsSnapshot {
            frames_processed: 10,
            ..Default::default()
        });

        let output = registry.encode().unwrap();
        assert!(output.contains("aav_recorder_frames_processed_total 30"));
    }

    #[test]
    fn test_metrics_encode() {
        let registry = MetricsRegistry::new().unwrap();
        let output = registry.encode().unwrap();

        assert!(output.contains("aav_recorder_integrated_frames_total"));
        assert!(output.contains("aav_recorder_cutoff_ratio"));
        assert!(output.contains("aav_recorder_integration_locked"));
    }
}
