//! Integration period boundary detection.
//!
//! Keeps the signatures seen since the last boundary and flags a new
//! integration period when a signature departs from their running mean
//! by more than both an absolute floor and a multiple of their spread.

/// Maximum signatures kept for one integration period.
pub const MAX_INTEGRATION: usize = 256;

/// Detector tuning.
#[derive(Debug, Clone, Copy)]
pub struct IntegrationThresholds {
    /// Whether the camera integrates at all. When false every frame is
    /// its own period.
    pub is_integrating: bool,
    /// Multiple of the running sigma a difference must exceed.
    pub difference_factor: f32,
    /// Absolute difference floor.
    pub minimum_difference: f32,
}

/// Rolling statistics of the current integration period.
pub struct SignatureTracker {
    thresholds: IntegrationThresholds,
    history: Vec<f32>,
    sum: f32,
    mean: f32,
    residual_square_sum: f32,
    sigma: f32,
    cutoff_ratio: f32,
    current_ratio: f32,
}

impl SignatureTracker {
    /// Creates an empty tracker.
    pub fn new(thresholds: IntegrationThresholds) -> Self {
        Self {
            thresholds,
            history: Vec::with_capacity(MAX_INTEGRATION),
            sum: 0.0,
            mean: 0.0,
            residual_square_sum: 0.0,
            sigma: 0.0,
            cutoff_ratio: 0.0,
            current_ratio: 0.0,
        }
    }

    /// Classifies the next frame's signature.
    ///
    /// Returns true when the frame starts a new integration period. Must be
    /// called once per captured frame, in arrival order.
    pub fn evaluate(&mut self, signature: f32) -> bool {
        if !self.thresholds.is_integrating {
            return true;
        }

        let count = self.history.len();
        let diff = (self.mean - signature).abs();
        let threshold = self.thresholds.difference_factor * self.sigma;

        let is_new_period = count >= MAX_INTEGRATION
            || (count > 1 && diff > self.thresholds.minimum_difference && diff > threshold);

        self.current_ratio = if count > 1 && count < MAX_INTEGRATION {
            ratio(diff, threshold)
        } else {
            0.0
        };

        tracing::trace!(
            count,
            signature,
            diff,
            threshold,
            mean = self.mean,
            sigma = self.sigma,
            is_new_period,
            "Evaluated diff signature"
        );

        if is_new_period {
            self.cutoff_ratio = ratio(diff, threshold);
            self.reset();
            return true;
        }

        self.history.push(signature);
        self.sum += signature;
        let n = self.history.len() as f32;
        self.mean = self.sum / n;
        let mean = self.mean;
        self.residual_square_sum = self.history.iter().map(|s| (mean - s).powi(2)).sum();
        self.sigma = self.residual_square_sum.sqrt() / n;

        false
    }

    /// Clears the running statistics of the current period.
    pub fn reset(&mut self) {
        self.history.clear();
        self.sum = 0.0;
        self.mean = 0.0;
        self.residual_square_sum = 0.0;
        self.sigma = 0.0;
    }

    /// Ratio recorded at the most recent boundary.
    pub fn cutoff_ratio(&self) -> f32 {
        self.cutoff_ratio
    }

    /// Ratio of the most recent evaluation.
    pub fn current_ratio(&self) -> f32 {
        self.current_ratio
    }

    /// Signatures held for the current period.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Returns true if no signature is held.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Running mean of the current period.
    pub fn mean(&self) -> f32 {
        self.mean
    }

    /// Running sigma of the current period.
    pub fn sigma(&self) -> f32 {
        self.sigma
    }
}

/// `diff / threshold`, or 0 when the threshold is 0.
fn ratio(diff: f32, threshold: f32) -> f32 {
    if threshold == 0.0 {
        0.0
    } else {
        diff / threshold
    }
}
