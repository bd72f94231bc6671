//! Running-best bookkeeping and the convergence score.

use bo_types::ConvergenceDiagnostics;

/// Observations required before a non-zero score is reported.
pub const MIN_OBSERVATIONS: usize = 5;

/// Means and deviations below this are treated as zero.
const EPSILON: f64 = 1e-12;

/// Tracks successful objective values (oriented so larger is better).
#[derive(Debug, Clone)]
pub struct ConvergenceTracker {
    window: usize,
    min_improvement: f64,
    values: Vec<f64>,
    best_so_far: Vec<f64>,
}

impl ConvergenceTracker {
    pub fn new(window: usize, min_improvement: f64) -> Self {
        Self {
            window: window.max(1),
            min_improvement,
            values: Vec::new(),
            best_so_far: Vec::new(),
        }
    }

    pub fn observe(&mut self, value: f64) {
        let best = match self.best_so_far.last() {
            Some(&b) if b >= value => b,
            _ => value,
        };
        self.values.push(value);
        self.best_so_far.push(best);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn best(&self) -> Option<f64> {
        self.best_so_far.last().copied()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Fraction of the last window of best-so-far steps that improved by
    /// more than `min_improvement`. 1.0 until two values are known.
    pub fn improvement_rate(&self) -> f64 {
        let n = self.best_so_far.len();
        if n < 2 {
            return 1.0;
        }
        let start = n.saturating_sub(self.window + 1);
        let recent = &self.best_so_far[start..];
        let steps = recent.len() - 1;
        let improved = recent
            .windows(2)
            .filter(|w| w[1] - w[0] > self.min_improvement)
            .count();
        improved as f64 / steps as f64
    }

    /// `1 - |coefficient of variation|` of the last window of values,
    /// clamped to `[0, 1]`.
    pub fn stability(&self) -> f64 {
        let n = self.values.len();
        if n == 0 {
            return 0.0;
        }
        let recent = &self.values[n.saturating_sub(self.window)..];
        let len = recent.len() as f64;
        let mean = recent.iter().sum::<f64>() / len;
        let std = (recent.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / len).sqrt();

        if mean.abs() < EPSILON {
            return if std < EPSILON { 1.0 } else { 0.0 };
        }
        (1.0 - std / mean.abs()).clamp(0.0, 1.0)
    }

    /// `(stability + (1 - improvement_rate)) / 2`; 0 with fewer than
    /// [`MIN_OBSERVATIONS`] values.
    pub fn score(&self) -> f64 {
        if self.values.len() < MIN_OBSERVATIONS {
            return 0.0;
        }
        ((self.stability() + (1.0 - self.improvement_rate())) / 2.0).clamp(0.0, 1.0)
    }

    pub fn diagnostics(&self, diversity: f64) -> ConvergenceDiagnostics {
        ConvergenceDiagnostics {
            score: self.score(),
            stability: self.stability(),
            improvement_rate: self.improvement_rate(),
            observations: self.len(),
            window: self.window,
            diversity,
        }
    }

    pub fn reset(&mut self) {
        self.values.clear();
        self.best_so_far.clear();
    }
}
