use super::ScalarFilter;
use crate::{Error, Result};
use std::collections::VecDeque;

/// Weighted average over the last `weights.len()` samples.
///
/// Weights are listed oldest first. While the history is shorter than the
/// weight list, the newest weights are used (right-aligned) and
/// renormalised to sum to one.
pub struct WeightedAverageFilter {
    weights: Vec<f64>,
    history: VecDeque<f64>,
}

impl WeightedAverageFilter {
    /// Create a filter; weights must be non-empty, finite and positive
    pub fn new(weights: Vec<f64>) -> Result<Self> {
        if weights.is_empty() || weights.iter().any(|w| !w.is_finite() || *w <= 0.0) {
            return Err(Error::FilterError(
                "Weights must be non-empty, finite and positive".to_string(),
            ));
        }
        Ok(Self {
            history: VecDeque::with_capacity(weights.len()),
            weights,
        })
    }

    /// Samples currently held
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Whether no sample is held
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

impl ScalarFilter for WeightedAverageFilter {
    fn apply(&mut self, value: f64) -> f64 {
        if self.history.len() >= self.weights.len() {
            self.history.pop_front();
        }
        self.history.push_back(value);

        let active = &self.weights[self.weights.len() - self.history.len()..];
        let total: f64 = active.iter().sum();
        self.history
            .iter()
            .zip(active)
            .map(|(sample, weight)| sample * weight)
            .sum::<f64>()
            / total
    }

    fn reset(&mut self) {
        self.history.clear();
    }

    fn name(&self) -> &str {
        "WeightedAverageFilter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_filter() -> WeightedAverageFilter {
        WeightedAverageFilter::new(vec![0.1, 0.15, 0.2, 0.25, 0.3]).unwrap()
    }

    #[test]
    fn test_first_sample_passes_through() {
        let mut filter = default_filter();
        assert!((filter.apply(10.0) - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_right_aligned_weights() {
        let mut filter = default_filter();
        filter.apply(10.0);
        // Weights 0.25 and 0.3 renormalised
        let expected = (10.0 * 0.25 + 11.0 * 0.3) / 0.55;
        assert!((filter.apply(11.0) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut filter = default_filter();
        for _ in 0..5 {
            filter.apply(100.0);
        }
        for _ in 0..5 {
            filter.apply(9.0);
        }
        assert_eq!(filter.len(), 5);
        assert!((filter.apply(9.0) - 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_recent_samples_dominate() {
        let mut filter = default_filter();
        for value in [10.0, 10.0, 10.0, 10.0] {
            filter.apply(value);
        }
        let out = filter.apply(12.0);
        // 0.3 of the step, nothing more
        assert!((out - 10.6).abs() < 1e-12);
    }

    #[test]
    fn test_reset_and_validation() {
        let mut filter = default_filter();
        filter.apply(3.0);
        filter.reset();
        assert!(filter.is_empty());
        assert!(WeightedAverageFilter::new(vec![]).is_err());
        assert!(WeightedAverageFilter::new(vec![0.5, -0.1]).is_err());
    }
}
