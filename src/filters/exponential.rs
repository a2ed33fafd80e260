use super::ScalarFilter;

/// Exponential smoothing filter
pub struct ExponentialFilter {
    alpha: f64,
    last: Option<f64>,
}

impl ExponentialFilter {
    pub fn new(alpha: f64) -> Self {
        assert!(alpha > 0.0 && alpha <= 1.0, "Alpha must be in (0, 1]");
        Self { alpha, last: None }
    }
}

impl ScalarFilter for ExponentialFilter {
    fn apply(&mut self, value: f64) -> f64 {
        let filtered = match self.last {
            Some(last) => self.alpha * value + (1.0 - self.alpha) * last,
            None => value,
        };

        self.last = Some(filtered);
        filtered
    }

    fn reset(&mut self) {
        self.last = None;
    }

    fn name(&self) -> &str {
        "ExponentialFilter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_filter() {
        let mut filter = ExponentialFilter::new(0.5);

        // First value passes through
        assert_eq!(filter.apply(10.0), 10.0);

        // Second value is smoothed
        assert_eq!(filter.apply(12.0), 11.0);
    }

    #[test]
    fn test_alpha_bounds() {
        // High alpha = less smoothing
        let mut filter = ExponentialFilter::new(0.9);
        filter.apply(10.0);
        assert!((filter.apply(12.0) - 11.8).abs() < 1e-9);

        // Low alpha = more smoothing
        let mut filter = ExponentialFilter::new(0.1);
        filter.apply(10.0);
        assert!((filter.apply(12.0) - 10.2).abs() < 1e-9);
    }

    #[test]
    fn test_reset_adopts_next_sample() {
        let mut filter = ExponentialFilter::new(0.2);
        filter.apply(8.0);
        filter.reset();
        assert_eq!(filter.apply(12.0), 12.0);
    }
}
