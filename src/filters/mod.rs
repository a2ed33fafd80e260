//! Scalar smoothing filters for lens-position commands.
//!
//! Raw distance-mapped focus values jump with every noisy range reading.
//! These filters turn that sequence into a steadier lens command.

/// Weighted history filter favouring recent samples
pub mod weighted_average;

/// Exponential filter for responsive smoothing
pub mod exponential;

use crate::config::FocusConfig;
use crate::Result;

/// Trait for all focus filters
pub trait ScalarFilter: Send + Sync {
    /// Feed one raw sample and get the filtered value
    fn apply(&mut self, value: f64) -> f64;

    /// Reset filter state
    fn reset(&mut self);

    /// Get filter name
    fn name(&self) -> &str;
}

/// No-op filter that passes through values unchanged
pub struct NoFilter;

impl ScalarFilter for NoFilter {
    fn apply(&mut self, value: f64) -> f64 {
        value
    }

    fn reset(&mut self) {}

    fn name(&self) -> &str {
        "NoFilter"
    }
}

/// Create a focus filter by type name, parameterised from `config`
pub fn create_filter(filter_type: &str, config: &FocusConfig) -> Result<Box<dyn ScalarFilter>> {
    match filter_type.to_lowercase().as_str() {
        "none" | "nofilter" => Ok(Box::new(NoFilter)),
        "weighted" | "weighted_average" => Ok(Box::new(weighted_average::WeightedAverageFilter::new(
            config.history_weights.clone(),
        )?)),
        "exponential" => Ok(Box::new(exponential::ExponentialFilter::new(config.exponential_alpha))),
        _ => Err(crate::Error::FilterError(format!("Unknown filter type: {filter_type}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_filter() {
        let mut filter = NoFilter;
        assert_eq!(filter.apply(10.0), 10.0);
        assert_eq!(filter.apply(-3.5), -3.5);
    }

    #[test]
    fn test_create_filter() {
        let config = FocusConfig::default();
        assert!(create_filter("none", &config).is_ok());
        assert_eq!(create_filter("Weighted", &config).unwrap().name(), "WeightedAverageFilter");
        assert_eq!(create_filter("exponential", &config).unwrap().name(), "ExponentialFilter");
        assert!(create_filter("kalman", &config).is_err());
    }

    #[test]
    fn test_create_filter_rejects_bad_weights() {
        let config = FocusConfig {
            history_weights: vec![],
            ..FocusConfig::default()
        };
        assert!(create_filter("weighted", &config).is_err());
    }
}
