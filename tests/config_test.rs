//! Configuration file handling

use smart_mirror::config::{Config, EXAMPLE_CONFIG};
use smart_mirror::zoom::ZoomLevel;
use smart_mirror::Error;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_config_file_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mirror.yaml");

    let mut config = Config::default();
    config.crop.smoothing_factor = 0.3;
    config.crop.zoom_ratios.eyes = 1.8;
    config.focus.filter = "exponential".to_string();
    config.focus.sweep.enabled = true;
    config.scheduler.workers = 4;
    config.to_file(&path).unwrap();

    let loaded = Config::from_file(&path).unwrap();
    loaded.validate().unwrap();
    assert_eq!(loaded.crop.smoothing_factor, 0.3);
    assert_eq!(loaded.crop.zoom_ratios.ratio(ZoomLevel::Eyes), 1.8);
    assert_eq!(loaded.focus.filter, "exponential");
    assert!(loaded.focus.sweep.enabled);
    assert_eq!(loaded.scheduler.workers, 4);
    assert_eq!(loaded.sensor.width, 9152);
}

#[test]
fn test_example_config_file_loads() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("example.yaml");
    fs::write(&path, EXAMPLE_CONFIG).unwrap();

    let config = Config::from_file(&path).unwrap();
    config.validate().unwrap();
    assert_eq!(config.display_crop.zoom_ratios.ratio(ZoomLevel::Eyes), 0.4);
    assert_eq!(config.focus.history_weights, vec![0.1, 0.15, 0.2, 0.25, 0.3]);
}

#[test]
fn test_missing_config_file() {
    let dir = tempdir().unwrap();
    let result = Config::from_file(dir.path().join("absent.yaml"));
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
fn test_invalid_values_fail_validation() {
    let config = Config::from_yaml("focus:\n  min_focus: 12.0\n  max_focus: 9.0\n").unwrap();
    assert!(matches!(config.validate(), Err(Error::ConfigError(_))));

    let config = Config::from_yaml("loops:\n  crop_hz: 0\n").unwrap();
    assert!(config.validate().is_err());

    let config = Config::from_yaml("crop:\n  zoom_ratios:\n    wide: -1.0\n    face: 1.2\n    eyes: 1.5\n    lips: 1.5\n")
        .unwrap();
    assert!(config.validate().is_err());
}
