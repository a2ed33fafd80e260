//! Crop controller behaviour: bounds, dead zone, convergence, zoom snap


use proptest::prelude::*;
use smart_mirror::config::{Config, CropConfig, DisplayCropConfig, SensorConfig};
use smart_mirror::constants::MIN_CROP_SIZE;
use smart_mirror::crop::CropController;
use smart_mirror::face::{BoundingBox, FaceData, Point};
use smart_mirror::zoom::ZoomLevel;
use std::time::Instant;
use test_helpers::face_at;

fn controller() -> CropController {
    let config = Config::default();
    CropController::new(&config.crop, &config.display_crop, &config.sensor)
}

fn zoom_level() -> impl Strategy<Value = ZoomLevel> {
    prop::sample::select(ZoomLevel::ALL.to_vec())
}

#[test]
fn test_face_zoom_target() {
    let controller = controller();
    let face = FaceData::new(
        BoundingBox::new(0.4, 0.4, 0.2, 0.2),
        [
            Point::new(0.45, 0.45),
            Point::new(0.55, 0.45),
            Point::new(0.5, 0.5),
            Point::new(0.5, 0.55),
        ],
        0.9,
    );
    assert_eq!(controller.zoom_level(), ZoomLevel::Face);

    controller.update_target(&face);
    let target = controller.target_crop().unwrap();
    assert!((target.x - 0.38).abs() < 1e-12);
    assert!((target.y - 0.38).abs() < 1e-12);
    assert!((target.size - 0.24).abs() < 1e-12);

    let command = controller.tick().unwrap();
    assert_eq!(command.region, target);
    // 0.24 of the 6944 px short side
    assert_eq!(command.sensor.size, 1667);
    assert!(command.sensor.fits(9152, 6944));
}

#[test]
fn test_dead_zone_holds_crop() {
    let controller = controller();
    let now = Instant::now();
    controller.update_target_at(&face_at(0.5, 0.5, 0.2), now);
    let start = controller.tick_at(now).unwrap().region;

    // 0.01 offset against a 0.1 * 0.24 dead zone
    controller.update_target_at(&face_at(0.51, 0.5, 0.2), now);
    for _ in 0..50 {
        assert_eq!(controller.tick_at(now).unwrap().region, start);
    }
    assert_eq!(controller.current_crop(), Some(start));
}

#[test]
fn test_converges_monotonically() {
    let controller = controller();
    let now = Instant::now();
    controller.update_target_at(&face_at(0.3, 0.4, 0.2), now);
    controller.tick_at(now);

    controller.update_target_at(&face_at(0.6, 0.55, 0.2), now);
    let target = controller.target_crop().unwrap();
    let threshold = CropConfig::default().movement_threshold_ratio * target.size;

    let mut previous = controller.current_crop().unwrap().center().distance(target.center());
    let mut converged = false;
    for _ in 0..100 {
        let region = controller.tick_at(now).unwrap().region;
        let distance = region.center().distance(target.center());
        if previous <= threshold {
            assert!((distance - previous).abs() < 1e-12);
            converged = true;
            break;
        }
        assert!(distance < previous, "{distance} >= {previous}");
        previous = distance;
    }
    assert!(converged || previous <= threshold);
}

#[test]
fn test_zoom_change_snaps_to_target() {
    let controller = controller();
    let now = Instant::now();
    controller.update_target_at(&face_at(0.3, 0.3, 0.2), now);
    controller.tick_at(now);
    controller.update_target_at(&face_at(0.6, 0.6, 0.2), now);
    controller.tick_at(now);

    for level in [ZoomLevel::Eyes, ZoomLevel::Lips, ZoomLevel::Wide, ZoomLevel::Face] {
        controller.set_zoom(level);
        controller.update_target_at(&face_at(0.6, 0.6, 0.2), now);
        let command = controller.tick_at(now).unwrap();
        assert_eq!(Some(command.region), controller.target_crop());
        assert_eq!(controller.current_crop(), controller.target_crop());
    }
}

#[test]
fn test_eyes_and_lips_anchor_on_landmarks() {
    let controller = controller();
    let face = face_at(0.5, 0.5, 0.2);

    controller.set_zoom(ZoomLevel::Eyes);
    controller.update_target(&face);
    let eyes = controller.target_crop().unwrap().center();
    assert!((eyes.x - 0.5).abs() < 1e-12);
    assert!((eyes.y - 0.45).abs() < 1e-12);

    controller.set_zoom(ZoomLevel::Lips);
    let lips = controller.target_crop().unwrap().center();
    assert!((lips.y - 0.55).abs() < 1e-12);
}

#[test]
fn test_non_square_sensor() {
    let controller = CropController::new(
        &CropConfig::default(),
        &DisplayCropConfig::default(),
        &SensorConfig { width: 640, height: 480 },
    );
    controller.set_zoom(ZoomLevel::Wide);
    controller.update_target(&face_at(0.98, 0.98, 0.8));
    let command = controller.tick().unwrap();
    assert_eq!(command.sensor.size, 480);
    assert!(command.sensor.fits(640, 480));
}

#[test]
fn test_wide_crop_slides_across_sensor_width() {
    let controller = controller();

    // A 0.5 face at WIDE asks for the full 6944 px short side, leaving 2208 px of travel
    let mut xs = Vec::new();
    for cx in [0.2, 0.5, 0.6, 0.8] {
        // Zoom change snaps straight to the new target
        controller.set_zoom(ZoomLevel::Wide);
        controller.update_target(&face_at(cx, 0.5, 0.5));
        let command = controller.tick().unwrap();
        assert_eq!(command.sensor.size, 6944);
        assert_eq!(command.sensor.y, 0);
        xs.push(command.sensor.x);
    }
    assert_eq!(xs, vec![0, 1104, 2019, 2208]);
}

#[test]
fn test_crop_pins_to_reachable_edge() {
    let controller = controller();
    controller.update_target(&face_at(0.95, 0.5, 0.2));
    let command = controller.tick().unwrap();

    // Face at 8694 px; a 1667 px crop can reach x = 9152 - 1667
    assert_eq!(command.sensor.size, 1667);
    assert_eq!(command.sensor.x, 7485);
    assert_eq!(command.sensor.right(), 9152);
    assert!(command.display.is_within_unit());
    assert!(command.display.center().x > 0.5);
}

proptest! {
    #[test]
    fn prop_sensor_crop_stays_on_sensor(
        xmin in -0.2f64..1.2,
        ymin in -0.2f64..1.2,
        side in 0.0f64..1.5,
        marks in prop::array::uniform4((0.0f64..1.0, 0.0f64..1.0)),
        level in zoom_level(),
        moves in 1usize..20,
    ) {
        let controller = controller();
        let (width, height) = controller.sensor_size();
        controller.set_zoom(level);
        let face = FaceData::new(
            BoundingBox::new(xmin, ymin, side, side),
            marks.map(|(x, y)| Point::new(x, y)),
            0.9,
        );
        let now = Instant::now();
        controller.update_target_at(&face, now);
        for _ in 0..moves {
            let command = controller.tick_at(now).unwrap();
            prop_assert!(command.sensor.size > 0);
            prop_assert!(command.sensor.fits(width, height));
            prop_assert!(command.region.size >= MIN_CROP_SIZE && command.region.size <= 1.0);
            prop_assert!(command.display.is_within_unit());
        }
    }
}
