//! Session-adaptive difficulty control
//!
//! A piecewise policy over rolling accuracy. Thresholds and bounds are fixed
//! so sessions stay reproducible.

use serde::{Deserialize, Serialize};
use tracing::info;

pub const HIGH_ACCURACY: f64 = 0.70;
pub const LOW_ACCURACY: f64 = 0.40;

pub const MIN_FLASH_SPEED: f64 = 0.6;
pub const MAX_FLASH_SPEED: f64 = 1.5;
pub const MIN_OBJECTS: u32 = 3;
pub const MAX_OBJECTS: u32 = 4;

const SPEED_UP: f64 = 1.1;
const SPEED_UP_AT_MAX_OBJECTS: f64 = 1.15;
const SLOW_DOWN: f64 = 0.9;
const SLOW_DOWN_AT_MIN_OBJECTS: f64 = 0.85;

/// What the controller changed, surfaced to the player as a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyChange {
    AddedObject,
    SpedUp,
    RemovedObject,
    SlowedDown,
    Steady,
}

impl DifficultyChange {
    pub fn message(self) -> &'static str {
        match self {
            DifficultyChange::AddedObject => "Great job! Let's add an object to make it more fun!",
            DifficultyChange::SpedUp => "You're on fire! Speeding up a little!",
            DifficultyChange::RemovedObject => "Let's slow down, removing an object.",
            DifficultyChange::SlowedDown => "No worries, we'll take it slower.",
            DifficultyChange::Steady => "Keep going, you're doing great!",
        }
    }
}

/// Output of one controller step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyUpdate {
    pub flash_speed: f64,
    pub object_count: u32,
    pub change: DifficultyChange,
    pub notification: String,
}

fn clamp_speed(speed: f64) -> f64 {
    if speed.is_nan() {
        return 1.0;
    }
    speed.clamp(MIN_FLASH_SPEED, MAX_FLASH_SPEED)
}

fn clamp_objects(count: u32) -> u32 {
    count.clamp(MIN_OBJECTS, MAX_OBJECTS)
}

/// Map rolling accuracy and the current difficulty to the next difficulty
///
/// Pure; the caller persists the result. Flash speed always stays in
/// [0.6, 1.5] and object count in [3, 4].
pub fn adapt_difficulty(recent_accuracy: f64, current_flash_speed: f64, current_object_count: u32) -> DifficultyUpdate {
    let speed = clamp_speed(current_flash_speed);
    let objects = clamp_objects(current_object_count);

    let (flash_speed, object_count, change) = if recent_accuracy > HIGH_ACCURACY {
        if objects < MAX_OBJECTS {
            (clamp_speed(speed * SPEED_UP), objects + 1, DifficultyChange::AddedObject)
        } else {
            (clamp_speed(speed * SPEED_UP_AT_MAX_OBJECTS), objects, DifficultyChange::SpedUp)
        }
    } else if recent_accuracy < LOW_ACCURACY {
        if objects > MIN_OBJECTS {
            (clamp_speed(speed * SLOW_DOWN), objects - 1, DifficultyChange::RemovedObject)
        } else {
            (clamp_speed(speed * SLOW_DOWN_AT_MIN_OBJECTS), objects, DifficultyChange::SlowedDown)
        }
    } else {
        (speed, objects, DifficultyChange::Steady)
    };

    DifficultyUpdate {
        flash_speed,
        object_count,
        change,
        notification: change.message().to_string(),
    }
}

/// Stateless wrapper that logs each adjustment
#[derive(Debug, Clone, Copy, Default)]
pub struct DifficultyController;

impl DifficultyController {
    pub fn adapt(&self, recent_accuracy: f64, current_flash_speed: f64, current_object_count: u32) -> DifficultyUpdate {
        let update = adapt_difficulty(recent_accuracy, current_flash_speed, current_object_count);
        if update.change != DifficultyChange::Steady {
            info!(
                accuracy = recent_accuracy,
                flash_speed = update.flash_speed,
                objects = update.object_count,
                change = ?update.change,
                "Difficulty adjusted"
            );
        }
        update
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_accuracy_adds_object() {
        let update = adapt_difficulty(0.8, 1.0, 3);
        assert_eq!(update.object_count, 4);
        assert!((update.flash_speed - 1.1).abs() < 1e-12);
        assert_eq!(update.change, DifficultyChange::AddedObject);
        assert!(update.notification.contains("add an object"));
    }

    #[test]
    fn test_high_accuracy_at_max_objects_speeds_up() {
        let update = adapt_difficulty(0.9, 1.0, 4);
        assert_eq!(update.object_count, 4);
        assert!((update.flash_speed - 1.15).abs() < 1e-12);
        assert_eq!(update.change, DifficultyChange::SpedUp);

        let capped = adapt_difficulty(0.9, 1.4, 4);
        assert_eq!(capped.flash_speed, MAX_FLASH_SPEED);
    }

    #[test]
    fn test_low_accuracy_at_min_objects_slows_down() {
        let update = adapt_difficulty(0.3, 1.0, 3);
        assert_eq!(update.object_count, 3);
        assert!((update.flash_speed - 0.85).abs() < 1e-12);
        assert_eq!(update.change, DifficultyChange::SlowedDown);
        assert!(update.notification.contains("take it slower"));
    }

    #[test]
    fn test_low_accuracy_removes_object() {
        let update = adapt_difficulty(0.1, 1.0, 4);
        assert_eq!(update.object_count, 3);
        assert!((update.flash_speed - 0.9).abs() < 1e-12);
        assert!(update.notification.contains("removing an object"));

        let floored = adapt_difficulty(0.1, 0.62, 3);
        assert_eq!(floored.flash_speed, MIN_FLASH_SPEED);
    }

    #[test]
    fn test_middle_band_is_steady() {
        for accuracy in [0.4, 0.55, 0.7] {
            let update = adapt_difficulty(accuracy, 1.2, 4);
            assert_eq!(update.flash_speed, 1.2);
            assert_eq!(update.object_count, 4);
            assert_eq!(update.change, DifficultyChange::Steady);
        }
    }

    #[test]
    fn test_bounds_hold_under_repeated_application() {
        let accuracies = [0.95, 0.95, 0.95, 0.95, 0.95, 0.95, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.5, 0.8, 0.2];
        let mut speed = 1.0;
        let mut objects = 3;
        for _ in 0..10 {
            for &accuracy in &accuracies {
                let update = adapt_difficulty(accuracy, speed, objects);
                assert!((MIN_FLASH_SPEED..=MAX_FLASH_SPEED).contains(&update.flash_speed));
                assert!((MIN_OBJECTS..=MAX_OBJECTS).contains(&update.object_count));
                speed = update.flash_speed;
                objects = update.object_count;
            }
        }
    }

    #[test]
    fn test_out_of_range_inputs_are_clamped() {
        let update = adapt_difficulty(0.5, 9.0, 12);
        assert_eq!(update.flash_speed, MAX_FLASH_SPEED);
        assert_eq!(update.object_count, MAX_OBJECTS);

        let update = adapt_difficulty(0.5, f64::NAN, 0);
        assert_eq!(update.flash_speed, 1.0);
        assert_eq!(update.object_count, MIN_OBJECTS);
    }
}
