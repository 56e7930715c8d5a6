//! BLE Service and Characteristic UUIDs.
//!
//! Contains all UUID constants used for treadmill workout-summary reads.

use uuid::Uuid;

// Workout Summary Service (Treadmill Custom)
/// Treadmill Workout Summary Service UUID.
pub const WORKOUT_SERVICE_UUID: Uuid = Uuid::from_u128(0x1234_5678_1234_5678_1234_56789abcdef0);

/// Elapsed time characteristic UUID (4-byte signed int, seconds).
pub const ELAPSED_TIME_UUID: Uuid = Uuid::from_u128(0x1234_5678_1234_5678_1234_56789abcdef1);
/// Average heart rate characteristic UUID (2-byte unsigned int, bpm).
pub const AVG_HEART_RATE_UUID: Uuid = Uuid::from_u128(0x1234_5678_1234_5678_1234_56789abcdef2);
/// Total distance characteristic UUID (4-byte IEEE float, meters).
pub const TOTAL_DISTANCE_UUID: Uuid = Uuid::from_u128(0x1234_5678_1234_5678_1234_56789abcdef3);
/// Calories burned characteristic UUID (2-byte unsigned int, kcal).
pub const CALORIES_BURNED_UUID: Uuid = Uuid::from_u128(0x1234_5678_1234_5678_1234_56789abcdef4);
/// Workout title characteristic UUID (UTF-8 bytes).
pub const WORKOUT_TITLE_UUID: Uuid = Uuid::from_u128(0x1234_5678_1234_5678_1234_56789abcdef5);

/// Check if a service UUID is the workout summary service.
pub fn is_workout_service(uuid: &Uuid) -> bool {
    *uuid == WORKOUT_SERVICE_UUID
}

/// Check if a characteristic UUID belongs to the workout summary service.
pub fn is_workout_characteristic(uuid: &Uuid) -> bool {
    [
        ELAPSED_TIME_UUID,
        AVG_HEART_RATE_UUID,
        TOTAL_DISTANCE_UUID,
        CALORIES_BURNED_UUID,
        WORKOUT_TITLE_UUID,
    ]
    .contains(uuid)
}
