//!
//! Robot Constants and Configuration Information
//!

use motion::{DifferentialDrive, KinematicConstants, KinematicsError};

#[cfg(any(not(feature = "wide-tracks"), feature = "compact-tracks"))]
pub mod robot_config {
    /// Radius of the drive wheels (m)
    pub const WHEEL_RADIUS: f32 = 0.0275;
    /// Half the distance between the two tracks (m)
    pub const HALF_AXLE_LENGTH: f32 = 0.0535;
    /// Position of the range sensor in the body frame, relative to the
    /// center of rotation (m).  X points forward.
    pub const RANGE_SENSOR_OFFSET: [f32; 2] = [0.0, 0.0];
    /// Wheel speed used for every motion (deg/s)
    pub const WHEEL_SPEED: f32 = 90.0;
}

#[cfg(all(feature = "wide-tracks", not(feature = "compact-tracks")))]
pub mod robot_config {
    /// Radius of the drive wheels (m)
    pub const WHEEL_RADIUS: f32 = 0.028;
    /// Half the distance between the two tracks (m)
    pub const HALF_AXLE_LENGTH: f32 = 0.069;
    /// Position of the range sensor in the body frame, relative to the
    /// center of rotation (m).  X points forward.
    pub const RANGE_SENSOR_OFFSET: [f32; 2] = [0.045, 0.0];
    /// Wheel speed used for every motion (deg/s)
    pub const WHEEL_SPEED: f32 = 90.0;
}

/// Kinematics of the robot this firmware is built for
pub fn differential_drive() -> Result<DifferentialDrive, KinematicsError> {
    DifferentialDrive::new(KinematicConstants::new(
        robot_config::WHEEL_RADIUS,
        robot_config::HALF_AXLE_LENGTH,
    )?)
}
