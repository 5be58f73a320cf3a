//!
//! Conversion between body motion (travel along the heading, rotation in place)
//! and the angle each track's drive wheel has to turn.
//!

use nalgebra::base::*;

use crate::DEG_PER_RAD;

/// Errors raised when the rover's geometry is physically impossible
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KinematicsError {
    /// The wheel radius must be strictly positive (m)
    NonPositiveWheelRadius(f32),
    /// The half axle length must be strictly positive (m)
    NonPositiveHalfAxle(f32),
    /// The body to wheel matrix could not be inverted
    Singular,
}

/// Geometry of the drive train.  Set once when the rover is built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KinematicConstants {
    wheel_radius: f32,
    half_axle_length: f32,
}

impl KinematicConstants {
    /// Create a new set of constants, refusing non-positive lengths
    pub fn new(wheel_radius: f32, half_axle_length: f32) -> Result<Self, KinematicsError> {
        if !(wheel_radius > 0.0) {
            return Err(KinematicsError::NonPositiveWheelRadius(wheel_radius));
        }
        if !(half_axle_length > 0.0) {
            return Err(KinematicsError::NonPositiveHalfAxle(half_axle_length));
        }

        Ok(Self {
            wheel_radius,
            half_axle_length,
        })
    }

    /// Radius of the drive wheels (m)
    pub fn wheel_radius(&self) -> f32 {
        self.wheel_radius
    }

    /// Half the distance between the two tracks (m)
    pub fn half_axle_length(&self) -> f32 {
        self.half_axle_length
    }
}

/// Encoder counts of both wheels, in degrees of wheel rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncoderSnapshot {
    pub left_ticks_deg: i32,
    pub right_ticks_deg: i32,
}

/// Target angle (deg) for each wheel
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WheelAngles {
    pub right: f32,
    pub left: f32,
}

/// Motion of the rover body recovered from wheel angles
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BodyMotion {
    /// Distance travelled along the heading (m)
    pub travel: f32,
    /// Rotation in place (deg, counterclockwise positive)
    pub rotation: f32,
}

/// Differential drive kinematics.
///
/// Body motion is the vector `[travel (m), rotation (deg)]` and wheel motion is
/// `[right (deg), left (deg)]`.  The motors are mounted backwards, so a forward
/// travel turns both wheels by a negative angle and a counterclockwise rotation
/// turns the right wheel backwards and the left one forwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifferentialDrive {
    constants: KinematicConstants,
    bot_to_wheel: Matrix2<f32>,
    wheel_to_bot: Matrix2<f32>,
}

impl DifferentialDrive {
    pub fn new(constants: KinematicConstants) -> Result<Self, KinematicsError> {
        let travel_gain = -DEG_PER_RAD / constants.wheel_radius;
        let rotation_gain = constants.half_axle_length / constants.wheel_radius;

        let bot_to_wheel = Matrix2::new(
            travel_gain, -rotation_gain,
            travel_gain, rotation_gain,
        );

        let wheel_to_bot = bot_to_wheel
            .try_inverse()
            .ok_or(KinematicsError::Singular)?;

        Ok(Self {
            constants,
            bot_to_wheel,
            wheel_to_bot,
        })
    }

    pub fn constants(&self) -> KinematicConstants {
        self.constants
    }

    /// Wheel angles for an in-place rotation of `angle` degrees
    pub fn rotation_to_wheels(&self, angle: f32) -> WheelAngles {
        self.body_to_wheels(BodyMotion {
            travel: 0.0,
            rotation: angle,
        })
    }

    /// Wheel angles for a straight travel of `distance` meters
    pub fn travel_to_wheels(&self, distance: f32) -> WheelAngles {
        self.body_to_wheels(BodyMotion {
            travel: distance,
            rotation: 0.0,
        })
    }

    pub fn body_to_wheels(&self, body: BodyMotion) -> WheelAngles {
        let wheels = self.bot_to_wheel * Vector2::new(body.travel, body.rotation);
        WheelAngles {
            right: wheels[0],
            left: wheels[1],
        }
    }

    pub fn wheels_to_body(&self, wheels: WheelAngles) -> BodyMotion {
        let body = self.wheel_to_bot * Vector2::new(wheels.right, wheels.left);
        BodyMotion {
            travel: body[0],
            rotation: body[1],
        }
    }

    /// Rotation (deg) recovered from encoder counts: `(left - right) / 2 * r / h`
    pub fn wheels_to_rotation(&self, snapshot: EncoderSnapshot) -> f32 {
        self.wheels_to_body(snapshot.into()).rotation
    }

    /// Travel (m) recovered from encoder counts: `-(left + right) / 2 * r` in radians
    pub fn wheels_to_travel(&self, snapshot: EncoderSnapshot) -> f32 {
        self.wheels_to_body(snapshot.into()).travel
    }
}

impl From<EncoderSnapshot> for WheelAngles {
    fn from(snapshot: EncoderSnapshot) -> Self {
        Self {
            right: snapshot.right_ticks_deg as f32,
            left: snapshot.left_ticks_deg as f32,
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    const TOLERANCE: f32 = 0.001;

    fn within_tolerance(value: f32, target: f32) -> bool {
        target > value - TOLERANCE && target < value + TOLERANCE
    }

    fn drive() -> DifferentialDrive {
        DifferentialDrive::new(KinematicConstants::new(0.0275, 0.0535).unwrap()).unwrap()
    }

    #[test]
    fn test_rejects_non_positive_geometry() {
        assert_eq!(
            KinematicConstants::new(0.0, 0.05),
            Err(KinematicsError::NonPositiveWheelRadius(0.0))
        );
        assert_eq!(
            KinematicConstants::new(0.03, -0.05),
            Err(KinematicsError::NonPositiveHalfAxle(-0.05))
        );
        assert!(KinematicConstants::new(f32::NAN, 0.05).is_err());
    }

    #[test]
    fn test_rotation_wheels_are_opposite() {
        let wheels = drive().rotation_to_wheels(90.0);

        assert!(within_tolerance(wheels.right, -175.0909));
        assert!(within_tolerance(wheels.left, 175.0909));
    }

    #[test]
    fn test_travel_wheels_are_equal() {
        let wheels = drive().travel_to_wheels(0.5);
        let expected = -0.5 / 0.0275 * DEG_PER_RAD;

        assert!(within_tolerance(wheels.right, expected));
        assert!(within_tolerance(wheels.left, expected));
    }

    #[test]
    fn test_wheels_to_rotation_matches_tachometer_formula() {
        let drive = drive();
        let snapshot = EncoderSnapshot {
            left_ticks_deg: 175,
            right_ticks_deg: -175,
        };

        let expected = (175.0 - -175.0) / 2.0 * 0.0275 / 0.0535;
        assert!(within_tolerance(drive.wheels_to_rotation(snapshot), expected));
        assert!(within_tolerance(drive.wheels_to_travel(snapshot), 0.0));
    }

    #[test]
    fn test_wheels_to_travel_undoes_mounting_sign() {
        let drive = drive();
        let wheels = drive.travel_to_wheels(0.25);
        let snapshot = EncoderSnapshot {
            left_ticks_deg: libm::roundf(wheels.left) as i32,
            right_ticks_deg: libm::roundf(wheels.right) as i32,
        };

        let travel = drive.wheels_to_travel(snapshot);
        assert!(travel > 0.0);
        assert!(within_tolerance(travel, 0.25));
        assert!(within_tolerance(drive.wheels_to_rotation(snapshot), 0.0));
    }

    #[test]
    fn test_body_wheels_inverse() {
        let drive = drive();
        let body = BodyMotion {
            travel: -0.3,
            rotation: 42.0,
        };

        let recovered = drive.wheels_to_body(drive.body_to_wheels(body));

        assert!(within_tolerance(recovered.travel, body.travel));
        assert!(within_tolerance(recovered.rotation, body.rotation));
    }
}
