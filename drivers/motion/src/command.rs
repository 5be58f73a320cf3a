//!
//! Motion requests that can be handed to the navigator
//!

use crate::kinematics::{DifferentialDrive, WheelAngles};

/// A single motion request.  `blocking` decides whether the pose is updated
/// on completion or left for a later encoder reconciliation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionCommand {
    /// Rotate in place by `angle` degrees
    Rotate { angle: f32, blocking: bool },
    /// Rotate in place until the heading is `heading` degrees
    RotateTo { heading: f32, blocking: bool },
    /// Travel `distance` meters along the current heading
    Travel { distance: f32, blocking: bool },
}

impl MotionCommand {
    pub fn is_blocking(&self) -> bool {
        match self {
            Self::Rotate { blocking, .. }
            | Self::RotateTo { blocking, .. }
            | Self::Travel { blocking, .. } => *blocking,
        }
    }

    /// Wheel targets for this command given the rover's current heading
    pub fn wheel_angles(&self, drive: &DifferentialDrive, current_heading: f32) -> WheelAngles {
        match *self {
            Self::Rotate { angle, .. } => drive.rotation_to_wheels(angle),
            Self::RotateTo { heading, .. } => drive.rotation_to_wheels(heading - current_heading),
            Self::Travel { distance, .. } => drive.travel_to_wheels(distance),
        }
    }
}
