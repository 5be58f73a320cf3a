//!
//! Position and heading of the rover in the relative frame
//!

use libm::{atan2f, cosf, roundf, sinf, sqrtf};
use nalgebra::{Point2, Vector2};

use crate::DEG_PER_RAD;

/// Dead-reckoned pose.
///
/// The heading is kept in degrees and is never wrapped, so a full turn to the
/// left leaves it at 360.0 rather than 0.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Location (m)
    pub location: Point2<f32>,
    /// Heading (deg, counterclockwise from the X axis)
    pub heading: f32,
}

impl Default for Pose {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

impl Pose {
    pub fn new(x: f32, y: f32, heading: f32) -> Self {
        Self {
            location: Point2::new(x, y),
            heading,
        }
    }

    pub fn x(&self) -> f32 {
        self.location.x
    }

    pub fn y(&self) -> f32 {
        self.location.y
    }

    /// Overwrite the heading (deg)
    pub fn set_heading(&mut self, heading: f32) {
        self.heading = heading;
    }

    /// Unit vector pointing along the current heading
    pub fn direction(&self) -> Vector2<f32> {
        let radians = self.heading / DEG_PER_RAD;
        Vector2::new(cosf(radians), sinf(radians))
    }

    /// Point `distance` meters ahead of the rover along its heading
    pub fn point_at(&self, distance: f32) -> Point2<f32> {
        self.location + self.direction() * distance
    }

    /// Move the rover `distance` meters along its heading
    pub fn move_along_heading(&mut self, distance: f32) {
        self.location = self.point_at(distance);
    }

    /// Rotate the rover in place by `angle` degrees
    pub fn rotate_by(&mut self, angle: f32) {
        self.heading += angle;
    }

    pub fn distance_to(&self, target: &Point2<f32>) -> f32 {
        let delta = *target - self.location;
        sqrtf(delta.x * delta.x + delta.y * delta.y)
    }

    /// Absolute bearing (deg) from the rover to `target`, in (-180, 180]
    pub fn bearing_to(&self, target: &Point2<f32>) -> f32 {
        let delta = *target - self.location;
        atan2f(delta.y, delta.x) * DEG_PER_RAD
    }

    /// Rotate `offset`, expressed in the rover's body frame, into the relative frame
    pub fn rotate_vector(&self, offset: &Vector2<f32>) -> Vector2<f32> {
        let radians = self.heading / DEG_PER_RAD;
        let (sin, cos) = (sinf(radians), cosf(radians));
        Vector2::new(
            offset.x * cos - offset.y * sin,
            offset.x * sin + offset.y * cos,
        )
    }
}

/// `target` shifted by whole turns so that it lies within 180 degrees of `reference`.
///
/// Used so that an absolute bearing can be handed to `rotate_to` without making
/// the rover spin through more than half a turn.
pub fn nearest_equivalent_heading(target: f32, reference: f32) -> f32 {
    target + 360.0 * roundf((reference - target) / 360.0)
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    const TOLERANCE: f32 = 0.0001;

    fn within_tolerance(value: f32, target: f32) -> bool {
        target > value - TOLERANCE && target < value + TOLERANCE
    }

    #[test]
    fn test_point_at_quarter_turn() {
        let pose = Pose::new(0.0, 0.0, 90.0);
        let point = pose.point_at(0.5);

        assert!(within_tolerance(point.x, 0.0));
        assert!(within_tolerance(point.y, 0.5));
    }

    #[test]
    fn test_move_along_heading_backwards() {
        let mut pose = Pose::new(1.0, 1.0, 0.0);
        pose.move_along_heading(-0.25);

        assert!(within_tolerance(pose.location.x, 0.75));
        assert!(within_tolerance(pose.location.y, 1.0));
        assert_eq!(pose.heading, 0.0);
    }

    #[test]
    fn test_heading_is_not_wrapped() {
        let mut pose = Pose::default();
        pose.rotate_by(270.0);
        pose.rotate_by(180.0);
        assert_eq!(pose.heading, 450.0);

        pose.set_heading(-30.0);
        assert_eq!(pose.heading, -30.0);
    }

    #[test]
    fn test_bearing_and_distance() {
        let pose = Pose::new(1.0, 1.0, 45.0);
        let target = Point2::new(1.0, 3.0);

        assert!(within_tolerance(pose.bearing_to(&target), 90.0));
        assert!(within_tolerance(pose.distance_to(&target), 2.0));
    }

    #[test]
    fn test_rotate_vector() {
        let pose = Pose::new(0.0, 0.0, 90.0);
        let rotated = pose.rotate_vector(&Vector2::new(0.1, 0.0));

        assert!(within_tolerance(rotated.x, 0.0));
        assert!(within_tolerance(rotated.y, 0.1));
    }

    #[test]
    fn test_nearest_equivalent_heading() {
        assert_eq!(nearest_equivalent_heading(10.0, 360.0), 370.0);
        assert_eq!(nearest_equivalent_heading(-170.0, 170.0), 190.0);
        assert_eq!(nearest_equivalent_heading(30.0, 0.0), 30.0);
        assert_eq!(nearest_equivalent_heading(90.0, -720.0), -630.0);
    }
}
