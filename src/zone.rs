//!
//! Zone Geometry
//!
//! Containment predicates for the regions of the arena.  Zones are expressed
//! in the rover's relative frame: the origin is the pose the rover landed on
//! and the X axis points along its initial heading.
//!

use libm::fabsf;
use motion::Pose;
use nalgebra::Point2;

use crate::errors::ZoneError;

/// A region of the arena
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Zone {
    /// Axis aligned rectangle.  `length` is measured along X, `width` along Y (m)
    Rectangle {
        center: Point2<f32>,
        width: f32,
        length: f32,
    },
    /// Disk of the given diameter (m)
    Circle { center: Point2<f32>, diameter: f32 },
}

fn check_dimension(what: &'static str, value: f32) -> Result<f32, ZoneError> {
    if value > 0.0 {
        Ok(value)
    } else {
        Err(ZoneError::NonPositiveDimension { what, value })
    }
}

impl Zone {
    pub fn rectangle(center: Point2<f32>, width: f32, length: f32) -> Result<Self, ZoneError> {
        Ok(Self::Rectangle {
            center,
            width: check_dimension("width", width)?,
            length: check_dimension("length", length)?,
        })
    }

    pub fn circle(center: Point2<f32>, diameter: f32) -> Result<Self, ZoneError> {
        Ok(Self::Circle {
            center,
            diameter: check_dimension("diameter", diameter)?,
        })
    }

    pub fn center(&self) -> Point2<f32> {
        match self {
            Self::Rectangle { center, .. } | Self::Circle { center, .. } => *center,
        }
    }

    /// Strict containment, a point on the border is outside
    pub fn contains(&self, point: &Point2<f32>) -> bool {
        match self {
            Self::Rectangle {
                center,
                width,
                length,
            } => {
                fabsf(point.x - center.x) < length / 2.0 && fabsf(point.y - center.y) < width / 2.0
            }
            Self::Circle { center, diameter } => {
                let dx = point.x - center.x;
                let dy = point.y - center.y;
                let radius = diameter / 2.0;
                dx * dx + dy * dy < radius * radius
            }
        }
    }

    /// Re-express a zone given in the arena frame in the frame of a rover that
    /// landed at `origin` (arena frame).
    ///
    /// The center is translated and rotated.  Rectangles stay axis aligned in
    /// the new frame, so their width and length are swapped when the rover
    /// landed facing closer to the arena's Y axis than to its X axis.
    pub fn relative_to(&self, origin: &Pose) -> Self {
        let inverse = Pose::new(0.0, 0.0, -origin.heading);
        let center = Point2::from(inverse.rotate_vector(&(self.center() - origin.location)));

        match *self {
            Self::Rectangle { width, length, .. } => {
                let quarter_turns = libm::roundf(origin.heading / 90.0) as i32;
                let (width, length) = if quarter_turns.rem_euclid(2) == 1 {
                    (length, width)
                } else {
                    (width, length)
                };
                Self::Rectangle {
                    center,
                    width,
                    length,
                }
            }
            Self::Circle { diameter, .. } => Self::Circle { center, diameter },
        }
    }
}

/// The two zones the rover cares about
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneMap {
    /// Region the rover has to stay in
    pub operating: Zone,
    /// Region where harvested samples are deposited
    pub recovery: Zone,
}

impl ZoneMap {
    pub fn new(operating: Zone, recovery: Zone) -> Self {
        Self {
            operating,
            recovery,
        }
    }

    /// True when a detection at `point` is worth keeping: inside the
    /// operating zone and outside the recovery zone
    pub fn accepts(&self, point: &Point2<f32>) -> bool {
        self.operating.contains(point) && !self.recovery.contains(point)
    }

    pub fn relative_to(&self, origin: &Pose) -> Self {
        Self {
            operating: self.operating.relative_to(origin),
            recovery: self.recovery.relative_to(origin),
        }
    }
}
