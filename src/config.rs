//!
//! Mission Configuration
//!
//! Everything the mission controller needs to know about the arena and how
//! to behave in it.  Built once at startup and handed to
//! [`crate::mission::Mission::new`].
//!

use alloc::vec::Vec;

use motion::Pose;
use nalgebra::Point2;

use crate::errors::{ConfigError, ZoneError};
use crate::mission::default_waypoints;
use crate::navigator::DEFAULT_POLL_INTERVAL_MS;
use crate::robot::robot_config::WHEEL_SPEED;
use crate::scanner::SensorMount;
use crate::zone::{Zone, ZoneMap};
use crate::{DEFAULT_SAMPLES_TO_HARVEST, MAX_OBJECT_SIZE, MIN_DIST_DETECTION, VOLTAGE_THRESHOLD_MV};

/// Center of the operating zone in the arena frame (m)
pub const ARENA_CENTER: [f32; 2] = [1.25, 0.75];
/// Extent of the operating zone along the arena's Y axis (m)
pub const ARENA_WIDTH: f32 = 1.5;
/// Extent of the operating zone along the arena's X axis (m)
pub const ARENA_LENGTH: f32 = 2.5;
/// Center of the recovery zone in the arena frame (m)
pub const RECOVERY_CENTER: [f32; 2] = [0.71, 1.16];
pub const RECOVERY_DIAMETER: f32 = 0.2;
/// Where the rover lands in the arena frame (m, m, deg)
pub const INITIAL_POSE: [f32; 3] = [0.25, 0.75, 0.0];
/// Distance between two waypoints of the default exploration path (m)
pub const WAYPOINT_SPACING: f32 = 0.5;

/// The pose the rover lands on, in the arena frame
pub fn initial_pose() -> Pose {
    Pose::new(INITIAL_POSE[0], INITIAL_POSE[1], INITIAL_POSE[2])
}

/// The arena zones in the arena frame
pub fn arena_zones() -> Result<ZoneMap, ZoneError> {
    Ok(ZoneMap::new(
        Zone::rectangle(
            Point2::new(ARENA_CENTER[0], ARENA_CENTER[1]),
            ARENA_WIDTH,
            ARENA_LENGTH,
        )?,
        Zone::circle(
            Point2::new(RECOVERY_CENTER[0], RECOVERY_CENTER[1]),
            RECOVERY_DIAMETER,
        )?,
    ))
}

#[derive(Debug, Clone, PartialEq)]
pub struct MissionConfig {
    /// Zones in the rover's relative frame
    pub zones: ZoneMap,
    /// Units: m
    pub max_object_size: f32,
    /// Novelty and arrival threshold.  Units: m
    pub min_dist_detection: f32,
    /// Units: deg
    pub sweep_deg: f32,
    /// Units: deg
    pub step_deg: f32,
    /// Stops of the exploration path, visited in order
    pub waypoints: Vec<Point2<f32>>,
    pub samples_to_harvest: usize,
    /// Longest a single motion may take.  Units: ms
    pub motion_timeout_ms: u32,
    /// Units: ms
    pub poll_interval_ms: u32,
    /// Units: mV
    pub battery_threshold_mv: u32,
    /// Share of the measured range travelled on each approach step
    pub approach_fraction: f32,
    pub max_approach_steps: u32,
    /// Corrective rotations tried on each side when the target is lost
    pub probe_count: u32,
    /// Units: deg
    pub probe_step_deg: f32,
    /// Distance backed off after dropping a sample.  Units: m
    pub back_off_m: f32,
    /// Wait for the operator between two harvests
    pub pause_between_harvests: bool,
    pub sensor_mount: SensorMount,
    /// Units: deg/s
    pub wheel_speed: f32,
}

impl Default for MissionConfig {
    fn default() -> Self {
        let origin = initial_pose();
        let zones = ZoneMap::new(
            Zone::Rectangle {
                center: Point2::new(ARENA_CENTER[0], ARENA_CENTER[1]),
                width: ARENA_WIDTH,
                length: ARENA_LENGTH,
            },
            Zone::Circle {
                center: Point2::new(RECOVERY_CENTER[0], RECOVERY_CENTER[1]),
                diameter: RECOVERY_DIAMETER,
            },
        )
        .relative_to(&origin);

        Self {
            waypoints: default_waypoints(&zones.operating, WAYPOINT_SPACING),
            zones,
            max_object_size: MAX_OBJECT_SIZE,
            min_dist_detection: MIN_DIST_DETECTION,
            sweep_deg: 360.0,
            step_deg: 5.0,
            samples_to_harvest: DEFAULT_SAMPLES_TO_HARVEST,
            motion_timeout_ms: 20_000,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            battery_threshold_mv: VOLTAGE_THRESHOLD_MV,
            approach_fraction: 0.5,
            max_approach_steps: 10,
            probe_count: 2,
            probe_step_deg: 5.0,
            back_off_m: 0.15,
            pause_between_harvests: true,
            sensor_mount: SensorMount::default(),
            wheel_speed: WHEEL_SPEED,
        }
    }
}

fn positive(what: &'static str, value: f32) -> Result<(), ConfigError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { what, value })
    }
}

fn check_zone(zone: &Zone) -> Result<(), ZoneError> {
    match *zone {
        Zone::Rectangle { center, width, length } => Zone::rectangle(center, width, length),
        Zone::Circle { center, diameter } => Zone::circle(center, diameter),
    }
    .map(|_| ())
}

impl MissionConfig {
    /// Check every parameter, returning the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_zone(&self.zones.operating)?;
        check_zone(&self.zones.recovery)?;

        positive("max_object_size", self.max_object_size)?;
        positive("min_dist_detection", self.min_dist_detection)?;
        positive("step_deg", self.step_deg)?;
        positive("probe_step_deg", self.probe_step_deg)?;
        positive("wheel_speed", self.wheel_speed)?;
        positive("motion_timeout_ms", self.motion_timeout_ms as f32)?;
        if self.back_off_m < 0.0 {
            return Err(ConfigError::NonPositive {
                what: "back_off_m",
                value: self.back_off_m,
            });
        }

        if self.step_deg > self.sweep_deg {
            return Err(ConfigError::StepLargerThanSweep {
                sweep_deg: self.sweep_deg,
                step_deg: self.step_deg,
            });
        }

        if !(self.approach_fraction > 0.0 && self.approach_fraction <= 1.0) {
            return Err(ConfigError::ApproachFraction(self.approach_fraction));
        }

        if self.samples_to_harvest == 0 {
            return Err(ConfigError::NoSamplesToHarvest);
        }

        if let Some(index) = self
            .waypoints
            .iter()
            .position(|waypoint| !self.zones.operating.contains(waypoint))
        {
            return Err(ConfigError::WaypointOutsideZone { index });
        }

        Ok(())
    }
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
    fn test_default_is_valid() {
        assert_eq!(MissionConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_default_zones_are_relative_to_landing() {
        let config = MissionConfig::default();

        let operating = config.zones.operating.center();
        assert!(within_tolerance(operating.x, 1.0));
        assert!(within_tolerance(operating.y, 0.0));

        let recovery = config.zones.recovery.center();
        assert!(within_tolerance(recovery.x, 0.46));
        assert!(within_tolerance(recovery.y, 0.41));

        // the rover lands inside the operating zone
        assert!(config.zones.operating.contains(&Point2::origin()));
    }

    #[test]
    fn test_arena_zones_match_default() {
        let relative = arena_zones().unwrap().relative_to(&initial_pose());
        assert_eq!(relative, MissionConfig::default().zones);
    }

    #[test]
    fn test_validate_rejects_bad_parameters() {
        let mut config = MissionConfig::default();
        config.samples_to_harvest = 0;
        assert_eq!(config.validate(), Err(ConfigError::NoSamplesToHarvest));

        let mut config = MissionConfig::default();
        config.approach_fraction = 1.5;
        assert_eq!(config.validate(), Err(ConfigError::ApproachFraction(1.5)));

        let mut config = MissionConfig::default();
        config.step_deg = 0.0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonPositive {
                what: "step_deg",
                value: 0.0
            })
        );

        let mut config = MissionConfig::default();
        config.zones.recovery = Zone::Circle {
            center: Point2::origin(),
            diameter: 0.0,
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Zone(ZoneError::NonPositiveDimension {
                what: "diameter",
                value: 0.0
            }))
        );

        let mut config = MissionConfig::default();
        config.waypoints.push(Point2::new(10.0, 0.0));
        let last = config.waypoints.len() - 1;
        assert_eq!(
            config.validate(),
            Err(ConfigError::WaypointOutsideZone { index: last })
        );
    }
}
