//!
//! Scanner
//!
//! Sweeps the range sensor across an angular interval by rotating the rover
//! and clusters the hits into distinct objects.
//!
//! Each finite reading is projected into the relative frame, filtered against
//! the zones, then either merged into the object currently being traced or
//! used to seed a new one.  An out of range reading following a hit closes
//! the object being traced, so two silhouettes separated by empty rays are
//! always reported as two objects.
//!

use alloc::vec::Vec;

use embedded_hal::blocking::delay::DelayMs;
use libm::floorf;
use log::{debug, info};
use motion::Pose;
use nalgebra::{distance, Point2, Vector2};

use crate::errors::{NavigatorError, ScannerError};
use crate::navigator::Navigator;
use crate::peripherals::{is_out_of_range, RangeSensor, WheelActuator};
use crate::robot::robot_config::RANGE_SENSOR_OFFSET;
use crate::zone::ZoneMap;

/// Slack added to the sweep so that a sweep that is an exact multiple of the
/// step is not cut one step short by rounding (deg)
const SWEEP_SLACK_DEG: f32 = 0.0001;

/// Where the range sensor sits on the rover.
///
/// A reading `d` is projected as
/// `location + rotate(heading, offset) + d * (cos(heading), sin(heading))`:
/// the offset is carried into the relative frame first, then the reading is
/// laid along the heading from the sensor's own position.  The sensor always
/// looks along the rover's heading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorMount {
    /// Sensor position in the body frame (m), X forward
    pub offset: Vector2<f32>,
}

impl Default for SensorMount {
    fn default() -> Self {
        Self::new(Vector2::new(RANGE_SENSOR_OFFSET[0], RANGE_SENSOR_OFFSET[1]))
    }
}

impl SensorMount {
    pub fn new(offset: Vector2<f32>) -> Self {
        Self { offset }
    }

    /// Sensor on the center of rotation
    pub fn centered() -> Self {
        Self::new(Vector2::zeros())
    }

    /// Relative frame position of the sensor
    pub fn origin(&self, pose: &Pose) -> Point2<f32> {
        pose.location + pose.rotate_vector(&self.offset)
    }

    /// Relative frame position of a hit `distance` meters in front of the sensor
    pub fn project(&self, pose: &Pose, distance: f32) -> Point2<f32> {
        self.origin(pose) + pose.direction() * distance
    }
}

/// An object found by a sweep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedObject {
    /// Mean of every hit merged into this object (m)
    pub position: Point2<f32>,
    /// Number of hits merged into this object
    pub visit_count: u32,
}

/// Objects found by one sweep, in angular order
pub type ScanResult = Vec<DetectedObject>;

/// What the clusterer did with a ray
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RayOutcome {
    /// No echo
    OutOfRange,
    /// Hit outside of the operating zone or inside the recovery zone
    OutsideZone,
    /// Hit refined the object being traced
    Merged,
    /// Hit seeded a new object
    Created,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    mean: Point2<f32>,
    last: Point2<f32>,
    visit_count: u32,
}

/// Incremental clustering of range readings, fed one ray at a time
#[derive(Debug, Clone)]
pub struct ObjectClusterer {
    zones: ZoneMap,
    mount: SensorMount,
    max_object_size: f32,
    slots: Vec<Slot>,
    // whether the last slot may still receive hits
    open: bool,
    previous_finite: bool,
}

impl ObjectClusterer {
    pub fn new(zones: ZoneMap, mount: SensorMount, max_object_size: f32) -> Self {
        Self {
            zones,
            mount,
            max_object_size,
            slots: Vec::new(),
            open: false,
            previous_finite: false,
        }
    }

    /// Feed one range reading taken from `pose`
    pub fn push(&mut self, pose: &Pose, range: f32) -> RayOutcome {
        if is_out_of_range(range) {
            if self.previous_finite {
                self.open = false;
            }
            self.previous_finite = false;
            return RayOutcome::OutOfRange;
        }
        self.previous_finite = true;

        let point = self.mount.project(pose, range);
        if !self.zones.accepts(&point) {
            return RayOutcome::OutsideZone;
        }

        match self.slots.last_mut() {
            Some(slot) if self.open && distance(&point, &slot.last) < self.max_object_size => {
                slot.visit_count += 1;
                slot.mean += (point - slot.mean) / slot.visit_count as f32;
                slot.last = point;
                RayOutcome::Merged
            }
            _ => {
                self.slots.push(Slot {
                    mean: point,
                    last: point,
                    visit_count: 1,
                });
                self.open = true;
                RayOutcome::Created
            }
        }
    }

    /// Objects traced so far
    pub fn detections(&self) -> ScanResult {
        self.slots
            .iter()
            .map(|slot| DetectedObject {
                position: slot.mean,
                visit_count: slot.visit_count,
            })
            .collect()
    }

    pub fn finish(self) -> ScanResult {
        self.detections()
    }
}

/// Samples that have already been targeted during the mission
#[derive(Debug, Clone, Default)]
pub struct KnownSamples {
    objects: Vec<DetectedObject>,
    min_dist: f32,
}

impl KnownSamples {
    pub fn new(min_dist: f32) -> Self {
        Self {
            objects: Vec::new(),
            min_dist,
        }
    }

    /// False when `point` is within the novelty threshold of a known sample
    pub fn is_new_sample(&self, point: &Point2<f32>) -> bool {
        self.objects
            .iter()
            .all(|known| distance(&known.position, point) >= self.min_dist)
    }

    pub fn commit(&mut self, object: DetectedObject) {
        info!(
            "New sample at ({}, {})",
            object.position.x, object.position.y
        );
        self.objects.push(object);
    }

    pub fn as_slice(&self) -> &[DetectedObject] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn into_vec(self) -> Vec<DetectedObject> {
        self.objects
    }
}

/// The detection closest to `pose`
pub fn closest_detection<'a>(
    pose: &Pose,
    detections: &'a [DetectedObject],
) -> Option<&'a DetectedObject> {
    detections.iter().min_by(|a, b| {
        pose.distance_to(&a.position)
            .total_cmp(&pose.distance_to(&b.position))
    })
}

/// True when a reading says the rover is close enough to its target to grab it
pub fn is_arrived(range: f32, min_dist: f32) -> bool {
    !is_out_of_range(range) && range < min_dist
}

pub struct Scanner<S> {
    sensor: S,
    mount: SensorMount,
    max_object_size: f32,
}

impl<S: RangeSensor> Scanner<S> {
    pub fn new(sensor: S, mount: SensorMount, max_object_size: f32) -> Self {
        Self {
            sensor,
            mount,
            max_object_size,
        }
    }

    pub fn mount(&self) -> &SensorMount {
        &self.mount
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }

    /// One reading from the range sensor (m), [`crate::peripherals::OUT_OF_RANGE`] when nothing echoed
    pub fn sample(&mut self) -> Result<f32, S::Error> {
        self.sensor.sample_distance()
    }

    /// Rotate by `step_deg` increments through `sweep_deg`, reading the
    /// sensor after every step.  A remainder smaller than a step is dropped.
    pub fn sweep<W, D>(
        &mut self,
        navigator: &mut Navigator<W, D>,
        zones: &ZoneMap,
        sweep_deg: f32,
        step_deg: f32,
    ) -> Result<ScanResult, ScannerError<W::Error, S::Error>>
    where
        W: WheelActuator,
        D: DelayMs<u32>,
    {
        if !(step_deg > 0.0) {
            return Err(ScannerError::InvalidSweep { step_deg });
        }

        let steps = floorf((sweep_deg + SWEEP_SLACK_DEG) / step_deg).max(0.0) as u32;
        let mut clusterer = ObjectClusterer::new(*zones, self.mount, self.max_object_size);

        for _ in 0..steps {
            let target = navigator.pose().heading + step_deg;
            navigator.rotate_to(target, true)?;

            let range = self.sample().map_err(ScannerError::Sensor)?;
            let outcome = clusterer.push(navigator.pose(), range);
            debug!(
                "Ray at {} deg: {} m, {:?}",
                navigator.pose().heading, range, outcome
            );
        }

        let detections = clusterer.finish();
        info!(
            "Sweep of {} deg found {} objects",
            sweep_deg,
            detections.len()
        );
        Ok(detections)
    }

    /// Travel `distance` meters while reading the sensor on every poll
    pub fn sample_during_travel<W, D>(
        &mut self,
        navigator: &mut Navigator<W, D>,
        distance: f32,
    ) -> Result<Vec<f32>, NavigatorError<W::Error>>
    where
        W: WheelActuator,
        D: DelayMs<u32>,
    {
        navigator.travel_and_sample(distance, &mut self.sensor)
    }

    /// Rotate by `angle` degrees while reading the sensor on every poll
    pub fn sample_during_rotation<W, D>(
        &mut self,
        navigator: &mut Navigator<W, D>,
        angle: f32,
    ) -> Result<Vec<f32>, NavigatorError<W::Error>>
    where
        W: WheelActuator,
        D: DelayMs<u32>,
    {
        navigator.rotate_and_sample(angle, &mut self.sensor)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::peripherals::OUT_OF_RANGE;
    use crate::sim::{NoopDelay, SimObject, SimRangeSensor, SimWheel, SimWorld};
    use crate::zone::Zone;
    use crate::{MAX_OBJECT_SIZE, MIN_DIST_DETECTION};
    use motion::{DifferentialDrive, KinematicConstants};

    const TOLERANCE: f32 = 0.001;

    fn within_tolerance(value: f32, target: f32) -> bool {
        target > value - TOLERANCE && target < value + TOLERANCE
    }

    fn open_field() -> ZoneMap {
        ZoneMap::new(
            Zone::rectangle(Point2::new(0.0, 0.0), 6.0, 6.0).unwrap(),
            Zone::circle(Point2::new(2.5, 2.5), 0.2).unwrap(),
        )
    }

    fn clusterer() -> ObjectClusterer {
        ObjectClusterer::new(open_field(), SensorMount::centered(), MAX_OBJECT_SIZE)
    }

    fn rig(pose: Pose) -> (crate::sim::SharedWorld, Navigator<SimWheel, NoopDelay>) {
        let drive =
            DifferentialDrive::new(KinematicConstants::new(0.0275, 0.0535).unwrap()).unwrap();
        let world = SimWorld::shared(pose, drive);
        let navigator = Navigator::new(
            pose,
            drive,
            SimWheel::right(world.clone()),
            SimWheel::left(world.clone()),
            NoopDelay::default(),
            1_000,
        );
        (world, navigator)
    }

    #[test]
    fn test_two_separated_bumps() {
        let mut clusterer = clusterer();
        let readings = [
            (0.0, 1.0),
            (5.0, 1.0),
            (10.0, OUT_OF_RANGE),
            (15.0, OUT_OF_RANGE),
            (20.0, OUT_OF_RANGE),
            (90.0, 1.0),
        ];

        for (heading, range) in readings {
            clusterer.push(&Pose::new(0.0, 0.0, heading), range);
        }
        let detections = clusterer.finish();

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].visit_count, 2);
        assert_eq!(detections[1].visit_count, 1);
        assert!(within_tolerance(detections[1].position.y, 1.0));
    }

    #[test]
    fn test_single_wide_bump() {
        let mut clusterer = clusterer();

        for heading in [0.0, 5.0, 10.0, 15.0, 20.0] {
            clusterer.push(&Pose::new(0.0, 0.0, heading), 1.0);
        }
        let detections = clusterer.finish();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].visit_count, 5);
        let middle = Pose::new(0.0, 0.0, 10.0).point_at(1.0);
        assert!(distance(&detections[0].position, &middle) < 0.01);
    }

    #[test]
    fn test_incremental_mean() {
        let mut clusterer = clusterer();
        let pose = Pose::default();

        assert_eq!(clusterer.push(&pose, 1.0), RayOutcome::Created);
        assert_eq!(clusterer.push(&pose, 1.1), RayOutcome::Merged);
        assert_eq!(clusterer.push(&pose, 1.2), RayOutcome::Merged);

        let detections = clusterer.finish();
        assert_eq!(detections.len(), 1);
        assert!(within_tolerance(detections[0].position.x, 1.1));
    }

    #[test]
    fn test_far_consecutive_hits_are_two_objects() {
        let mut clusterer = clusterer();
        let pose = Pose::default();

        clusterer.push(&pose, 1.0);
        assert_eq!(clusterer.push(&pose, 1.0 + MAX_OBJECT_SIZE + 0.05), RayOutcome::Created);

        assert_eq!(clusterer.finish().len(), 2);
    }

    #[test]
    fn test_empty_ray_closes_object() {
        let mut clusterer = clusterer();
        let pose = Pose::default();

        clusterer.push(&pose, 1.0);
        assert_eq!(clusterer.push(&pose, OUT_OF_RANGE), RayOutcome::OutOfRange);
        assert_eq!(clusterer.push(&pose, 1.0), RayOutcome::Created);
    }

    #[test]
    fn test_zone_filter() {
        let mut clusterer = clusterer();

        // outside of the operating zone
        assert_eq!(
            clusterer.push(&Pose::default(), 3.5),
            RayOutcome::OutsideZone
        );
        // inside of the recovery zone
        assert_eq!(
            clusterer.push(&Pose::new(2.5, 2.0, 90.0), 0.5),
            RayOutcome::OutsideZone
        );
        assert!(clusterer.finish().is_empty());
    }

    #[test]
    fn test_mount_offset_projection() {
        let mount = SensorMount::new(Vector2::new(0.1, 0.0));
        let point = mount.project(&Pose::new(1.0, 1.0, 90.0), 0.5);

        assert!(within_tolerance(point.x, 1.0));
        assert!(within_tolerance(point.y, 1.6));
    }

    #[test]
    fn test_novelty_check() {
        let mut known = KnownSamples::new(MIN_DIST_DETECTION);
        known.commit(DetectedObject {
            position: Point2::new(1.0, 1.0),
            visit_count: 3,
        });

        assert!(!known.is_new_sample(&Point2::new(1.1, 1.0)));
        assert!(known.is_new_sample(&Point2::new(1.0, 1.0 + MIN_DIST_DETECTION + 0.01)));
        assert_eq!(known.len(), 1);
    }

    #[test]
    fn test_is_arrived() {
        assert!(is_arrived(0.1, MIN_DIST_DETECTION));
        assert!(!is_arrived(0.5, MIN_DIST_DETECTION));
        assert!(!is_arrived(OUT_OF_RANGE, MIN_DIST_DETECTION));
    }

    #[test]
    fn test_closest_detection() {
        let detections = [
            DetectedObject {
                position: Point2::new(2.0, 0.0),
                visit_count: 1,
            },
            DetectedObject {
                position: Point2::new(0.0, -0.5),
                visit_count: 1,
            },
        ];

        let closest = closest_detection(&Pose::default(), &detections).unwrap();
        assert_eq!(closest.position, Point2::new(0.0, -0.5));
        assert!(closest_detection(&Pose::default(), &[]).is_none());
    }

    #[test]
    fn test_sweep_finds_two_objects() {
        let (world, mut navigator) = rig(Pose::default());
        world
            .borrow_mut()
            .objects
            .extend([
                SimObject::new(Point2::new(0.0, 1.0), 0.1),
                SimObject::new(Point2::new(-0.75, -0.27), 0.1),
            ]);
        let mut scanner = Scanner::new(
            SimRangeSensor::new(world.clone()),
            SensorMount::default(),
            MAX_OBJECT_SIZE,
        );

        let detections = scanner
            .sweep(&mut navigator, &open_field(), 360.0, 5.0)
            .unwrap();

        assert_eq!(detections.len(), 2);
        assert!(distance(&detections[0].position, &Point2::new(0.0, 1.0)) < 0.15);
        assert!(distance(&detections[1].position, &Point2::new(-0.75, -0.27)) < 0.15);
        assert!(within_tolerance(navigator.pose().heading, 360.0));
    }

    #[test]
    fn test_sweep_drops_remainder_step() {
        let (world, mut navigator) = rig(Pose::default());
        let mut scanner = Scanner::new(
            SimRangeSensor::new(world),
            SensorMount::centered(),
            MAX_OBJECT_SIZE,
        );

        let detections = scanner
            .sweep(&mut navigator, &open_field(), 23.0, 5.0)
            .unwrap();

        assert!(detections.is_empty());
        assert!(within_tolerance(navigator.pose().heading, 20.0));
    }

    #[test]
    fn test_sweep_rejects_non_positive_step() {
        let (world, mut navigator) = rig(Pose::default());
        let mut scanner = Scanner::new(
            SimRangeSensor::new(world),
            SensorMount::centered(),
            MAX_OBJECT_SIZE,
        );

        match scanner.sweep(&mut navigator, &open_field(), 90.0, 0.0) {
            Err(ScannerError::InvalidSweep { step_deg }) => assert_eq!(step_deg, 0.0),
            other => panic!("expected an invalid sweep, got {:?}", other),
        }
    }

    #[test]
    fn test_sweep_with_scripted_ranges() {
        let (world, mut navigator) = rig(Pose::default());
        let mut scanner = Scanner::new(
            SimRangeSensor::scripted(
                world,
                [1.0, 1.0, OUT_OF_RANGE, OUT_OF_RANGE, OUT_OF_RANGE, 1.0],
            ),
            SensorMount::centered(),
            MAX_OBJECT_SIZE,
        );

        // the last reading is 30 degrees away from the first bump
        let detections = scanner
            .sweep(&mut navigator, &open_field(), 30.0, 5.0)
            .unwrap();

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].visit_count, 2);
    }

    #[test]
    fn test_sample_during_rotation_faces_object() {
        let (world, mut navigator) = rig(Pose::default());
        world
            .borrow_mut()
            .objects
            .push(SimObject::new(Point2::new(0.0, 1.0), 0.05));
        let mut scanner = Scanner::new(
            SimRangeSensor::new(world.clone()).with_mount(SensorMount::centered()),
            SensorMount::centered(),
            MAX_OBJECT_SIZE,
        );

        let samples = scanner.sample_during_rotation(&mut navigator, 90.0).unwrap();

        assert_eq!(samples.len(), 4);
        assert!(samples.iter().all(|range| within_tolerance(*range, 0.95)));
        assert!(libm::fabsf(navigator.pose().heading - 90.0) < 0.1);
    }

    #[test]
    fn test_sensor_failure_while_moving_is_out_of_range() {
        let (world, mut navigator) = rig(Pose::default());
        let mut scanner = Scanner::new(
            SimRangeSensor::new(world).fail_on_sample(),
            SensorMount::centered(),
            MAX_OBJECT_SIZE,
        );

        let samples = scanner.sample_during_travel(&mut navigator, 0.3).unwrap();

        assert!(!samples.is_empty());
        assert!(samples.iter().all(|range| *range == OUT_OF_RANGE));
        assert!(within_tolerance(navigator.pose().x(), 0.3));
    }
}
