//!
//! Simulated Peripherals
//!
//! A tiny world model the navigation core can run against on the host.  The
//! wheels share the world through an `Rc<RefCell<_>>`; once both tracks have
//! been commanded, the body motion they imply is applied to the true pose.
//! The range sensor ray casts against round objects lying in the arena.
//!

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

use embedded_hal::blocking::delay::DelayMs;
use libm::{roundf, sqrtf};
use log::debug;
use motion::{DifferentialDrive, Pose, WheelAngles};
use nalgebra::{distance, Point2};

use crate::peripherals::{
    Battery, FeedbackSink, Grabber, Light, Measure, OperatorPanel, Order, Peripheral,
    RangeSensor, Tone, WheelActuator, OUT_OF_RANGE,
};
use crate::scanner::SensorMount;

/// Number of `is_moving` polls a simulated motion lasts
pub const DEFAULT_POLLS_PER_MOTION: u32 = 3;

/// Farthest echo the simulated range sensor returns (m)
pub const DEFAULT_MAX_RANGE: f32 = 2.55;

/// Farthest the simulated pliers reach from the center of the rover (m)
pub const GRAB_REACH: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    /// The device was told to fail on connection
    NotConnected(&'static str),
    /// The scripted battery has no reading to give
    NoReading,
    /// The device was told to fail every reading
    SampleFailed(&'static str),
}

/// A round object lying in the arena
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimObject {
    pub center: Point2<f32>,
    pub radius: f32,
}

impl SimObject {
    pub fn new(center: Point2<f32>, radius: f32) -> Self {
        Self { center, radius }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Right,
    Left,
}

pub struct SimWorld {
    /// True pose of the rover
    pub pose: Pose,
    pub objects: Vec<SimObject>,
    /// Object currently held by the pliers
    pub carried: Option<SimObject>,
    drive: DifferentialDrive,
    pending_right: Option<f32>,
    pending_left: Option<f32>,
}

pub type SharedWorld = Rc<RefCell<SimWorld>>;

impl SimWorld {
    pub fn new(pose: Pose, drive: DifferentialDrive) -> Self {
        Self {
            pose,
            objects: Vec::new(),
            carried: None,
            drive,
            pending_right: None,
            pending_left: None,
        }
    }

    pub fn shared(pose: Pose, drive: DifferentialDrive) -> SharedWorld {
        Rc::new(RefCell::new(Self::new(pose, drive)))
    }

    fn command(&mut self, side: Side, angle: f32) {
        match side {
            Side::Right => self.pending_right = Some(angle),
            Side::Left => self.pending_left = Some(angle),
        }

        if let (Some(right), Some(left)) = (self.pending_right, self.pending_left) {
            let body = self.drive.wheels_to_body(WheelAngles { right, left });
            self.pose.rotate_by(body.rotation);
            self.pose.move_along_heading(body.travel);
            self.pending_right = None;
            self.pending_left = None;
            debug!("Sim pose: {:?}", self.pose);
        }
    }

    /// Distance from `origin` along `heading` to the nearest object surface
    pub fn cast_ray(&self, origin: Point2<f32>, heading: f32) -> Option<f32> {
        let direction = Pose::new(0.0, 0.0, heading).direction();
        self.objects
            .iter()
            .filter_map(|object| {
                let to_center = object.center - origin;
                let along = to_center.dot(&direction);
                if along <= 0.0 {
                    return None;
                }
                let perpendicular = to_center.norm_squared() - along * along;
                let radius_squared = object.radius * object.radius;
                if perpendicular > radius_squared {
                    return None;
                }
                Some(along - sqrtf(radius_squared - perpendicular))
            })
            .min_by(f32::total_cmp)
    }
}

/// One track of the simulated rover
pub struct SimWheel {
    world: SharedWorld,
    side: Side,
    encoder: i32,
    remaining_polls: u32,
    polls_per_motion: u32,
    stalled: bool,
    spinning: bool,
    speed: f32,
    last_command: f32,
    fail_connect: bool,
}

impl SimWheel {
    pub fn new(world: SharedWorld, side: Side) -> Self {
        Self {
            world,
            side,
            encoder: 0,
            remaining_polls: 0,
            polls_per_motion: DEFAULT_POLLS_PER_MOTION,
            stalled: false,
            spinning: false,
            speed: 0.0,
            last_command: 0.0,
            fail_connect: false,
        }
    }

    pub fn right(world: SharedWorld) -> Self {
        Self::new(world, Side::Right)
    }

    pub fn left(world: SharedWorld) -> Self {
        Self::new(world, Side::Left)
    }

    /// A stalled wheel reports moving until it is stopped
    pub fn set_stalled(&mut self, stalled: bool) {
        self.stalled = stalled;
    }

    pub fn fail_on_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// Last angle this wheel was told to turn (deg)
    pub fn last_command(&self) -> f32 {
        self.last_command
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }
}

impl Peripheral for SimWheel {
    type Error = SimError;

    fn name(&self) -> &'static str {
        match self.side {
            Side::Right => "right wheel",
            Side::Left => "left wheel",
        }
    }

    fn connect(&mut self) -> Result<(), SimError> {
        if self.fail_connect {
            return Err(SimError::NotConnected(self.name()));
        }
        Ok(())
    }

    fn read(&mut self) -> Result<Measure, SimError> {
        Ok(Measure(self.encoder as f32))
    }

    fn write(&mut self, order: Order) -> Result<(), SimError> {
        self.set_speed(order.speed)?;
        self.rotate_by(order.angle, false)
    }
}

impl WheelActuator for SimWheel {
    fn set_speed(&mut self, speed: f32) -> Result<(), SimError> {
        self.speed = speed;
        Ok(())
    }

    fn rotate_by(&mut self, angle: f32, immediate_return: bool) -> Result<(), SimError> {
        self.last_command = angle;
        self.encoder += roundf(angle) as i32;
        self.remaining_polls = if immediate_return {
            self.polls_per_motion
        } else {
            0
        };
        self.world.borrow_mut().command(self.side, angle);
        Ok(())
    }

    fn reset_encoder(&mut self) -> Result<(), SimError> {
        self.encoder = 0;
        Ok(())
    }

    fn encoder_ticks_deg(&mut self) -> Result<i32, SimError> {
        Ok(self.encoder)
    }

    fn is_moving(&mut self) -> Result<bool, SimError> {
        if self.stalled || self.spinning {
            return Ok(true);
        }
        if self.remaining_polls > 0 {
            self.remaining_polls -= 1;
            return Ok(true);
        }
        Ok(false)
    }

    fn forward(&mut self) -> Result<(), SimError> {
        self.spinning = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SimError> {
        self.spinning = false;
        self.stalled = false;
        self.remaining_polls = 0;
        Ok(())
    }
}

/// Range sensor looking along the true heading of the rover
pub struct SimRangeSensor {
    world: SharedWorld,
    mount: SensorMount,
    max_range: f32,
    script: VecDeque<f32>,
    fail_connect: bool,
    fail_sample: bool,
}

impl SimRangeSensor {
    pub fn new(world: SharedWorld) -> Self {
        Self {
            world,
            mount: SensorMount::default(),
            max_range: DEFAULT_MAX_RANGE,
            script: VecDeque::new(),
            fail_connect: false,
            fail_sample: false,
        }
    }

    /// Sensor replaying `readings` before falling back to ray casting
    pub fn scripted<I: IntoIterator<Item = f32>>(world: SharedWorld, readings: I) -> Self {
        let mut sensor = Self::new(world);
        sensor.script.extend(readings);
        sensor
    }

    pub fn with_max_range(mut self, max_range: f32) -> Self {
        self.max_range = max_range;
        self
    }

    pub fn with_mount(mut self, mount: SensorMount) -> Self {
        self.mount = mount;
        self
    }

    pub fn fail_on_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// While failing, every reading errors out, scripted ones included
    pub fn set_failing(&mut self, failing: bool) {
        self.fail_sample = failing;
    }

    pub fn fail_on_sample(mut self) -> Self {
        self.set_failing(true);
        self
    }
}

impl Peripheral for SimRangeSensor {
    type Error = SimError;

    fn name(&self) -> &'static str {
        "range sensor"
    }

    fn connect(&mut self) -> Result<(), SimError> {
        if self.fail_connect {
            return Err(SimError::NotConnected(self.name()));
        }
        Ok(())
    }

    fn read(&mut self) -> Result<Measure, SimError> {
        self.sample_distance().map(Measure)
    }

    fn write(&mut self, _order: Order) -> Result<(), SimError> {
        Ok(())
    }
}

impl RangeSensor for SimRangeSensor {
    fn sample_distance(&mut self) -> Result<f32, SimError> {
        if self.fail_sample {
            return Err(SimError::SampleFailed(self.name()));
        }
        if let Some(reading) = self.script.pop_front() {
            return Ok(reading);
        }

        let world = self.world.borrow();
        let range = world
            .cast_ray(self.mount.origin(&world.pose), world.pose.heading)
            .filter(|range| *range <= self.max_range)
            .unwrap_or(OUT_OF_RANGE);
        Ok(range)
    }
}

/// Pliers picking up the object closest to the rover
pub struct SimGrabber {
    world: SharedWorld,
    closed: bool,
    fail_connect: bool,
}

impl SimGrabber {
    pub fn new(world: SharedWorld) -> Self {
        Self {
            world,
            closed: false,
            fail_connect: false,
        }
    }

    pub fn fail_on_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Peripheral for SimGrabber {
    type Error = SimError;

    fn name(&self) -> &'static str {
        "grabber"
    }

    fn connect(&mut self) -> Result<(), SimError> {
        if self.fail_connect {
            return Err(SimError::NotConnected(self.name()));
        }
        Ok(())
    }

    fn read(&mut self) -> Result<Measure, SimError> {
        Ok(Measure(if self.closed { 1.0 } else { 0.0 }))
    }

    fn write(&mut self, order: Order) -> Result<(), SimError> {
        if order.angle > 0.0 {
            self.grab()
        } else {
            self.release()
        }
    }
}

impl Grabber for SimGrabber {
    fn grab(&mut self) -> Result<(), SimError> {
        self.closed = true;
        let mut world = self.world.borrow_mut();
        let location = world.pose.location;
        let nearest = world
            .objects
            .iter()
            .enumerate()
            .map(|(index, object)| (index, distance(&object.center, &location)))
            .filter(|(_, range)| *range < GRAB_REACH)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(index, _)| index);

        if let Some(index) = nearest {
            let object = world.objects.remove(index);
            world.carried = Some(object);
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), SimError> {
        self.closed = false;
        let mut world = self.world.borrow_mut();
        if let Some(mut object) = world.carried.take() {
            object.center = world.pose.location;
            world.objects.push(object);
        }
        Ok(())
    }
}

/// Battery replaying a list of readings, repeating the last one
pub struct SimBattery {
    readings: VecDeque<u32>,
}

impl SimBattery {
    pub fn new<I: IntoIterator<Item = u32>>(readings: I) -> Self {
        Self {
            readings: readings.into_iter().collect(),
        }
    }
}

impl Battery for SimBattery {
    type Error = SimError;

    fn voltage_mv(&mut self) -> Result<u32, SimError> {
        if self.readings.len() > 1 {
            return self.readings.pop_front().ok_or(SimError::NoReading);
        }
        self.readings.front().copied().ok_or(SimError::NoReading)
    }
}

/// Feedback sink recording every signal
#[derive(Debug, Default)]
pub struct SimFeedback {
    pub signals: Vec<(Light, Tone)>,
}

impl FeedbackSink for SimFeedback {
    fn signal(&mut self, light: Light, tone: Tone) {
        self.signals.push((light, tone));
    }
}

/// Operator who presses the button immediately
#[derive(Debug, Default)]
pub struct SimOperator {
    pub presses: usize,
}

impl OperatorPanel for SimOperator {
    fn wait_for_press(&mut self) {
        self.presses += 1;
    }
}

/// Delay that only counts how long it was asked to wait
#[derive(Debug, Default)]
pub struct NoopDelay {
    pub elapsed_ms: u32,
}

impl DelayMs<u32> for NoopDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.elapsed_ms = self.elapsed_ms.saturating_add(ms);
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use motion::KinematicConstants;

    const TOLERANCE: f32 = 0.0001;

    fn within_tolerance(value: f32, target: f32) -> bool {
        target > value - TOLERANCE && target < value + TOLERANCE
    }

    fn world() -> SharedWorld {
        let drive =
            DifferentialDrive::new(KinematicConstants::new(0.0275, 0.0535).unwrap()).unwrap();
        SimWorld::shared(Pose::default(), drive)
    }

    #[test]
    fn test_ray_hits_near_surface() {
        let world = world();
        world
            .borrow_mut()
            .objects
            .push(SimObject::new(Point2::new(1.0, 0.0), 0.1));

        let hit = world.borrow().cast_ray(Point2::origin(), 0.0).unwrap();
        assert!(within_tolerance(hit, 0.9));
        assert!(world.borrow().cast_ray(Point2::origin(), 180.0).is_none());
        assert!(world.borrow().cast_ray(Point2::origin(), 45.0).is_none());
    }

    #[test]
    fn test_pose_moves_once_both_wheels_commanded() {
        let world = world();
        let mut right = SimWheel::right(world.clone());
        let mut left = SimWheel::left(world.clone());
        let wheels = world.borrow().drive.travel_to_wheels(0.2);

        right.rotate_by(wheels.right, true).unwrap();
        assert_eq!(world.borrow().pose.x(), 0.0);
        left.rotate_by(wheels.left, true).unwrap();
        assert!(within_tolerance(world.borrow().pose.x(), 0.2));
    }

    #[test]
    fn test_grab_and_release_move_object() {
        let world = world();
        world
            .borrow_mut()
            .objects
            .push(SimObject::new(Point2::new(0.1, 0.0), 0.03));
        let mut grabber = SimGrabber::new(world.clone());

        grabber.grab().unwrap();
        assert!(world.borrow().objects.is_empty());

        world.borrow_mut().pose = Pose::new(0.5, 0.5, 0.0);
        grabber.release().unwrap();
        assert_eq!(world.borrow().objects[0].center, Point2::new(0.5, 0.5));
    }

    #[test]
    fn test_battery_repeats_last_reading() {
        let mut battery = SimBattery::new([8_100, 7_900]);

        assert_eq!(battery.voltage_mv(), Ok(8_100));
        assert_eq!(battery.voltage_mv(), Ok(7_900));
        assert_eq!(battery.voltage_mv(), Ok(7_900));
        assert_eq!(SimBattery::new(core::iter::empty()).voltage_mv(), Err(SimError::NoReading));
    }

    #[test]
    fn test_generic_orders_and_measures() {
        let world = world();
        world
            .borrow_mut()
            .objects
            .push(SimObject::new(Point2::new(0.1, 0.0), 0.03));
        let mut wheel = SimWheel::right(world.clone());
        let mut grabber = SimGrabber::new(world.clone());

        wheel.write(Order { speed: 45.0, angle: 30.4 }).unwrap();
        assert_eq!(wheel.speed(), 45.0);
        assert_eq!(wheel.read(), Ok(Measure(30.0)));
        assert!(!wheel.is_moving().unwrap());

        grabber.write(Order { speed: 10.0, angle: 90.0 }).unwrap();
        assert_eq!(grabber.read(), Ok(Measure(1.0)));
        assert!(world.borrow().carried.is_some());
        grabber.write(Order::default()).unwrap();
        assert_eq!(grabber.read(), Ok(Measure(0.0)));
    }

    #[test]
    fn test_failing_range_sensor() {
        let mut sensor = SimRangeSensor::scripted(world(), [0.5]).fail_on_sample();

        assert_eq!(sensor.read(), Err(SimError::SampleFailed("range sensor")));
        sensor.set_failing(false);
        assert_eq!(sensor.sample_distance(), Ok(0.5));
    }
}
