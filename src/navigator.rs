//!
//! Navigator
//!
//! Turns rotation and travel requests into wheel targets for the two tracks
//! and keeps the dead-reckoned pose consistent with what the wheels did.
//!
//! Blocking commands update the pose from the commanded motion once both
//! wheels have stopped.  Non-blocking commands leave the pose alone, the
//! caller reconciles it later from the encoders with [`Navigator::compute_new_heading`]
//! or [`Navigator::compute_new_location`].
//!

use alloc::vec::Vec;

use embedded_hal::blocking::delay::DelayMs;
use log::{debug, error, info, warn};
use motion::{
    nearest_equivalent_heading, DifferentialDrive, EncoderSnapshot, MotionCommand, Pose,
    WheelAngles,
};
use nalgebra::{Point2, Vector2};

use crate::errors::NavigatorError;
use crate::peripherals::{RangeSensor, WheelActuator, OUT_OF_RANGE};

/// Default time between two polls of the wheels (ms)
pub const DEFAULT_POLL_INTERVAL_MS: u32 = 10;

/// Targets closer than this are considered reached by `go_to` (m)
const ARRIVAL_EPSILON: f32 = 0.001;

pub struct Navigator<W, D> {
    pose: Pose,
    drive: DifferentialDrive,
    right: W,
    left: W,
    delay: D,
    // the longest a blocking motion may last (ms)
    timeout_ms: u32,
    poll_interval_ms: u32,
}

impl<W, D> Navigator<W, D>
where
    W: WheelActuator,
    D: DelayMs<u32>,
{
    pub fn new(
        pose: Pose,
        drive: DifferentialDrive,
        right: W,
        left: W,
        delay: D,
        timeout_ms: u32,
    ) -> Self {
        Self {
            pose,
            drive,
            right,
            left,
            delay,
            timeout_ms,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval_ms: u32) -> Self {
        self.poll_interval_ms = poll_interval_ms.max(1);
        self
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn drive(&self) -> &DifferentialDrive {
        &self.drive
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    /// Overwrite the heading without moving
    pub fn set_heading(&mut self, heading: f32) {
        self.pose.set_heading(heading);
    }

    /// Move the pose `distance` meters along the heading without moving the wheels
    pub fn add_distance(&mut self, distance: f32) {
        self.pose.move_along_heading(distance);
    }

    /// The (right, left) wheels
    pub fn wheels_mut(&mut self) -> (&mut W, &mut W) {
        (&mut self.right, &mut self.left)
    }

    pub fn set_speed(&mut self, speed: f32) -> Result<(), NavigatorError<W::Error>> {
        self.right.set_speed(speed).map_err(NavigatorError::Actuator)?;
        self.left.set_speed(speed).map_err(NavigatorError::Actuator)
    }

    /// Run a motion command.
    ///
    /// Both wheels are always started without waiting so the tracks move
    /// together; a blocking command then waits for them to stop and applies
    /// the commanded motion to the pose.
    pub fn execute(&mut self, command: MotionCommand) -> Result<(), NavigatorError<W::Error>> {
        let wheels = command.wheel_angles(&self.drive, self.pose.heading);
        debug!(
            "{:?}: right {} deg, left {} deg",
            command, wheels.right, wheels.left
        );
        self.command_wheels(wheels)?;

        if !command.is_blocking() {
            return Ok(());
        }

        self.wait_until_stopped()?;
        match command {
            MotionCommand::Rotate { angle, .. } => self.pose.rotate_by(angle),
            MotionCommand::RotateTo { heading, .. } => self.pose.set_heading(heading),
            MotionCommand::Travel { distance, .. } => self.pose.move_along_heading(distance),
        }

        Ok(())
    }

    /// Rotate in place by `angle` degrees (counterclockwise positive)
    pub fn rotate(&mut self, angle: f32, blocking: bool) -> Result<(), NavigatorError<W::Error>> {
        self.execute(MotionCommand::Rotate { angle, blocking })
    }

    /// Rotate in place until the heading is `heading` degrees.  Once a blocking
    /// rotation completes the heading is set to exactly `heading`.
    pub fn rotate_to(
        &mut self,
        heading: f32,
        blocking: bool,
    ) -> Result<(), NavigatorError<W::Error>> {
        self.execute(MotionCommand::RotateTo { heading, blocking })
    }

    /// Travel `distance` meters along the current heading (negative backs up)
    pub fn travel(&mut self, distance: f32, blocking: bool) -> Result<(), NavigatorError<W::Error>> {
        self.execute(MotionCommand::Travel { distance, blocking })
    }

    /// Reset both encoders then start a rotation without waiting
    pub fn setup_rotate(&mut self, angle: f32) -> Result<(), NavigatorError<W::Error>> {
        self.reset_encoders()?;
        self.rotate(angle, false)
    }

    /// Reset both encoders then start a travel without waiting
    pub fn setup_travel(&mut self, distance: f32) -> Result<(), NavigatorError<W::Error>> {
        self.reset_encoders()?;
        self.travel(distance, false)
    }

    /// Add the rotation measured by the encoders since their last reset to
    /// the heading.  Returns the rotation (deg).
    pub fn compute_new_heading(&mut self) -> Result<f32, NavigatorError<W::Error>> {
        let snapshot = self.encoder_snapshot()?;
        let rotation = self.drive.wheels_to_rotation(snapshot);
        self.pose.rotate_by(rotation);
        debug!("Reconciled rotation {} deg from {:?}", rotation, snapshot);

        Ok(rotation)
    }

    /// Move the location by the travel measured by the encoders since their
    /// last reset, along the current heading.  Returns the displacement (m).
    pub fn compute_new_location(&mut self) -> Result<Vector2<f32>, NavigatorError<W::Error>> {
        let snapshot = self.encoder_snapshot()?;
        let distance = self.drive.wheels_to_travel(snapshot);
        let displacement = self.pose.direction() * distance;
        self.pose.location += displacement;
        debug!("Reconciled travel {} m from {:?}", distance, snapshot);

        Ok(displacement)
    }

    /// Face `target` then drive straight to it.  Returns the distance travelled (m).
    pub fn go_to(&mut self, target: &Point2<f32>) -> Result<f32, NavigatorError<W::Error>> {
        let distance = self.pose.distance_to(target);
        if distance < ARRIVAL_EPSILON {
            return Ok(0.0);
        }

        let bearing = nearest_equivalent_heading(self.pose.bearing_to(target), self.pose.heading);
        info!(
            "Going to ({}, {}): {} m at {} deg",
            target.x, target.y, distance, bearing
        );
        self.rotate_to(bearing, true)?;
        self.travel(distance, true)?;

        Ok(distance)
    }

    /// True while either wheel is turning
    pub fn is_moving(&mut self) -> Result<bool, NavigatorError<W::Error>> {
        let right = self.right.is_moving().map_err(NavigatorError::Actuator)?;
        let left = self.left.is_moving().map_err(NavigatorError::Actuator)?;
        Ok(right || left)
    }

    /// Drive both wheels forward at their current speed.  The pose is not updated.
    pub fn forward(&mut self) -> Result<(), NavigatorError<W::Error>> {
        self.right.forward().map_err(NavigatorError::Actuator)?;
        self.left.forward().map_err(NavigatorError::Actuator)
    }

    pub fn stop(&mut self) -> Result<(), NavigatorError<W::Error>> {
        self.right.stop().map_err(NavigatorError::Actuator)?;
        self.left.stop().map_err(NavigatorError::Actuator)
    }

    /// Wait for both wheels to stop
    pub fn wait_until_stopped(&mut self) -> Result<(), NavigatorError<W::Error>> {
        self.wait_until_stopped_with(|_| {})
    }

    /// Wait for both wheels to stop, calling `on_poll` once per poll cycle
    /// with the (not yet reconciled) pose.
    ///
    /// Gives up after the navigator's timeout: both wheels are stopped and
    /// [`NavigatorError::MotionTimeout`] is returned.
    pub fn wait_until_stopped_with<F>(&mut self, mut on_poll: F) -> Result<(), NavigatorError<W::Error>>
    where
        F: FnMut(&Pose),
    {
        let mut remaining = self.timeout_ms;
        loop {
            on_poll(&self.pose);

            if !self.is_moving()? {
                return Ok(());
            }

            if remaining == 0 {
                error!("Wheels still moving after {} ms", self.timeout_ms);
                if let Err(err) = self.stop() {
                    warn!("Unable to stop the wheels: {:?}", err);
                }
                return Err(NavigatorError::MotionTimeout {
                    waited_ms: self.timeout_ms,
                });
            }

            let step = self.poll_interval_ms.min(remaining);
            self.delay.delay_ms(step);
            remaining -= step;
        }
    }

    /// Start a travel and sample `sensor` on every poll until the wheels
    /// stop, then reconcile the location from the encoders.
    ///
    /// A failing sensor is reported as out of range for that sample.
    pub fn travel_and_sample<S: RangeSensor>(
        &mut self,
        distance: f32,
        sensor: &mut S,
    ) -> Result<Vec<f32>, NavigatorError<W::Error>> {
        self.setup_travel(distance)?;
        let samples = self.sample_until_stopped(sensor)?;
        self.compute_new_location()?;
        Ok(samples)
    }

    /// Start a rotation and sample `sensor` on every poll until the wheels
    /// stop, then reconcile the heading from the encoders.
    pub fn rotate_and_sample<S: RangeSensor>(
        &mut self,
        angle: f32,
        sensor: &mut S,
    ) -> Result<Vec<f32>, NavigatorError<W::Error>> {
        self.setup_rotate(angle)?;
        let samples = self.sample_until_stopped(sensor)?;
        self.compute_new_heading()?;
        Ok(samples)
    }

    fn sample_until_stopped<S: RangeSensor>(
        &mut self,
        sensor: &mut S,
    ) -> Result<Vec<f32>, NavigatorError<W::Error>> {
        let mut samples = Vec::new();
        self.wait_until_stopped_with(|_| {
            let distance = sensor.sample_distance().unwrap_or_else(|err| {
                warn!("{} error: {:?}", sensor.name(), err);
                OUT_OF_RANGE
            });
            samples.push(distance);
        })?;
        Ok(samples)
    }

    fn command_wheels(&mut self, wheels: WheelAngles) -> Result<(), NavigatorError<W::Error>> {
        self.right
            .rotate_by(wheels.right, true)
            .map_err(NavigatorError::Actuator)?;
        self.left
            .rotate_by(wheels.left, true)
            .map_err(NavigatorError::Actuator)
    }

    fn reset_encoders(&mut self) -> Result<(), NavigatorError<W::Error>> {
        self.right.reset_encoder().map_err(NavigatorError::Actuator)?;
        self.left.reset_encoder().map_err(NavigatorError::Actuator)
    }

    fn encoder_snapshot(&mut self) -> Result<EncoderSnapshot, NavigatorError<W::Error>> {
        Ok(EncoderSnapshot {
            right_ticks_deg: self
                .right
                .encoder_ticks_deg()
                .map_err(NavigatorError::Actuator)?,
            left_ticks_deg: self
                .left
                .encoder_ticks_deg()
                .map_err(NavigatorError::Actuator)?,
        })
    }
}
