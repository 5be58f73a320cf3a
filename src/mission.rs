//!
//! Mission Controller
//!
//! Runs the fixed mission script: land, run diagnostics, then alternate
//! between exploring for a new sample and harvesting it until enough samples
//! sit in the recovery zone, then go to sleep.  Any failure ends in the
//! terminal Error state.
//!

use alloc::vec;
use alloc::vec::Vec;

use embedded_hal::blocking::delay::DelayMs;
use libm::floorf;
use log::{debug, error, info, warn};
use motion::{nearest_equivalent_heading, DifferentialDrive, Pose};
use nalgebra::{distance, Point2};

use crate::config::MissionConfig;
use crate::errors::{ConfigError, MissionError};
use crate::navigator::Navigator;
use crate::peripherals::{
    is_out_of_range, Battery, BlinkPattern, FeedbackSink, Grabber, Light, LightColor, Measure,
    OperatorPanel, Peripheral, PeripheralFaults, RangeSensor, Tone, WheelActuator, OUT_OF_RANGE,
};
use crate::scanner::{is_arrived, DetectedObject, KnownSamples, Scanner};
use crate::zone::Zone;

/// Fatal error of a mission running on the given peripherals
pub type MissionFault<W, S, G, B> = MissionError<
    <W as Peripheral>::Error,
    <S as Peripheral>::Error,
    <G as Peripheral>::Error,
    <B as Battery>::Error,
>;

/// The mode the rover is in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissionState {
    #[default]
    Landing,
    Diagnostic,
    Exploration,
    Harvest,
    Wait,
    Sleep,
    Error,
}

impl MissionState {
    /// Whether the script may go from this state to `next`
    pub fn can_transition_to(&self, next: MissionState) -> bool {
        use MissionState::*;

        match (*self, next) {
            (Error, _) => false,
            (_, Error) => true,
            (Sleep, _) => false,
            (Landing, Diagnostic)
            | (Diagnostic, Exploration)
            | (Diagnostic, Wait)
            | (Exploration, Harvest)
            | (Exploration, Sleep)
            | (Harvest, Diagnostic)
            | (Harvest, Exploration)
            | (Harvest, Sleep)
            | (Wait, Exploration) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sleep | Self::Error)
    }

    /// Light and jingle announcing this mode
    pub fn feedback(&self) -> (Light, Tone) {
        let (color, pattern, code) = match self {
            Self::Landing => (LightColor::Green, BlinkPattern::Slow, 1),
            Self::Diagnostic => (LightColor::Orange, BlinkPattern::Fast, 2),
            Self::Error => (LightColor::Red, BlinkPattern::Fast, 3),
            Self::Exploration => (LightColor::Green, BlinkPattern::Slow, 4),
            Self::Harvest => (LightColor::Green, BlinkPattern::Fast, 5),
            Self::Wait => (LightColor::Orange, BlinkPattern::Slow, 6),
            Self::Sleep => (LightColor::Orange, BlinkPattern::Still, 7),
        };
        (Light::new(color, pattern), Tone::Sequence(code))
    }
}

/// Coarse battery charge, one level per volt
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BatteryLevel {
    Critical,
    VeryLow,
    Low,
    Fine,
    Half,
    Good,
    VeryGood,
    AlmostFull,
    Full,
}

impl BatteryLevel {
    pub fn from_millivolts(millivolts: u32) -> Self {
        match millivolts / 1000 {
            0 => Self::Critical,
            1 => Self::VeryLow,
            2 => Self::Low,
            3 => Self::Fine,
            4 => Self::Half,
            5 => Self::Good,
            6 => Self::VeryGood,
            7 => Self::AlmostFull,
            _ => Self::Full,
        }
    }

    pub fn light(&self) -> Light {
        let (color, pattern) = match self {
            Self::Full => (LightColor::Green, BlinkPattern::Still),
            Self::AlmostFull => (LightColor::Green, BlinkPattern::Slow),
            Self::VeryGood => (LightColor::Green, BlinkPattern::Fast),
            Self::Good => (LightColor::Orange, BlinkPattern::Still),
            Self::Half => (LightColor::Orange, BlinkPattern::Slow),
            Self::Fine => (LightColor::Orange, BlinkPattern::Fast),
            Self::Low => (LightColor::Red, BlinkPattern::Still),
            Self::VeryLow => (LightColor::Red, BlinkPattern::Slow),
            Self::Critical => (LightColor::Red, BlinkPattern::Fast),
        };
        Light::new(color, pattern)
    }
}

/// Serpentine path through the cells of a rectangular zone, one waypoint at
/// the center of each `spacing` sized cell.  A circular zone yields its center.
pub fn default_waypoints(zone: &Zone, spacing: f32) -> Vec<Point2<f32>> {
    let (center, width, length) = match *zone {
        Zone::Rectangle {
            center,
            width,
            length,
        } => (center, width, length),
        Zone::Circle { center, .. } => return vec![center],
    };
    if !(spacing > 0.0) {
        return vec![center];
    }

    let columns = (floorf(length / spacing + 1e-4) as usize).max(1);
    let rows = (floorf(width / spacing + 1e-4) as usize).max(1);
    let cell_length = length / columns as f32;
    let cell_width = width / rows as f32;
    let start = Point2::new(
        center.x - length / 2.0 + cell_length / 2.0,
        center.y - width / 2.0 + cell_width / 2.0,
    );

    let mut waypoints = Vec::with_capacity(rows * columns);
    for row in 0..rows {
        for step in 0..columns {
            let column = if row % 2 == 0 { step } else { columns - 1 - step };
            waypoints.push(Point2::new(
                start.x + column as f32 * cell_length,
                start.y + row as f32 * cell_width,
            ));
        }
    }
    waypoints
}

/// Everything the rover is wired to
pub struct RoverPeripherals<W, D, S, G, B, F, P> {
    pub right_wheel: W,
    pub left_wheel: W,
    pub delay: D,
    pub range_sensor: S,
    pub grabber: G,
    pub battery: B,
    pub feedback: F,
    pub panel: P,
}

/// Outcome of a mission that reached Sleep
#[derive(Debug, Clone, PartialEq)]
pub struct MissionReport {
    pub final_state: MissionState,
    pub harvested: usize,
    pub known_samples: Vec<DetectedObject>,
    pub final_pose: Pose,
}

pub struct Mission<W, D, S, G, B, F, P> {
    config: MissionConfig,
    navigator: Navigator<W, D>,
    scanner: Scanner<S>,
    grabber: G,
    battery: B,
    feedback: F,
    panel: P,
    state: MissionState,
    known: KnownSamples,
    // new samples seen but not harvested yet
    pending: Vec<DetectedObject>,
    next_waypoint: usize,
    harvested: usize,
}

impl<W, D, S, G, B, F, P> Mission<W, D, S, G, B, F, P>
where
    W: WheelActuator,
    D: DelayMs<u32>,
    S: RangeSensor,
    G: Grabber,
    B: Battery,
    F: FeedbackSink,
    P: OperatorPanel,
{
    /// Build a mission.  The rover starts at the origin of its relative frame.
    pub fn new(
        config: MissionConfig,
        drive: DifferentialDrive,
        peripherals: RoverPeripherals<W, D, S, G, B, F, P>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let navigator = Navigator::new(
            Pose::default(),
            drive,
            peripherals.right_wheel,
            peripherals.left_wheel,
            peripherals.delay,
            config.motion_timeout_ms,
        )
        .with_poll_interval(config.poll_interval_ms);
        let scanner = Scanner::new(
            peripherals.range_sensor,
            config.sensor_mount,
            config.max_object_size,
        );

        Ok(Self {
            known: KnownSamples::new(config.min_dist_detection),
            config,
            navigator,
            scanner,
            grabber: peripherals.grabber,
            battery: peripherals.battery,
            feedback: peripherals.feedback,
            panel: peripherals.panel,
            state: MissionState::Landing,
            pending: Vec::new(),
            next_waypoint: 0,
            harvested: 0,
        })
    }

    pub fn state(&self) -> MissionState {
        self.state
    }

    pub fn harvested(&self) -> usize {
        self.harvested
    }

    pub fn known_samples(&self) -> &KnownSamples {
        &self.known
    }

    pub fn navigator(&self) -> &Navigator<W, D> {
        &self.navigator
    }

    pub fn navigator_mut(&mut self) -> &mut Navigator<W, D> {
        &mut self.navigator
    }

    pub fn feedback(&self) -> &F {
        &self.feedback
    }

    pub fn panel(&self) -> &P {
        &self.panel
    }

    /// Run the whole mission.  On failure the rover is left in the Error
    /// state after the operator acknowledged it.
    pub fn run(&mut self) -> Result<MissionReport, MissionFault<W, S, G, B>> {
        match self.run_script() {
            Ok(()) => Ok(self.report()),
            Err(err) => {
                error!("Mission aborted in {:?}: {:?}", self.state, err);
                self.enter_error();
                Err(err)
            }
        }
    }

    pub fn report(&self) -> MissionReport {
        MissionReport {
            final_state: self.state,
            harvested: self.harvested,
            known_samples: self.known.as_slice().to_vec(),
            final_pose: *self.navigator.pose(),
        }
    }

    fn run_script(&mut self) -> Result<(), MissionFault<W, S, G, B>> {
        self.land();

        self.transition(MissionState::Diagnostic)?;
        self.connect_peripherals()?;
        self.navigator.set_speed(self.config.wheel_speed)?;
        self.check_battery()?;

        self.transition(MissionState::Exploration)?;
        while let Some(target) = self.explore()? {
            self.transition(MissionState::Harvest)?;
            self.harvest(&target)?;
            self.harvested += 1;
            info!(
                "Harvested {} of {} samples",
                self.harvested, self.config.samples_to_harvest
            );

            if self.harvested >= self.config.samples_to_harvest {
                break;
            }

            self.transition(MissionState::Diagnostic)?;
            self.check_battery()?;
            if self.config.pause_between_harvests {
                self.transition(MissionState::Wait)?;
                self.panel.wait_for_press();
            }
            self.transition(MissionState::Exploration)?;
        }

        self.transition(MissionState::Sleep)?;
        self.panel.wait_for_press();
        Ok(())
    }

    fn land(&mut self) {
        info!("Landing");
        let (light, tone) = self.state.feedback();
        self.feedback.signal(light, tone);
        self.panel.wait_for_press();
    }

    fn transition(&mut self, next: MissionState) -> Result<(), MissionFault<W, S, G, B>> {
        if !self.state.can_transition_to(next) {
            return Err(MissionError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        info!("Mode {:?} -> {:?}", self.state, next);
        self.state = next;
        let (light, tone) = next.feedback();
        self.feedback.signal(light, tone);
        Ok(())
    }

    fn enter_error(&mut self) {
        if self.state.can_transition_to(MissionState::Error) {
            info!("Mode {:?} -> {:?}", self.state, MissionState::Error);
            self.state = MissionState::Error;
            let (light, tone) = self.state.feedback();
            self.feedback.signal(light, tone);
        }
        if let Err(err) = self.navigator.stop() {
            warn!("Unable to stop the wheels: {:?}", err);
        }
        self.panel.wait_for_press();
    }

    /// Connect every peripheral and take one reading from it, beeping once
    /// per device that answered and twice per device that did not.
    pub fn connect_peripherals(&mut self) -> Result<(), MissionFault<W, S, G, B>> {
        let mut faults = PeripheralFaults::empty();

        connect_one(
            self.scanner.sensor_mut(),
            PeripheralFaults::RANGE_SENSOR,
            &mut faults,
            &mut self.feedback,
        );
        connect_one(
            &mut self.grabber,
            PeripheralFaults::GRABBER,
            &mut faults,
            &mut self.feedback,
        );
        let (right, left) = self.navigator.wheels_mut();
        connect_one(right, PeripheralFaults::RIGHT_WHEEL, &mut faults, &mut self.feedback);
        connect_one(left, PeripheralFaults::LEFT_WHEEL, &mut faults, &mut self.feedback);

        if faults.is_empty() {
            Ok(())
        } else {
            error!("Peripheral faults: {:#06b}", faults.bits());
            Err(MissionError::PeripheralFaults(faults))
        }
    }

    /// Log the battery level and fail below the configured threshold
    pub fn check_battery(&mut self) -> Result<BatteryLevel, MissionFault<W, S, G, B>> {
        let millivolts = self.battery.voltage_mv().map_err(MissionError::Battery)?;
        let level = BatteryLevel::from_millivolts(millivolts);
        info!("Battery {:?} with {} mV", level, millivolts);
        self.feedback.signal(level.light(), Tone::None);

        if millivolts < self.config.battery_threshold_mv {
            return Err(MissionError::LowBattery { millivolts });
        }
        Ok(level)
    }

    /// Sweep, and walk the waypoint path until a sample that has not been
    /// targeted yet shows up.  Returns `None` once the path is exhausted.
    pub fn explore(&mut self) -> Result<Option<DetectedObject>, MissionFault<W, S, G, B>> {
        loop {
            let detections = self.scanner.sweep(
                &mut self.navigator,
                &self.config.zones,
                self.config.sweep_deg,
                self.config.step_deg,
            )?;

            let min_dist = self.config.min_dist_detection;
            for detection in detections {
                let pending = self
                    .pending
                    .iter()
                    .any(|p| distance(&p.position, &detection.position) < min_dist);
                if !pending && self.known.is_new_sample(&detection.position) {
                    debug!("Candidate sample at {:?}", detection.position);
                    self.pending.push(detection);
                }
            }

            let pose = *self.navigator.pose();
            let closest = self
                .pending
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    pose.distance_to(&a.position)
                        .total_cmp(&pose.distance_to(&b.position))
                })
                .map(|(index, _)| index);

            if let Some(index) = closest {
                let target = self.pending.remove(index);
                self.known.commit(target);
                return Ok(Some(target));
            }

            match self.config.waypoints.get(self.next_waypoint).copied() {
                Some(waypoint) => {
                    self.next_waypoint += 1;
                    self.navigator.go_to(&waypoint)?;
                }
                None => {
                    info!("Exploration path exhausted");
                    return Ok(None);
                }
            }
        }
    }

    /// Approach `target`, pick it up, drop it in the recovery zone and back off
    pub fn harvest(&mut self, target: &DetectedObject) -> Result<(), MissionFault<W, S, G, B>> {
        let pose = *self.navigator.pose();
        let bearing = nearest_equivalent_heading(pose.bearing_to(&target.position), pose.heading);
        self.navigator.rotate_to(bearing, true)?;
        self.approach()?;

        self.grabber.grab().map_err(MissionError::Grabber)?;
        let recovery = self.config.zones.recovery.center();
        self.navigator.go_to(&recovery)?;
        self.grabber.release().map_err(MissionError::Grabber)?;
        self.navigator.travel(-self.config.back_off_m, true)?;

        Ok(())
    }

    /// Close in on the sample straight ahead, covering `approach_fraction` of
    /// the remaining range per step while sampling on the way.  The last echo
    /// of a step sizes the next one.  Returns the final range, or
    /// [`OUT_OF_RANGE`] when the sample got too close to be seen.
    fn approach(&mut self) -> Result<f32, MissionFault<W, S, G, B>> {
        let min_dist = self.config.min_dist_detection;
        let mut last_echo = None;
        let mut steps = 0;

        loop {
            let mut range = match last_echo.take() {
                Some(range) => range,
                None => self.sample()?,
            };
            if is_out_of_range(range) {
                range = self.reacquire()?;
                if is_out_of_range(range) {
                    info!("Sample too close to be seen");
                    return Ok(OUT_OF_RANGE);
                }
            }

            if is_arrived(range, min_dist) {
                info!("Arrived on sample at {} m", range);
                return Ok(range);
            }

            if steps >= self.config.max_approach_steps {
                warn!("Giving up the approach {} m away", range);
                return Ok(range);
            }

            let samples = self
                .scanner
                .sample_during_travel(&mut self.navigator, range * self.config.approach_fraction)?;
            steps += 1;

            if let Some(range) = samples.iter().copied().find(|r| is_arrived(*r, min_dist)) {
                info!("Arrived on sample at {} m while moving", range);
                return Ok(range);
            }
            last_echo = samples.iter().rev().copied().find(|r| !is_out_of_range(*r));
        }
    }

    /// Probe on both sides of the current heading for a lost sample.  Stays
    /// on the heading it was found on, or rotates back to the starting heading.
    fn reacquire(&mut self) -> Result<f32, MissionFault<W, S, G, B>> {
        let origin = self.navigator.pose().heading;

        for side in [1.0, -1.0] {
            for probe in 1..=self.config.probe_count {
                let heading = origin + side * probe as f32 * self.config.probe_step_deg;
                self.navigator.rotate_to(heading, true)?;

                let range = self.sample()?;
                if !is_out_of_range(range) {
                    debug!("Sample found again at {} deg", heading);
                    return Ok(range);
                }
            }
        }

        self.navigator.rotate_to(origin, true)?;
        Ok(OUT_OF_RANGE)
    }

    fn sample(&mut self) -> Result<f32, MissionFault<W, S, G, B>> {
        self.scanner.sample().map_err(MissionError::Sensor)
    }
}

fn connect_one<T: Peripheral, F: FeedbackSink>(
    device: &mut T,
    flag: PeripheralFaults,
    faults: &mut PeripheralFaults,
    feedback: &mut F,
) {
    let (light, _) = MissionState::Diagnostic.feedback();
    match device.connect().and_then(|()| device.read()) {
        Ok(Measure(value)) => {
            info!("con. {}: ok", device.name());
            debug!("{} reads {}", device.name(), value);
            feedback.signal(light, Tone::Beep);
        }
        Err(err) => {
            error!("con. {}: ko ({:?})", device.name(), err);
            faults.insert(flag);
            feedback.signal(light, Tone::TwoBeeps);
        }
    }
}
