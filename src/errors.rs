//!
//! Errors raised by the navigation core
//!

use crate::mission::MissionState;
use crate::peripherals::PeripheralFaults;

/// Invalid zone geometry
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoneError {
    /// A width, length or diameter was zero, negative or NaN
    NonPositiveDimension { what: &'static str, value: f32 },
}

/// Invalid mission configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigError {
    Zone(ZoneError),
    /// A threshold or length that must be strictly positive was not
    NonPositive { what: &'static str, value: f32 },
    /// The approach fraction must lie in (0, 1]
    ApproachFraction(f32),
    /// The sweep step must not exceed the sweep itself
    StepLargerThanSweep { sweep_deg: f32, step_deg: f32 },
    /// A mission needs at least one sample to harvest
    NoSamplesToHarvest,
    /// A waypoint lies outside of the operating zone
    WaypointOutsideZone { index: usize },
}

impl From<ZoneError> for ConfigError {
    fn from(value: ZoneError) -> Self {
        Self::Zone(value)
    }
}

/// Errors from the navigator
#[derive(Debug)]
pub enum NavigatorError<WheelError> {
    /// A wheel actuator reported an error
    Actuator(WheelError),
    /// The wheels did not stop within the configured time.  Both wheels were
    /// told to stop before this was returned.
    MotionTimeout { waited_ms: u32 },
}

/// Errors from a scan
#[derive(Debug)]
pub enum ScannerError<WheelError, SensorError> {
    Navigator(NavigatorError<WheelError>),
    /// The range sensor failed outright (not an out of range reading)
    Sensor(SensorError),
    /// The angular step is not strictly positive
    InvalidSweep { step_deg: f32 },
}

impl<WE, SE> From<NavigatorError<WE>> for ScannerError<WE, SE> {
    fn from(value: NavigatorError<WE>) -> Self {
        Self::Navigator(value)
    }
}

/// Fatal mission errors.  Every one of these ends in the Error state.
#[derive(Debug)]
pub enum MissionError<WheelError, SensorError, GrabberError, BatteryError> {
    Navigator(NavigatorError<WheelError>),
    Sensor(SensorError),
    Grabber(GrabberError),
    Battery(BatteryError),
    /// At least one peripheral failed to connect during diagnostics
    PeripheralFaults(PeripheralFaults),
    /// The battery is below the configured threshold
    LowBattery { millivolts: u32 },
    /// The mission script requested a transition the state machine forbids
    InvalidTransition { from: MissionState, to: MissionState },
    InvalidSweep { step_deg: f32 },
}

impl<WE, SE, GE, BE> From<NavigatorError<WE>> for MissionError<WE, SE, GE, BE> {
    fn from(value: NavigatorError<WE>) -> Self {
        Self::Navigator(value)
    }
}

impl<WE, SE, GE, BE> From<ScannerError<WE, SE>> for MissionError<WE, SE, GE, BE> {
    fn from(value: ScannerError<WE, SE>) -> Self {
        match value {
            ScannerError::Navigator(err) => Self::Navigator(err),
            ScannerError::Sensor(err) => Self::Sensor(err),
            ScannerError::InvalidSweep { step_deg } => Self::InvalidSweep { step_deg },
        }
    }
}
