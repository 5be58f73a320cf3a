//!
//! Peripheral Capability Definitions
//!
//! Every device the rover talks to is reached through one of these traits so
//! the navigation core can run against real hardware or the simulated devices
//! in [`crate::sim`].
//!

use core::fmt::Debug;

use bitflags::bitflags;

/// Distance reported by a range sensor when no echo came back
pub const OUT_OF_RANGE: f32 = f32::MAX;

/// True when `distance` means "nothing along this ray"
pub fn is_out_of_range(distance: f32) -> bool {
    !distance.is_finite() || distance >= OUT_OF_RANGE
}

/// A single reading from a peripheral
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measure(pub f32);

/// A generic order for a peripheral.  Wheels interpret it as a speed (deg/s)
/// and a relative rotation (deg), the grabber as a jaw speed and opening angle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Order {
    pub speed: f32,
    pub angle: f32,
}

/// Behavior shared by every connected device
pub trait Peripheral {
    type Error: Debug;

    /// Short human readable name used in diagnostics
    fn name(&self) -> &'static str;

    /// Establish the connection with the device
    fn connect(&mut self) -> Result<(), Self::Error>;

    fn read(&mut self) -> Result<Measure, Self::Error>;

    fn write(&mut self, order: Order) -> Result<(), Self::Error>;
}

/// One drive wheel with its motor and encoder
pub trait WheelActuator: Peripheral {
    /// Set the speed of every following rotation (deg/s)
    fn set_speed(&mut self, speed: f32) -> Result<(), Self::Error>;

    /// Turn the wheel by `angle` degrees.  With `immediate_return` the call
    /// returns as soon as the motion is started, otherwise once it is done.
    fn rotate_by(&mut self, angle: f32, immediate_return: bool) -> Result<(), Self::Error>;

    fn reset_encoder(&mut self) -> Result<(), Self::Error>;

    /// Encoder count since the last reset (deg of wheel rotation)
    fn encoder_ticks_deg(&mut self) -> Result<i32, Self::Error>;

    fn is_moving(&mut self) -> Result<bool, Self::Error>;

    /// Spin forward at the current speed until stopped
    fn forward(&mut self) -> Result<(), Self::Error>;

    fn stop(&mut self) -> Result<(), Self::Error>;
}

/// Forward facing distance sensor
pub trait RangeSensor: Peripheral {
    /// Distance to the nearest echo (m), or [`OUT_OF_RANGE`]
    fn sample_distance(&mut self) -> Result<f32, Self::Error>;
}

/// The pliers used to pick up samples
pub trait Grabber: Peripheral {
    fn grab(&mut self) -> Result<(), Self::Error>;

    fn release(&mut self) -> Result<(), Self::Error>;
}

pub trait Battery {
    type Error: Debug;

    /// Battery voltage (mV)
    fn voltage_mv(&mut self) -> Result<u32, Self::Error>;
}

/// Color of the status light
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightColor {
    Blank,
    Green,
    Red,
    Orange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlinkPattern {
    Still,
    Slow,
    Fast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Light {
    pub color: LightColor,
    pub pattern: BlinkPattern,
}

impl Light {
    pub const fn new(color: LightColor, pattern: BlinkPattern) -> Self {
        Self { color, pattern }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    None,
    /// Numbered jingle played on a mode change
    Sequence(u8),
    Beep,
    TwoBeeps,
}

/// Sound and light output.  Fire and forget.
pub trait FeedbackSink {
    fn signal(&mut self, light: Light, tone: Tone);
}

/// The button an operator presses to acknowledge a mode
pub trait OperatorPanel {
    /// Block until the operator presses the button
    fn wait_for_press(&mut self);
}

bitflags! {
    /// Peripherals that failed to connect during diagnostics
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct PeripheralFaults: u8 {
        const RANGE_SENSOR = 1;
        const GRABBER = 1 << 1;
        const RIGHT_WHEEL = 1 << 2;
        const LEFT_WHEEL = 1 << 3;
    }
}
