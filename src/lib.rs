//!
//! Navigation and perception core for a two-track sample-harvesting rover.
//!
//! The rover localizes itself purely by dead reckoning on its wheel encoders
//! and perceives the world through a single forward-facing range sensor.
//!

#![no_std]

extern crate alloc;

pub mod robot;

pub mod errors;
pub use errors::{ConfigError, MissionError, NavigatorError, ScannerError, ZoneError};

pub mod zone;

pub mod peripherals;

pub mod navigator;

pub mod scanner;

pub mod config;

pub mod mission;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

/// Maximum distance between two successive scan hits on the same object (m)
pub const MAX_OBJECT_SIZE: f32 = 0.3;

/// Closer than this a detection is a re-sighting of a known sample, or the
/// rover has arrived on its target (m)
pub const MIN_DIST_DETECTION: f32 = 0.2;

/// Number of samples that ends the mission
pub const DEFAULT_SAMPLES_TO_HARVEST: usize = 2;

/// Below this battery voltage the mission is aborted (mV)
pub const VOLTAGE_THRESHOLD_MV: u32 = 900;
