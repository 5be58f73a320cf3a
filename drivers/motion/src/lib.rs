//!
//! Dead-reckoning model for a two-track differential rover.
//!
//! Nothing in here touches hardware: wheel targets come out as angles and
//! encoder counts go back in as an [`EncoderSnapshot`].
//!

#![no_std]

pub mod kinematics;
pub use kinematics::{
    BodyMotion, DifferentialDrive, EncoderSnapshot, KinematicConstants, KinematicsError,
    WheelAngles,
};

pub mod pose;
pub use pose::{nearest_equivalent_heading, Pose};

pub mod command;
pub use command::MotionCommand;

/// Degrees in one radian
pub const DEG_PER_RAD: f32 = 180.0 / core::f32::consts::PI;
