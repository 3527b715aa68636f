// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::geometry::{Pose2d, Rotation2d};
use crate::kinematics::ChassisSpeeds;

// Driver input from teleop/scripts -> runtime
// Axes are normalized to [-1, 1] and scaled by the robot's limits in the teleop command
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct TeleopInput {
    pub forward: f64,  // +1 = full speed forward
    pub strafe: f64,   // +1 = full speed left
    pub rotation: f64, // +1 = full speed counter-clockwise
}

impl TeleopInput {
    /// Clamp every axis into [-1, 1]; NaN becomes 0
    pub fn clamped(self) -> Self {
        let clamp = |v: f64| if v.is_nan() { 0.0 } else { v.clamp(-1.0, 1.0) };
        Self {
            forward: clamp(self.forward),
            strafe: clamp(self.strafe),
            rotation: clamp(self.rotation),
        }
    }
}

/// Runtime settings changes, sent alongside the driver input
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SettingsCommand {
    SetFieldRelative { value: bool },
    SetOpenLoop { value: bool },
    ToggleFieldRelative,
    ToggleOpenLoop,
    ZeroHeading,
    SkiStop,
}

/// Pose published by a vision pipeline
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct VisionPose {
    pub x: f64,
    pub y: f64,
    pub heading_rad: f64,
}

impl From<&VisionPose> for Pose2d {
    fn from(v: &VisionPose) -> Self {
        Pose2d::from_xy(v.x, v.y, Rotation2d::from_radians(v.heading_rad))
    }
}

/// Per-module dashboard values
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleTelemetry {
    pub drive_velocity: f64, // m/s
    pub drive_distance: f64, // m
    pub azimuth_deg: f64,
    pub desired_velocity: f64,
    pub desired_azimuth_deg: f64,
}

/// Drivetrain state published by the runtime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DrivetrainTelemetry {
    pub x: f64,
    pub y: f64,
    pub heading_deg: f64, // estimated
    pub gyro_deg: f64,
    pub speeds: ChassisSpeeds,
    pub modules: Vec<ModuleTelemetry>,
}

/// Teleop flags and scheduler state published by the runtime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandTelemetry {
    pub active_command: Option<String>,
    pub field_relative: bool,
    pub open_loop: bool,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
}
