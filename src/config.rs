// Timeouts, topics, drivetrain configuration
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::Result;
use crate::estimator::{DEFAULT_STATE_STD_DEVS, DEFAULT_VISION_STD_DEVS};
use crate::geometry::Translation2d;
use crate::units::{AngularVelocity, Length, LinearVelocity};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;
pub const LOOP_PERIOD: Duration = Duration::from_millis(1000 / LOOP_HZ);

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_TELEOP: &str = "swerve/cmd/teleop"; // driver input
pub const TOPIC_CMD_SETTINGS: &str = "swerve/cmd/settings"; // flag changes, zero heading, ski stop
pub const TOPIC_VISION_POSE: &str = "swerve/vision/pose"; // external pose corrections
pub const TOPIC_DRIVETRAIN: &str = "swerve/state/drivetrain"; // telemetry
pub const TOPIC_COMMANDS: &str = "swerve/state/commands"; // active command and teleop flags
pub const TOPIC_HEALTH: &str = "swerve/state/health"; // health status

// Length of the competition field, used to mirror trajectories for the other alliance
pub const FIELD_LENGTH_METERS: f64 = 16.54;

// Example rig: square base, 21.73 in between module centers
const EXAMPLE_TRACK_WIDTH_INCHES: f64 = 21.73;
const EXAMPLE_MAX_SPEED: f64 = 4.5; // m/s
const EXAMPLE_MAX_ANGULAR_SPEED: f64 = 11.5; // rad/s

/// Where one module sits, relative to the robot center (+x forward, +y left)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModulePlacement {
    pub x: Length,
    pub y: Length,
}

impl ModulePlacement {
    pub fn to_translation(&self) -> Translation2d {
        Translation2d::new(self.x.as_meters(), self.y.as_meters())
    }
}

/// Drivetrain description loaded from a JSON file
///
/// Missing fields fall back to the example rig.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrivetrainConfig {
    pub max_linear: LinearVelocity,
    pub max_angular: AngularVelocity,
    pub startup_settle_ms: u64,
    pub field_relative: bool,
    pub open_loop: bool,
    pub modules: Vec<ModulePlacement>,
    pub state_std_devs: [f64; 3],
    pub vision_std_devs: [f64; 3],
}

impl Default for DrivetrainConfig {
    fn default() -> Self {
        let half = Length::Inches(EXAMPLE_TRACK_WIDTH_INCHES / 2.0);
        let neg_half = Length::Inches(-EXAMPLE_TRACK_WIDTH_INCHES / 2.0);
        Self {
            max_linear: LinearVelocity::MetersPerSecond(EXAMPLE_MAX_SPEED),
            max_angular: AngularVelocity::RadiansPerSecond(EXAMPLE_MAX_ANGULAR_SPEED),
            startup_settle_ms: 1000,
            field_relative: true,
            open_loop: true,
            // Front left, front right, back left, back right
            modules: vec![
                ModulePlacement { x: half, y: half },
                ModulePlacement { x: half, y: neg_half },
                ModulePlacement { x: neg_half, y: half },
                ModulePlacement { x: neg_half, y: neg_half },
            ],
            state_std_devs: DEFAULT_STATE_STD_DEVS,
            vision_std_devs: DEFAULT_VISION_STD_DEVS,
        }
    }
}

impl DrivetrainConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn placements(&self) -> Vec<Translation2d> {
        self.modules.iter().map(ModulePlacement::to_translation).collect()
    }

    pub fn startup_settle(&self) -> Duration {
        Duration::from_millis(self.startup_settle_ms)
    }
}
