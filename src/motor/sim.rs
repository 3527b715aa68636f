// Ideal simulated motors and gyro
//
// Commands take effect immediately; distance and heading only advance when
// simulation_periodic is called, so tests control time explicitly.

use tracing::debug;

use super::{AzimuthMotor, DriveMode, DriveMotor};
use crate::geometry::Rotation2d;
use crate::module::Gyro;

/// Simulated drive motor: velocity tracks the command exactly
#[derive(Debug, Clone, Default)]
pub struct SimDriveMotor {
    velocity: f64,
    distance: f64,
    mode: DriveMode,
}

impl SimDriveMotor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loop used for the last velocity command
    pub fn mode(&self) -> DriveMode {
        self.mode
    }
}

impl DriveMotor for SimDriveMotor {
    fn follow_velocity_open(&mut self, velocity: f64) {
        self.velocity = velocity;
        self.mode = DriveMode::OpenLoop;
    }

    fn follow_velocity_closed(&mut self, velocity: f64) {
        self.velocity = velocity;
        self.mode = DriveMode::ClosedLoop;
    }

    fn reset(&mut self) {
        self.distance = 0.0;
    }

    fn velocity(&self) -> f64 {
        self.velocity
    }

    fn distance(&self) -> f64 {
        self.distance
    }

    fn simulation_periodic(&mut self, dt: f64) {
        self.distance += self.velocity * dt;
    }
}

/// Simulated azimuth motor: reaches the commanded angle instantly
#[derive(Debug, Clone, Default)]
pub struct SimAzimuthMotor {
    angle: Rotation2d,
    previous_angle: Rotation2d,
    rotational_velocity: f64,
    resets: u32,
}

impl SimAzimuthMotor {
    pub fn new(initial_angle: Rotation2d) -> Self {
        Self {
            angle: initial_angle,
            previous_angle: initial_angle,
            ..Self::default()
        }
    }

    /// Number of times the encoder was re-synced
    pub fn reset_count(&self) -> u32 {
        self.resets
    }
}

impl AzimuthMotor for SimAzimuthMotor {
    fn follow_angle(&mut self, angle: Rotation2d) {
        self.angle = angle;
    }

    fn reset(&mut self) {
        // The simulated encoder is already absolute
        self.resets += 1;
        self.rotational_velocity = 0.0;
    }

    fn rotational_velocity(&self) -> f64 {
        self.rotational_velocity
    }

    fn angle(&self) -> Rotation2d {
        self.angle
    }

    fn simulation_periodic(&mut self, dt: f64) {
        if dt > 0.0 {
            self.rotational_velocity = (self.angle - self.previous_angle).radians() / dt;
        }
        self.previous_angle = self.angle;
    }
}

/// Simulated heading sensor, CCW positive
#[derive(Debug, Clone, Default)]
pub struct SimGyro {
    yaw: f64, // rad, raw sensor reading
    zero: f64,
}

impl SimGyro {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated gyro whose raw reading starts at `yaw`
    pub fn with_raw_yaw(yaw: Rotation2d) -> Self {
        Self {
            yaw: yaw.radians(),
            zero: 0.0,
        }
    }
}

impl Gyro for SimGyro {
    fn heading(&self) -> Rotation2d {
        Rotation2d::from_radians(self.yaw - self.zero)
    }

    fn zero_heading(&mut self) {
        debug!("Zeroing simulated gyro at raw yaw {:.3} rad", self.yaw);
        self.zero = self.yaw;
    }

    fn simulation_periodic(&mut self, omega: f64, dt: f64) {
        self.yaw += omega * dt;
    }
}
