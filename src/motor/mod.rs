// Motor abstractions used by coaxial swerve modules
//
// Provides:
// - Drive motor interface (open/closed loop velocity follower + odometry readback)
// - Azimuth motor interface (angle follower + angle readback)
// - Simulated implementations of both, plus a simulated gyro

pub mod sim;

pub use sim::{SimAzimuthMotor, SimDriveMotor, SimGyro};

use crate::geometry::Rotation2d;

/// Motor that spins the wheel
pub trait DriveMotor {
    /// Follow `velocity` (m/s at the wheel) without feedback
    fn follow_velocity_open(&mut self, velocity: f64);

    /// Follow `velocity` (m/s at the wheel) using the motor's velocity loop
    fn follow_velocity_closed(&mut self, velocity: f64);

    /// Zero the distance counter
    fn reset(&mut self);

    /// Measured wheel velocity in m/s
    fn velocity(&self) -> f64;

    /// Cumulative distance driven in m
    fn distance(&self) -> f64;

    /// Advance simulated physics by `dt` seconds; hardware ignores this
    fn simulation_periodic(&mut self, _dt: f64) {}
}

/// Motor that steers the wheel
pub trait AzimuthMotor {
    fn follow_angle(&mut self, angle: Rotation2d);

    /// Re-sync the relative encoder with the absolute one
    fn reset(&mut self);

    /// Measured steering rate in rad/s
    fn rotational_velocity(&self) -> f64;

    fn angle(&self) -> Rotation2d;

    fn simulation_periodic(&mut self, _dt: f64) {}
}

/// Which drive loop a velocity command went to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriveMode {
    #[default]
    Idle,
    OpenLoop,
    ClosedLoop,
}
