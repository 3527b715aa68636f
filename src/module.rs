// Hardware-facing interfaces of the drivetrain: swerve modules and the gyro.

use tracing::debug;

use crate::geometry::{Rotation2d, Translation2d};
use crate::kinematics::{SwerveModulePosition, SwerveModuleState};
use crate::motor::{AzimuthMotor, DriveMotor};

/// Below this fraction of max speed a module that may not rotate in place keeps
/// its previous azimuth target
pub const ROTATE_IN_PLACE_DEADBAND: f64 = 0.01;

/// One independently steered and driven wheel
pub trait SwerveModule {
    /// Drive at `state.speed` while steering to `state.angle`
    ///
    /// With `rotate_in_place == false` the module may skip steering when the
    /// speed is negligible.
    fn desire_state(&mut self, state: SwerveModuleState, open_loop: bool, rotate_in_place: bool);

    /// Return sensors to their zeroed state
    fn reset(&mut self);

    /// Offset of the module from the robot center (+x forward, +y left)
    fn placement(&self) -> Translation2d;

    /// Distance driven and current azimuth
    fn module_position(&self) -> SwerveModulePosition;

    /// Measured speed and azimuth right now
    fn module_state(&self) -> SwerveModuleState;

    /// Last target sent to the motors; defaults to the measured state
    fn last_commanded_state(&self) -> SwerveModuleState {
        self.module_state()
    }

    fn simulation_periodic(&mut self, _dt: f64) {}
}

/// Heading sensor, counter-clockwise positive
pub trait Gyro {
    fn heading(&self) -> Rotation2d;

    /// Make the current orientation the zero heading
    fn zero_heading(&mut self);

    /// Advance simulated heading by `omega * dt`; hardware ignores this
    fn simulation_periodic(&mut self, _omega: f64, _dt: f64) {}
}

/// Module with a separate drive motor and azimuth motor on the same axis
#[derive(Debug, Clone)]
pub struct CoaxialSwerveModule<D, A> {
    drive: D,
    azimuth: A,
    placement: Translation2d,
    max_speed: f64,
    last_command: SwerveModuleState,
}

impl<D: DriveMotor, A: AzimuthMotor> CoaxialSwerveModule<D, A> {
    /// # Arguments
    /// * `placement` - Module offset from robot center in meters
    /// * `max_speed` - Top wheel speed in m/s, used for the rotate-in-place deadband
    pub fn new(drive: D, azimuth: A, placement: Translation2d, max_speed: f64) -> Self {
        let last_command = SwerveModuleState::new(0.0, azimuth.angle());
        Self {
            drive,
            azimuth,
            placement,
            max_speed,
            last_command,
        }
    }

    pub fn drive_motor(&self) -> &D {
        &self.drive
    }

    pub fn azimuth_motor(&self) -> &A {
        &self.azimuth
    }
}

impl<D: DriveMotor, A: AzimuthMotor> SwerveModule for CoaxialSwerveModule<D, A> {
    fn desire_state(&mut self, state: SwerveModuleState, open_loop: bool, rotate_in_place: bool) {
        let state = state.optimize(self.azimuth.angle());

        let angle = if !rotate_in_place && state.speed.abs() <= self.max_speed * ROTATE_IN_PLACE_DEADBAND {
            self.last_command.angle
        } else {
            state.angle
        };

        if open_loop {
            self.drive.follow_velocity_open(state.speed);
        } else {
            self.drive.follow_velocity_closed(state.speed);
        }
        self.azimuth.follow_angle(angle);

        self.last_command = SwerveModuleState::new(state.speed, angle);
    }

    fn reset(&mut self) {
        debug!("Resetting module at ({:.3}, {:.3})", self.placement.x, self.placement.y);
        self.drive.reset();
        self.azimuth.reset();
    }

    fn placement(&self) -> Translation2d {
        self.placement
    }

    fn module_position(&self) -> SwerveModulePosition {
        SwerveModulePosition::new(self.drive.distance(), self.azimuth.angle())
    }

    fn module_state(&self) -> SwerveModuleState {
        SwerveModuleState::new(self.drive.velocity(), self.azimuth.angle())
    }

    fn last_commanded_state(&self) -> SwerveModuleState {
        self.last_command
    }

    fn simulation_periodic(&mut self, dt: f64) {
        self.drive.simulation_periodic(dt);
        self.azimuth.simulation_periodic(dt);
    }
}
