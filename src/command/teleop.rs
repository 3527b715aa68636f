// Teleoperation: driver input -> drivetrain, every cycle

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

use crate::drivetrain::SwerveDrive;
use crate::geometry::Translation2d;
use crate::module::{Gyro, SwerveModule};
use crate::scheduler::Command;

/// A zero-argument input, normalized to [-1, 1]
pub type InputSource = Box<dyn FnMut() -> f64 + Send>;

/// Flags the driver (or dashboard) can flip while teleop is running
///
/// Shared between the command and whoever edits it; every read sees the
/// latest write.
#[derive(Debug, Default)]
pub struct TeleopSettings {
    field_relative: AtomicBool,
    open_loop: AtomicBool,
}

impl TeleopSettings {
    pub fn new(field_relative: bool, open_loop: bool) -> Self {
        Self {
            field_relative: AtomicBool::new(field_relative),
            open_loop: AtomicBool::new(open_loop),
        }
    }

    pub fn field_relative(&self) -> bool {
        self.field_relative.load(Ordering::Relaxed)
    }

    pub fn set_field_relative(&self, value: bool) {
        self.field_relative.store(value, Ordering::Relaxed);
    }

    /// Flip field-relative mode and return the new value
    pub fn toggle_field_relative(&self) -> bool {
        let value = !self.field_relative.fetch_xor(true, Ordering::Relaxed);
        info!("Field relative: {}", value);
        value
    }

    pub fn open_loop(&self) -> bool {
        self.open_loop.load(Ordering::Relaxed)
    }

    pub fn set_open_loop(&self, value: bool) {
        self.open_loop.store(value, Ordering::Relaxed);
    }

    /// Flip open-loop mode and return the new value
    pub fn toggle_open_loop(&self) -> bool {
        let value = !self.open_loop.fetch_xor(true, Ordering::Relaxed);
        info!("Open loop: {}", value);
        value
    }
}

/// Drives the base from three inputs scaled to the robot's speed limits
///
/// Never finishes on its own.
pub struct TeleopCommand {
    forward: InputSource,
    strafe: InputSource,
    rotation: InputSource,
    settings: Arc<TeleopSettings>,
}

impl TeleopCommand {
    /// # Arguments
    /// * `forward` - +1 is full speed forward (+x)
    /// * `strafe` - +1 is full speed left (+y)
    /// * `rotation` - +1 is full speed counter-clockwise
    /// * `settings` - Frame and loop flags, read every cycle
    pub fn new(
        forward: impl FnMut() -> f64 + Send + 'static,
        strafe: impl FnMut() -> f64 + Send + 'static,
        rotation: impl FnMut() -> f64 + Send + 'static,
        settings: Arc<TeleopSettings>,
    ) -> Self {
        Self {
            forward: Box::new(forward),
            strafe: Box::new(strafe),
            rotation: Box::new(rotation),
            settings,
        }
    }

    pub fn settings(&self) -> &Arc<TeleopSettings> {
        &self.settings
    }
}

impl<M: SwerveModule, G: Gyro> Command<SwerveDrive<M, G>> for TeleopCommand {
    fn name(&self) -> &'static str {
        "teleop"
    }

    fn execute(&mut self, drive: &mut SwerveDrive<M, G>) {
        let translation = Translation2d::new((self.forward)(), (self.strafe)()) * drive.max_linear_velocity();
        let rotation = (self.rotation)() * drive.max_angular_velocity();

        drive.drive(
            translation,
            rotation,
            self.settings.field_relative(),
            self.settings.open_loop(),
        );
    }
}
