// Swerve drivetrain coordinator
//
// Owns the modules, the gyro, the kinematic model and the pose estimator.
// Turns chassis motion requests into per-module commands and keeps the field
// pose up to date once per cycle.

use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::{Result, SwerveError};
use crate::estimator::{DEFAULT_STATE_STD_DEVS, DEFAULT_VISION_STD_DEVS, SwervePoseEstimator};
use crate::geometry::{Pose2d, Rotation2d, Translation2d};
use crate::kinematics::{ChassisSpeeds, SwerveKinematics, SwerveModulePosition, SwerveModuleState};
use crate::messages::{DrivetrainTelemetry, ModuleTelemetry};
use crate::module::{Gyro, SwerveModule};
use crate::scheduler::Subsystem;
use crate::units::{AngularVelocity, LinearVelocity};

/// Default pause before the modules are reset at startup.
///
/// Some motor controllers ignore an inversion setting sent right after
/// power-up.
pub const DEFAULT_STARTUP_SETTLE: Duration = Duration::from_secs(1);

/// Returns a vision-derived pose given the current estimate, if one is available
pub type VisionPoseCallback = Box<dyn FnMut(Pose2d) -> Option<Pose2d> + Send>;

/// Physical speed limits of the robot, in m/s and rad/s
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityLimits {
    pub max_linear: f64,
    pub max_angular: f64,
}

impl VelocityLimits {
    pub fn new(max_linear: LinearVelocity, max_angular: AngularVelocity) -> Result<Self> {
        let max_linear = max_linear.as_meters_per_second();
        let max_angular = max_angular.as_radians_per_second();
        if !max_linear.is_finite() || max_linear <= 0.0 {
            return Err(SwerveError::InvalidLimit {
                name: "max linear velocity",
                value: max_linear,
            });
        }
        if !max_angular.is_finite() || max_angular <= 0.0 {
            return Err(SwerveError::InvalidLimit {
                name: "max angular velocity",
                value: max_angular,
            });
        }
        Ok(Self {
            max_linear,
            max_angular,
        })
    }
}

/// Builder for [`SwerveDrive`]
pub struct SwerveDriveBuilder<M, G> {
    modules: Vec<M>,
    gyro: G,
    max_linear: LinearVelocity,
    max_angular: AngularVelocity,
    startup_settle: Duration,
    vision_pose_callback: Option<VisionPoseCallback>,
    state_std_devs: [f64; 3],
    vision_std_devs: [f64; 3],
}

impl<M: SwerveModule, G: Gyro> SwerveDriveBuilder<M, G> {
    /// Pause before resetting the modules; zero disables it
    pub fn startup_settle(mut self, duration: Duration) -> Self {
        self.startup_settle = duration;
        self
    }

    pub fn vision_pose_callback(
        mut self,
        callback: impl FnMut(Pose2d) -> Option<Pose2d> + Send + 'static,
    ) -> Self {
        self.vision_pose_callback = Some(Box::new(callback));
        self
    }

    /// Standard deviations (x m, y m, theta rad) of odometry and of vision poses
    pub fn std_devs(mut self, state: [f64; 3], vision: [f64; 3]) -> Self {
        self.state_std_devs = state;
        self.vision_std_devs = vision;
        self
    }

    /// Bring up the drivetrain
    ///
    /// Blocks for the startup-settle duration, resets every module, zeroes
    /// the gyro, then seeds the pose estimate at the origin.
    pub fn build(self) -> Result<SwerveDrive<M, G>> {
        let limits = VelocityLimits::new(self.max_linear, self.max_angular)?;
        let placements: Vec<Translation2d> = self.modules.iter().map(|m| m.placement()).collect();
        let kinematics = SwerveKinematics::new(placements)?;

        let mut modules = self.modules;
        let mut gyro = self.gyro;

        if !self.startup_settle.is_zero() {
            info!("Waiting {:?} for module controllers to settle", self.startup_settle);
            std::thread::sleep(self.startup_settle);
        }
        for module in &mut modules {
            module.reset();
        }
        gyro.zero_heading();

        let positions: Vec<SwerveModulePosition> = modules.iter().map(|m| m.module_position()).collect();
        let mut estimator =
            SwervePoseEstimator::new(kinematics.clone(), gyro.heading(), &positions, Pose2d::default());
        estimator.set_state_std_devs(self.state_std_devs);
        estimator.set_vision_std_devs(self.vision_std_devs);

        info!(
            "Swerve drive ready: {} modules, max {:.2} m/s, {:.2} rad/s",
            modules.len(),
            limits.max_linear,
            limits.max_angular
        );

        Ok(SwerveDrive {
            modules,
            gyro,
            limits,
            kinematics,
            estimator,
            vision_pose_callback: self.vision_pose_callback,
            epoch: Instant::now(),
        })
    }
}

/// The drivetrain coordinator
///
/// Module order is fixed at construction and is the order of every state and
/// position list this type accepts or returns.
pub struct SwerveDrive<M, G> {
    modules: Vec<M>,
    gyro: G,
    limits: VelocityLimits,
    kinematics: SwerveKinematics,
    estimator: SwervePoseEstimator,
    vision_pose_callback: Option<VisionPoseCallback>,
    epoch: Instant,
}

impl<M: SwerveModule, G: Gyro> SwerveDrive<M, G> {
    /// Start building a drivetrain from its modules and gyro
    ///
    /// Module placements define the kinematic model, so their order here is
    /// the module order from then on.
    pub fn builder(
        modules: Vec<M>,
        gyro: G,
        max_linear: LinearVelocity,
        max_angular: AngularVelocity,
    ) -> SwerveDriveBuilder<M, G> {
        SwerveDriveBuilder {
            modules,
            gyro,
            max_linear,
            max_angular,
            startup_settle: DEFAULT_STARTUP_SETTLE,
            vision_pose_callback: None,
            state_std_devs: DEFAULT_STATE_STD_DEVS,
            vision_std_devs: DEFAULT_VISION_STD_DEVS,
        }
    }

    /// Drive at the given translation and rotation
    ///
    /// # Arguments
    /// * `translation` - Velocity in m/s (+x forward, +y left)
    /// * `rotation` - Rotational velocity in rad/s, counter-clockwise positive
    /// * `field_relative` - Interpret `translation` in the field frame (gyro zero is forward)
    /// * `open_loop` - Drive the wheels without velocity feedback
    pub fn drive(&mut self, translation: Translation2d, rotation: f64, field_relative: bool, open_loop: bool) {
        let speeds = if field_relative {
            ChassisSpeeds::from_field_relative(translation.x, translation.y, rotation, self.gyro.heading())
        } else {
            ChassisSpeeds::new(translation.x, translation.y, rotation)
        };

        let states = self.kinematics.to_module_states(speeds);
        self.desire_module_states(states, open_loop, false);
    }

    /// Drive at robot-relative chassis speeds
    pub fn drive_chassis_speeds(&mut self, speeds: ChassisSpeeds, open_loop: bool) {
        self.drive(speeds.translation(), speeds.omega, false, open_loop);
    }

    /// Send one state to each module, after desaturating to the speed limit
    ///
    /// # Panics
    /// If `states` doesn't contain exactly one state per module.
    pub fn desire_module_states(&mut self, states: Vec<SwerveModuleState>, open_loop: bool, rotate_in_place: bool) {
        assert_eq!(
            states.len(),
            self.modules.len(),
            "one module state is required per module"
        );

        let states = SwerveKinematics::desaturate_wheel_speeds(states, self.limits.max_linear);
        for (module, state) in self.modules.iter_mut().zip(states) {
            module.desire_state(state, open_loop, rotate_in_place);
        }
    }

    /// Point every wheel along the line to the robot center so the base resists pushing
    pub fn ski_stop(&mut self) {
        debug!("Ski stop");
        let states = self
            .modules
            .iter()
            .map(|m| SwerveModuleState::new(0.0, m.placement().angle()))
            .collect();
        self.desire_module_states(states, false, true);
    }

    pub fn module_positions(&self) -> Vec<SwerveModulePosition> {
        self.modules.iter().map(|m| m.module_position()).collect()
    }

    /// Measured (not commanded) module states
    pub fn module_states(&self) -> Vec<SwerveModuleState> {
        self.modules.iter().map(|m| m.module_state()).collect()
    }

    /// Estimated field pose
    pub fn pose(&self) -> Pose2d {
        self.estimator.estimated_pose()
    }

    /// Gyro heading, zero at the last `zero_heading`
    pub fn heading(&self) -> Rotation2d {
        self.gyro.heading()
    }

    /// Chassis speeds from the measured module states
    pub fn robot_relative_speeds(&self) -> ChassisSpeeds {
        self.kinematics.to_chassis_speeds(&self.module_states())
    }

    pub fn max_linear_velocity(&self) -> f64 {
        self.limits.max_linear
    }

    pub fn max_angular_velocity(&self) -> f64 {
        self.limits.max_angular
    }

    pub fn placements(&self) -> &[Translation2d] {
        self.kinematics.placements()
    }

    /// Distance from the robot center to the farthest module
    pub fn drive_base_radius(&self) -> f64 {
        drive_base_radius(self.placements())
    }

    pub fn modules(&self) -> &[M] {
        &self.modules
    }

    pub fn reset_modules(&mut self) {
        for module in &mut self.modules {
            module.reset();
        }
    }

    /// Make the current orientation "forward" for field-relative driving
    pub fn zero_heading(&mut self) {
        info!("Zeroing heading");
        self.gyro.zero_heading();
    }

    /// Move the pose estimate to `pose`, using current sensor readings as the baseline
    pub fn reset_odometry(&mut self, pose: Pose2d) {
        info!(
            "Resetting odometry to ({:.3}, {:.3}, {:.1} deg)",
            pose.x(),
            pose.y(),
            pose.rotation.degrees()
        );
        let positions = self.module_positions();
        self.estimator.reset_position(self.gyro.heading(), &positions, pose);
    }

    /// Snapshot for the dashboard
    pub fn telemetry(&self) -> DrivetrainTelemetry {
        let pose = self.pose();
        DrivetrainTelemetry {
            x: pose.x(),
            y: pose.y(),
            heading_deg: pose.rotation.degrees(),
            gyro_deg: self.heading().degrees(),
            speeds: self.robot_relative_speeds(),
            modules: self
                .modules
                .iter()
                .map(|m| {
                    let measured = m.module_state();
                    let desired = m.last_commanded_state();
                    ModuleTelemetry {
                        drive_velocity: measured.speed,
                        drive_distance: m.module_position().distance,
                        azimuth_deg: measured.angle.degrees(),
                        desired_velocity: desired.speed,
                        desired_azimuth_deg: desired.angle.degrees(),
                    }
                })
                .collect(),
        }
    }
}

impl<M: SwerveModule, G: Gyro> Subsystem for SwerveDrive<M, G> {
    fn name(&self) -> &'static str {
        "swerve_drive"
    }

    /// Fuse odometry and any vision pose into the estimate
    fn periodic(&mut self) {
        let now = self.epoch.elapsed().as_secs_f64();
        let positions = self.module_positions();
        self.estimator.update(now, self.gyro.heading(), &positions);

        let pose = self.pose();
        if let Some(vision_pose) = self.vision_pose_callback.as_mut().and_then(|cb| cb(pose)) {
            self.estimator.add_vision_measurement(vision_pose, now);
        }
    }

    fn simulation_periodic(&mut self, dt: f64) {
        for module in &mut self.modules {
            module.simulation_periodic(dt);
        }
        let omega = self.robot_relative_speeds().omega;
        self.gyro.simulation_periodic(omega, dt);
    }
}

/// Largest distance from the origin to any of `placements`
pub fn drive_base_radius(placements: &[Translation2d]) -> f64 {
    placements.iter().map(|p| p.norm()).fold(0.0, f64::max)
}
