// Trajectory following: track one timed trajectory, then finish

use std::time::Duration;
use tracing::info;

use crate::config::{FIELD_LENGTH_METERS, LOOP_PERIOD};
use crate::drivetrain::SwerveDrive;
use crate::module::{Gyro, SwerveModule};
use crate::scheduler::Command;
use crate::trajectory::{HolonomicDriveController, PathController, Trajectory};
use crate::units::LinearVelocity;

/// Gains and speed limit for trajectory tracking
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryFollowerParameters {
    pub max_drive_velocity: LinearVelocity, // fastest a single wheel may go
    pub theta_kp: f64,
    pub xy_kp: f64,
}

/// Follows a [`Trajectory`] with a [`HolonomicDriveController`]
///
/// Time advances by one scheduler period per `execute`. The last `execute`
/// tracks the trajectory's end state. Nothing else is sent on `end`, so an
/// interrupted run leaves modules at their last command.
pub struct FollowTrajectoryCommand {
    trajectory: Trajectory,
    active: Trajectory,
    controller: HolonomicDriveController,
    first_path: bool,
    open_loop: bool,
    flip_path: Box<dyn Fn() -> bool + Send>,
    period: f64,
    cycles: u32,
}

impl FollowTrajectoryCommand {
    /// The drive is borrowed only to read its geometry
    pub fn new<M: SwerveModule, G: Gyro>(
        drive: &SwerveDrive<M, G>,
        trajectory: Trajectory,
        parameters: TrajectoryFollowerParameters,
    ) -> Self {
        let controller = HolonomicDriveController::new(
            parameters.xy_kp,
            parameters.theta_kp,
            parameters.max_drive_velocity.as_meters_per_second(),
            drive.drive_base_radius(),
        );
        Self {
            active: trajectory.clone(),
            trajectory,
            controller,
            first_path: false,
            open_loop: false,
            flip_path: Box::new(|| false),
            period: LOOP_PERIOD.as_secs_f64(),
            cycles: 0,
        }
    }

    /// Reset odometry to the trajectory's start before following it
    pub fn first_path(mut self, first_path: bool) -> Self {
        self.first_path = first_path;
        self
    }

    pub fn open_loop(mut self, open_loop: bool) -> Self {
        self.open_loop = open_loop;
        self
    }

    /// Checked when the command starts; `true` mirrors the trajectory to the other side of the field
    pub fn flip_path(mut self, flip_path: impl Fn() -> bool + Send + 'static) -> Self {
        self.flip_path = Box::new(flip_path);
        self
    }

    /// Time between `execute` calls
    pub fn period(mut self, period: Duration) -> Self {
        self.period = period.as_secs_f64();
        self
    }

    /// Trajectory being followed (mirrored once the command has started with flipping on)
    pub fn trajectory(&self) -> &Trajectory {
        &self.active
    }

    pub fn controller(&self) -> &HolonomicDriveController {
        &self.controller
    }

    fn elapsed(&self) -> f64 {
        f64::from(self.cycles) * self.period
    }

    /// Time of the most recently commanded sample
    fn last_sample_time(&self) -> Option<f64> {
        self.cycles.checked_sub(1).map(|c| f64::from(c) * self.period)
    }
}

impl<M: SwerveModule, G: Gyro> Command<SwerveDrive<M, G>> for FollowTrajectoryCommand {
    fn name(&self) -> &'static str {
        "follow_trajectory"
    }

    fn initialize(&mut self, drive: &mut SwerveDrive<M, G>) {
        self.active = if (self.flip_path)() {
            self.trajectory.mirrored(FIELD_LENGTH_METERS)
        } else {
            self.trajectory.clone()
        };
        self.cycles = 0;

        if self.first_path {
            drive.reset_odometry(self.active.initial_pose());
        }
        info!("Following trajectory ({:.2} s)", self.active.total_time());
    }

    fn execute(&mut self, drive: &mut SwerveDrive<M, G>) {
        let target = self.active.sample(self.elapsed());
        let speeds = self
            .controller
            .calculate(drive.pose(), drive.robot_relative_speeds(), &target);
        drive.drive_chassis_speeds(speeds, self.open_loop);
        self.cycles += 1;
    }

    /// Done once the end state itself has been commanded
    fn is_finished(&self, _drive: &SwerveDrive<M, G>) -> bool {
        self.last_sample_time()
            .is_some_and(|t| t >= self.active.total_time())
    }

    fn end(&mut self, _drive: &mut SwerveDrive<M, G>, interrupted: bool) {
        if interrupted {
            info!("Trajectory interrupted after {:.2} s", self.elapsed());
        } else {
            info!("Trajectory finished");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Pose2d, Rotation2d, Translation2d};
    use crate::module::CoaxialSwerveModule;
    use crate::motor::{DriveMode, SimAzimuthMotor, SimDriveMotor, SimGyro};
    use crate::scheduler::{Scheduler, Subsystem};
    use crate::units::AngularVelocity;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    type SimDrive = SwerveDrive<CoaxialSwerveModule<SimDriveMotor, SimAzimuthMotor>, SimGyro>;

    const EPS: f64 = 1e-9;

    fn sim_drive() -> SimDrive {
        let modules = [(0.3, 0.3), (0.3, -0.3), (-0.3, 0.3), (-0.3, -0.3)]
            .into_iter()
            .map(|(x, y)| {
                CoaxialSwerveModule::new(
                    SimDriveMotor::new(),
                    SimAzimuthMotor::default(),
                    Translation2d::new(x, y),
                    4.0,
                )
            })
            .collect();
        SwerveDrive::builder(
            modules,
            SimGyro::new(),
            LinearVelocity::MetersPerSecond(4.0),
            AngularVelocity::RadiansPerSecond(6.0),
        )
        .startup_settle(Duration::ZERO)
        .build()
        .unwrap()
    }

    fn parameters() -> TrajectoryFollowerParameters {
        TrajectoryFollowerParameters {
            max_drive_velocity: LinearVelocity::MetersPerSecond(4.0),
            theta_kp: 1.0,
            xy_kp: 1.0,
        }
    }

    // 1 m along +x at 1 m/s, starting away from the origin
    fn straight() -> Trajectory {
        Trajectory::from_waypoints(
            &[
                Pose2d::from_xy(2.0, 1.0, Rotation2d::default()),
                Pose2d::from_xy(3.0, 1.0, Rotation2d::default()),
            ],
            1.0,
        )
        .unwrap()
    }

    #[test]
    fn test_controller_uses_drive_base_radius() {
        let drive = sim_drive();
        let command = FollowTrajectoryCommand::new(&drive, straight(), parameters());
        let expected = 4.0 / drive.drive_base_radius();
        assert!((command.controller().max_rotation() - expected).abs() < EPS);
    }

    #[test]
    fn test_first_path_resets_odometry() {
        let mut drive = sim_drive();
        let mut command = FollowTrajectoryCommand::new(&drive, straight(), parameters()).first_path(true);
        command.initialize(&mut drive);
        assert_eq!(drive.pose(), Pose2d::from_xy(2.0, 1.0, Rotation2d::default()));
    }

    #[test]
    fn test_later_path_keeps_odometry() {
        let mut drive = sim_drive();
        let mut command = FollowTrajectoryCommand::new(&drive, straight(), parameters());
        command.initialize(&mut drive);
        assert_eq!(drive.pose(), Pose2d::default());
    }

    #[test]
    fn test_flip_decided_at_start() {
        let mut drive = sim_drive();
        let red = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&red);
        let mut command = FollowTrajectoryCommand::new(&drive, straight(), parameters())
            .first_path(true)
            .flip_path(move || flag.load(Ordering::Relaxed));

        // Alliance becomes known after the command was built
        red.store(true, Ordering::Relaxed);
        command.initialize(&mut drive);

        let start = drive.pose();
        assert!((start.x() - (FIELD_LENGTH_METERS - 2.0)).abs() < EPS);
        assert!((start.y() - 1.0).abs() < EPS);
        assert!((start.rotation.degrees().abs() - 180.0).abs() < 1e-6);
        assert_eq!(command.trajectory().initial_pose(), start);
    }

    #[test]
    fn test_on_path_drives_feedforward() {
        let mut drive = sim_drive();
        let mut command = FollowTrajectoryCommand::new(&drive, straight(), parameters())
            .first_path(true)
            .open_loop(true);
        command.initialize(&mut drive);
        command.execute(&mut drive);

        let speeds = drive.robot_relative_speeds();
        assert!((speeds.vx - 1.0).abs() < EPS);
        assert!(speeds.vy.abs() < EPS);
        assert!(speeds.omega.abs() < EPS);
        for module in drive.modules() {
            assert_eq!(module.drive_motor().mode(), DriveMode::OpenLoop);
        }
    }

    #[test]
    fn test_off_path_corrects_toward_target() {
        let mut drive = sim_drive();
        // Odometry stays at the origin, 1 m behind the start
        let mut command = FollowTrajectoryCommand::new(&drive, straight(), parameters());
        command.initialize(&mut drive);
        command.execute(&mut drive);

        let speeds = drive.robot_relative_speeds();
        // Feedforward 1 m/s plus 1.0 * 2 m error in x and 1.0 * 1 m in y
        assert!((speeds.vx - 3.0).abs() < EPS);
        assert!((speeds.vy - 1.0).abs() < EPS);
    }

    #[test]
    fn test_finishes_on_end_state() {
        let mut drive = sim_drive();
        let command = FollowTrajectoryCommand::new(&drive, straight(), parameters())
            .first_path(true)
            .period(Duration::from_millis(250));
        drive.periodic();

        let mut scheduler = Scheduler::new(drive);
        scheduler.schedule(Box::new(command));

        let mut cycles = 0;
        while scheduler.active_command().is_some() {
            scheduler.subsystem_mut().simulation_periodic(0.25);
            scheduler.run_cycle();
            cycles += 1;
            assert!(cycles <= 10, "trajectory never finished");
        }
        // Samples at 0, 0.25, 0.5, 0.75 and the 1.0 s end state
        assert_eq!(cycles, 5);

        // The path ends at rest, so the last command is a stop at the goal
        let last = scheduler.subsystem().robot_relative_speeds();
        assert!(last.vx.abs() < EPS);
        assert!(last.vy.abs() < EPS);

        for _ in 0..20 {
            scheduler.subsystem_mut().simulation_periodic(0.25);
            scheduler.run_cycle();
        }
        let pose = scheduler.subsystem().pose();
        assert!((pose.x() - 3.0).abs() < 1e-6);
        assert!((pose.y() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_interrupted_keeps_last_command() {
        let mut drive = sim_drive();
        let command = FollowTrajectoryCommand::new(&drive, straight(), parameters())
            .first_path(true)
            .period(Duration::from_millis(250));
        drive.periodic();

        let mut scheduler = Scheduler::new(drive);
        scheduler.schedule(Box::new(command));
        scheduler.run_cycle();
        scheduler.cancel();

        let last = scheduler.subsystem().robot_relative_speeds();
        assert!((last.vx - 1.0).abs() < EPS);
    }
}
