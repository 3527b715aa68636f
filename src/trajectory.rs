// Timed holonomic trajectories and the feedback controller that tracks them

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::{Result, SwerveError};
use crate::geometry::{Pose2d, Rotation2d, Translation2d};
use crate::kinematics::ChassisSpeeds;

/// One sample of a trajectory
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrajectoryState {
    pub time: f64,                    // s since the start
    pub pose: Pose2d,                 // rotation is the robot's facing, not its direction of travel
    pub velocity: f64,                // m/s along heading_of_motion
    pub heading_of_motion: Rotation2d,
    pub angular_velocity: f64,        // rad/s of the robot's facing
}

impl TrajectoryState {
    fn interpolate(&self, end: &TrajectoryState, t: f64) -> TrajectoryState {
        let lerp = |a: f64, b: f64| a + (b - a) * t;
        TrajectoryState {
            time: lerp(self.time, end.time),
            pose: Pose2d::new(
                self.pose.translation + (end.pose.translation - self.pose.translation) * t,
                self.pose.rotation.interpolate(end.pose.rotation, t),
            ),
            velocity: lerp(self.velocity, end.velocity),
            heading_of_motion: self.heading_of_motion.interpolate(end.heading_of_motion, t),
            angular_velocity: lerp(self.angular_velocity, end.angular_velocity),
        }
    }

    /// Reflect across the field's center line (x -> field_length - x)
    fn mirrored(&self, field_length: f64) -> TrajectoryState {
        let mirror = |r: Rotation2d| Rotation2d::from_radians(PI) - r;
        TrajectoryState {
            time: self.time,
            pose: Pose2d::from_xy(field_length - self.pose.x(), self.pose.y(), mirror(self.pose.rotation)),
            velocity: self.velocity,
            heading_of_motion: mirror(self.heading_of_motion),
            angular_velocity: -self.angular_velocity,
        }
    }
}

/// Time-ordered list of trajectory states, never empty
///
/// Serialized as the bare list of states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TrajectoryState>", into = "Vec<TrajectoryState>")]
pub struct Trajectory {
    states: Vec<TrajectoryState>,
}

impl Trajectory {
    /// States must be sorted by time
    pub fn new(states: Vec<TrajectoryState>) -> Result<Self> {
        if states.is_empty() {
            return Err(SwerveError::EmptyTrajectory);
        }
        Ok(Self { states })
    }

    /// Straight segments between waypoints, driven at a constant `velocity`
    ///
    /// The robot's facing turns linearly from one waypoint's rotation to the
    /// next over each segment. Coincident waypoints are skipped.
    pub fn from_waypoints(waypoints: &[Pose2d], velocity: f64) -> Result<Self> {
        let Some(first) = waypoints.first() else {
            return Err(SwerveError::EmptyTrajectory);
        };
        if !velocity.is_finite() || velocity <= 0.0 {
            return Err(SwerveError::InvalidLimit {
                name: "trajectory velocity",
                value: velocity,
            });
        }

        let mut states = Vec::with_capacity(waypoints.len());
        let mut time = 0.0;
        let mut previous = *first;

        for next in &waypoints[1..] {
            let segment = next.translation - previous.translation;
            let length = segment.norm();
            if length == 0.0 {
                continue;
            }
            let duration = length / velocity;
            states.push(TrajectoryState {
                time,
                pose: previous,
                velocity,
                heading_of_motion: segment.angle(),
                angular_velocity: (next.rotation - previous.rotation).radians() / duration,
            });
            time += duration;
            previous = *next;
        }

        let heading_of_motion = states.last().map(|s| s.heading_of_motion).unwrap_or_default();
        states.push(TrajectoryState {
            time,
            pose: previous,
            velocity: 0.0,
            heading_of_motion,
            angular_velocity: 0.0,
        });
        Self::new(states)
    }

    pub fn states(&self) -> &[TrajectoryState] {
        &self.states
    }

    pub fn initial_pose(&self) -> Pose2d {
        self.states[0].pose
    }

    /// Duration in seconds
    pub fn total_time(&self) -> f64 {
        self.states[self.states.len() - 1].time
    }

    /// State at `time`, clamped to the ends of the trajectory
    pub fn sample(&self, time: f64) -> TrajectoryState {
        let first = &self.states[0];
        let last = &self.states[self.states.len() - 1];
        if time <= first.time {
            return *first;
        }
        if time >= last.time {
            return *last;
        }

        let upper = self.states.partition_point(|s| s.time <= time);
        let before = &self.states[upper - 1];
        let after = &self.states[upper];
        let span = after.time - before.time;
        if span <= 0.0 {
            return *after;
        }
        before.interpolate(after, (time - before.time) / span)
    }

    /// Same trajectory driven from the other end of the field
    pub fn mirrored(&self, field_length: f64) -> Trajectory {
        Trajectory {
            states: self.states.iter().map(|s| s.mirrored(field_length)).collect(),
        }
    }
}

impl TryFrom<Vec<TrajectoryState>> for Trajectory {
    type Error = SwerveError;

    fn try_from(states: Vec<TrajectoryState>) -> Result<Self> {
        Self::new(states)
    }
}

impl From<Trajectory> for Vec<TrajectoryState> {
    fn from(trajectory: Trajectory) -> Self {
        trajectory.states
    }
}

/// Feedback controller that turns a trajectory sample into chassis speeds
pub trait PathController {
    /// Robot-relative speeds that track `target` from `pose`
    fn calculate(&mut self, pose: Pose2d, speeds: ChassisSpeeds, target: &TrajectoryState) -> ChassisSpeeds;
}

/// Feedforward plus proportional feedback on position and heading
#[derive(Debug, Clone, PartialEq)]
pub struct HolonomicDriveController {
    pub xy_kp: f64,
    pub theta_kp: f64,
    max_rotation: f64, // rad/s
}

impl HolonomicDriveController {
    /// # Arguments
    /// * `max_module_speed` - Fastest a wheel may be asked to go, m/s
    /// * `drive_base_radius` - Distance from center to the farthest module, m
    pub fn new(xy_kp: f64, theta_kp: f64, max_module_speed: f64, drive_base_radius: f64) -> Self {
        let max_rotation = if drive_base_radius > 0.0 {
            max_module_speed / drive_base_radius
        } else {
            f64::INFINITY
        };
        Self {
            xy_kp,
            theta_kp,
            max_rotation,
        }
    }

    /// Rotation rate that alone would spin the outermost wheel at max speed
    pub fn max_rotation(&self) -> f64 {
        self.max_rotation
    }
}

impl PathController for HolonomicDriveController {
    fn calculate(&mut self, pose: Pose2d, _speeds: ChassisSpeeds, target: &TrajectoryState) -> ChassisSpeeds {
        let feedforward = Translation2d::from_polar(target.velocity, target.heading_of_motion);
        let error = target.pose.translation - pose.translation;
        let vx = feedforward.x + self.xy_kp * error.x;
        let vy = feedforward.y + self.xy_kp * error.y;

        let heading_error = (target.pose.rotation - pose.rotation).radians();
        let omega = (target.angular_velocity + self.theta_kp * heading_error)
            .clamp(-self.max_rotation, self.max_rotation);

        ChassisSpeeds::from_field_relative(vx, vy, omega, pose.rotation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn l_path() -> Trajectory {
        Trajectory::from_waypoints(
            &[
                Pose2d::from_xy(1.0, 1.0, Rotation2d::default()),
                Pose2d::from_xy(3.0, 1.0, Rotation2d::default()),
                Pose2d::from_xy(3.0, 2.0, Rotation2d::from_degrees(90.0)),
            ],
            1.0,
        )
        .unwrap()
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(Trajectory::new(vec![]), Err(SwerveError::EmptyTrajectory)));
        assert!(matches!(Trajectory::from_waypoints(&[], 1.0), Err(SwerveError::EmptyTrajectory)));
    }

    #[test]
    fn test_load_from_json() {
        assert!(serde_json::from_str::<Trajectory>("[]").is_err());

        let json = serde_json::to_string(&l_path()).unwrap();
        assert!(json.starts_with('['));
        let loaded: Trajectory = serde_json::from_str(&json).unwrap();
        assert!((loaded.total_time() - 3.0).abs() < EPS);
    }

    #[test]
    fn test_waypoint_timing() {
        let traj = l_path();
        assert!((traj.total_time() - 3.0).abs() < EPS);
        assert_eq!(traj.initial_pose(), Pose2d::from_xy(1.0, 1.0, Rotation2d::default()));
    }

    #[test]
    fn test_sample_interpolates() {
        let traj = l_path();
        let mid = traj.sample(1.0);
        assert!((mid.pose.x() - 2.0).abs() < EPS);
        assert!((mid.pose.y() - 1.0).abs() < EPS);
        assert!((mid.velocity - 1.0).abs() < EPS);

        let turning = traj.sample(2.5);
        assert!((turning.pose.y() - 1.5).abs() < EPS);
        assert!((turning.pose.rotation.degrees() - 45.0).abs() < 1e-6);
        assert!((turning.heading_of_motion.degrees() - 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_sample_clamps() {
        let traj = l_path();
        assert_eq!(traj.sample(-1.0), traj.states()[0]);
        assert_eq!(traj.sample(100.0), *traj.states().last().unwrap());
    }

    #[test]
    fn test_mirror() {
        let traj = l_path().mirrored(16.54);
        let start = traj.initial_pose();
        assert!((start.x() - 15.54).abs() < EPS);
        assert!((start.y() - 1.0).abs() < EPS);
        assert!((start.rotation.degrees().abs() - 180.0).abs() < 1e-6);

        // First segment now heads toward -x
        assert!((traj.states()[0].heading_of_motion.degrees().abs() - 180.0).abs() < 1e-6);
    }

    #[test]
    fn test_controller_feedforward_on_target() {
        let mut controller = HolonomicDriveController::new(1.0, 1.0, 4.5, 0.4);
        let target = TrajectoryState {
            time: 0.0,
            pose: Pose2d::default(),
            velocity: 2.0,
            heading_of_motion: Rotation2d::default(),
            angular_velocity: 0.0,
        };
        let speeds = controller.calculate(Pose2d::default(), ChassisSpeeds::default(), &target);
        assert!((speeds.vx - 2.0).abs() < EPS);
        assert!(speeds.vy.abs() < EPS);
        assert!(speeds.omega.abs() < EPS);
    }

    #[test]
    fn test_controller_corrects_error_in_robot_frame() {
        let mut controller = HolonomicDriveController::new(2.0, 1.0, 4.5, 0.4);
        let target = TrajectoryState {
            pose: Pose2d::from_xy(1.0, 0.0, Rotation2d::from_degrees(90.0)),
            heading_of_motion: Rotation2d::default(),
            ..Default::default()
        };
        // Robot faces +y, target is 1 m ahead along field +x, i.e. to the robot's right
        let pose = Pose2d::from_xy(0.0, 0.0, Rotation2d::from_degrees(90.0));
        let speeds = controller.calculate(pose, ChassisSpeeds::default(), &target);
        assert!(speeds.vx.abs() < EPS);
        assert!((speeds.vy - -2.0).abs() < EPS);
    }

    #[test]
    fn test_controller_limits_rotation() {
        let mut controller = HolonomicDriveController::new(1.0, 100.0, 4.0, 0.5);
        let target = TrajectoryState {
            pose: Pose2d::from_xy(0.0, 0.0, Rotation2d::from_degrees(90.0)),
            ..Default::default()
        };
        let speeds = controller.calculate(Pose2d::default(), ChassisSpeeds::default(), &target);
        assert!((speeds.omega - controller.max_rotation()).abs() < EPS);
        assert!((controller.max_rotation() - 8.0).abs() < EPS);
    }
}
