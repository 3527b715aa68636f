// Pose estimation: wheel odometry fused with timestamped vision corrections
//
// Odometry integrates the module-position deltas every cycle. Vision poses arrive
// late, so every odometry sample is kept for a short window; a correction is
// applied at the time it was observed and the later samples are replayed on top.

use std::collections::VecDeque;
use tracing::debug;

use crate::geometry::{Pose2d, Rotation2d, Twist2d};
use crate::kinematics::{SwerveKinematics, SwerveModulePosition};

/// How long odometry samples are kept for late vision corrections (seconds)
pub const HISTORY_SECONDS: f64 = 1.5;

/// Default standard deviations of the odometry state (x m, y m, theta rad)
pub const DEFAULT_STATE_STD_DEVS: [f64; 3] = [0.1, 0.1, 0.1];

/// Default standard deviations of vision measurements (x m, y m, theta rad)
pub const DEFAULT_VISION_STD_DEVS: [f64; 3] = [0.9, 0.9, 0.9];

#[derive(Debug, Clone)]
struct PoseRecord {
    timestamp: f64,
    pose: Pose2d,
    gyro: Rotation2d,
    positions: Vec<SwerveModulePosition>,
}

impl PoseRecord {
    fn interpolate(&self, end: &PoseRecord, timestamp: f64) -> PoseRecord {
        let span = end.timestamp - self.timestamp;
        let t = if span > 0.0 {
            (timestamp - self.timestamp) / span
        } else {
            0.0
        };
        PoseRecord {
            timestamp,
            pose: self.pose.interpolate(end.pose, t),
            gyro: self.gyro.interpolate(end.gyro, t),
            positions: self
                .positions
                .iter()
                .zip(&end.positions)
                .map(|(a, b)| a.interpolate(*b, t))
                .collect(),
        }
    }
}

/// Odometry-based pose estimator for a swerve base
#[derive(Debug, Clone)]
pub struct SwervePoseEstimator {
    kinematics: SwerveKinematics,
    pose: Pose2d,
    gyro_offset: Rotation2d,
    previous_angle: Rotation2d,
    previous_positions: Vec<SwerveModulePosition>,
    history: VecDeque<PoseRecord>,
    state_variance: [f64; 3],
    vision_gain: [f64; 3],
}

impl SwervePoseEstimator {
    /// Create an estimator seeded at `initial_pose`
    ///
    /// `gyro` and `positions` are the raw sensor readings at that moment and
    /// become the baseline for the next update.
    pub fn new(
        kinematics: SwerveKinematics,
        gyro: Rotation2d,
        positions: &[SwerveModulePosition],
        initial_pose: Pose2d,
    ) -> Self {
        let mut estimator = Self {
            kinematics,
            pose: initial_pose,
            gyro_offset: initial_pose.rotation - gyro,
            previous_angle: initial_pose.rotation,
            previous_positions: positions.to_vec(),
            history: VecDeque::new(),
            state_variance: [0.0; 3],
            vision_gain: [0.0; 3],
        };
        estimator.set_state_std_devs(DEFAULT_STATE_STD_DEVS);
        estimator.set_vision_std_devs(DEFAULT_VISION_STD_DEVS);
        estimator
    }

    /// Trust in wheel odometry; smaller means vision moves the estimate less
    pub fn set_state_std_devs(&mut self, std_devs: [f64; 3]) {
        self.state_variance = std_devs.map(|s| s * s);
    }

    /// Trust in vision; smaller means vision moves the estimate more
    pub fn set_vision_std_devs(&mut self, std_devs: [f64; 3]) {
        let r = std_devs.map(|s| s * s);
        for i in 0..3 {
            let q = self.state_variance[i];
            self.vision_gain[i] = if q == 0.0 { 0.0 } else { q / (q + (q * r[i]).sqrt()) };
        }
    }

    pub fn estimated_pose(&self) -> Pose2d {
        self.pose
    }

    /// Reset to `pose`, using the given readings as the new baseline
    ///
    /// Clears the sample history so no later correction can be replayed across
    /// the reset.
    pub fn reset_position(
        &mut self,
        gyro: Rotation2d,
        positions: &[SwerveModulePosition],
        pose: Pose2d,
    ) {
        self.reset_odometry(gyro, positions, pose);
        self.history.clear();
    }

    /// Integrate new sensor readings and return the new estimate
    ///
    /// # Panics
    /// If `positions` doesn't have one entry per module.
    pub fn update(
        &mut self,
        timestamp: f64,
        gyro: Rotation2d,
        positions: &[SwerveModulePosition],
    ) -> Pose2d {
        let angle = gyro + self.gyro_offset;

        let mut twist: Twist2d = self.kinematics.to_twist(&self.previous_positions, positions);
        twist.dtheta = (angle - self.previous_angle).radians();

        let moved = self.pose.exp(twist);
        self.pose = Pose2d::new(moved.translation, angle);
        self.previous_angle = angle;
        self.previous_positions = positions.to_vec();

        self.record(PoseRecord {
            timestamp,
            pose: self.pose,
            gyro,
            positions: positions.to_vec(),
        });
        self.pose
    }

    /// Blend a vision pose observed at `timestamp` into the estimate
    ///
    /// Measurements older than the history window are ignored.
    pub fn add_vision_measurement(&mut self, vision_pose: Pose2d, timestamp: f64) {
        let Some(latest) = self.history.back() else {
            return;
        };
        if latest.timestamp - HISTORY_SECONDS > timestamp {
            debug!("Dropping vision pose {:.3}s older than history", latest.timestamp - timestamp);
            return;
        }
        let Some(sample) = self.sample_at(timestamp) else {
            return;
        };

        let twist = sample.pose.log(vision_pose);
        let scaled = Twist2d {
            dx: twist.dx * self.vision_gain[0],
            dy: twist.dy * self.vision_gain[1],
            dtheta: twist.dtheta * self.vision_gain[2],
        };
        let corrected = sample.pose.exp(scaled);

        // Rewind to the observation time, then replay everything after it
        let keep = self
            .history
            .iter()
            .position(|r| r.timestamp > timestamp)
            .unwrap_or(self.history.len());
        let later: Vec<PoseRecord> = self.history.drain(keep..).collect();
        if self.history.back().is_some_and(|r| r.timestamp == timestamp) {
            self.history.pop_back();
        }

        self.reset_odometry(sample.gyro, &sample.positions, corrected);
        self.history.push_back(PoseRecord {
            timestamp,
            pose: corrected,
            gyro: sample.gyro,
            positions: sample.positions,
        });

        for record in later {
            self.update(record.timestamp, record.gyro, &record.positions);
        }
    }

    fn reset_odometry(&mut self, gyro: Rotation2d, positions: &[SwerveModulePosition], pose: Pose2d) {
        self.pose = pose;
        self.previous_angle = pose.rotation;
        self.gyro_offset = pose.rotation - gyro;
        self.previous_positions = positions.to_vec();
    }

    fn record(&mut self, record: PoseRecord) {
        let cutoff = record.timestamp - HISTORY_SECONDS;
        self.history.push_back(record);
        while self.history.front().is_some_and(|r| r.timestamp < cutoff) {
            self.history.pop_front();
        }
    }

    /// Odometry record at `timestamp`, interpolated between neighbours and
    /// clamped to the ends of the history
    fn sample_at(&self, timestamp: f64) -> Option<PoseRecord> {
        let first = self.history.front()?;
        let last = self.history.back()?;
        if timestamp <= first.timestamp {
            return Some(first.clone());
        }
        if timestamp >= last.timestamp {
            return Some(last.clone());
        }

        let upper = self.history.iter().position(|r| r.timestamp >= timestamp)?;
        let before = &self.history[upper - 1];
        let after = &self.history[upper];
        Some(before.interpolate(after, timestamp))
    }
}
