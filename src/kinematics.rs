// Swerve kinematics for an arbitrary number of modules
// Converts chassis velocities (vx, vy, omega) to per-module speed + angle and back.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};

use crate::error::{Result, SwerveError};
use crate::geometry::{Rotation2d, Translation2d, Twist2d};

/// Singular values below this are treated as zero when inverting the model
const RANK_EPSILON: f64 = 1e-9;

/// Robot-relative chassis velocity
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChassisSpeeds {
    pub vx: f64,    // m/s, positive = forward
    pub vy: f64,    // m/s, positive = left
    pub omega: f64, // rad/s, positive = counter-clockwise
}

impl ChassisSpeeds {
    pub const fn new(vx: f64, vy: f64, omega: f64) -> Self {
        Self { vx, vy, omega }
    }

    /// Convert field-relative velocities into the robot frame
    ///
    /// # Arguments
    /// * `vx`, `vy` - Velocity along the field axes in m/s
    /// * `omega` - Rotational velocity in rad/s
    /// * `heading` - Current robot heading relative to the field
    pub fn from_field_relative(vx: f64, vy: f64, omega: f64, heading: Rotation2d) -> Self {
        let robot = Translation2d::new(vx, vy).rotate_by(-heading);
        Self::new(robot.x, robot.y, omega)
    }

    pub fn translation(&self) -> Translation2d {
        Translation2d::new(self.vx, self.vy)
    }

    fn is_zero(&self) -> bool {
        self.vx == 0.0 && self.vy == 0.0 && self.omega == 0.0
    }
}

/// Target (or measured) state of one module
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SwerveModuleState {
    pub speed: f64, // m/s, signed
    pub angle: Rotation2d,
}

impl SwerveModuleState {
    pub const fn new(speed: f64, angle: Rotation2d) -> Self {
        Self { speed, angle }
    }

    /// Pick the equivalent state that needs the least azimuth travel
    ///
    /// A module can reach any target either by turning to it, or by turning to
    /// the opposite direction and driving backwards. The result never asks the
    /// azimuth to move more than 90 degrees.
    pub fn optimize(self, current_angle: Rotation2d) -> Self {
        let delta = (self.angle - current_angle).radians();
        if delta.abs() > FRAC_PI_2 {
            Self::new(-self.speed, self.angle + Rotation2d::from_radians(PI))
        } else {
            self
        }
    }
}

/// Cumulative distance driven by a module and its current azimuth
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SwerveModulePosition {
    pub distance: f64, // m
    pub angle: Rotation2d,
}

impl SwerveModulePosition {
    pub const fn new(distance: f64, angle: Rotation2d) -> Self {
        Self { distance, angle }
    }

    /// Linear interpolation of distance and angle
    pub fn interpolate(&self, end: SwerveModulePosition, t: f64) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self::new(
            self.distance + (end.distance - self.distance) * t,
            self.angle.interpolate(end.angle, t),
        )
    }
}

/// Kinematic model of a swerve base with N modules
///
/// Module order is the order of `placements`; every slice passed in or returned
/// uses the same order.
#[derive(Debug, Clone)]
pub struct SwerveKinematics {
    placements: Vec<Translation2d>,
    // 2N x 3: chassis speeds -> stacked module velocity vectors
    inverse: DMatrix<f64>,
    // 3 x 2N least-squares inverse of the above
    forward: DMatrix<f64>,
    // Last commanded angles, reused when the chassis is asked to stop
    last_angles: Vec<Rotation2d>,
}

impl SwerveKinematics {
    pub fn new(placements: Vec<Translation2d>) -> Result<Self> {
        let count = placements.len();
        if count < 2 {
            return Err(SwerveError::TooFewModules { count });
        }

        // Each module contributes two rows:
        // vx_i = vx - omega * y_i
        // vy_i = vy + omega * x_i
        let mut inverse = DMatrix::<f64>::zeros(count * 2, 3);
        for (i, p) in placements.iter().enumerate() {
            inverse[(i * 2, 0)] = 1.0;
            inverse[(i * 2, 2)] = -p.y;
            inverse[(i * 2 + 1, 1)] = 1.0;
            inverse[(i * 2 + 1, 2)] = p.x;
        }

        if inverse.rank(RANK_EPSILON) < 3 {
            return Err(SwerveError::SingularGeometry);
        }
        let forward = inverse
            .clone()
            .pseudo_inverse(RANK_EPSILON)
            .map_err(|_| SwerveError::SingularGeometry)?;

        Ok(Self {
            last_angles: vec![Rotation2d::default(); count],
            placements,
            inverse,
            forward,
        })
    }

    pub fn module_count(&self) -> usize {
        self.placements.len()
    }

    pub fn placements(&self) -> &[Translation2d] {
        &self.placements
    }

    /// Inverse kinematics: chassis speeds -> one state per module
    ///
    /// A zero chassis speed keeps every module at its previous angle so the
    /// wheels don't snap back to zero when the robot stops.
    pub fn to_module_states(&mut self, speeds: ChassisSpeeds) -> Vec<SwerveModuleState> {
        if speeds.is_zero() {
            return self
                .last_angles
                .iter()
                .map(|&angle| SwerveModuleState::new(0.0, angle))
                .collect();
        }

        let chassis = DVector::from_vec(vec![speeds.vx, speeds.vy, speeds.omega]);
        let module_vectors = &self.inverse * chassis;

        let states: Vec<SwerveModuleState> = (0..self.module_count())
            .map(|i| {
                let v = Translation2d::new(module_vectors[i * 2], module_vectors[i * 2 + 1]);
                SwerveModuleState::new(v.norm(), v.angle())
            })
            .collect();

        self.last_angles = states.iter().map(|s| s.angle).collect();
        states
    }

    /// Forward kinematics: module states -> chassis speeds (least squares)
    ///
    /// # Panics
    /// If `states.len()` differs from the module count.
    pub fn to_chassis_speeds(&self, states: &[SwerveModuleState]) -> ChassisSpeeds {
        assert_eq!(
            states.len(),
            self.module_count(),
            "module state count must match module count"
        );

        let stacked = DVector::from_iterator(
            states.len() * 2,
            states
                .iter()
                .flat_map(|s| [s.speed * s.angle.cos(), s.speed * s.angle.sin()]),
        );
        let chassis = &self.forward * stacked;
        ChassisSpeeds::new(chassis[0], chassis[1], chassis[2])
    }

    /// Chassis displacement between two sets of module positions
    ///
    /// Each module's travel is taken along its angle at `end`.
    ///
    /// # Panics
    /// If either slice length differs from the module count.
    pub fn to_twist(&self, start: &[SwerveModulePosition], end: &[SwerveModulePosition]) -> Twist2d {
        assert_eq!(start.len(), self.module_count(), "module position count must match module count");
        assert_eq!(end.len(), self.module_count(), "module position count must match module count");

        let deltas: Vec<SwerveModuleState> = start
            .iter()
            .zip(end)
            .map(|(s, e)| SwerveModuleState::new(e.distance - s.distance, e.angle))
            .collect();
        let d = self.to_chassis_speeds(&deltas);
        Twist2d {
            dx: d.vx,
            dy: d.vy,
            dtheta: d.omega,
        }
    }

    /// Scale all module speeds down uniformly so none exceeds `max_speed`
    ///
    /// Ratios between modules are preserved, which keeps the commanded
    /// direction and curvature intact. States already within the limit are
    /// returned untouched.
    pub fn desaturate_wheel_speeds(
        mut states: Vec<SwerveModuleState>,
        max_speed: f64,
    ) -> Vec<SwerveModuleState> {
        let max_computed = states.iter().map(|s| s.speed.abs()).fold(0.0f64, f64::max);

        if max_computed > max_speed {
            let scale = max_speed / max_computed;
            for state in &mut states {
                state.speed *= scale;
            }
        }
        states
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn square_base() -> SwerveKinematics {
        SwerveKinematics::new(vec![
            Translation2d::new(0.3, 0.3),
            Translation2d::new(0.3, -0.3),
            Translation2d::new(-0.3, 0.3),
            Translation2d::new(-0.3, -0.3),
        ])
        .unwrap()
    }

    #[test]
    fn test_too_few_modules() {
        let err = SwerveKinematics::new(vec![Translation2d::new(0.3, 0.3)]).unwrap_err();
        assert!(matches!(err, SwerveError::TooFewModules { count: 1 }));
    }

    #[test]
    fn test_coincident_modules_rejected() {
        let err = SwerveKinematics::new(vec![Translation2d::new(0.1, 0.1); 3]).unwrap_err();
        assert!(matches!(err, SwerveError::SingularGeometry));
    }

    #[test]
    fn test_straight_forward() {
        let mut k = square_base();
        let states = k.to_module_states(ChassisSpeeds::new(2.0, 0.0, 0.0));
        for s in states {
            assert!((s.speed - 2.0).abs() < EPS);
            assert!(s.angle.radians().abs() < EPS);
        }
    }

    #[test]
    fn test_rotation_only() {
        // Pure rotation points every wheel tangent to the circle through it
        let mut k = square_base();
        let omega = 2.0;
        let states = k.to_module_states(ChassisSpeeds::new(0.0, 0.0, omega));
        let radius = 0.3f64.hypot(0.3);
        for (s, p) in states.iter().zip(k.placements()) {
            assert!((s.speed - omega * radius).abs() < EPS);
            let expected = p.angle() + Rotation2d::from_radians(FRAC_PI_2);
            assert!((s.angle - expected).radians().abs() < EPS);
        }
    }

    #[test]
    fn test_stop_keeps_last_angles() {
        let mut k = square_base();
        let moving = k.to_module_states(ChassisSpeeds::new(0.0, 1.0, 0.0));
        let stopped = k.to_module_states(ChassisSpeeds::default());
        for (m, s) in moving.iter().zip(&stopped) {
            assert_eq!(s.speed, 0.0);
            assert_eq!(s.angle, m.angle);
        }
    }

    #[test]
    fn test_round_trip() {
        let mut k = square_base();
        let speeds = ChassisSpeeds::new(1.2, -0.7, 1.5);
        let states = k.to_module_states(speeds);
        let back = k.to_chassis_speeds(&states);
        assert!((back.vx - speeds.vx).abs() < 1e-9);
        assert!((back.vy - speeds.vy).abs() < 1e-9);
        assert!((back.omega - speeds.omega).abs() < 1e-9);
    }

    #[test]
    fn test_round_trip_three_modules() {
        let mut k = SwerveKinematics::new(vec![
            Translation2d::new(0.25, 0.0),
            Translation2d::new(-0.125, 0.2165),
            Translation2d::new(-0.125, -0.2165),
        ])
        .unwrap();
        let speeds = ChassisSpeeds::new(-0.4, 0.9, -2.0);
        let states = k.to_module_states(speeds);
        let back = k.to_chassis_speeds(&states);
        assert!((back.vx - speeds.vx).abs() < 1e-9);
        assert!((back.vy - speeds.vy).abs() < 1e-9);
        assert!((back.omega - speeds.omega).abs() < 1e-9);
    }

    #[test]
    fn test_desaturate_scales_uniformly() {
        let states = vec![
            SwerveModuleState::new(5.0, Rotation2d::default()),
            SwerveModuleState::new(-2.5, Rotation2d::default()),
            SwerveModuleState::new(1.0, Rotation2d::default()),
        ];
        let out = SwerveKinematics::desaturate_wheel_speeds(states.clone(), 4.0);
        for (before, after) in states.iter().zip(&out) {
            assert!((after.speed - before.speed * (4.0 / 5.0)).abs() < EPS);
        }
    }

    #[test]
    fn test_desaturate_within_limit_is_identity() {
        let states = vec![
            SwerveModuleState::new(3.999, Rotation2d::from_degrees(10.0)),
            SwerveModuleState::new(-4.0, Rotation2d::from_degrees(-30.0)),
        ];
        let out = SwerveKinematics::desaturate_wheel_speeds(states.clone(), 4.0);
        assert_eq!(out, states);
    }

    #[test]
    fn test_twist_forward() {
        let k = square_base();
        let start = vec![SwerveModulePosition::default(); 4];
        let end = vec![SwerveModulePosition::new(1.5, Rotation2d::default()); 4];
        let twist = k.to_twist(&start, &end);
        assert!((twist.dx - 1.5).abs() < EPS);
        assert!(twist.dy.abs() < EPS);
        assert!(twist.dtheta.abs() < EPS);
    }

    #[test]
    fn test_field_relative_conversion() {
        // Facing +y on the field, "field forward" is the robot's right
        let speeds = ChassisSpeeds::from_field_relative(1.0, 0.0, 0.5, Rotation2d::from_degrees(90.0));
        assert!(speeds.vx.abs() < EPS);
        assert!((speeds.vy - -1.0).abs() < EPS);
        assert_eq!(speeds.omega, 0.5);
    }

    #[test]
    fn test_optimize_flips_large_turns() {
        let target = SwerveModuleState::new(2.0, Rotation2d::from_degrees(170.0));
        let optimized = target.optimize(Rotation2d::from_degrees(0.0));
        assert_eq!(optimized.speed, -2.0);
        assert!((optimized.angle.degrees() - -10.0).abs() < 1e-9);

        let small = SwerveModuleState::new(2.0, Rotation2d::from_degrees(45.0));
        assert_eq!(small.optimize(Rotation2d::default()), small);
    }
}
