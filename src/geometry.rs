// Planar geometry: translations, rotations, poses and twists.
//
// Conventions: +x forward, +y left, rotations counter-clockwise positive, SI units.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Neg, Sub};

/// Threshold under which the exp/log maps switch to their Taylor expansions
const SMALL_ANGLE: f64 = 1e-9;

/// A 2D vector (position offset in meters or a velocity in m/s)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Translation2d {
    pub x: f64,
    pub y: f64,
}

impl Translation2d {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn from_polar(distance: f64, angle: Rotation2d) -> Self {
        Self::new(distance * angle.cos(), distance * angle.sin())
    }

    /// Euclidean length
    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Direction of the vector; zero vectors report zero
    pub fn angle(&self) -> Rotation2d {
        Rotation2d::from_radians(self.y.atan2(self.x))
    }

    /// Rotate the vector counter-clockwise about the origin
    pub fn rotate_by(&self, rotation: Rotation2d) -> Self {
        let (s, c) = (rotation.sin(), rotation.cos());
        Self::new(self.x * c - self.y * s, self.x * s + self.y * c)
    }
}

impl Add for Translation2d {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Translation2d {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Translation2d {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

/// A planar rotation, stored in radians
///
/// Values are not wrapped on construction; results of composition are wrapped
/// to (-pi, pi].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rotation2d {
    radians: f64,
}

impl Rotation2d {
    pub const fn from_radians(radians: f64) -> Self {
        Self { radians }
    }

    pub fn from_degrees(degrees: f64) -> Self {
        Self::from_radians(degrees.to_radians())
    }

    pub fn radians(&self) -> f64 {
        self.radians
    }

    pub fn degrees(&self) -> f64 {
        self.radians.to_degrees()
    }

    pub fn cos(&self) -> f64 {
        self.radians.cos()
    }

    pub fn sin(&self) -> f64 {
        self.radians.sin()
    }

    /// Compose two rotations, wrapping the result
    pub fn rotate_by(&self, other: Rotation2d) -> Self {
        let c = self.cos() * other.cos() - self.sin() * other.sin();
        let s = self.cos() * other.sin() + self.sin() * other.cos();
        Self::from_radians(s.atan2(c))
    }

    /// Linear interpolation along the shortest arc
    pub fn interpolate(&self, end: Rotation2d, t: f64) -> Self {
        let t = t.clamp(0.0, 1.0);
        self.rotate_by(Rotation2d::from_radians((end - *self).radians() * t))
    }
}

impl Add for Rotation2d {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        self.rotate_by(rhs)
    }
}

impl Sub for Rotation2d {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        self.rotate_by(-rhs)
    }
}

impl Neg for Rotation2d {
    type Output = Self;
    fn neg(self) -> Self {
        Self::from_radians(-self.radians)
    }
}

/// Rigid transform between two poses
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transform2d {
    pub translation: Translation2d,
    pub rotation: Rotation2d,
}

/// A velocity-like displacement along an arc (dx, dy in meters, dtheta in radians)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Twist2d {
    pub dx: f64,
    pub dy: f64,
    pub dtheta: f64,
}

impl Mul<f64> for Twist2d {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self {
            dx: self.dx * rhs,
            dy: self.dy * rhs,
            dtheta: self.dtheta * rhs,
        }
    }
}

/// Position and heading on the field
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose2d {
    pub translation: Translation2d,
    pub rotation: Rotation2d,
}

impl Pose2d {
    pub const fn new(translation: Translation2d, rotation: Rotation2d) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn from_xy(x: f64, y: f64, rotation: Rotation2d) -> Self {
        Self::new(Translation2d::new(x, y), rotation)
    }

    pub fn x(&self) -> f64 {
        self.translation.x
    }

    pub fn y(&self) -> f64 {
        self.translation.y
    }

    /// Apply a transform expressed in this pose's frame
    pub fn transform_by(&self, transform: Transform2d) -> Pose2d {
        Pose2d::new(
            self.translation + transform.translation.rotate_by(self.rotation),
            self.rotation + transform.rotation,
        )
    }

    /// Express this pose in the frame of `other`
    pub fn relative_to(&self, other: Pose2d) -> Transform2d {
        Transform2d {
            translation: (self.translation - other.translation).rotate_by(-other.rotation),
            rotation: self.rotation - other.rotation,
        }
    }

    /// Follow a constant-curvature arc described by `twist` from this pose
    pub fn exp(&self, twist: Twist2d) -> Pose2d {
        let Twist2d { dx, dy, dtheta } = twist;
        let (sin_theta, cos_theta) = (dtheta.sin(), dtheta.cos());

        let (s, c) = if dtheta.abs() < SMALL_ANGLE {
            (1.0 - dtheta * dtheta / 6.0, 0.5 * dtheta)
        } else {
            (sin_theta / dtheta, (1.0 - cos_theta) / dtheta)
        };

        let transform = Transform2d {
            translation: Translation2d::new(dx * s - dy * c, dx * c + dy * s),
            rotation: Rotation2d::from_radians(sin_theta.atan2(cos_theta)),
        };
        self.transform_by(transform)
    }

    /// The twist that takes this pose to `end` (inverse of [`Pose2d::exp`])
    pub fn log(&self, end: Pose2d) -> Twist2d {
        let transform = end.relative_to(*self);
        let dtheta = transform.rotation.radians();
        let half_dtheta = dtheta / 2.0;
        let cos_minus_one = transform.rotation.cos() - 1.0;

        let half_theta_by_tan = if cos_minus_one.abs() < SMALL_ANGLE {
            1.0 - dtheta * dtheta / 12.0
        } else {
            -(half_dtheta * transform.rotation.sin()) / cos_minus_one
        };

        let translation = transform
            .translation
            .rotate_by(Rotation2d::from_radians((-half_dtheta).atan2(half_theta_by_tan)))
            * half_theta_by_tan.hypot(half_dtheta);

        Twist2d {
            dx: translation.x,
            dy: translation.y,
            dtheta,
        }
    }

    /// Interpolate along the twist between two poses, `t` in [0, 1]
    pub fn interpolate(&self, end: Pose2d, t: f64) -> Pose2d {
        if t <= 0.0 {
            *self
        } else if t >= 1.0 {
            end
        } else {
            self.exp(self.log(end) * t)
        }
    }
}
