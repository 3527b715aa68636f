pub mod command;
pub mod config;
pub mod drivetrain;
pub mod error;
pub mod estimator;
pub mod geometry;
pub mod kinematics;
pub mod messages;
pub mod module;
pub mod motor;
pub mod runtime;
pub mod scheduler;
pub mod trajectory;
pub mod units;

pub use drivetrain::{SwerveDrive, SwerveDriveBuilder, VelocityLimits};
pub use error::{Result, SwerveError};
