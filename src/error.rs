// Error types for drivetrain construction and configuration

/// Failures that can happen while building or configuring the drivetrain.
///
/// Runtime contract violations (wrong number of module states, etc.) are not
/// represented here; those panic.
#[derive(Debug, thiserror::Error)]
pub enum SwerveError {
    #[error("A swerve drive needs at least 2 modules, got {count}")]
    TooFewModules { count: usize },

    #[error("Module placements do not define a usable kinematic model")]
    SingularGeometry,

    #[error("Invalid {name} limit: {value}")]
    InvalidLimit { name: &'static str, value: f64 },

    #[error("Trajectory has no states")]
    EmptyTrajectory,

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SwerveError>;
