// Commands that drive the swerve base
//
// - Teleop: runs every cycle from driver input until replaced
// - Follow trajectory: tracks one trajectory and finishes

mod follow;
mod teleop;

pub use follow::{FollowTrajectoryCommand, TrajectoryFollowerParameters};
pub use teleop::{InputSource, TeleopCommand, TeleopSettings};
