// 50 Hz loop with watchdog
// Note: a watchdog is a safety mechanism that triggers a safe action if something goes wrong
// Eg. without it if teleop crashes and stops sending input, the robot would keep driving on the last input

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::command::{TeleopCommand, TeleopSettings};
use crate::config::{
    CMD_TIMEOUT, DrivetrainConfig, LOOP_HZ, LOOP_PERIOD, TOPIC_CMD_SETTINGS, TOPIC_CMD_TELEOP, TOPIC_COMMANDS,
    TOPIC_DRIVETRAIN, TOPIC_HEALTH, TOPIC_VISION_POSE,
};
use crate::drivetrain::SwerveDrive;
use crate::error::Result;
use crate::geometry::Pose2d;
use crate::messages::{CommandTelemetry, RuntimeHealth, SettingsCommand, TeleopInput, VisionPose};
use crate::module::{CoaxialSwerveModule, Gyro, SwerveModule};
use crate::motor::{SimAzimuthMotor, SimDriveMotor, SimGyro};
use crate::scheduler::{Command, Scheduler, Subsystem};

/// Drivetrain made of ideal simulated motors
pub type SimSwerveDrive = SwerveDrive<CoaxialSwerveModule<SimDriveMotor, SimAzimuthMotor>, SimGyro>;

pub struct Runtime {
    latest_input: Option<TeleopInput>,
    input_received_at: Instant,
    health: RuntimeHealth,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            latest_input: None,
            input_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first input
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    /// Process incoming driver input
    fn on_input(&mut self, input: TeleopInput) {
        debug!("Received input: {:?}", &input);
        self.latest_input = Some(input.clamped());
        self.input_received_at = Instant::now();
    }

    /// Driver input to use this cycle, based on watchdog state
    fn compute_input(&mut self) -> TeleopInput {
        let input_age = self.input_received_at.elapsed();

        if input_age > CMD_TIMEOUT {
            // Watchdog triggered - stop the robot
            if self.health != RuntimeHealth::CmdStale {
                warn!("Input stale ({:?} old), stopping robot", input_age);
            }
            self.health = RuntimeHealth::CmdStale;
            TeleopInput::default()
        } else if let Some(input) = self.latest_input {
            self.health = RuntimeHealth::Ok;
            input
        } else {
            // No input ever received
            self.health = RuntimeHealth::CmdStale;
            TeleopInput::default()
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds the wheels in an X until the driver moves again
struct SkiStopCommand;

impl<M: SwerveModule, G: Gyro> Command<SwerveDrive<M, G>> for SkiStopCommand {
    fn name(&self) -> &'static str {
        "ski_stop"
    }

    fn execute(&mut self, drive: &mut SwerveDrive<M, G>) {
        drive.ski_stop();
    }
}

/// Build the simulated drivetrain described by `config`
///
/// Blocks for the configured startup settle. Poses sent on `vision` are fed
/// to the estimator on the next cycle; only the newest one counts.
pub fn build_sim_drivetrain(
    config: &DrivetrainConfig,
    mut vision: mpsc::UnboundedReceiver<Pose2d>,
) -> Result<SimSwerveDrive> {
    let max_speed = config.max_linear.as_meters_per_second();
    let modules = config
        .placements()
        .into_iter()
        .map(|placement| {
            CoaxialSwerveModule::new(SimDriveMotor::new(), SimAzimuthMotor::default(), placement, max_speed)
        })
        .collect();

    SwerveDrive::builder(modules, SimGyro::new(), config.max_linear, config.max_angular)
        .startup_settle(config.startup_settle())
        .std_devs(config.state_std_devs, config.vision_std_devs)
        .vision_pose_callback(move |_estimate| {
            let mut latest = None;
            while let Ok(pose) = vision.try_recv() {
                latest = Some(pose);
            }
            latest
        })
        .build()
}

/// Apply one settings message
pub fn apply_settings<M, G>(
    scheduler: &mut Scheduler<SwerveDrive<M, G>>,
    settings: &TeleopSettings,
    command: SettingsCommand,
) where
    M: SwerveModule,
    G: Gyro,
{
    info!("Settings: {:?}", command);
    match command {
        SettingsCommand::SetFieldRelative { value } => settings.set_field_relative(value),
        SettingsCommand::SetOpenLoop { value } => settings.set_open_loop(value),
        SettingsCommand::ToggleFieldRelative => {
            settings.toggle_field_relative();
        }
        SettingsCommand::ToggleOpenLoop => {
            settings.toggle_open_loop();
        }
        SettingsCommand::ZeroHeading => scheduler.subsystem_mut().zero_heading(),
        SettingsCommand::SkiStop => scheduler.schedule(Box::new(SkiStopCommand)),
    }
}

fn is_moving(input: &TeleopInput) -> bool {
    input.forward != 0.0 || input.strafe != 0.0 || input.rotation != 0.0
}

pub async fn run<M, G>(
    drive: SwerveDrive<M, G>,
    settings: Arc<TeleopSettings>,
    vision: mpsc::UnboundedSender<Pose2d>,
) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    M: SwerveModule,
    G: Gyro,
{
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_teleop = session.declare_subscriber(TOPIC_CMD_TELEOP).await?;
    let sub_settings = session.declare_subscriber(TOPIC_CMD_SETTINGS).await?;
    let sub_vision = session.declare_subscriber(TOPIC_VISION_POSE).await?;
    let pub_drivetrain = session.declare_publisher(TOPIC_DRIVETRAIN).await?;
    let pub_commands = session.declare_publisher(TOPIC_COMMANDS).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    // Teleop reads the latest watchdog-filtered input every cycle
    let (input_tx, input_rx) = watch::channel(TeleopInput::default());
    let (forward, strafe, rotation) = (input_rx.clone(), input_rx.clone(), input_rx);
    let teleop = TeleopCommand::new(
        move || forward.borrow().forward,
        move || strafe.borrow().strafe,
        move || rotation.borrow().rotation,
        Arc::clone(&settings),
    );

    let mut scheduler = Scheduler::new(drive);
    scheduler.set_default_command(Box::new(teleop));

    let mut runtime = Runtime::new();
    let mut tick = interval(LOOP_PERIOD);
    let dt = LOOP_PERIOD.as_secs_f64();

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!(
        "Subscribed to: {}, {}, {}",
        TOPIC_CMD_TELEOP, TOPIC_CMD_SETTINGS, TOPIC_VISION_POSE
    );
    info!("Publishing to: {}, {}, {}", TOPIC_DRIVETRAIN, TOPIC_COMMANDS, TOPIC_HEALTH);

    loop {
        tick.tick().await;

        // 1. Drain all pending input (non-blocking), keep latest
        while let Ok(Some(sample)) = sub_teleop.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<TeleopInput>(&payload) {
                Ok(input) => runtime.on_input(input),
                Err(e) => warn!("Failed to parse teleop input: {}", e),
            }
        }

        // 2. Settings take effect in arrival order
        while let Ok(Some(sample)) = sub_settings.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<SettingsCommand>(&payload) {
                Ok(command) => apply_settings(&mut scheduler, &settings, command),
                Err(e) => warn!("Failed to parse settings command: {}", e),
            }
        }

        // 3. Hand vision poses to the estimator's callback
        while let Ok(Some(sample)) = sub_vision.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<VisionPose>(&payload) {
                Ok(pose) => {
                    if vision.send(Pose2d::from(&pose)).is_err() {
                        warn!("Vision pose dropped: drivetrain no longer listening");
                    }
                }
                Err(e) => warn!("Failed to parse vision pose: {}", e),
            }
        }

        // 4. Watchdog, then release a held ski stop once the driver moves
        let input = runtime.compute_input();
        if scheduler.active_command() == Some("ski_stop") && is_moving(&input) {
            scheduler.cancel();
        }
        input_tx.send_replace(input);

        // 5. Advance the simulated hardware, then run the cycle
        scheduler.subsystem_mut().simulation_periodic(dt);
        scheduler.run_cycle();

        // 6. Publish state
        let telemetry_json = serde_json::to_string(&scheduler.subsystem().telemetry())?;
        pub_drivetrain.put(telemetry_json).await?;

        let commands = CommandTelemetry {
            active_command: scheduler.active_command().map(String::from),
            field_relative: settings.field_relative(),
            open_loop: settings.open_loop(),
        };
        pub_commands.put(serde_json::to_string(&commands)?).await?;

        let health_json = serde_json::to_string(&runtime.health())?;
        pub_health.put(health_json).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Rotation2d, Translation2d};
    use std::time::Duration;

    fn sim_config() -> DrivetrainConfig {
        DrivetrainConfig {
            startup_settle_ms: 0,
            ..Default::default()
        }
    }

    fn sim_scheduler() -> (Scheduler<SimSwerveDrive>, mpsc::UnboundedSender<Pose2d>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let drive = build_sim_drivetrain(&sim_config(), rx).unwrap();
        (Scheduler::new(drive), tx)
    }

    #[test]
    fn test_watchdog_starts_stale() {
        let mut runtime = Runtime::new();
        assert_eq!(runtime.compute_input(), TeleopInput::default());
        assert_eq!(runtime.health(), RuntimeHealth::CmdStale);
    }

    #[test]
    fn test_watchdog_passes_fresh_input() {
        let mut runtime = Runtime::new();
        runtime.on_input(TeleopInput {
            forward: 2.0,
            strafe: 0.5,
            rotation: 0.0,
        });
        let input = runtime.compute_input();
        assert_eq!(input.forward, 1.0);
        assert_eq!(input.strafe, 0.5);
        assert_eq!(runtime.health(), RuntimeHealth::Ok);
    }

    #[test]
    fn test_watchdog_zeroes_stale_input() {
        let mut runtime = Runtime::new();
        runtime.on_input(TeleopInput {
            forward: 0.5,
            strafe: 0.0,
            rotation: 0.0,
        });
        runtime.input_received_at = Instant::now() - CMD_TIMEOUT - Duration::from_millis(10);
        assert_eq!(runtime.compute_input(), TeleopInput::default());
        assert_eq!(runtime.health(), RuntimeHealth::CmdStale);
    }

    #[test]
    fn test_build_from_default_config() {
        let (scheduler, _tx) = sim_scheduler();
        let drive = scheduler.subsystem();
        assert_eq!(drive.modules().len(), 4);
        assert!((drive.max_linear_velocity() - 4.5).abs() < 1e-12);
        assert!((drive.max_angular_velocity() - 11.5).abs() < 1e-12);
    }

    #[test]
    fn test_vision_channel_feeds_estimator() {
        let (mut scheduler, tx) = sim_scheduler();
        tx.send(Pose2d::from_xy(5.0, 0.0, Rotation2d::default())).unwrap();
        tx.send(Pose2d::from_xy(1.0, 0.0, Rotation2d::default())).unwrap();
        scheduler.run_cycle();
        // Only the newest pose is fused, at the default 0.1 gain
        assert!((scheduler.subsystem().pose().x() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_settings_toggle_flags() {
        let (mut scheduler, _tx) = sim_scheduler();
        let settings = TeleopSettings::new(true, true);
        apply_settings(&mut scheduler, &settings, SettingsCommand::ToggleFieldRelative);
        apply_settings(&mut scheduler, &settings, SettingsCommand::SetOpenLoop { value: false });
        assert!(!settings.field_relative());
        assert!(!settings.open_loop());
    }

    #[test]
    fn test_settings_zero_heading() {
        let (mut scheduler, _tx) = sim_scheduler();
        let drive = scheduler.subsystem_mut();
        drive.drive(Translation2d::default(), 1.0, false, false);
        drive.simulation_periodic(0.5);
        assert!(drive.heading().radians().abs() > 0.1);

        apply_settings(&mut scheduler, &TeleopSettings::default(), SettingsCommand::ZeroHeading);
        assert!(scheduler.subsystem().heading().radians().abs() < 1e-12);
    }

    #[test]
    fn test_ski_stop_holds_until_moving() {
        let (mut scheduler, _tx) = sim_scheduler();
        let settings = Arc::new(TeleopSettings::new(false, false));
        let teleop = TeleopCommand::new(|| 0.0, || 0.0, || 0.0, Arc::clone(&settings));
        scheduler.set_default_command(Box::new(teleop));
        scheduler.run_cycle();
        assert_eq!(scheduler.active_command(), Some("teleop"));

        apply_settings(&mut scheduler, &settings, SettingsCommand::SkiStop);
        scheduler.run_cycle();
        scheduler.run_cycle();
        assert_eq!(scheduler.active_command(), Some("ski_stop"));
        for module in scheduler.subsystem().modules() {
            let misalignment = (module.module_state().angle - module.placement().angle()).radians();
            assert!(misalignment.sin().abs() < 1e-9);
        }

        assert!(!is_moving(&TeleopInput::default()));
        scheduler.cancel();
        scheduler.run_cycle();
        assert_eq!(scheduler.active_command(), Some("teleop"));
    }
}
