// Keyboard teleop: WASD move, Z/X rotate, R/F speed, G field-relative, O open-loop,
// H zero heading, Space ski stop, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use swerve_zenoh_runtime::config::{TOPIC_CMD_SETTINGS, TOPIC_CMD_TELEOP};
use swerve_zenoh_runtime::messages::{SettingsCommand, TeleopInput};

const SCALES: [f64; 3] = [0.25, 0.5, 1.0]; // fraction of the robot's max speed
const INPUT_TIMEOUT_MS: u64 = 100; // Release the axes after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_input = session.declare_publisher(TOPIC_CMD_TELEOP).await?;
    let pub_settings = session.declare_publisher(TOPIC_CMD_SETTINGS).await?;

    info!("Controls: WASD=move, Z/X=rotate, R/F=speed, G=field relative, O=open loop, H=zero heading, Space=ski stop, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&pub_input, &pub_settings).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    pub_input: &zenoh::pubsub::Publisher<'_>,
    pub_settings: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut scale_idx: usize = 0;
    let mut input = TeleopInput::default();
    let mut last_movement_input = Instant::now();

    loop {
        let mut setting = None;

        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                let scale = SCALES[scale_idx];

                match code {
                    // Movement - set an axis and refresh timestamp
                    KeyCode::Char('w') if pressed => {
                        input.forward = scale;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        input.forward = -scale;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        input.strafe = scale;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        input.strafe = -scale;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('z') if pressed => {
                        input.rotation = scale;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('x') if pressed => {
                        input.rotation = -scale;
                        last_movement_input = Instant::now();
                    }

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        scale_idx = (scale_idx + 1).min(2);
                        print_speed(scale_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        scale_idx = scale_idx.saturating_sub(1);
                        print_speed(scale_idx);
                    }

                    // Drivetrain settings
                    KeyCode::Char('g') if pressed => setting = Some(SettingsCommand::ToggleFieldRelative),
                    KeyCode::Char('o') if pressed => setting = Some(SettingsCommand::ToggleOpenLoop),
                    KeyCode::Char('h') if pressed => setting = Some(SettingsCommand::ZeroHeading),
                    KeyCode::Char(' ') if pressed => setting = Some(SettingsCommand::SkiStop),

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        if let Some(setting) = setting {
            info!("Sending {:?}", setting);
            pub_settings.put(serde_json::to_string(&setting)?).await?;
        }

        // Release the axes if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            input = TeleopInput::default();
        }

        // Always publish at ~50Hz so the runtime watchdog stays fed
        pub_input.put(serde_json::to_string(&input)?).await?;
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
