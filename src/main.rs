// src/main.rs - vehicle-host: drive the engine end to end from the CLI
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::LocalSet;

use obosim::sensors::ObstacleField;
use obosim::{CommandKind, Config, Vehicle, VehicleEvent};

#[derive(Debug, Parser)]
#[command(
    name = "vehicle-host",
    about = "Drive the simulated vehicle through a demo pattern"
)]
struct Cli {
    /// Configuration file; engine defaults apply when it does not exist
    #[arg(short, long, default_value = "vehicle.toml")]
    config: PathBuf,

    /// Demo driving pattern
    #[arg(short, long, value_enum, default_value_t = Pattern::Square)]
    pattern: Pattern,

    /// Emit the final status report as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Pattern {
    /// Four sides, four right turns, back at the start facing north.
    Square,
    /// A long left 270 and back with a right 270.
    Spin,
    /// Out, about-face, and home.
    OutAndBack,
}

fn pattern_commands(pattern: Pattern) -> Vec<(CommandKind, f64)> {
    match pattern {
        Pattern::Square => vec![
            (CommandKind::MoveForward, 4.0),
            (CommandKind::TurnRight, 90.0),
            (CommandKind::MoveForward, 4.0),
            (CommandKind::TurnRight, 90.0),
            (CommandKind::MoveForward, 4.0),
            (CommandKind::TurnRight, 90.0),
            (CommandKind::MoveForward, 4.0),
            (CommandKind::TurnRight, 90.0),
        ],
        Pattern::Spin => vec![
            (CommandKind::TurnLeft, 270.0),
            (CommandKind::Wait, 1.0),
            (CommandKind::TurnRight, 270.0),
        ],
        Pattern::OutAndBack => vec![
            (CommandKind::MoveForward, 5.0),
            (CommandKind::TurnRight, 180.0),
            (CommandKind::MoveForward, 5.0),
            (CommandKind::TurnLeft, 180.0),
        ],
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        tracing::info!(path = %cli.config.display(), "config not found, using defaults");
        Config::default()
    };

    tracing::info!(vehicle = %config.vehicle.name, pattern = ?cli.pattern, "starting vehicle host");

    let local = LocalSet::new();
    local
        .run_until(async move {
            let field = ObstacleField::scatter(config.sensors.clone(), 12, 15.0, 42);
            let vehicle = Vehicle::with_sensors(config, Box::new(field));
            vehicle.start();

            let mut events = vehicle.subscribe();
            tokio::task::spawn_local(async move {
                while let Ok(event) = events.recv().await {
                    match event {
                        VehicleEvent::CommandStarted { id, kind } => {
                            tracing::info!(%id, ?kind, "command started");
                        }
                        VehicleEvent::CommandFinished {
                            id, disposition, ..
                        } => {
                            tracing::info!(%id, ?disposition, "command finished");
                        }
                        VehicleEvent::StateChanged { from, to } => {
                            tracing::debug!(?from, ?to, "state changed");
                        }
                        _ => {}
                    }
                }
            });

            for (kind, magnitude) in pattern_commands(cli.pattern) {
                vehicle.enqueue_command(kind, magnitude, 0).await?;
            }

            // The engine is non-blocking; poll until the queue drains and the
            // last command settles.
            loop {
                tokio::time::sleep(Duration::from_millis(100)).await;
                if !vehicle.is_busy().await && vehicle.queue_depth().await == 0 {
                    break;
                }
            }

            let report = vehicle.status().await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let sensors = vehicle.get_sensors().await;
                tracing::info!(
                    position = ?report.pose.position,
                    heading_deg = report.pose.heading_deg,
                    cumulative_deg = report.pose.cumulative_heading_deg,
                    battery_pct = report.battery_pct,
                    odometer = report.odometer,
                    "run complete"
                );
                tracing::info!(
                    front = sensors.front,
                    right = sensors.right,
                    back = sensors.back,
                    left = sensors.left,
                    "sensor sweep"
                );
            }

            vehicle.shutdown();
            Ok::<(), Box<dyn std::error::Error>>(())
        })
        .await?;

    Ok(())
}
