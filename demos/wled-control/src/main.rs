use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};

use glint::wled::StateUpdate;

use glint_controller::config::{ControllerConfig, ServicesConfig, TransportConfig, TransportMode};
use glint_controller::controller::{BroadcastResult, Controller};

use tracing::{error, info};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Request timeout, in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    timeout: u64,

    /// Close every connection after its response instead of reusing it.
    #[arg(long)]
    basic: bool,

    /// Print the controller statistics before exiting.
    #[arg(long)]
    stats: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check the services configured through `WLED_API_URL`, `HASS_API_URL`,
    /// `HASS_TOKEN` and `LEDFX_API_URL`.
    Status,
    /// Ping devices.
    Ping {
        /// Device addresses.
        #[arg(required = true)]
        devices: Vec<String>,
    },
    /// Turn devices on.
    On {
        /// Device addresses.
        #[arg(required = true)]
        devices: Vec<String>,
    },
    /// Turn devices off.
    Off {
        /// Device addresses.
        #[arg(required = true)]
        devices: Vec<String>,
    },
    /// Set the brightness of devices.
    Brightness {
        /// Brightness, from 0 to 255.
        value: u8,
        /// Device addresses.
        #[arg(required = true)]
        devices: Vec<String>,
    },
    /// Apply an effect, by name, to the main segment of devices.
    Effect {
        /// Effect name.
        name: String,
        /// Device addresses.
        #[arg(required = true)]
        devices: Vec<String>,
    },
}

fn report(results: &[BroadcastResult]) -> bool {
    let mut success = true;
    for BroadcastResult { address, result } in results {
        match result {
            Ok(state) => info!(
                "{address}: {} at brightness {}",
                if state.on { "on" } else { "off" },
                state.brightness
            ),
            Err(e) => {
                error!("{address}: {e}");
                success = false;
            }
        }
    }
    success
}

async fn run(controller: &Controller, command: Command) -> bool {
    match command {
        Command::Status => {
            let statuses = controller
                .test_all_connections(&ServicesConfig::from_env())
                .await;
            for status in &statuses {
                match (&status.error, status.success) {
                    (_, true) => info!("{}: reachable", status.service),
                    (Some(e), false) => error!("{}: {e}", status.service),
                    (None, false) => error!("{}: unreachable", status.service),
                }
            }
            statuses.iter().all(|status| status.success)
        }
        Command::Ping { devices } => {
            let mut success = true;
            for device in &devices {
                let report = match controller.wled(device) {
                    Ok(client) => client.ping_timed().await,
                    Err(e) => {
                        error!("{device}: {e}");
                        success = false;
                        continue;
                    }
                };
                if report.success {
                    info!("{}: {}", report.device, report.message);
                } else {
                    error!("{}: {}", report.device, report.message);
                    success = false;
                }
            }
            success
        }
        Command::On { devices } => {
            report(&controller.broadcast(&devices, &StateUpdate::new().on(true)).await)
        }
        Command::Off { devices } => {
            report(&controller.broadcast(&devices, &StateUpdate::new().on(false)).await)
        }
        Command::Brightness { value, devices } => report(
            &controller
                .broadcast(&devices, &StateUpdate::new().on(true).brightness(value))
                .await,
        ),
        Command::Effect { name, devices } => {
            let mut success = true;
            for device in &devices {
                let result = match controller.wled(device) {
                    Ok(client) => client.set_effect_by_name(&name, 0).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = result {
                    error!("{device}: {e}");
                    success = false;
                } else {
                    info!("{device}: effect {name} applied");
                }
            }
            success
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_target(false).init();

    let cli = Cli::parse();

    let transport = TransportConfig::new()
        .timeout(Duration::from_millis(cli.timeout))
        .mode(if cli.basic {
            TransportMode::Basic
        } else {
            TransportMode::Pooled
        });

    let controller = match Controller::new(ControllerConfig::new().transport(transport)) {
        Ok(controller) => controller,
        Err(e) => {
            error!("Failed to start the controller: {e}");
            return ExitCode::FAILURE;
        }
    };

    let success = run(&controller, cli.command).await;

    if cli.stats {
        match serde_json::to_string_pretty(&controller.stats()) {
            Ok(stats) => println!("{stats}"),
            Err(e) => error!("Failed to serialize the statistics: {e}"),
        }
    }

    controller.shutdown().await;

    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
