//! Executes one parsed command line against the relay.

use crate::cli::{ChargeAction, Cli, CliCommand, Toggle};
use crate::error::LinkAppError;

use link_core::config::CONFIG_FILE_NAME;
use link_core::{
    Command, CommandResponse, LinkConfig, SessionStatus, VehicleFamily, VehicleLink,
};

use common::ErrorLocation;

use std::panic::Location;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;

/// Values for `init`, already parsed from the command line.
#[derive(Debug, Clone)]
pub struct InitOptions {
    pub vehicle_id: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub use_tls: bool,
    pub family: VehicleFamily,
    pub force: bool,
}

pub async fn run(cli: Cli) -> Result<(), LinkAppError> {
    let config_dir = resolve_config_dir(cli.config.as_deref())?;
    debug!("Using config directory {}", config_dir.display());

    match cli.command {
        CliCommand::Init {
            vehicle_id,
            host,
            port,
            no_tls,
            family,
            force,
        } => {
            let options = InitOptions {
                vehicle_id,
                host,
                port,
                use_tls: !no_tls,
                family: VehicleFamily::from(family),
                force,
            };
            let path = init_config(&config_dir, &options)?;
            println!("{}", path.display());
            Ok(())
        }
        CliCommand::Watch { seconds, every } => {
            let link = open_link(&config_dir)?;
            let result = watch(
                &link,
                Duration::from_secs(seconds),
                Duration::from_secs(every.max(1)),
            )
            .await;
            link.shutdown().await;
            result
        }
        command => {
            let link = open_link(&config_dir)?;
            let result = match vehicle_command(&command, link.config().vehicle.family) {
                Ok(command) => send(&link, &command).await,
                Err(e) => Err(e),
            };
            link.shutdown().await;
            result
        }
    }
}

#[track_caller]
pub fn resolve_config_dir(explicit: Option<&Path>) -> Result<PathBuf, LinkAppError> {
    match explicit {
        Some(dir) => Ok(dir.to_path_buf()),
        None => LinkConfig::default_dir().ok_or_else(|| LinkAppError::App {
            message: "No platform config directory, pass --config".to_string(),
            location: ErrorLocation::from(Location::caller()),
        }),
    }
}

/// Writes a config for one vehicle. Refuses to overwrite unless forced.
pub fn init_config(config_dir: &Path, options: &InitOptions) -> Result<PathBuf, LinkAppError> {
    let target = config_dir.join(CONFIG_FILE_NAME);
    if target.exists() && !options.force {
        return Err(LinkAppError::app(format!(
            "{} already exists, pass --force to overwrite",
            target.display()
        )));
    }

    let mut config = LinkConfig::default();
    config.vehicle.vehicle_id = options.vehicle_id.trim().to_string();
    config.vehicle.family = options.family;
    config.server.use_tls = options.use_tls;
    config.server.port = options.port;
    if let Some(host) = &options.host {
        config.server.host = host.clone();
    }
    config.require_vehicle()?;

    let path = config.save(config_dir)?;
    info!(
        "Wrote config for vehicle {}, secret is read from ${}",
        config.vehicle.vehicle_id, config.vehicle.secret_env
    );
    Ok(path)
}

/// Loads config and secret and builds an unconnected link.
pub fn open_link(config_dir: &Path) -> Result<VehicleLink, LinkAppError> {
    let config = LinkConfig::load(config_dir)?;
    config.require_vehicle()?;
    let secret = config.resolve_secret()?;
    info!(
        "Vehicle {} via {}",
        config.vehicle.vehicle_id,
        config.endpoint()
    );
    Ok(VehicleLink::new(config, secret))
}

/// Maps a vehicle subcommand onto a protocol command.
pub fn vehicle_command(
    command: &CliCommand,
    family: VehicleFamily,
) -> Result<Command, LinkAppError> {
    let command = match command {
        CliCommand::Send { payload } => Command::from_str(payload)?,
        CliCommand::Climate { state: Toggle::On } => Command::climate_on(family),
        CliCommand::Climate { state: Toggle::Off } => Command::climate_off(family),
        CliCommand::Lock => Command::lock(),
        CliCommand::Unlock => Command::unlock(),
        CliCommand::Charge {
            action: ChargeAction::Start,
        } => Command::start_charge(),
        CliCommand::Charge {
            action: ChargeAction::Stop,
        } => Command::stop_charge(),
        CliCommand::Init { .. } | CliCommand::Watch { .. } => {
            return Err(LinkAppError::app("Not a vehicle command"));
        }
    };
    Ok(command)
}

async fn send(link: &VehicleLink, command: &Command) -> Result<(), LinkAppError> {
    let response = link.execute(command).await?;
    let response = response_outcome(command, response)?;
    print_json(&response)
}

/// Turns the vehicle's answer into the CLI result.
#[track_caller]
pub fn response_outcome(
    command: &Command,
    response: Option<CommandResponse>,
) -> Result<CommandResponse, LinkAppError> {
    match response {
        Some(reply) if reply.is_success() => Ok(reply),
        Some(reply) => Err(LinkAppError::CommandFailed {
            message: format!("Command {command} answered {reply}"),
            location: ErrorLocation::from(Location::caller()),
        }),
        None => Err(LinkAppError::NoResponse {
            message: format!("No response to command {command}, it may still have been delivered"),
            location: ErrorLocation::from(Location::caller()),
        }),
    }
}

async fn watch(link: &VehicleLink, total: Duration, every: Duration) -> Result<(), LinkAppError> {
    link.ensure_connected().await?;

    let deadline = tokio::time::Instant::now() + total;
    let mut ticker = tokio::time::interval(every);
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            _ = &mut interrupted => {
                info!("Interrupted, stopping watch");
                return Ok(());
            }
            _ = tokio::time::sleep_until(deadline) => {
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        if link.status() == SessionStatus::Dead {
            warn!("Relay session dropped, reconnecting");
            link.ensure_connected().await?;
        }

        print_json(&link.telemetry().snapshot_json().await)?;
    }
}

#[track_caller]
fn print_json<T: Serialize>(value: &T) -> Result<(), LinkAppError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| LinkAppError::App {
        message: format!("Failed to format output: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;
    println!("{text}");
    Ok(())
}
