//! Command-line arguments.

use link_core::VehicleFamily;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

pub const DEFAULT_WATCH_SECONDS: u64 = 60;
pub const DEFAULT_WATCH_EVERY_SECONDS: u64 = 5;

#[derive(Debug, Parser)]
#[command(name = "ovms-link", version, about = "Talk to a vehicle module through the OVMS relay")]
pub struct Cli {
    /// Directory holding ovms-link.toml
    #[arg(long, value_name = "DIR", global = true)]
    pub config: Option<PathBuf>,

    /// Directory for ovms-link.log
    #[arg(long, value_name = "DIR", global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Write a config file for one vehicle
    Init {
        vehicle_id: String,

        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,

        /// Use the plain TCP port instead of TLS
        #[arg(long)]
        no_tls: bool,

        #[arg(long, value_enum, default_value_t = FamilyArg::Standard)]
        family: FamilyArg,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Send raw command text, e.g. `26,1`
    Send { payload: String },

    Climate {
        #[arg(value_enum)]
        state: Toggle,
    },

    Lock,

    Unlock,

    Charge {
        #[arg(value_enum)]
        action: ChargeAction,
    },

    /// Print telemetry snapshots as JSON
    Watch {
        #[arg(long, default_value_t = DEFAULT_WATCH_SECONDS)]
        seconds: u64,

        /// Seconds between snapshots
        #[arg(long, default_value_t = DEFAULT_WATCH_EVERY_SECONDS)]
        every: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChargeAction {
    Start,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FamilyArg {
    Standard,
    Sq,
}

impl From<FamilyArg> for VehicleFamily {
    fn from(family: FamilyArg) -> Self {
        match family {
            FamilyArg::Standard => VehicleFamily::Standard,
            FamilyArg::Sq => VehicleFamily::Sq,
        }
    }
}
