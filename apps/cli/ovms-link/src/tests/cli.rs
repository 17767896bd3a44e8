// Unit tests for argument parsing

use crate::cli::{ChargeAction, Cli, CliCommand, DEFAULT_WATCH_SECONDS, FamilyArg, Toggle};

use link_core::VehicleFamily;

use std::path::PathBuf;

use clap::Parser;

#[test]
fn given_global_flags_after_subcommand_when_parsed_then_both_are_read() {
    let cli = Cli::try_parse_from([
        "ovms-link",
        "lock",
        "--config",
        "/tmp/cfg",
        "--log-dir",
        "/tmp/logs",
    ])
    .unwrap();

    assert!(matches!(cli.command, CliCommand::Lock));
    assert_eq!(cli.config, Some(PathBuf::from("/tmp/cfg")));
    assert_eq!(cli.log_dir, Some(PathBuf::from("/tmp/logs")));
}

#[test]
fn given_vehicle_subcommands_when_parsed_then_arguments_map_to_enums() {
    let cli = Cli::try_parse_from(["ovms-link", "climate", "on"]).unwrap();
    assert!(matches!(cli.command, CliCommand::Climate { state: Toggle::On }));

    let cli = Cli::try_parse_from(["ovms-link", "charge", "stop"]).unwrap();
    assert!(matches!(
        cli.command,
        CliCommand::Charge {
            action: ChargeAction::Stop
        }
    ));

    let cli = Cli::try_parse_from(["ovms-link", "send", "26,1"]).unwrap();
    assert!(matches!(cli.command, CliCommand::Send { ref payload } if payload == "26,1"));

    assert!(Cli::try_parse_from(["ovms-link", "climate", "maybe"]).is_err());
    assert!(Cli::try_parse_from(["ovms-link"]).is_err());
}

#[test]
fn given_watch_without_flags_when_parsed_then_uses_defaults() {
    let cli = Cli::try_parse_from(["ovms-link", "watch"]).unwrap();
    match cli.command {
        CliCommand::Watch { seconds, every } => {
            assert_eq!(seconds, DEFAULT_WATCH_SECONDS);
            assert!(every > 0);
        }
        other => panic!("expected watch, got {other:?}"),
    }
}

#[test]
fn given_init_flags_when_parsed_then_options_are_captured() {
    let cli = Cli::try_parse_from([
        "ovms-link", "init", "MYCAR", "--no-tls", "--port", "6867", "--family", "sq",
    ])
    .unwrap();

    match cli.command {
        CliCommand::Init {
            vehicle_id,
            port,
            no_tls,
            family,
            force,
            host,
        } => {
            assert_eq!(vehicle_id, "MYCAR");
            assert_eq!(port, Some(6867));
            assert!(no_tls);
            assert!(!force);
            assert_eq!(host, None);
            assert_eq!(VehicleFamily::from(family), VehicleFamily::Sq);
            assert_eq!(family, FamilyArg::Sq);
        }
        other => panic!("expected init, got {other:?}"),
    }
}
