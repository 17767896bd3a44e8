// Unit tests for command codes and payload builders

use crate::commands::{Command, CommandCode, VehicleFamily, Wheel};
use crate::error::command::CommandError;

use std::str::FromStr;

#[test]
fn given_command_codes_when_looked_up_then_numeric_values_round_trip() {
    assert_eq!(CommandCode::ClimateControl.code(), 26);
    assert_eq!(CommandCode::ModemCommand.code(), 49);
    assert_eq!(CommandCode::from_code(20), Some(CommandCode::LockCar));
    assert_eq!(CommandCode::from_code(8), None);
}

#[test]
fn given_builder_with_params_when_to_payload_then_joins_with_commas() {
    let command = Command::new(CommandCode::SetChargeTimer).param(1).param(6).param(30);
    assert_eq!(command.to_payload(), "17,1,6,30");
    assert_eq!(command.to_string(), "17,1,6,30");
    assert_eq!(Command::lock().to_payload(), "20");
}

/// **VALUE**: Climate commands differ per vehicle family.
///
/// **BUG THIS CATCHES**: Sending code 26 to a family that does not implement
/// it, which the module answers with "unsupported".
#[test]
fn given_vehicle_family_when_building_climate_commands_then_uses_family_codes() {
    assert_eq!(Command::climate_on(VehicleFamily::Standard).to_payload(), "26,1");
    assert_eq!(Command::climate_off(VehicleFamily::Standard).to_payload(), "26,0");
    assert_eq!(Command::climate_on(VehicleFamily::Sq).to_payload(), "24,0");
    assert_eq!(Command::climate_off(VehicleFamily::Sq).to_payload(), "7,climate off");
    assert_eq!(Command::climate_status(VehicleFamily::Standard).to_payload(), "6");
    assert_eq!(Command::climate_status(VehicleFamily::Sq).to_payload(), "7,schedule status");
}

#[test]
fn given_simple_builders_when_to_payload_then_match_protocol_codes() {
    assert_eq!(Command::cooldown().to_payload(), "25");
    assert_eq!(Command::start_charge().to_payload(), "11");
    assert_eq!(Command::stop_charge().to_payload(), "12");
    assert_eq!(Command::unlock().to_payload(), "22");
    assert_eq!(Command::valet_on().to_payload(), "21");
    assert_eq!(Command::valet_off().to_payload(), "23");
    assert_eq!(Command::wakeup_car().to_payload(), "18");
    assert_eq!(Command::wakeup_subsystem(2).to_payload(), "19,2");
    assert_eq!(Command::reboot().to_payload(), "5");
    assert_eq!(Command::set_charge_current(16).to_payload(), "15,16");
    assert_eq!(Command::get_features().to_payload(), "1");
    assert_eq!(Command::get_parameters().to_payload(), "3");
    assert_eq!(Command::clear_charge_timer().to_payload(), "17,0");
}

#[test]
fn given_out_of_range_charge_limit_when_built_then_clamps() {
    assert_eq!(Command::set_charge_limit(150).to_payload(), "16,100");
    assert_eq!(Command::set_charge_limit(-5).to_payload(), "16,0");
    assert_eq!(Command::set_charge_limit(80).to_payload(), "16,80");
}

#[test]
fn given_valid_clock_when_set_charge_timer_then_encodes_hour_and_minute() {
    assert_eq!(Command::set_charge_timer("06:30").unwrap().to_payload(), "17,1,6,30");
    assert_eq!(Command::set_charge_timer("23:59").unwrap().to_payload(), "17,1,23,59");
}

#[test]
fn given_invalid_clock_when_set_charge_timer_then_returns_validation_error() {
    for value in ["6", "24:00", "12:60", "ab:cd", ""] {
        assert!(
            matches!(Command::set_charge_timer(value), Err(CommandError::Validation { .. })),
            "expected validation error for {value:?}"
        );
    }
}

#[test]
fn given_range_limited_builders_when_out_of_range_then_rejected() {
    assert_eq!(Command::set_feature(15, "1").unwrap().to_payload(), "2,15,1");
    assert!(Command::set_feature(16, "1").is_err());

    assert_eq!(Command::set_parameter(31, "x").unwrap().to_payload(), "4,31,x");
    assert!(Command::set_parameter(32, "x").is_err());

    assert_eq!(Command::homelink(2).unwrap().to_payload(), "24,2");
    assert!(Command::homelink(3).is_err());
}

#[test]
fn given_text_builders_when_input_is_valid_then_payload_carries_text() {
    assert_eq!(Command::generic("  stat ").unwrap().to_payload(), "7,stat");
    assert!(Command::generic("   ").is_err());

    assert_eq!(
        Command::send_sms("+4912345", "hello, car").unwrap().to_payload(),
        "40,+4912345,hello, car"
    );
    assert!(Command::send_sms("", "hi").is_err());
}

#[test]
fn given_wheel_and_sensor_when_tpms_map_then_builds_generic_command() {
    let wheel = Wheel::from_str("FL").unwrap();
    assert_eq!(
        Command::tpms_map_wheel(wheel, "0x1A2B").unwrap().to_payload(),
        "7,tpms map fl 0x1A2B"
    );
    assert!(Wheel::from_str("middle").is_err());
    assert!(Command::tpms_map_wheel(Wheel::RearRight, "a b").is_err());
}

/// **VALUE**: Raw command text from the command line maps onto a known code.
///
/// **BUG THIS CATCHES**: Forwarding a typo such as `62,1` to the vehicle.
#[test]
fn given_raw_command_text_when_parsed_then_known_codes_accepted() {
    let command = Command::from_str(" 26,1 ").unwrap();
    assert_eq!(command.code(), CommandCode::ClimateControl);
    assert_eq!(command.params(), ["1"]);
    assert_eq!(command.to_payload(), "26,1");

    assert_eq!(Command::from_str("11").unwrap().to_payload(), "11");
    assert!(matches!(Command::from_str("62,1"), Err(CommandError::Validation { .. })));
    assert!(Command::from_str("climate").is_err());
    assert!(Command::from_str("").is_err());
}
