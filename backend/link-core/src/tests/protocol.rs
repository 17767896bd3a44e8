// Unit tests for inbound payload parsing

use crate::protocol::{
    CommandResponse, CommandResult, MessageTag, parse_environment_hvac, parse_firmware,
};
use crate::telemetry::TelemetryValue;

use std::collections::HashMap;

// ============================================
// COMMAND RESPONSES
// ============================================

#[test]
fn given_full_response_when_parse_then_extracts_code_result_and_message() {
    let response = CommandResponse::parse("26,0,OK");

    assert_eq!(response.code, Some(26));
    assert_eq!(response.result, Some(0));
    assert_eq!(response.message, "OK");
    assert!(response.is_success());
    assert_eq!(response.outcome(), Some(CommandResult::Success));
}

#[test]
fn given_response_without_message_when_parse_then_message_is_empty() {
    let response = CommandResponse::parse("5,2");

    assert_eq!(response.code, Some(5));
    assert_eq!(response.result, Some(2));
    assert_eq!(response.message, "");
    assert!(!response.is_success());
    assert_eq!(response.outcome(), Some(CommandResult::Unsupported));
}

/// **VALUE**: Garbage never panics and never reports success.
///
/// **BUG THIS CATCHES**: Using `parse().unwrap()` on relay-controlled input.
#[test]
fn given_non_numeric_fields_when_parse_then_fields_are_none() {
    let response = CommandResponse::parse("x,y");

    assert_eq!(response.code, None);
    assert_eq!(response.result, None);
    assert_eq!(response.message, "");
    assert!(!response.is_success());

    let signed = CommandResponse::parse("-1,+0");
    assert_eq!(signed.code, None);
    assert_eq!(signed.result, None);
}

/// **VALUE**: Commas inside the message survive parsing.
#[test]
fn given_message_with_commas_when_parse_then_keeps_remainder_intact() {
    let response = CommandResponse::parse("7,0,a,b,c");
    assert_eq!(response.message, "a,b,c");
    assert_eq!(response.to_string(), "7,0,a,b,c");
}

#[test]
fn given_result_codes_when_mapped_then_round_trip_known_values() {
    for code in 0..=3 {
        let result = CommandResult::from_code(code).unwrap();
        assert_eq!(result.code(), code);
    }
    assert_eq!(CommandResult::from_code(9), None);
}

// ============================================
// TAGS
// ============================================

#[test]
fn given_tag_chars_when_converted_then_known_and_unknown_tags_map() {
    assert_eq!(MessageTag::from('c'), MessageTag::CommandResponse);
    assert_eq!(MessageTag::from('F'), MessageTag::FirmwareInfo);
    assert_eq!(MessageTag::from('D'), MessageTag::Environment);
    assert_eq!(MessageTag::from('q'), MessageTag::Other('q'));
    assert_eq!(MessageTag::from('q').as_char(), 'q');
    assert!(MessageTag::Status.is_high_frequency());
    assert!(!MessageTag::Push.is_high_frequency());
}

// ============================================
// FIRMWARE AND ENVIRONMENT
// ============================================

/// **VALUE**: Extracts firmware fields by position.
///
/// **BUG THIS CATCHES**: Shifted indices, or the signal stored as text.
#[test]
fn given_firmware_payload_when_parse_then_extracts_indexed_fields() {
    // GIVEN
    let payload = "v3.2.1,1FADP3,-70,1,Tesla,,,,ESP32-v1,4G";

    // WHEN
    let fields: HashMap<&str, TelemetryValue> = parse_firmware(payload).into_iter().collect();

    // THEN
    assert_eq!(fields["m_firmware"], TelemetryValue::Text("v3.2.1".into()));
    assert_eq!(fields["car_vin"], TelemetryValue::Text("1FADP3".into()));
    assert_eq!(fields["car_gsm_signal"], TelemetryValue::Integer(-70));
    assert_eq!(fields["canwrite"], TelemetryValue::Flag(true));
    assert_eq!(fields["car_type"], TelemetryValue::Text("Tesla".into()));
    assert_eq!(fields["m_hardware"], TelemetryValue::Text("ESP32-v1".into()));
    assert_eq!(fields["m_mdm_mode"], TelemetryValue::Text("4G".into()));
    assert!(!fields.contains_key("m_mdm_network"));
    assert!(!fields.contains_key("servicerange"));
}

#[test]
fn given_fractional_signal_and_service_fields_when_parse_then_truncates_numbers() {
    let payload = "v1,VIN,-63.8,0,RT,Vodafone,1200.5,86400,HW,LTE";
    let fields: HashMap<&str, TelemetryValue> = parse_firmware(payload).into_iter().collect();

    assert_eq!(fields["car_gsm_signal"], TelemetryValue::Integer(-63));
    assert_eq!(fields["canwrite"], TelemetryValue::Flag(false));
    assert_eq!(fields["m_mdm_network"], TelemetryValue::Text("Vodafone".into()));
    assert_eq!(fields["servicerange"], TelemetryValue::Integer(1200));
    assert_eq!(fields["servicetime"], TelemetryValue::Integer(86400));
}

/// **BUG THIS CATCHES**: Index panics on short payloads, or a bad signal
/// value overwriting a previously good one.
#[test]
fn given_short_or_malformed_firmware_payload_when_parse_then_skips_missing_fields() {
    let fields: HashMap<&str, TelemetryValue> =
        parse_firmware("v3.2.1,,weak").into_iter().collect();

    assert_eq!(fields.len(), 1);
    assert_eq!(fields["m_firmware"], TelemetryValue::Text("v3.2.1".into()));
    assert!(parse_firmware("").is_empty());
}

fn environment_with_doors5(value: &str) -> String {
    let mut fields = vec!["0"; 17];
    fields.push(value);
    fields.push("tail");
    fields.join(",")
}

#[test]
fn given_environment_payload_when_bit_set_then_hvac_is_on() {
    assert_eq!(parse_environment_hvac(&environment_with_doors5("128")), Some(true));
    assert_eq!(parse_environment_hvac(&environment_with_doors5("129")), Some(true));
}

#[test]
fn given_environment_payload_when_bit_clear_then_hvac_is_off() {
    assert_eq!(parse_environment_hvac(&environment_with_doors5("0")), Some(false));
    assert_eq!(parse_environment_hvac(&environment_with_doors5("127")), Some(false));
}

#[test]
fn given_short_or_non_numeric_environment_when_parse_then_returns_none() {
    assert_eq!(parse_environment_hvac("1,2,3"), None);
    assert_eq!(parse_environment_hvac(&environment_with_doors5("on")), None);
}
