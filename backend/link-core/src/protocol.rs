//! Typed views over inbound `MP-0` message payloads.

use crate::telemetry::{
    FIELD_CAN_WRITE, FIELD_CAR_TYPE, FIELD_FIRMWARE, FIELD_GSM_SIGNAL, FIELD_HARDWARE,
    FIELD_MODEM_MODE, FIELD_NETWORK, FIELD_SERVICE_RANGE, FIELD_SERVICE_TIME, FIELD_VIN,
    TelemetryValue,
};

use std::fmt;

use serde::Serialize;

/// Index of the door/climate bitmask inside an environment (`D`) payload.
pub const ENV_DOORS5_INDEX: usize = 17;
/// Bit of the `doors5` field set while climate control is running.
pub const ENV_HVAC_BIT: i64 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTag {
    CommandResponse,
    FirmwareInfo,
    Environment,
    Status,
    Time,
    Location,
    PingAck,
    Push,
    CarsConnected,
    Capabilities,
    Other(char),
}

impl MessageTag {
    pub fn as_char(self) -> char {
        match self {
            MessageTag::CommandResponse => 'c',
            MessageTag::FirmwareInfo => 'F',
            MessageTag::Environment => 'D',
            MessageTag::Status => 'S',
            MessageTag::Time => 'T',
            MessageTag::Location => 'L',
            MessageTag::PingAck => 'a',
            MessageTag::Push => 'P',
            MessageTag::CarsConnected => 'Z',
            MessageTag::Capabilities => 'V',
            MessageTag::Other(tag) => tag,
        }
    }

    /// Messages the vehicle streams continuously and that are only traced.
    pub fn is_high_frequency(self) -> bool {
        matches!(
            self,
            MessageTag::Status | MessageTag::Time | MessageTag::Location | MessageTag::PingAck
        )
    }
}

impl From<char> for MessageTag {
    fn from(tag: char) -> Self {
        match tag {
            'c' => MessageTag::CommandResponse,
            'F' => MessageTag::FirmwareInfo,
            'D' => MessageTag::Environment,
            'S' => MessageTag::Status,
            'T' => MessageTag::Time,
            'L' => MessageTag::Location,
            'a' => MessageTag::PingAck,
            'P' => MessageTag::Push,
            'Z' => MessageTag::CarsConnected,
            'V' => MessageTag::Capabilities,
            other => MessageTag::Other(other),
        }
    }
}

/// Outcome codes carried in the second field of a command response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommandResult {
    Success,
    Failed,
    Unsupported,
    Unimplemented,
}

impl CommandResult {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(CommandResult::Success),
            1 => Some(CommandResult::Failed),
            2 => Some(CommandResult::Unsupported),
            3 => Some(CommandResult::Unimplemented),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            CommandResult::Success => 0,
            CommandResult::Failed => 1,
            CommandResult::Unsupported => 2,
            CommandResult::Unimplemented => 3,
        }
    }
}

/// Parsed `c` payload: `<code>,<result>[,<message>]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResponse {
    pub code: Option<i64>,
    pub result: Option<i64>,
    pub message: String,
}

impl CommandResponse {
    /// Never fails: fields that are not plain digit strings become `None`.
    pub fn parse(payload: &str) -> Self {
        let mut parts = payload.splitn(3, ',');
        let code = parts.next().and_then(parse_digits);
        let result = parts.next().and_then(parse_digits);
        let message = parts.next().unwrap_or_default().to_string();

        Self {
            code,
            result,
            message,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == Some(0)
    }

    pub fn outcome(&self) -> Option<CommandResult> {
        self.result.and_then(CommandResult::from_code)
    }
}

impl fmt::Display for CommandResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.code.map(|c| c.to_string()).unwrap_or_default();
        let result = self.result.map(|r| r.to_string()).unwrap_or_default();
        if self.message.is_empty() {
            write!(f, "{code},{result}")
        } else {
            write!(f, "{code},{result},{}", self.message)
        }
    }
}

fn parse_digits(field: &str) -> Option<i64> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

/// Extracts the known firmware (`F`) fields. Empty or malformed fields are
/// left out so they never overwrite a previously reported value.
pub fn parse_firmware(payload: &str) -> Vec<(&'static str, TelemetryValue)> {
    let fields: Vec<&str> = payload.split(',').collect();
    let text = |index: usize| {
        fields
            .get(index)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(|value| TelemetryValue::Text(value.to_string()))
    };

    let mut entries = Vec::new();
    let mut push = |key: &'static str, value: Option<TelemetryValue>| {
        if let Some(value) = value {
            entries.push((key, value));
        }
    };

    push(FIELD_FIRMWARE, text(0));
    push(FIELD_VIN, text(1));
    push(FIELD_GSM_SIGNAL, fields.get(2).and_then(|v| parse_truncated(v)));
    push(
        FIELD_CAN_WRITE,
        fields.get(3).and_then(|v| match v.trim() {
            "1" => Some(TelemetryValue::Flag(true)),
            "0" => Some(TelemetryValue::Flag(false)),
            _ => None,
        }),
    );
    push(FIELD_CAR_TYPE, text(4));
    push(FIELD_NETWORK, text(5));
    push(FIELD_SERVICE_RANGE, fields.get(6).and_then(|v| parse_truncated(v)));
    push(FIELD_SERVICE_TIME, fields.get(7).and_then(|v| parse_truncated(v)));
    push(FIELD_HARDWARE, text(8));
    push(FIELD_MODEM_MODE, text(9));

    entries
}

/// Climate state from an environment (`D`) payload, if present and numeric.
pub fn parse_environment_hvac(payload: &str) -> Option<bool> {
    let doors5 = payload.split(',').nth(ENV_DOORS5_INDEX)?;
    let bits: i64 = doors5.trim().parse().ok()?;
    Some(bits & ENV_HVAC_BIT != 0)
}

fn parse_truncated(field: &str) -> Option<TelemetryValue> {
    let value: f64 = field.trim().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(TelemetryValue::Integer(value.trunc() as i64))
}
