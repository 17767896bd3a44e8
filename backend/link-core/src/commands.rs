//! Command codes and payload builders.
//!
//! A payload is `<code>[,<param>]*`. The session adds the `MP-0 C` prefix
//! when it writes the command.

use crate::error::command::CommandError;

use std::fmt;

use serde::{Deserialize, Serialize};

pub const MAX_FEATURE: u8 = 15;
pub const MAX_PARAMETER: u8 = 31;
pub const MAX_HOMELINK_BUTTON: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCode {
    GetFeatures,
    SetFeature,
    GetParameters,
    SetParameter,
    Reboot,
    GetStatus,
    Generic,
    SetChargeMode,
    StartCharge,
    StopCharge,
    SetChargeCurrent,
    SetChargeParameters,
    SetChargeTimer,
    WakeupCar,
    WakeupSubsystem,
    LockCar,
    SetValetMode,
    UnlockCar,
    ClearValetMode,
    HomeLink,
    Cooldown,
    ClimateControl,
    GetUsage,
    GetDataSummary,
    GetDataRecords,
    SendSms,
    SendMmiUssd,
    ModemCommand,
}

impl CommandCode {
    const ALL: [CommandCode; 28] = [
        CommandCode::GetFeatures,
        CommandCode::SetFeature,
        CommandCode::GetParameters,
        CommandCode::SetParameter,
        CommandCode::Reboot,
        CommandCode::GetStatus,
        CommandCode::Generic,
        CommandCode::SetChargeMode,
        CommandCode::StartCharge,
        CommandCode::StopCharge,
        CommandCode::SetChargeCurrent,
        CommandCode::SetChargeParameters,
        CommandCode::SetChargeTimer,
        CommandCode::WakeupCar,
        CommandCode::WakeupSubsystem,
        CommandCode::LockCar,
        CommandCode::SetValetMode,
        CommandCode::UnlockCar,
        CommandCode::ClearValetMode,
        CommandCode::HomeLink,
        CommandCode::Cooldown,
        CommandCode::ClimateControl,
        CommandCode::GetUsage,
        CommandCode::GetDataSummary,
        CommandCode::GetDataRecords,
        CommandCode::SendSms,
        CommandCode::SendMmiUssd,
        CommandCode::ModemCommand,
    ];

    pub fn code(self) -> u16 {
        match self {
            CommandCode::GetFeatures => 1,
            CommandCode::SetFeature => 2,
            CommandCode::GetParameters => 3,
            CommandCode::SetParameter => 4,
            CommandCode::Reboot => 5,
            CommandCode::GetStatus => 6,
            CommandCode::Generic => 7,
            CommandCode::SetChargeMode => 10,
            CommandCode::StartCharge => 11,
            CommandCode::StopCharge => 12,
            CommandCode::SetChargeCurrent => 15,
            CommandCode::SetChargeParameters => 16,
            CommandCode::SetChargeTimer => 17,
            CommandCode::WakeupCar => 18,
            CommandCode::WakeupSubsystem => 19,
            CommandCode::LockCar => 20,
            CommandCode::SetValetMode => 21,
            CommandCode::UnlockCar => 22,
            CommandCode::ClearValetMode => 23,
            CommandCode::HomeLink => 24,
            CommandCode::Cooldown => 25,
            CommandCode::ClimateControl => 26,
            CommandCode::GetUsage => 30,
            CommandCode::GetDataSummary => 31,
            CommandCode::GetDataRecords => 32,
            CommandCode::SendSms => 40,
            CommandCode::SendMmiUssd => 41,
            CommandCode::ModemCommand => 49,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| i64::from(candidate.code()) == code)
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// Climate commands differ between vehicle families.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleFamily {
    #[default]
    Standard,
    Sq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wheel {
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
}

impl Wheel {
    pub fn as_str(self) -> &'static str {
        match self {
            Wheel::FrontLeft => "fl",
            Wheel::FrontRight => "fr",
            Wheel::RearLeft => "rl",
            Wheel::RearRight => "rr",
        }
    }
}

impl std::str::FromStr for Wheel {
    type Err = CommandError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fl" => Ok(Wheel::FrontLeft),
            "fr" => Ok(Wheel::FrontRight),
            "rl" => Ok(Wheel::RearLeft),
            "rr" => Ok(Wheel::RearRight),
            other => Err(CommandError::validation(format!(
                "Unknown wheel position {other:?}, expected fl, fr, rl or rr"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    code: CommandCode,
    params: Vec<String>,
}

impl Command {
    pub fn new(code: CommandCode) -> Self {
        Self {
            code,
            params: Vec::new(),
        }
    }

    pub fn param(mut self, value: impl ToString) -> Self {
        self.params.push(value.to_string());
        self
    }

    pub fn code(&self) -> CommandCode {
        self.code
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn to_payload(&self) -> String {
        let mut payload = self.code.code().to_string();
        for param in &self.params {
            payload.push(',');
            payload.push_str(param);
        }
        payload
    }

    // ========================================================================
    // Climate
    // ========================================================================

    pub fn climate_on(family: VehicleFamily) -> Self {
        match family {
            VehicleFamily::Standard => Self::new(CommandCode::ClimateControl).param(1),
            VehicleFamily::Sq => Self::new(CommandCode::HomeLink).param(0),
        }
    }

    pub fn climate_off(family: VehicleFamily) -> Self {
        match family {
            VehicleFamily::Standard => Self::new(CommandCode::ClimateControl).param(0),
            VehicleFamily::Sq => Self::new(CommandCode::Generic).param("climate off"),
        }
    }

    pub fn climate_status(family: VehicleFamily) -> Self {
        match family {
            VehicleFamily::Standard => Self::new(CommandCode::GetStatus),
            VehicleFamily::Sq => Self::new(CommandCode::Generic).param("schedule status"),
        }
    }

    pub fn cooldown() -> Self {
        Self::new(CommandCode::Cooldown)
    }

    // ========================================================================
    // Charging
    // ========================================================================

    pub fn start_charge() -> Self {
        Self::new(CommandCode::StartCharge)
    }

    pub fn stop_charge() -> Self {
        Self::new(CommandCode::StopCharge)
    }

    /// Clamped to 0..=100.
    pub fn set_charge_limit(soc_percent: i32) -> Self {
        Self::new(CommandCode::SetChargeParameters).param(soc_percent.clamp(0, 100))
    }

    pub fn set_charge_current(amps: u32) -> Self {
        Self::new(CommandCode::SetChargeCurrent).param(amps)
    }

    /// `start` is `HH:MM`, 24-hour clock.
    pub fn set_charge_timer(start: &str) -> Result<Self, CommandError> {
        let (hour, minute) = parse_clock(start)?;
        Ok(Self::new(CommandCode::SetChargeTimer)
            .param(1)
            .param(hour)
            .param(minute))
    }

    pub fn clear_charge_timer() -> Self {
        Self::new(CommandCode::SetChargeTimer).param(0)
    }

    // ========================================================================
    // Locks and valet
    // ========================================================================

    pub fn lock() -> Self {
        Self::new(CommandCode::LockCar)
    }

    pub fn unlock() -> Self {
        Self::new(CommandCode::UnlockCar)
    }

    pub fn valet_on() -> Self {
        Self::new(CommandCode::SetValetMode)
    }

    pub fn valet_off() -> Self {
        Self::new(CommandCode::ClearValetMode)
    }

    // ========================================================================
    // Module
    // ========================================================================

    pub fn wakeup_car() -> Self {
        Self::new(CommandCode::WakeupCar)
    }

    pub fn wakeup_subsystem(subsystem: u32) -> Self {
        Self::new(CommandCode::WakeupSubsystem).param(subsystem)
    }

    pub fn homelink(button: u8) -> Result<Self, CommandError> {
        if button > MAX_HOMELINK_BUTTON {
            return Err(CommandError::validation(format!(
                "HomeLink button must be 0..={MAX_HOMELINK_BUTTON}, got {button}"
            )));
        }
        Ok(Self::new(CommandCode::HomeLink).param(button))
    }

    pub fn reboot() -> Self {
        Self::new(CommandCode::Reboot)
    }

    pub fn generic(text: &str) -> Result<Self, CommandError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CommandError::validation("Generic command text must not be empty"));
        }
        Ok(Self::new(CommandCode::Generic).param(text))
    }

    pub fn send_sms(number: &str, message: &str) -> Result<Self, CommandError> {
        let number = number.trim();
        if number.is_empty() {
            return Err(CommandError::validation("SMS number must not be empty"));
        }
        Ok(Self::new(CommandCode::SendSms).param(number).param(message))
    }

    pub fn get_features() -> Self {
        Self::new(CommandCode::GetFeatures)
    }

    pub fn set_feature(feature: u8, value: &str) -> Result<Self, CommandError> {
        if feature > MAX_FEATURE {
            return Err(CommandError::validation(format!(
                "Feature number must be 0..={MAX_FEATURE}, got {feature}"
            )));
        }
        Ok(Self::new(CommandCode::SetFeature).param(feature).param(value))
    }

    pub fn get_parameters() -> Self {
        Self::new(CommandCode::GetParameters)
    }

    pub fn set_parameter(parameter: u8, value: &str) -> Result<Self, CommandError> {
        if parameter > MAX_PARAMETER {
            return Err(CommandError::validation(format!(
                "Parameter number must be 0..={MAX_PARAMETER}, got {parameter}"
            )));
        }
        Ok(Self::new(CommandCode::SetParameter).param(parameter).param(value))
    }

    pub fn tpms_map_wheel(wheel: Wheel, sensor_id: &str) -> Result<Self, CommandError> {
        let sensor_id = sensor_id.trim();
        if sensor_id.is_empty() || sensor_id.contains(char::is_whitespace) {
            return Err(CommandError::validation(format!(
                "Invalid TPMS sensor id {sensor_id:?}"
            )));
        }
        Ok(Self::new(CommandCode::Generic).param(format!(
            "tpms map {} {sensor_id}",
            wheel.as_str()
        )))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_payload())
    }
}

/// Parses raw command text such as `26,1`. The code must be a known command.
impl std::str::FromStr for Command {
    type Err = CommandError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut fields = value.trim().split(',');
        let head = fields.next().unwrap_or_default().trim();

        let code = head
            .parse::<i64>()
            .ok()
            .and_then(CommandCode::from_code)
            .ok_or_else(|| CommandError::validation(format!("Unknown command code {head:?}")))?;

        Ok(fields.fold(Self::new(code), |command, field| command.param(field)))
    }
}

fn parse_clock(value: &str) -> Result<(u8, u8), CommandError> {
    let invalid = || CommandError::validation(format!("Invalid time {value:?}, expected HH:MM"));

    let (hour, minute) = value.trim().split_once(':').ok_or_else(invalid)?;
    let hour: u8 = hour.parse().map_err(|_| invalid())?;
    let minute: u8 = minute.parse().map_err(|_| invalid())?;

    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok((hour, minute))
}
