pub mod duration;
pub mod secret;

pub use secret::resolve_secret;

use crate::commands::VehicleFamily;
use crate::error::config::ConfigError;
use crate::handshake::{DEFAULT_HANDSHAKE_TIMEOUT, DigestPolicy};
use crate::session::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_KEEPALIVE_INTERVAL, SessionSettings};
use crate::transport::Endpoint;
use crate::{DEFAULT_PLAIN_PORT, DEFAULT_RELAY_HOST, DEFAULT_TLS_PORT};

use common::{ErrorLocation, RedactedSecret};

use std::panic::Location;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "ovms-link.toml";
pub const CONFIG_DIR_NAME: &str = "ovms-link";
pub const DEFAULT_SECRET_ENV: &str = "OVMS_VEHICLE_PASSWORD";
const CONFIG_VERSION: u32 = 1;

// ============================================
// CONFIG STRUCTS
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// Falls back to the standard port for the chosen transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
    #[serde(default = "default_connect_timeout", with = "duration")]
    pub connect_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: None,
            use_tls: default_use_tls(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleConfig {
    #[serde(default)]
    pub vehicle_id: String,
    /// Environment variable holding the module password.
    #[serde(default = "default_secret_env")]
    pub secret_env: String,
    #[serde(default)]
    pub family: VehicleFamily,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            vehicle_id: String::new(),
            secret_env: default_secret_env(),
            family: VehicleFamily::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default = "default_handshake_timeout", with = "duration")]
    pub handshake_timeout: Duration,
    #[serde(default = "default_command_timeout", with = "duration")]
    pub command_timeout: Duration,
    #[serde(default = "default_keepalive_interval", with = "duration")]
    pub keepalive_interval: Duration,
    #[serde(default)]
    pub digest_policy: DigestPolicy,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: default_handshake_timeout(),
            command_timeout: default_command_timeout(),
            keepalive_interval: default_keepalive_interval(),
            digest_policy: DigestPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_initial_delay", with = "duration")]
    pub initial_delay: Duration,
    #[serde(default = "default_max_delay", with = "duration")]
    pub max_delay: Duration,
    #[serde(default = "default_max_elapsed", with = "duration")]
    pub max_elapsed: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            max_elapsed: default_max_elapsed(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub vehicle: VehicleConfig,

    #[serde(default)]
    pub protocol: ProtocolConfig,

    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            server: ServerConfig::default(),
            vehicle: VehicleConfig::default(),
            protocol: ProtocolConfig::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

// ============================================
// DEFAULT FUNCTIONS
// ============================================

fn default_version() -> u32 {
    CONFIG_VERSION
}
fn default_host() -> String {
    DEFAULT_RELAY_HOST.to_string()
}
fn default_use_tls() -> bool {
    true
}
fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}
fn default_secret_env() -> String {
    DEFAULT_SECRET_ENV.to_string()
}
fn default_handshake_timeout() -> Duration {
    DEFAULT_HANDSHAKE_TIMEOUT
}
fn default_command_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_keepalive_interval() -> Duration {
    DEFAULT_KEEPALIVE_INTERVAL
}
fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}
fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}
fn default_max_elapsed() -> Duration {
    Duration::from_secs(120)
}

// ============================================
// IMPLEMENTATION
// ============================================

impl LinkConfig {
    /// `{config_dir}/ovms-link/`, if the platform has a config directory.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME))
    }

    /// Load config from `{config_dir}/ovms-link.toml`.
    ///
    /// A missing file yields defaults. A file that exists but cannot be read,
    /// parsed or validated is an error.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            info!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        Self::load_from_path(&config_path)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            location: ErrorLocation::from(Location::caller()),
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: LinkConfig = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            location: ErrorLocation::from(Location::caller()),
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;

        info!("Config loaded from {}", path.display());
        Ok(config)
    }

    /// Save config to `{config_dir}/ovms-link.toml` via temp file + rename.
    pub fn save(&self, config_dir: &Path) -> Result<PathBuf, ConfigError> {
        self.validate()?;

        std::fs::create_dir_all(config_dir).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: config_dir.to_path_buf(),
            source: e,
        })?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let temp_path = config_dir.join(format!("{}.tmp", CONFIG_FILE_NAME));

        let contents = toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError {
            location: ErrorLocation::from(Location::caller()),
            reason: e.to_string(),
        })?;

        std::fs::write(&temp_path, contents).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: temp_path.clone(),
            source: e,
        })?;

        std::fs::rename(&temp_path, &config_path).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: config_path.clone(),
            source: e,
        })?;

        info!("Config saved to {}", config_path.display());
        Ok(config_path)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version == 0 || self.version > CONFIG_VERSION {
            return Err(validation(format!(
                "Invalid version: {} (expected 1-{})",
                self.version, CONFIG_VERSION
            )));
        }

        if self.server.host.trim().is_empty() {
            return Err(validation("server.host cannot be empty"));
        }

        if self.server.port == Some(0) {
            return Err(validation("server.port cannot be 0"));
        }

        // Empty means "not configured yet"; `require_vehicle` rejects it before connecting.
        if self.vehicle.vehicle_id.contains(char::is_whitespace) {
            return Err(validation(format!(
                "vehicle.vehicle_id cannot contain whitespace: {:?}",
                self.vehicle.vehicle_id
            )));
        }

        if self.vehicle.secret_env.trim().is_empty() {
            return Err(validation("vehicle.secret_env cannot be empty"));
        }

        let durations = [
            ("server.connect_timeout", self.server.connect_timeout),
            ("protocol.handshake_timeout", self.protocol.handshake_timeout),
            ("protocol.command_timeout", self.protocol.command_timeout),
            ("protocol.keepalive_interval", self.protocol.keepalive_interval),
            ("reconnect.initial_delay", self.reconnect.initial_delay),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(validation(format!("{name} must be greater than zero")));
            }
        }

        if self.reconnect.max_delay < self.reconnect.initial_delay {
            return Err(validation(
                "reconnect.max_delay must not be shorter than reconnect.initial_delay",
            ));
        }

        Ok(())
    }

    /// Checks that a vehicle id is configured.
    pub fn require_vehicle(&self) -> Result<&str, ConfigError> {
        if self.vehicle.vehicle_id.is_empty() {
            return Err(validation("vehicle.vehicle_id is not configured"));
        }
        Ok(&self.vehicle.vehicle_id)
    }

    pub fn endpoint(&self) -> Endpoint {
        let default_port = if self.server.use_tls {
            DEFAULT_TLS_PORT
        } else {
            DEFAULT_PLAIN_PORT
        };

        Endpoint {
            host: self.server.host.clone(),
            port: self.server.port.unwrap_or(default_port),
            use_tls: self.server.use_tls,
        }
    }

    pub fn resolve_secret(&self) -> Result<RedactedSecret, ConfigError> {
        resolve_secret(&self.vehicle.secret_env)
    }

    pub fn session_settings(&self, secret: RedactedSecret) -> SessionSettings {
        SessionSettings::new(self.endpoint(), self.vehicle.vehicle_id.clone(), secret)
            .with_connect_timeout(self.server.connect_timeout)
            .with_handshake_timeout(self.protocol.handshake_timeout)
            .with_keepalive_interval(self.protocol.keepalive_interval)
            .with_digest_policy(self.protocol.digest_policy)
    }
}

#[track_caller]
fn validation(reason: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        location: ErrorLocation::from(Location::caller()),
        reason: reason.into(),
    }
}
