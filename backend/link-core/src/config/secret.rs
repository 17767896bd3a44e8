use crate::error::config::ConfigError;

use common::{ErrorLocation, RedactedSecret};

use std::env;
use std::panic::Location;
use std::path::PathBuf;

use log::{debug, info, warn};

/// Reads the vehicle password from `variable`, loading a `.env` first.
pub fn resolve_secret(variable: &str) -> Result<RedactedSecret, ConfigError> {
    if try_load_dotenv().is_none() {
        debug!("No .env file found, checking process environment only");
    }

    match env::var(variable) {
        Ok(value) if value.is_empty() => Err(ConfigError::SecretMissing {
            location: ErrorLocation::from(Location::caller()),
            variable: variable.to_string(),
        }),
        Ok(value) => {
            debug!("Vehicle secret loaded from {variable}");
            Ok(RedactedSecret::new(value))
        }
        Err(env::VarError::NotPresent) => Err(ConfigError::SecretMissing {
            location: ErrorLocation::from(Location::caller()),
            variable: variable.to_string(),
        }),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::ValidationError {
            location: ErrorLocation::from(Location::caller()),
            reason: format!("{variable} is not valid unicode"),
        }),
    }
}

/// Current directory first, then next to the executable.
fn try_load_dotenv() -> Option<PathBuf> {
    if let Ok(path) = dotenvy::dotenv() {
        info!("Loaded .env from: {:?}", path);
        return Some(path);
    }

    let exe_path = env::current_exe().ok()?;
    let env_path = exe_path.parent()?.join(".env");
    if !env_path.exists() {
        return None;
    }

    match dotenvy::from_path(&env_path) {
        Ok(()) => {
            info!("Loaded .env from: {:?}", env_path);
            Some(env_path)
        }
        Err(e) => {
            warn!("Failed to parse .env at {:?}: {}", env_path, e);
            None
        }
    }
}
