use link_core::error::{CommandError, ConfigError, CoreError, SessionError};

use common::ErrorLocation;

use std::panic::Location;

use thiserror::Error;

/// Errors surfaced by the command-line front-end.
///
/// Library errors are flattened into a message plus the location where the
/// CLI received them, so the log shows both ends of the failure.
#[derive(Debug, Error)]
pub enum LinkAppError {
    /// Error from this App
    #[error("Link App Error: {message} {location}")]
    App {
        message: String,
        location: ErrorLocation,
    },

    /// Config file or secret could not be loaded
    #[error("Config Error: {message} {location}")]
    Config {
        message: String,
        location: ErrorLocation,
    },

    /// Session, handshake or command builder failure
    #[error("Core Error: {message} {location}")]
    Core {
        message: String,
        location: ErrorLocation,
    },

    /// The vehicle did not answer within the command timeout
    #[error("No Response Error: {message} {location}")]
    NoResponse {
        message: String,
        location: ErrorLocation,
    },

    /// The vehicle answered with a non-zero result
    #[error("Command Failed Error: {message} {location}")]
    CommandFailed {
        message: String,
        location: ErrorLocation,
    },
}

impl LinkAppError {
    #[track_caller]
    pub fn app(message: impl Into<String>) -> Self {
        LinkAppError::App {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            LinkAppError::App { .. } => 1,
            LinkAppError::Config { .. } => 2,
            LinkAppError::Core { .. } => 3,
            LinkAppError::NoResponse { .. } => 4,
            LinkAppError::CommandFailed { .. } => 5,
        }
    }
}

impl From<ConfigError> for LinkAppError {
    #[track_caller]
    fn from(error: ConfigError) -> Self {
        LinkAppError::Config {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<SessionError> for LinkAppError {
    #[track_caller]
    fn from(error: SessionError) -> Self {
        LinkAppError::Core {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<CommandError> for LinkAppError {
    #[track_caller]
    fn from(error: CommandError) -> Self {
        LinkAppError::Core {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<CoreError> for LinkAppError {
    #[track_caller]
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::Config(inner) => Self::from(inner),
            CoreError::Session(inner) => Self::from(inner),
            CoreError::Command(inner) => Self::from(inner),
        }
    }
}
