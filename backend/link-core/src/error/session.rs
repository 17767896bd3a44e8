//! Error types for the relay session.
//!
//! Connection-class variants (`Connection`, `Handshake`, `Desync`, `Io`) mean
//! the link cannot be trusted any more. `ProtocolDecode` is the only
//! recoverable variant: a line that decrypted fine but carried no usable frame.

use common::ErrorLocation;

use std::io::Error as IoError;
use std::panic::Location;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum SessionError {
    #[error("Connection Error: {message} {location}")]
    Connection {
        message: String,
        location: ErrorLocation,
    },

    #[error("Handshake Error: {message} {location}")]
    Handshake {
        message: String,
        location: ErrorLocation,
    },

    #[error("Not Authenticated Error: {message} {location}")]
    NotAuthenticated {
        message: String,
        location: ErrorLocation,
    },

    #[error("Protocol Decode Error: {message} {location}")]
    ProtocolDecode {
        message: String,
        location: ErrorLocation,
    },

    #[error("Cipher Desync Error: {message} {location}")]
    Desync {
        message: String,
        location: ErrorLocation,
    },

    #[error("IO Error: {message} {location}")]
    Io {
        message: String,
        location: ErrorLocation,
    },
}

impl SessionError {
    #[track_caller]
    pub fn connection(message: impl Into<String>) -> Self {
        SessionError::Connection {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn handshake(message: impl Into<String>) -> Self {
        SessionError::Handshake {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn not_authenticated(message: impl Into<String>) -> Self {
        SessionError::NotAuthenticated {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn protocol_decode(message: impl Into<String>) -> Self {
        SessionError::ProtocolDecode {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn desync(message: impl Into<String>) -> Self {
        SessionError::Desync {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    /// True when the session that raised this error must be considered dead.
    pub fn is_connection_class(&self) -> bool {
        match self {
            SessionError::Connection { .. } => true,
            SessionError::Handshake { .. } => true,
            SessionError::Desync { .. } => true,
            SessionError::Io { .. } => true,
            SessionError::NotAuthenticated { .. } => false,
            SessionError::ProtocolDecode { .. } => false,
        }
    }

    /// Short category name for log lines.
    pub fn error_category(&self) -> &'static str {
        match self {
            SessionError::Connection { .. } => "connection",
            SessionError::Handshake { .. } => "handshake",
            SessionError::NotAuthenticated { .. } => "not_authenticated",
            SessionError::ProtocolDecode { .. } => "protocol_decode",
            SessionError::Desync { .. } => "desync",
            SessionError::Io { .. } => "io",
        }
    }
}

impl From<IoError> for SessionError {
    #[track_caller]
    fn from(error: IoError) -> Self {
        SessionError::Io {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
