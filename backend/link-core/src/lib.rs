pub mod cipher;
pub mod codec;
pub mod commands;
pub mod config;
pub mod error;
pub mod handshake;
pub mod link;
pub mod protocol;
pub mod session;
pub mod telemetry;
pub mod transport;

#[cfg(test)]
mod tests;

pub use commands::{Command, CommandCode, VehicleFamily};
pub use config::LinkConfig;
pub use link::VehicleLink;
pub use protocol::{CommandResponse, CommandResult};
pub use session::{PendingCommand, Session, SessionSettings, SessionStatus};
pub use telemetry::{TelemetrySink, TelemetryValue};

pub const DEFAULT_RELAY_HOST: &str = "api.openvehicles.com";
pub const DEFAULT_TLS_PORT: u16 = 6870;
pub const DEFAULT_PLAIN_PORT: u16 = 6867;

pub const LINE_TERMINATOR: &str = "\r\n";
pub const CLIENT_AUTH_PREAMBLE: &str = "MP-A";
pub const SERVER_AUTH_PREAMBLE: &str = "MP-S";
pub const AUTH_SUCCESS_MARKER: &str = "0";
pub const MESSAGE_PREAMBLE: &str = "MP-0 ";
pub const COMMAND_PREFIX: &str = const_format::concatcp!(MESSAGE_PREAMBLE, "C");
pub const KEEPALIVE_LINE: &str = const_format::concatcp!(MESSAGE_PREAMBLE, "A");
