pub mod command;
pub mod config;
pub mod session;

pub use command::CommandError;
pub use config::ConfigError;
pub use session::SessionError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Session(#[from] session::SessionError),

    #[error(transparent)]
    Command(#[from] command::CommandError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}
