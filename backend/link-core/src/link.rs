//! Caller-side supervisor that keeps one session usable across drops.

use crate::commands::{Command, CommandCode};
use crate::config::LinkConfig;
use crate::error::session::SessionError;
use crate::protocol::CommandResponse;
use crate::session::{Session, SessionStatus};
use crate::telemetry::TelemetrySink;

use common::RedactedSecret;

use std::sync::Arc;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use log::{info, warn};
use tokio::sync::Mutex;

pub struct VehicleLink {
    config: LinkConfig,
    session: Arc<Session>,
    reconnecting: Mutex<()>,
}

impl VehicleLink {
    pub fn new(config: LinkConfig, secret: RedactedSecret) -> Self {
        let session = Arc::new(Session::new(config.session_settings(secret)));
        Self::with_session(config, session)
    }

    pub fn with_session(config: LinkConfig, session: Arc<Session>) -> Self {
        Self {
            config,
            session,
            reconnecting: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Returns once the session is `Ready` with its loops running,
    /// reconnecting with exponential backoff if needed.
    ///
    /// Concurrent callers share one reconnect: the rest wait for it and
    /// return its outcome instead of tearing the fresh session down.
    pub async fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.session.is_authenticated() {
            return Ok(());
        }

        let _reconnecting = self.reconnecting.lock().await;
        if self.session.is_authenticated() {
            return Ok(());
        }

        let mut backoff = ExponentialBackoff {
            initial_interval: self.config.reconnect.initial_delay,
            max_interval: self.config.reconnect.max_delay,
            max_elapsed_time: Some(self.config.reconnect.max_elapsed),
            ..Default::default()
        };

        loop {
            self.session.disconnect().await;

            let error = match self.try_connect().await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            match backoff.next_backoff() {
                Some(delay) => {
                    warn!(
                        "Connecting to relay failed ({}), retrying in {delay:?}",
                        error.error_category()
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    warn!("Giving up on relay connection: {error}");
                    return Err(error);
                }
            }
        }
    }

    async fn try_connect(&self) -> Result<(), SessionError> {
        self.session.connect().await?;
        self.session.start_background_loops().await
    }

    /// Sends `command` and waits up to the configured command timeout.
    ///
    /// `Ok(None)` means no response arrived in time. The vehicle may still
    /// have received the command.
    pub async fn execute(
        &self,
        command: &Command,
    ) -> Result<Option<CommandResponse>, SessionError> {
        self.ensure_connected().await?;

        let payload = command.to_payload();
        let pending = match self.session.send_command(&payload).await {
            Ok(pending) => pending,
            Err(e) => {
                if e.is_connection_class() {
                    self.session.disconnect().await;
                }
                return Err(e);
            }
        };

        let response = pending
            .wait_for_response(self.config.protocol.command_timeout)
            .await;

        match &response {
            Some(reply) if reply.is_success() => {
                info!("Command {} succeeded", describe(reply));
            }
            Some(reply) => {
                warn!(
                    "Command {} returned {:?}: {}",
                    describe(reply),
                    reply.outcome(),
                    reply.message
                );
            }
            None => {
                warn!(
                    "No response to command {payload} within {:?}, \
                     it may still have been delivered",
                    self.config.protocol.command_timeout
                );
            }
        }

        Ok(response)
    }

    pub fn telemetry(&self) -> TelemetrySink {
        self.session.telemetry()
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    pub async fn shutdown(&self) {
        self.session.disconnect().await;
    }
}

fn describe(reply: &CommandResponse) -> String {
    match reply.code.and_then(CommandCode::from_code) {
        Some(code) => code.to_string(),
        None => reply
            .code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "?".to_string()),
    }
}
