//! Authenticated relay session.
//!
//! A [`Session`] walks `Disconnected -> Connecting -> Authenticating -> Ready`
//! on [`Session::connect`]. Once `Ready`, [`Session::start_background_loops`]
//! spawns the inbound dispatcher and the keepalive. Any stream failure moves
//! the session to `Dead`; it must be disconnected before connecting again.

pub(crate) mod correlator;
pub(crate) mod dispatcher;
pub(crate) mod keepalive;
pub(crate) mod status;
pub(crate) mod writer;

pub use correlator::PendingCommand;
pub use keepalive::DEFAULT_KEEPALIVE_INTERVAL;
pub use status::SessionStatus;

use crate::COMMAND_PREFIX;
use crate::error::session::SessionError;
use crate::handshake::{DEFAULT_HANDSHAKE_TIMEOUT, DigestPolicy, Handshake, SessionKeys};
use crate::protocol::CommandResponse;
use crate::telemetry::TelemetrySink;
use crate::transport::{self, BoxedStream, Endpoint};
use correlator::CommandCorrelator;
use status::StatusCell;
use writer::{RxPath, TxPath};

use common::RedactedSecret;

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncWriteExt, BufReader, WriteHalf};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub endpoint: Endpoint,
    pub vehicle_id: String,
    pub secret: RedactedSecret,
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    pub keepalive_interval: Duration,
    pub digest_policy: DigestPolicy,
}

impl SessionSettings {
    pub fn new(endpoint: Endpoint, vehicle_id: impl Into<String>, secret: RedactedSecret) -> Self {
        Self {
            endpoint,
            vehicle_id: vehicle_id.into(),
            secret,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            digest_policy: DigestPolicy::default(),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    pub fn with_digest_policy(mut self, policy: DigestPolicy) -> Self {
        self.digest_policy = policy;
        self
    }
}

// ============================================================================
// Shared state
// ============================================================================

/// State reachable from both the session handle and its background loops.
pub(crate) struct SessionShared {
    pub(crate) status: StatusCell,
    pub(crate) correlator: CommandCorrelator,
    pub(crate) telemetry: TelemetrySink,
}

impl SessionShared {
    pub(crate) fn new() -> Self {
        Self {
            status: StatusCell::new(),
            correlator: CommandCorrelator::new(),
            telemetry: TelemetrySink::new(),
        }
    }

    /// Marks the session dead, stops the other loop and releases any waiter.
    /// A failure from a superseded generation only stops its own loops.
    pub(crate) async fn fail(&self, reason: &str, generation: u64, shutdown: &CancellationToken) {
        if self.status.mark_dead(generation) {
            warn!("Relay session is dead: {reason}");
        } else {
            debug!("Ignoring failure on inactive session: {reason}");
        }
        shutdown.cancel();
        self.correlator.clear().await;
    }
}

struct LiveConnection {
    generation: u64,
    tx: Arc<TxPath>,
    rx: Option<RxPath>,
    shutdown: CancellationToken,
    loops: Vec<JoinHandle<()>>,
}

// ============================================================================
// Session
// ============================================================================

pub struct Session {
    settings: SessionSettings,
    shared: Arc<SessionShared>,
    live: Mutex<Option<LiveConnection>>,
}

impl Session {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            shared: Arc::new(SessionShared::new()),
            live: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Opens a stream to the configured endpoint and authenticates.
    pub async fn connect(&self) -> Result<(), SessionError> {
        let generation = self.begin_connect()?;

        let settings = &self.settings;
        let connecting = transport::connect_stream(&settings.endpoint, settings.connect_timeout);
        let stream = match connecting.await {
            Ok(stream) => stream,
            Err(e) => {
                self.shared.status.advance(generation, SessionStatus::Dead);
                return Err(e);
            }
        };

        self.authenticate(stream, generation).await
    }

    /// Authenticates over a stream the caller already opened.
    pub async fn connect_with_stream(&self, stream: BoxedStream) -> Result<(), SessionError> {
        let generation = self.begin_connect()?;
        self.authenticate(stream, generation).await
    }

    fn begin_connect(&self) -> Result<u64, SessionError> {
        self.shared.status.begin_connect().map_err(|current| {
            SessionError::connection(format!(
                "Cannot connect while session is {current}, disconnect first"
            ))
        })
    }

    async fn authenticate(&self, stream: BoxedStream, generation: u64) -> Result<(), SessionError> {
        let (read_half, mut write_half) = tokio::io::split(stream);

        if !self.shared.status.advance(generation, SessionStatus::Authenticating) {
            close_quietly(&mut write_half).await;
            return Err(SessionError::connection("Disconnected before authentication"));
        }

        let mut reader = BufReader::new(read_half);
        let handshake = Handshake::new(&self.settings.secret, &self.settings.vehicle_id)
            .with_timeout(self.settings.handshake_timeout)
            .with_digest_policy(self.settings.digest_policy);

        let SessionKeys { tx, rx } = match handshake.run(&mut reader, &mut write_half).await {
            Ok(keys) => keys,
            Err(e) => {
                close_quietly(&mut write_half).await;
                self.shared.status.advance(generation, SessionStatus::Dead);
                return Err(e);
            }
        };

        let mut live = self.live.lock().await;
        if !self.shared.status.advance(generation, SessionStatus::Ready) {
            drop(live);
            close_quietly(&mut write_half).await;
            return Err(SessionError::connection("Disconnected while authenticating"));
        }

        let shutdown = CancellationToken::new();
        let stale = live.replace(LiveConnection {
            generation,
            tx: Arc::new(TxPath::new(write_half, tx, shutdown.clone())),
            rx: Some(RxPath::new(reader, rx)),
            shutdown,
            loops: Vec::new(),
        });
        if let Some(stale) = stale {
            stale.shutdown.cancel();
        }
        drop(live);

        info!("Relay session ready for vehicle {}", self.settings.vehicle_id);
        Ok(())
    }

    /// Spawns the inbound dispatcher and keepalive. A second call is a no-op.
    pub async fn start_background_loops(&self) -> Result<(), SessionError> {
        if !self.is_authenticated() {
            return Err(SessionError::not_authenticated(format!(
                "Background loops need a ready session, session is {}",
                self.status()
            )));
        }

        let mut live = self.live.lock().await;
        let Some(connection) = live.as_mut() else {
            return Err(SessionError::not_authenticated("No live connection"));
        };

        if !connection.loops.is_empty() {
            debug!("Background loops already running");
            return Ok(());
        }

        let Some(rx) = connection.rx.take() else {
            return Err(SessionError::connection("Inbound stream is no longer available"));
        };

        connection.loops.push(tokio::spawn(dispatcher::run(
            rx,
            Arc::clone(&self.shared),
            connection.generation,
            connection.shutdown.clone(),
        )));
        connection.loops.push(tokio::spawn(keepalive::run(
            Arc::clone(&connection.tx),
            Arc::clone(&self.shared),
            self.settings.keepalive_interval,
            connection.generation,
            connection.shutdown.clone(),
        )));

        info!(
            "Background loops started, keepalive every {:?}",
            self.settings.keepalive_interval
        );
        Ok(())
    }

    /// Writes `MP-0 C<text>` and returns a handle to await the response.
    ///
    /// Waits while another command is outstanding.
    pub async fn send_command(&self, text: &str) -> Result<PendingCommand, SessionError> {
        self.ensure_ready()?;
        let exclusive = self.shared.correlator.acquire().await;
        self.ensure_ready()?;

        let (tx, generation, shutdown) = {
            let live = self.live.lock().await;
            match live.as_ref() {
                Some(connection) => (
                    Arc::clone(&connection.tx),
                    connection.generation,
                    connection.shutdown.clone(),
                ),
                None => return Err(SessionError::not_authenticated("No live connection")),
            }
        };

        let response = self.shared.correlator.arm().await;
        let line = format!("{COMMAND_PREFIX}{text}");
        debug!("Sending command {text}");

        if let Err(e) = tx.send(&line).await {
            self.shared
                .fail(&format!("Command write failed: {e}"), generation, &shutdown)
                .await;
            return Err(SessionError::connection(format!("Failed to send command {text}: {e}")));
        }

        Ok(PendingCommand::new(text, response, exclusive))
    }

    pub async fn execute(
        &self,
        text: &str,
        timeout: Duration,
    ) -> Result<Option<CommandResponse>, SessionError> {
        let pending = self.send_command(text).await?;
        Ok(pending.wait_for_response(timeout).await)
    }

    fn ensure_ready(&self) -> Result<(), SessionError> {
        match self.status() {
            SessionStatus::Ready => Ok(()),
            SessionStatus::Dead => Err(SessionError::connection(
                "Relay session is dead, reconnect first",
            )),
            other => Err(SessionError::not_authenticated(format!(
                "Session is {other}, not authenticated"
            ))),
        }
    }

    /// Stops the loops, closes the stream and drops both ciphers.
    /// Safe to call in any state, any number of times. A connect still in
    /// its handshake is abandoned and closes its own stream.
    pub async fn disconnect(&self) {
        let (connection, generation) = {
            let mut live = self.live.lock().await;
            (live.take(), self.shared.status.invalidate())
        };

        if let Some(mut connection) = connection {
            connection.shutdown.cancel();
            for handle in connection.loops.drain(..) {
                if let Err(e) = handle.await {
                    warn!("Background loop ended abnormally: {e}");
                }
            }
            connection.tx.shutdown().await;
        }

        self.shared.correlator.clear().await;

        let previous = self.status();
        if self.shared.status.advance(generation, SessionStatus::Disconnected)
            && previous != SessionStatus::Disconnected
        {
            info!("Relay session disconnected");
        }
    }

    pub fn telemetry(&self) -> TelemetrySink {
        self.shared.telemetry.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.status.get()
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    pub fn is_authenticated(&self) -> bool {
        self.status().is_authenticated()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.shared.status.subscribe()
    }
}

async fn close_quietly(writer: &mut WriteHalf<BoxedStream>) {
    if let Err(e) = writer.shutdown().await {
        debug!("Ignoring error while closing the relay stream: {e}");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(connection) = self.live.get_mut().as_ref() {
            connection.shutdown.cancel();
        }
    }
}
