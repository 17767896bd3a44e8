//! Mutual authentication with the relay and session key derivation.
//!
//! The exchange is two plaintext lines:
//!
//! ```text
//! client: MP-A 0 <client_token> <client_digest> <vehicle_id>\r\n
//! server: MP-S 0 <server_token> <server_digest>\r\n
//! ```
//!
//! Digests are base64(HMAC-MD5(secret, token)). The session key is
//! HMAC-MD5(secret, server_token || client_token) and keys both directions.

use crate::cipher::CipherState;
use crate::codec::{self, LineRead, MAX_LINE_LEN};
use crate::error::session::SessionError;
use crate::{
    AUTH_SUCCESS_MARKER, CLIENT_AUTH_PREAMBLE, LINE_TERMINATOR, SERVER_AUTH_PREAMBLE,
};

use common::RedactedSecret;

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use log::{debug, info, warn};
use md5::Md5;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};
use zeroize::Zeroize;

type HmacMd5 = Hmac<Md5>;

pub const TOKEN_LEN: usize = 22;
pub const DIGEST_LEN: usize = 16;
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

const TOKEN_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// What to do when the server's digest does not match the expected one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestPolicy {
    /// Log a warning and continue. Some relays answer with a digest the
    /// client cannot reproduce, and the cipher still fails closed later.
    #[default]
    Warn,
    /// Abort the handshake.
    Enforce,
}

/// Session key. Wiped on drop.
pub struct DerivedKey([u8; DIGEST_LEN]);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

/// Fields of the server's reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    pub token: String,
    pub digest: String,
}

/// Primed ciphers for each direction.
#[derive(Debug)]
pub struct SessionKeys {
    pub tx: CipherState,
    pub rx: CipherState,
}

pub fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    (0..TOKEN_LEN)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// HMAC-MD5 keyed with the vehicle secret. An empty secret is rejected.
#[track_caller]
pub fn hmac_md5(
    secret: &RedactedSecret,
    message: &[u8],
) -> Result<[u8; DIGEST_LEN], SessionError> {
    let key = secret.expose_bytes();
    if key.is_empty() {
        return Err(SessionError::handshake("Vehicle secret is empty"));
    }
    let mut mac = match HmacMd5::new_from_slice(key) {
        Ok(mac) => mac,
        Err(e) => return Err(SessionError::handshake(format!("Invalid HMAC key: {e}"))),
    };
    mac.update(message);
    let mut digest = [0u8; DIGEST_LEN];
    digest.copy_from_slice(&mac.finalize().into_bytes());
    Ok(digest)
}

/// base64 of HMAC-MD5(secret, token).
#[track_caller]
pub fn token_digest(secret: &RedactedSecret, token: &str) -> Result<String, SessionError> {
    let mut raw = hmac_md5(secret, token.as_bytes())?;
    let encoded = STANDARD.encode(raw);
    raw.zeroize();
    Ok(encoded)
}

#[track_caller]
pub fn derive_key(
    secret: &RedactedSecret,
    server_token: &str,
    client_token: &str,
) -> Result<DerivedKey, SessionError> {
    let mut message = Vec::with_capacity(server_token.len() + client_token.len());
    message.extend_from_slice(server_token.as_bytes());
    message.extend_from_slice(client_token.as_bytes());
    Ok(DerivedKey(hmac_md5(secret, &message)?))
}

/// Builds the client's hello line, without the line terminator.
pub fn client_hello(client_token: &str, client_digest: &str, vehicle_id: &str) -> String {
    format!(
        "{CLIENT_AUTH_PREAMBLE} {AUTH_SUCCESS_MARKER} {client_token} {client_digest} {vehicle_id}"
    )
}

/// Parses the server's reply. Accepts either auth preamble, requires the
/// success marker and at least four whitespace-separated fields.
pub fn parse_server_hello(line: &str) -> Result<ServerHello, SessionError> {
    let trimmed = line.trim();
    let parts: Vec<&str> = trimmed.split_whitespace().collect();

    if parts.len() < 4 {
        return Err(SessionError::handshake(format!(
            "Invalid server response: {trimmed}"
        )));
    }

    if parts[0] != CLIENT_AUTH_PREAMBLE && parts[0] != SERVER_AUTH_PREAMBLE {
        return Err(SessionError::handshake(format!(
            "Authentication failed: {trimmed}"
        )));
    }

    if parts[1] != AUTH_SUCCESS_MARKER {
        return Err(SessionError::handshake(format!(
            "Authentication failed: {trimmed}"
        )));
    }

    Ok(ServerHello {
        token: parts[2].to_string(),
        digest: parts[3].to_string(),
    })
}

/// One authentication attempt against an already-open stream.
pub struct Handshake<'a> {
    secret: &'a RedactedSecret,
    vehicle_id: &'a str,
    timeout: Duration,
    policy: DigestPolicy,
}

impl<'a> Handshake<'a> {
    pub fn new(secret: &'a RedactedSecret, vehicle_id: &'a str) -> Self {
        Self {
            secret,
            vehicle_id,
            timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            policy: DigestPolicy::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_digest_policy(mut self, policy: DigestPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn run<R, W>(
        &self,
        reader: &mut R,
        writer: &mut W,
    ) -> Result<SessionKeys, SessionError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let client_token = generate_token();
        self.run_with_token(&client_token, reader, writer).await
    }

    /// Same as [`Handshake::run`] with a caller-chosen client token.
    pub async fn run_with_token<R, W>(
        &self,
        client_token: &str,
        reader: &mut R,
        writer: &mut W,
    ) -> Result<SessionKeys, SessionError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let client_digest = token_digest(self.secret, client_token)?;
        let hello = client_hello(client_token, &client_digest, self.vehicle_id);

        debug!("Sending auth request for vehicle {}", self.vehicle_id);
        writer
            .write_all(format!("{hello}{LINE_TERMINATOR}").as_bytes())
            .await
            .map_err(|e| SessionError::connection(format!("Failed to send auth request: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| SessionError::connection(format!("Failed to send auth request: {e}")))?;

        let mut buffer = Vec::new();
        let read = tokio::time::timeout(self.timeout, codec::read_line(reader, &mut buffer)).await;
        match read {
            Err(_) => {
                return Err(SessionError::connection(format!(
                    "Timed out after {:?} waiting for server auth response",
                    self.timeout
                )));
            }
            Ok(Err(e)) => {
                return Err(SessionError::connection(format!(
                    "Failed to read server auth response: {e}"
                )));
            }
            Ok(Ok(LineRead::Closed)) => {
                return Err(SessionError::connection(
                    "Server closed the connection without responding",
                ));
            }
            Ok(Ok(LineRead::TooLong)) => {
                return Err(SessionError::handshake(format!(
                    "Server auth response longer than {MAX_LINE_LEN} bytes"
                )));
            }
            Ok(Ok(LineRead::Line)) => {}
        }

        let line = String::from_utf8_lossy(&buffer);
        if line.trim().is_empty() {
            return Err(SessionError::handshake("Empty response from server"));
        }

        let server = parse_server_hello(&line)?;

        let expected = token_digest(self.secret, &server.token)?;
        if expected != server.digest {
            match self.policy {
                DigestPolicy::Warn => {
                    warn!("Server digest mismatch for vehicle {}, continuing", self.vehicle_id);
                }
                DigestPolicy::Enforce => {
                    return Err(SessionError::handshake("Server digest mismatch"));
                }
            }
        }

        let key = derive_key(self.secret, &server.token, client_token)?;
        let keys = SessionKeys {
            tx: CipherState::primed(key.as_bytes())?,
            rx: CipherState::primed(key.as_bytes())?,
        };

        info!("Authenticated with relay as vehicle {}", self.vehicle_id);
        Ok(keys)
    }
}
