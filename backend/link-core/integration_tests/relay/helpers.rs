//! Test helpers for relay integration tests.
//!
//! [`MockRelay`] listens on a local port and plays the server side of the
//! protocol: it checks the client's hello, answers with its own token and
//! digest, then speaks encrypted lines through [`RelayPeer`].

use link_core::cipher::CipherState;
use link_core::codec::{decode_line, encode_line};
use link_core::handshake::{derive_key, token_digest};
use link_core::transport::{BoxedStream, Endpoint};
use link_core::{LinkConfig, SessionSettings};

use common::RedactedSecret;

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream, ReadBuf,
    ReadHalf, WriteHalf,
};
use tokio::net::TcpListener;

pub const TEST_SECRET: &str = "relay-test-password";
pub const TEST_VEHICLE: &str = "DEMO";
pub const SERVER_TOKEN: &str = "RelayToken0123456789ABCD";
pub const WAIT: Duration = Duration::from_secs(5);

pub fn secret() -> RedactedSecret {
    RedactedSecret::new(TEST_SECRET)
}

/// Settings for sessions driven through `connect_with_stream`.
pub fn in_memory_settings() -> SessionSettings {
    let endpoint = Endpoint {
        host: "in-memory".to_string(),
        port: 0,
        use_tls: false,
    };
    SessionSettings::new(endpoint, TEST_VEHICLE, secret())
        .with_handshake_timeout(Duration::from_secs(2))
        .with_keepalive_interval(Duration::from_secs(600))
}

pub struct MockRelay {
    listener: TcpListener,
    pub port: u16,
}

impl MockRelay {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock relay");
        let port = listener.local_addr().expect("No local addr").port();
        Self { listener, port }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: "127.0.0.1".to_string(),
            port: self.port,
            use_tls: false,
        }
    }

    /// Settings with short timeouts and a keepalive slow enough to stay
    /// out of the way unless a test shortens it.
    pub fn settings(&self) -> SessionSettings {
        SessionSettings::new(self.endpoint(), TEST_VEHICLE, secret())
            .with_connect_timeout(Duration::from_secs(2))
            .with_handshake_timeout(Duration::from_secs(2))
            .with_keepalive_interval(Duration::from_secs(600))
    }

    pub fn link_config(&self) -> LinkConfig {
        let mut config = LinkConfig::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = Some(self.port);
        config.server.use_tls = false;
        config.vehicle.vehicle_id = TEST_VEHICLE.to_string();
        config.protocol.command_timeout = Duration::from_secs(2);
        config.protocol.handshake_timeout = Duration::from_secs(2);
        config.reconnect.initial_delay = Duration::from_millis(20);
        config.reconnect.max_delay = Duration::from_millis(100);
        config.reconnect.max_elapsed = Duration::from_secs(3);
        config
    }

    pub async fn accept(&self) -> RelayPeer {
        let (stream, _) = tokio::time::timeout(WAIT, self.listener.accept())
            .await
            .expect("Timed out waiting for client")
            .expect("Accept failed");
        RelayPeer::new(Box::new(stream))
    }

    pub async fn accept_authenticated(&self) -> RelayPeer {
        let mut peer = self.accept().await;
        peer.complete_handshake().await;
        peer
    }

    /// Panics if a client connects within `window`.
    pub async fn assert_no_connection_within(&self, window: Duration) {
        let accepted = tokio::time::timeout(window, self.listener.accept()).await;
        assert!(accepted.is_err(), "unexpected extra client connection");
    }
}

/// Client end of an in-memory pipe whose writes fail once broken, while
/// reads keep waiting on the peer as usual.
pub struct BreakableStream {
    inner: DuplexStream,
    broken: Arc<AtomicBool>,
}

impl BreakableStream {
    /// Returns the client stream, its break switch and the relay end.
    pub fn pair() -> (Self, Arc<AtomicBool>, DuplexStream) {
        let (client, server) = tokio::io::duplex(8192);
        let broken = Arc::new(AtomicBool::new(false));
        let stream = Self {
            inner: client,
            broken: Arc::clone(&broken),
        };
        (stream, broken, server)
    }

    fn check(&self) -> io::Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "write side broken"))
        } else {
            Ok(())
        }
    }
}

impl AsyncRead for BreakableStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for BreakableStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if let Err(e) = self.check() {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if let Err(e) = self.check() {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Fields of the client's hello line.
#[derive(Debug, Clone)]
pub struct ClientHello {
    pub token: String,
    pub digest: String,
    pub vehicle_id: String,
}

/// Server end of one connection.
pub struct RelayPeer {
    reader: BufReader<ReadHalf<BoxedStream>>,
    writer: WriteHalf<BoxedStream>,
    tx: Option<CipherState>,
    rx: Option<CipherState>,
    pub hello: Option<ClientHello>,
}

impl RelayPeer {
    pub fn new(stream: BoxedStream) -> Self {
        let (read, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(read),
            writer,
            tx: None,
            rx: None,
            hello: None,
        }
    }

    /// One raw line, or `None` on EOF.
    pub async fn read_raw_line(&mut self) -> Option<String> {
        let mut line = String::new();
        let read = tokio::time::timeout(WAIT, self.reader.read_line(&mut line))
            .await
            .expect("Timed out waiting for client line")
            .expect("Read failed");
        if read == 0 { None } else { Some(line) }
    }

    pub async fn write_raw(&mut self, text: &str) {
        self.writer
            .write_all(text.as_bytes())
            .await
            .expect("Failed to write to client");
        self.writer.flush().await.expect("Failed to flush");
    }

    /// Reads and checks the client hello.
    pub async fn read_hello(&mut self) -> ClientHello {
        let line = self.read_raw_line().await.expect("Client sent no hello");
        assert!(line.ends_with("\r\n"), "hello must end with CRLF: {line:?}");

        let parts: Vec<&str> = line.split_whitespace().collect();
        assert_eq!(parts.len(), 5, "unexpected hello {line:?}");
        assert_eq!(parts[0], "MP-A");
        assert_eq!(parts[1], "0");

        let hello = ClientHello {
            token: parts[2].to_string(),
            digest: parts[3].to_string(),
            vehicle_id: parts[4].to_string(),
        };
        self.hello = Some(hello.clone());
        hello
    }

    pub async fn complete_handshake(&mut self) {
        let hello = self.read_hello().await;
        let secret = secret();

        assert_eq!(
            hello.digest,
            token_digest(&secret, &hello.token).unwrap(),
            "client digest does not verify"
        );

        let server_digest = token_digest(&secret, SERVER_TOKEN).unwrap();
        self.write_raw(&format!("MP-S 0 {SERVER_TOKEN} {server_digest}\r\n"))
            .await;

        let key = derive_key(&secret, SERVER_TOKEN, &hello.token).unwrap();
        self.tx = Some(CipherState::primed(key.as_bytes()).unwrap());
        self.rx = Some(CipherState::primed(key.as_bytes()).unwrap());
    }

    /// Encrypts and sends one line to the client.
    pub async fn send(&mut self, plaintext: &str) {
        let tx = self.tx.as_mut().expect("Handshake not completed");
        let line = encode_line(tx, plaintext);
        self.write_raw(&line).await;
    }

    /// Next decrypted line from the client, or `None` on EOF.
    pub async fn recv(&mut self) -> Option<String> {
        let line = self.read_raw_line().await?;
        let rx = self.rx.as_mut().expect("Handshake not completed");
        Some(decode_line(rx, &line).expect("Client sent undecodable line"))
    }

    /// Answers the next command with `reply` and returns the command text.
    pub async fn answer_next_command(&mut self, reply: &str) -> String {
        let command = self.recv().await.expect("Client closed before command");
        self.send(reply).await;
        command
    }
}
