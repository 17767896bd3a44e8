//! Byte streams to the relay: plain TCP or TLS, behind one boxed type.

use crate::error::session::SessionError;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

pub trait LinkStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> LinkStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxedStream = Box<dyn LinkStream>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.use_tls { "tls" } else { "tcp" };
        write!(f, "{scheme}://{}:{}", self.host, self.port)
    }
}

pub async fn connect_stream(
    endpoint: &Endpoint,
    connect_timeout: Duration,
) -> Result<BoxedStream, SessionError> {
    debug!("Connecting to {endpoint}");

    let tcp = tokio::time::timeout(
        connect_timeout,
        TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
    )
    .await
    .map_err(|_| {
        SessionError::connection(format!(
            "Timed out after {connect_timeout:?} connecting to {endpoint}"
        ))
    })?
    .map_err(|e| SessionError::connection(format!("Failed to connect to {endpoint}: {e}")))?;

    tcp.set_nodelay(true)?;

    if !endpoint.use_tls {
        return Ok(Box::new(tcp));
    }

    let server_name = ServerName::try_from(endpoint.host.clone()).map_err(|e| {
        SessionError::connection(format!("Invalid TLS server name {}: {e}", endpoint.host))
    })?;

    let tls = tokio::time::timeout(connect_timeout, tls_connector().connect(server_name, tcp))
        .await
        .map_err(|_| {
            SessionError::connection(format!("Timed out during TLS handshake with {endpoint}"))
        })?
        .map_err(|e| {
            SessionError::connection(format!("TLS handshake with {endpoint} failed: {e}"))
        })?;

    Ok(Box::new(tls))
}

fn tls_connector() -> TlsConnector {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}
