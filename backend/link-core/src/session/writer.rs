use crate::cipher::CipherState;
use crate::codec;
use crate::error::session::SessionError;
use crate::transport::BoxedStream;

use std::sync::Arc;

use log::debug;
use tokio::io::{AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// The only way bytes reach the relay after authentication. Commands and
/// keepalives share this mutex, so tx keystream use is never interleaved.
pub(crate) struct TxPath {
    inner: Arc<Mutex<TxInner>>,
    shutdown: CancellationToken,
}

struct TxInner {
    writer: WriteHalf<BoxedStream>,
    cipher: CipherState,
}

impl TxPath {
    pub(crate) fn new(
        writer: WriteHalf<BoxedStream>,
        cipher: CipherState,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TxInner { writer, cipher })),
            shutdown,
        }
    }

    /// Encrypts and writes one line.
    ///
    /// The write runs on its own task. Dropping the returned future leaves
    /// that task to finish the line, so the keystream and the wire stay in
    /// step. Only session shutdown stops a write halfway.
    pub(crate) async fn send(&self, plaintext: &str) -> Result<(), SessionError> {
        let inner = Arc::clone(&self.inner);
        let shutdown = self.shutdown.clone();
        let plaintext = plaintext.to_string();

        let write = tokio::spawn(async move {
            let mut guard = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    return Err(SessionError::connection("Session closed before write"));
                }
                guard = inner.lock() => guard,
            };
            let inner = &mut *guard;
            let line = codec::encode_line(&mut inner.cipher, &plaintext);

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    Err(SessionError::connection("Session closed during write"))
                }
                written = write_line(&mut inner.writer, &line) => written,
            }
        });

        match write.await {
            Ok(written) => written,
            Err(e) => Err(SessionError::connection(format!("Write task failed: {e}"))),
        }
    }

    pub(crate) async fn shutdown(&self) {
        let mut guard = self.inner.lock().await;
        if let Err(e) = guard.writer.shutdown().await {
            debug!("Ignoring error while closing the relay stream: {e}");
        }
    }
}

async fn write_line(
    writer: &mut WriteHalf<BoxedStream>,
    line: &str,
) -> Result<(), SessionError> {
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Read half and rx cipher, owned by the dispatcher once it starts.
pub(crate) struct RxPath {
    pub(crate) reader: BufReader<ReadHalf<BoxedStream>>,
    pub(crate) cipher: CipherState,
}

impl RxPath {
    pub(crate) fn new(reader: BufReader<ReadHalf<BoxedStream>>, cipher: CipherState) -> Self {
        Self { reader, cipher }
    }
}
