use crate::protocol::CommandResponse;

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::{Mutex, OwnedMutexGuard, oneshot};

/// Single-slot rendezvous between `send_command` and the dispatcher.
///
/// `exclusive` admits one outstanding command at a time. `slot` holds the
/// sender the next `c` response is delivered to.
pub(crate) struct CommandCorrelator {
    exclusive: Arc<Mutex<()>>,
    slot: Mutex<Option<oneshot::Sender<CommandResponse>>>,
}

impl CommandCorrelator {
    pub(crate) fn new() -> Self {
        Self {
            exclusive: Arc::new(Mutex::new(())),
            slot: Mutex::new(None),
        }
    }

    pub(crate) async fn acquire(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.exclusive).lock_owned().await
    }

    /// Installs a fresh slot, discarding any stale one.
    pub(crate) async fn arm(&self) -> oneshot::Receiver<CommandResponse> {
        let (sender, receiver) = oneshot::channel();
        if self.slot.lock().await.replace(sender).is_some() {
            debug!("Discarded stale command response slot");
        }
        receiver
    }

    /// Hands `response` to the armed slot. Returns false when nobody was waiting.
    pub(crate) async fn deliver(&self, response: CommandResponse) -> bool {
        let armed = self.slot.lock().await.take();
        match armed {
            Some(sender) => {
                if let Err(response) = sender.send(response) {
                    debug!("Command waiter gone, dropping response {response}");
                    return false;
                }
                true
            }
            None => {
                debug!("Unsolicited command response {response}");
                false
            }
        }
    }

    /// Drops the armed slot so a waiter returns immediately.
    pub(crate) async fn clear(&self) {
        self.slot.lock().await.take();
    }
}

/// A command that has been written to the relay and may still be answered.
///
/// Holds the exclusive command lock until it is waited on or dropped.
#[must_use = "the command lock is held until the response is awaited or this is dropped"]
pub struct PendingCommand {
    text: String,
    response: oneshot::Receiver<CommandResponse>,
    _exclusive: OwnedMutexGuard<()>,
}

impl PendingCommand {
    pub(crate) fn new(
        text: impl Into<String>,
        response: oneshot::Receiver<CommandResponse>,
        exclusive: OwnedMutexGuard<()>,
    ) -> Self {
        Self {
            text: text.into(),
            response,
            _exclusive: exclusive,
        }
    }

    pub fn command(&self) -> &str {
        &self.text
    }

    /// Waits up to `timeout` for the response. `None` on timeout, or when the
    /// session dies or disconnects first.
    pub async fn wait_for_response(self, timeout: Duration) -> Option<CommandResponse> {
        match tokio::time::timeout(timeout, self.response).await {
            Ok(Ok(response)) => Some(response),
            Ok(Err(_)) => {
                debug!("Session closed before command {} was answered", self.text);
                None
            }
            Err(_) => {
                warn!("Command {} timed out after {timeout:?}", self.text);
                None
            }
        }
    }
}
