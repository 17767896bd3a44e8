use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    Dead,
}

impl SessionStatus {
    pub fn is_connected(self) -> bool {
        matches!(self, SessionStatus::Authenticating | SessionStatus::Ready)
    }

    pub fn is_authenticated(self) -> bool {
        self == SessionStatus::Ready
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Authenticating => "authenticating",
            SessionStatus::Ready => "ready",
            SessionStatus::Dead => "dead",
        };
        f.write_str(name)
    }
}

/// Current status, published to any number of watchers.
///
/// Every connect attempt and every disconnect takes a new generation. Updates
/// carrying an older generation are dropped, so an attempt that outlives a
/// disconnect cannot move the session again.
pub(crate) struct StatusCell {
    sender: watch::Sender<SessionStatus>,
    generation: AtomicU64,
}

impl StatusCell {
    pub(crate) fn new() -> Self {
        let (sender, _) = watch::channel(SessionStatus::Disconnected);
        Self {
            sender,
            generation: AtomicU64::new(0),
        }
    }

    pub(crate) fn get(&self) -> SessionStatus {
        *self.sender.borrow()
    }

    /// Moves `Disconnected` to `Connecting` and returns the attempt's
    /// generation. Returns the current status when the session is in any
    /// other state.
    pub(crate) fn begin_connect(&self) -> Result<u64, SessionStatus> {
        let mut current = SessionStatus::Disconnected;
        let mut generation = 0;
        let changed = self.sender.send_if_modified(|status| {
            current = *status;
            if *status == SessionStatus::Disconnected {
                *status = SessionStatus::Connecting;
                generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                true
            } else {
                false
            }
        });

        if changed {
            debug!("Session status {current} -> {}", SessionStatus::Connecting);
            Ok(generation)
        } else {
            Err(current)
        }
    }

    /// Sets `status` if `generation` is still current. Returns false when
    /// the attempt has been superseded.
    pub(crate) fn advance(&self, generation: u64, status: SessionStatus) -> bool {
        let mut current = None;
        self.sender.send_if_modified(|value| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            current = Some(*value);
            let changed = *value != status;
            *value = status;
            changed
        });

        match current {
            Some(previous) => {
                if previous != status {
                    debug!("Session status {previous} -> {status}");
                }
                true
            }
            None => false,
        }
    }

    /// Marks a live session dead. Returns false if it was not live or
    /// `generation` is stale.
    pub(crate) fn mark_dead(&self, generation: u64) -> bool {
        self.sender.send_if_modified(|status| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            match status {
                SessionStatus::Connecting
                | SessionStatus::Authenticating
                | SessionStatus::Ready => {
                    *status = SessionStatus::Dead;
                    true
                }
                SessionStatus::Disconnected | SessionStatus::Dead => false,
            }
        })
    }

    /// Starts a new generation without touching the status, which
    /// supersedes every attempt and loop of the previous one.
    pub(crate) fn invalidate(&self) -> u64 {
        let mut generation = 0;
        self.sender.send_if_modified(|_| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            false
        });
        generation
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.sender.subscribe()
    }
}
