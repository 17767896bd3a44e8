use super::SessionShared;
use super::writer::TxPath;
use crate::KEEPALIVE_LINE;

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(300);

pub(crate) async fn run(
    tx: Arc<TxPath>,
    shared: Arc<SessionShared>,
    interval: Duration,
    generation: u64,
    shutdown: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("Keepalive cancelled");
                return;
            }
            _ = ticker.tick() => {}
        }

        if !shared.status.get().is_authenticated() {
            debug!("Keepalive stopping, session is {}", shared.status.get());
            return;
        }

        debug!("Sending keepalive");
        let sent = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            sent = tx.send(KEEPALIVE_LINE) => sent,
        };

        if let Err(e) = sent {
            let reason = format!("Keepalive failed: {e}");
            shared.fail(&reason, generation, &shutdown).await;
            return;
        }
    }
}
