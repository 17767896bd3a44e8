use super::SessionShared;
use super::writer::RxPath;
use crate::cipher::CipherState;
use crate::codec::{self, Frame, LineRead, MAX_LINE_LEN};
use crate::error::session::SessionError;
use crate::protocol::{self, CommandResponse, MessageTag};
use crate::telemetry::{FIELD_HVAC, TelemetryValue};

use std::sync::Arc;

use log::{debug, info, trace};
use tokio_util::sync::CancellationToken;

const LINE_CAPACITY: usize = 512;

/// Reads inbound lines until cancelled or the stream fails.
///
/// Every non-blank line goes through the rx cipher, recognised or not, so the
/// keystream stays aligned with the relay.
pub(crate) async fn run(
    mut rx: RxPath,
    shared: Arc<SessionShared>,
    generation: u64,
    shutdown: CancellationToken,
) {
    info!("Inbound dispatcher started");
    let mut buffer = Vec::with_capacity(LINE_CAPACITY);

    let failure = loop {
        buffer.clear();

        let read = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("Inbound dispatcher cancelled");
                return;
            }
            read = codec::read_line(&mut rx.reader, &mut buffer) => read,
        };

        match read {
            Ok(LineRead::Closed) => break "Connection closed by relay".to_string(),
            Ok(LineRead::TooLong) => {
                break SessionError::desync(format!(
                    "Inbound line longer than {MAX_LINE_LEN} bytes"
                ))
                .to_string();
            }
            Ok(LineRead::Line) => {}
            Err(e) => break format!("Read from relay failed: {e}"),
        }

        let wire = String::from_utf8_lossy(&buffer);
        if wire.trim().is_empty() {
            continue;
        }

        if let Err(e) = dispatch_line(&mut rx.cipher, &wire, &shared).await {
            if e.is_connection_class() {
                break e.to_string();
            }
            debug!("Skipping inbound line: {e}");
        }
    };

    shared.fail(&failure, generation, &shutdown).await;
}

async fn dispatch_line(
    cipher: &mut CipherState,
    wire: &str,
    shared: &SessionShared,
) -> Result<(), SessionError> {
    let decoded = codec::decode_line(cipher, wire)?;
    let frame = codec::split_frame(&decoded)?;
    route_frame(frame, shared).await;
    Ok(())
}

pub(crate) async fn route_frame(frame: Frame<'_>, shared: &SessionShared) {
    let tag = MessageTag::from(frame.tag);
    match tag {
        MessageTag::CommandResponse => {
            let response = CommandResponse::parse(frame.payload);
            debug!("Command response {response}");
            shared.correlator.deliver(response).await;
        }
        MessageTag::FirmwareInfo => {
            let entries = protocol::parse_firmware(frame.payload);
            debug!("Firmware info updated {} fields", entries.len());
            shared.telemetry.merge(entries).await;
        }
        MessageTag::Environment => {
            if let Some(hvac) = protocol::parse_environment_hvac(frame.payload) {
                shared.telemetry.set(FIELD_HVAC, TelemetryValue::Flag(hvac)).await;
            }
        }
        tag if tag.is_high_frequency() => {
            trace!("Ignoring {} message", tag.as_char());
        }
        tag => {
            debug!("Unhandled {} message: {}", tag.as_char(), frame.payload);
        }
    }
}
