mod codec;
mod commands;
mod config;
mod error;
mod protocol;
mod status;

/// Lowercase hex, for comparing against published vectors.
fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
