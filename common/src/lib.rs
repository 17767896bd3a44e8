//! Shared building blocks for the vehicle link workspace.
//!
//! This crate holds the small pieces every other crate leans on:
//! call-site capture for errors and a secret wrapper that never
//! leaks the vehicle password into logs.
//!
//! ## Architecture
//!
//! - **common** (this crate): error location tracking, secret handling
//! - **link-core**: protocol session, cipher, dispatcher, commands
//! - **ovms-link**: command-line front-end wiring everything together

pub mod error;
pub mod redacted_secret;


pub use error::error_location::ErrorLocation;
pub use error::redact_error::RedactError;
pub use redacted_secret::RedactedSecret;
