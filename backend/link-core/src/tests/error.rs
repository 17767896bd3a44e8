use crate::error::{CommandError, ConfigError, CoreError, SessionError};

use std::io;

#[test]
fn given_io_error_when_converted_then_becomes_connection_class_io_variant() {
    let error: SessionError = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed").into();

    assert!(matches!(error, SessionError::Io { .. }));
    assert!(error.is_connection_class());
    assert_eq!(error.error_category(), "io");
    assert!(error.to_string().starts_with("IO Error: pipe closed ["));
}

/// **VALUE**: Constructors record the caller's file, not this module's.
#[test]
fn given_constructor_when_called_then_location_points_at_caller() {
    let error = SessionError::not_authenticated("not yet");

    let SessionError::NotAuthenticated { location, .. } = &error else {
        panic!("unexpected variant {error:?}");
    };
    assert!(location.file.ends_with("error.rs"));
    assert!(location.file.contains("tests"));
    assert!(!error.is_connection_class());
}

#[test]
fn given_each_concern_error_when_wrapped_in_core_error_then_display_is_transparent() {
    let session: CoreError = SessionError::connection("refused").into();
    let command: CoreError = CommandError::validation("bad").into();
    let config: CoreError = ConfigError::SecretMissing {
        location: common::ErrorLocation::from(std::panic::Location::caller()),
        variable: "OVMS_VEHICLE_PASSWORD".into(),
    }
    .into();

    assert!(session.to_string().starts_with("Connection Error: refused"));
    assert!(command.to_string().starts_with("Command Validation Error: bad"));
    assert!(config.to_string().contains("OVMS_VEHICLE_PASSWORD"));
}
