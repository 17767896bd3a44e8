// Unit tests for logger module initialization logic
// Tests focus on idempotent init and log file errors

use crate::error::LinkAppError;
use crate::logger::{LOG_FILE_NAME, initialize, open_log_file};

use std::path::PathBuf;

use serial_test::serial;

/// **VALUE**: Verifies that calling initialize() multiple times doesn't panic or fail.
///
/// **WHY THIS MATTERS**: fern installs a process-wide logger. A second install
/// would fail, so the guard must turn repeat calls into a warning.
///
/// **BUG THIS CATCHES**: Would catch if the Once or AtomicBool guards are removed.
#[test]
#[serial]
fn given_logger_initialized_when_called_again_then_returns_ok() {
    // GIVEN: A writable temporary directory
    let temp_dir = tempfile::tempdir().unwrap();

    // WHEN: Calling initialize twice
    let first = initialize(temp_dir.path());
    let second = initialize(temp_dir.path());

    // THEN: Both return Ok
    assert!(first.is_ok(), "First initialization should succeed");
    assert!(second.is_ok(), "Second initialization should be a no-op");
}

/// **VALUE**: An unusable log directory is reported, not a panic.
///
/// **BUG THIS CATCHES**: Would catch if `fern::log_file()` is unwrapped.
#[test]
fn given_invalid_log_dir_when_log_file_opened_then_returns_app_error() {
    // GIVEN: A path below a device node, which can never be a directory
    let invalid_dir = PathBuf::from("/dev/null/invalid-path");

    // WHEN
    let result = open_log_file(&invalid_dir);

    // THEN
    let err = result.unwrap_err();
    assert!(matches!(err, LinkAppError::App { .. }));
    assert!(err.to_string().contains(LOG_FILE_NAME));
}

#[test]
fn given_writable_dir_when_log_file_opened_then_file_exists() {
    let temp_dir = tempfile::tempdir().unwrap();

    open_log_file(temp_dir.path()).unwrap();

    assert!(temp_dir.path().join(LOG_FILE_NAME).is_file());
}
