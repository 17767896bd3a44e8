use crate::session::SessionStatus;
use crate::session::status::StatusCell;

#[test]
fn given_statuses_when_flags_checked_then_match_connection_phase() {
    assert!(!SessionStatus::Disconnected.is_connected());
    assert!(!SessionStatus::Connecting.is_connected());
    assert!(SessionStatus::Authenticating.is_connected());
    assert!(!SessionStatus::Authenticating.is_authenticated());
    assert!(SessionStatus::Ready.is_connected());
    assert!(SessionStatus::Ready.is_authenticated());
    assert!(!SessionStatus::Dead.is_connected());
}

/// **VALUE**: Only a disconnected session may begin connecting.
///
/// **BUG THIS CATCHES**: Connecting over a dead session, which would leave
/// the old loops and socket alive next to the new ones.
#[test]
fn given_non_disconnected_status_when_begin_connect_then_rejected_with_current() {
    let cell = StatusCell::new();
    let generation = cell.begin_connect().unwrap();
    assert_eq!(cell.get(), SessionStatus::Connecting);

    assert_eq!(cell.begin_connect(), Err(SessionStatus::Connecting));

    assert!(cell.advance(generation, SessionStatus::Dead));
    assert_eq!(cell.begin_connect(), Err(SessionStatus::Dead));
}

#[test]
fn given_live_or_idle_status_when_mark_dead_then_only_live_transitions() {
    let cell = StatusCell::new();
    let generation = cell.invalidate();
    assert!(!cell.mark_dead(generation));
    assert_eq!(cell.get(), SessionStatus::Disconnected);

    let generation = cell.begin_connect().unwrap();
    assert!(cell.advance(generation, SessionStatus::Ready));
    assert!(cell.mark_dead(generation));
    assert_eq!(cell.get(), SessionStatus::Dead);
    assert!(!cell.mark_dead(generation));
}

/// **VALUE**: An attempt superseded by a disconnect can no longer move the
/// status, even after a newer attempt has started.
///
/// **BUG THIS CATCHES**: A handshake finishing after disconnect flipping a
/// newer connection to `Ready`, or a dying loop of an old connection marking
/// the new one `Dead`.
#[test]
fn given_superseded_generation_when_advanced_or_marked_dead_then_ignored() {
    // GIVEN
    let cell = StatusCell::new();
    let first = cell.begin_connect().unwrap();
    assert!(cell.advance(first, SessionStatus::Authenticating));

    let reset = cell.invalidate();
    assert!(cell.advance(reset, SessionStatus::Disconnected));
    let second = cell.begin_connect().unwrap();

    // WHEN
    let stale_ready = cell.advance(first, SessionStatus::Ready);
    let stale_dead = cell.mark_dead(first);

    // THEN
    assert!(!stale_ready);
    assert!(!stale_dead);
    assert_eq!(cell.get(), SessionStatus::Connecting);
    assert!(cell.advance(second, SessionStatus::Ready));
    assert_eq!(cell.get(), SessionStatus::Ready);
}

#[tokio::test]
async fn given_subscriber_when_status_changes_then_sees_latest_value() {
    let cell = StatusCell::new();
    let mut receiver = cell.subscribe();

    let generation = cell.begin_connect().unwrap();
    assert!(cell.advance(generation, SessionStatus::Ready));

    receiver.changed().await.unwrap();
    assert_eq!(*receiver.borrow(), SessionStatus::Ready);
    assert_eq!(SessionStatus::Ready.to_string(), "ready");
}
