//! `VehicleLink` reconnect and command behaviour against a mock relay.

use super::helpers::{MockRelay, WAIT, secret};

use link_core::{Command, SessionStatus, VehicleFamily, VehicleLink};

use std::time::Duration;

/// **VALUE**: The first command connects lazily and returns the reply.
#[tokio::test]
async fn given_fresh_link_when_execute_then_connects_and_returns_response() {
    // GIVEN
    let relay = MockRelay::start().await;
    let link = VehicleLink::new(relay.link_config(), secret());
    assert_eq!(link.status(), SessionStatus::Disconnected);

    // WHEN
    let relay_side = async {
        let mut peer = relay.accept_authenticated().await;
        let command = peer.answer_next_command("MP-0 c26,0").await;
        (peer, command)
    };
    let cmd = Command::climate_on(VehicleFamily::Standard);
    let (response, (_peer, command)) = tokio::join!(link.execute(&cmd), relay_side);

    // THEN
    assert_eq!(command, "MP-0 C26,1");
    let response = response.unwrap().unwrap();
    assert!(response.is_success());
    assert_eq!(link.status(), SessionStatus::Ready);

    link.shutdown().await;
    assert_eq!(link.status(), SessionStatus::Disconnected);
}

/// **VALUE**: A dropped relay connection is replaced on the next command.
///
/// **BUG THIS CATCHES**: Reusing a dead session, so every later command fails
/// until the process restarts.
#[tokio::test]
async fn given_relay_dropped_connection_when_execute_then_reconnects() {
    // GIVEN
    let relay = MockRelay::start().await;
    let link = VehicleLink::new(relay.link_config(), secret());
    let mut status = link.session().subscribe_status();

    let (connected, first_peer) =
        tokio::join!(link.ensure_connected(), relay.accept_authenticated());
    connected.unwrap();
    drop(first_peer);
    tokio::time::timeout(WAIT, status.wait_for(|current| *current == SessionStatus::Dead))
        .await
        .expect("Session never noticed the drop")
        .unwrap();

    // WHEN
    let relay_side = async {
        let mut peer = relay.accept_authenticated().await;
        let command = peer.answer_next_command("MP-0 c20,0").await;
        (peer, command)
    };
    let cmd = Command::lock();
    let (response, (_peer, command)) = tokio::join!(link.execute(&cmd), relay_side);

    // THEN
    assert_eq!(command, "MP-0 C20");
    assert_eq!(response.unwrap().unwrap().code, Some(20));
    assert_eq!(link.status(), SessionStatus::Ready);

    link.shutdown().await;
}

/// **VALUE**: Callers racing to connect share a single relay connection.
///
/// **BUG THIS CATCHES**: A second caller disconnecting the session while the
/// first is still authenticating, which opens a second socket and leaves the
/// first caller with a failed or orphaned connection.
#[tokio::test]
async fn given_concurrent_callers_when_ensure_connected_then_one_connection_serves_both() {
    // GIVEN
    let relay = MockRelay::start().await;
    let link = VehicleLink::new(relay.link_config(), secret());

    // WHEN
    let (first, second, _peer) = tokio::join!(
        link.ensure_connected(),
        link.ensure_connected(),
        relay.accept_authenticated()
    );

    // THEN
    first.unwrap();
    second.unwrap();
    assert_eq!(link.status(), SessionStatus::Ready);
    relay
        .assert_no_connection_within(Duration::from_millis(200))
        .await;

    link.shutdown().await;
}

#[tokio::test]
async fn given_unreachable_relay_when_ensure_connected_then_gives_up_with_error() {
    // GIVEN
    let relay = MockRelay::start().await;
    let mut config = relay.link_config();
    config.reconnect.max_elapsed = Duration::from_millis(300);
    drop(relay);
    let link = VehicleLink::new(config, secret());

    // WHEN
    let result = tokio::time::timeout(WAIT, link.ensure_connected())
        .await
        .expect("Reconnect loop did not give up");

    // THEN
    let error = result.unwrap_err();
    assert!(error.is_connection_class());
    assert!(!link.session().is_authenticated());
}

/// **VALUE**: A missing reply is `Ok(None)`, not an error, and the session
/// stays usable.
#[tokio::test]
async fn given_relay_never_replies_when_execute_then_none_and_session_stays_ready() {
    // GIVEN
    let relay = MockRelay::start().await;
    let mut config = relay.link_config();
    config.protocol.command_timeout = Duration::from_millis(100);
    let link = VehicleLink::new(config, secret());

    // WHEN
    let relay_side = async {
        let mut peer = relay.accept_authenticated().await;
        let command = peer.recv().await;
        (peer, command)
    };
    let cmd = Command::start_charge();
    let (response, (mut peer, command)) = tokio::join!(link.execute(&cmd), relay_side);

    // THEN
    assert_eq!(command.as_deref(), Some("MP-0 C11"));
    assert_eq!(response.unwrap(), None);
    assert_eq!(link.status(), SessionStatus::Ready);

    let cmd = Command::stop_charge();
    let (second, command) = tokio::join!(
        link.execute(&cmd),
        peer.answer_next_command("MP-0 c12,0")
    );
    assert_eq!(command, "MP-0 C12");
    assert!(second.unwrap().unwrap().is_success());

    link.shutdown().await;
}
