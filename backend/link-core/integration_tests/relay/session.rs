//! Session lifecycle against a mock relay over local TCP.

use super::helpers::{
    BreakableStream, MockRelay, RelayPeer, SERVER_TOKEN, TEST_VEHICLE, WAIT, in_memory_settings,
    secret,
};

use link_core::codec::MAX_LINE_LEN;
use link_core::error::SessionError;
use link_core::handshake::{DigestPolicy, token_digest};
use link_core::telemetry::TelemetryValue;
use link_core::{Session, SessionSettings, SessionStatus};

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

async fn wait_for_status(session: &Session, wanted: SessionStatus) {
    let mut status = session.subscribe_status();
    tokio::time::timeout(WAIT, status.wait_for(|current| *current == wanted))
        .await
        .expect("Timed out waiting for session status")
        .expect("Status channel closed");
}

async fn ready_session(relay: &MockRelay, settings: SessionSettings) -> (Session, RelayPeer) {
    let session = Session::new(settings);
    let (connected, peer) = tokio::join!(session.connect(), relay.accept_authenticated());
    connected.expect("Session failed to connect");
    session
        .start_background_loops()
        .await
        .expect("Failed to start loops");
    (session, peer)
}

// ============================================
// CONNECT AND HANDSHAKE
// ============================================

/// **VALUE**: A full connect reaches `Ready` with a verifiable client hello.
///
/// **WHY THIS MATTERS**: This is the only path from the outside world into an
/// authenticated session.
#[tokio::test]
async fn given_mock_relay_when_connect_then_session_is_ready_and_hello_verifies() {
    // GIVEN
    let relay = MockRelay::start().await;
    let session = Session::new(relay.settings());
    assert_eq!(session.status(), SessionStatus::Disconnected);

    // WHEN
    let (connected, peer) = tokio::join!(session.connect(), relay.accept_authenticated());

    // THEN
    connected.unwrap();
    assert_eq!(session.status(), SessionStatus::Ready);
    assert!(session.is_connected());
    assert!(session.is_authenticated());
    assert_eq!(peer.hello.unwrap().vehicle_id, TEST_VEHICLE);

    session.disconnect().await;
}

/// **BUG THIS CATCHES**: A rejected login leaving the session half-open.
#[tokio::test]
async fn given_relay_rejects_login_when_connect_then_handshake_error_and_dead() {
    // GIVEN
    let relay = MockRelay::start().await;
    let session = Session::new(relay.settings());

    // WHEN
    let relay_side = async {
        let mut peer = relay.accept().await;
        peer.read_hello().await;
        peer.write_raw("MP-S 1 rejected\r\n").await;
        peer
    };
    let (connected, _peer) = tokio::join!(session.connect(), relay_side);

    // THEN
    assert!(matches!(connected, Err(SessionError::Handshake { .. })));
    assert_eq!(session.status(), SessionStatus::Dead);
}

/// **VALUE**: Reconnecting requires an explicit disconnect.
#[tokio::test]
async fn given_dead_session_when_connect_without_disconnect_then_rejected() {
    let relay = MockRelay::start().await;
    let session = Session::new(relay.settings());

    let relay_side = async {
        let mut peer = relay.accept().await;
        peer.read_hello().await;
        peer.write_raw("garbage\r\n").await;
        peer
    };
    let (first, _peer) = tokio::join!(session.connect(), relay_side);
    assert!(first.is_err());

    let second = session.connect().await;
    assert!(matches!(second, Err(SessionError::Connection { .. })));
    assert_eq!(session.status(), SessionStatus::Dead);

    session.disconnect().await;
    assert_eq!(session.status(), SessionStatus::Disconnected);

    let (third, _peer) = tokio::join!(session.connect(), relay.accept_authenticated());
    third.unwrap();
    session.disconnect().await;
}

#[tokio::test]
async fn given_wrong_server_digest_when_enforced_then_connect_fails() {
    let relay = MockRelay::start().await;
    let session = Session::new(relay.settings().with_digest_policy(DigestPolicy::Enforce));

    let relay_side = async {
        let mut peer = relay.accept().await;
        peer.read_hello().await;
        peer.write_raw("MP-S 0 SomeServerToken bogus==\r\n").await;
        peer
    };
    let (connected, _peer) = tokio::join!(session.connect(), relay_side);

    assert!(matches!(connected, Err(SessionError::Handshake { .. })));
}

#[tokio::test]
async fn given_nothing_listening_when_connect_then_connection_error_and_dead() {
    let relay = MockRelay::start().await;
    let settings = relay.settings();
    drop(relay);

    let session = Session::new(settings);
    let result = session.connect().await;

    assert!(matches!(result, Err(SessionError::Connection { .. })));
    assert_eq!(session.status(), SessionStatus::Dead);
}

/// **VALUE**: Sessions run over any caller-supplied byte stream.
#[tokio::test]
async fn given_in_memory_stream_when_connect_with_stream_then_commands_work() {
    // GIVEN
    let (client, server) = tokio::io::duplex(8192);
    let session = Session::new(in_memory_settings());
    let mut peer = RelayPeer::new(Box::new(server));

    // WHEN
    let (connected, ()) = tokio::join!(
        session.connect_with_stream(Box::new(client)),
        peer.complete_handshake()
    );
    connected.unwrap();
    session.start_background_loops().await.unwrap();

    let (response, command) = tokio::join!(
        session.execute("6", Duration::from_secs(2)),
        peer.answer_next_command("MP-0 c6,0")
    );

    // THEN
    assert_eq!(command, "MP-0 C6");
    let response = response.unwrap().unwrap();
    assert_eq!(response.code, Some(6));
    assert!(response.is_success());

    session.disconnect().await;
}

/// **VALUE**: A disconnect during the handshake abandons that attempt for
/// good, and the next connect owns the session alone.
///
/// **BUG THIS CATCHES**: The late handshake installing its stream over the
/// newer connection, leaking one socket and leaving the session on the wrong
/// keystream.
#[tokio::test]
async fn given_disconnect_during_handshake_when_reconnected_then_late_handshake_is_discarded() {
    // GIVEN
    let session = Arc::new(Session::new(in_memory_settings()));
    let (first_client, first_server) = tokio::io::duplex(8192);
    let mut first_peer = RelayPeer::new(Box::new(first_server));

    let first_attempt = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.connect_with_stream(Box::new(first_client)).await })
    };
    first_peer.read_hello().await;
    assert_eq!(session.status(), SessionStatus::Authenticating);

    // WHEN
    session.disconnect().await;
    assert_eq!(session.status(), SessionStatus::Disconnected);

    let (second_client, second_server) = tokio::io::duplex(8192);
    let mut second_peer = RelayPeer::new(Box::new(second_server));
    let (connected, ()) = tokio::join!(
        session.connect_with_stream(Box::new(second_client)),
        second_peer.complete_handshake()
    );
    connected.unwrap();

    let server_digest = token_digest(&secret(), SERVER_TOKEN).unwrap();
    first_peer
        .write_raw(&format!("MP-S 0 {SERVER_TOKEN} {server_digest}\r\n"))
        .await;
    let late = first_attempt.await.unwrap();

    // THEN
    assert!(matches!(late, Err(SessionError::Connection { .. })));
    assert_eq!(session.status(), SessionStatus::Ready);
    assert_eq!(first_peer.read_raw_line().await, None);

    session.start_background_loops().await.unwrap();
    let (response, command) = tokio::join!(
        session.execute("6", Duration::from_secs(2)),
        second_peer.answer_next_command("MP-0 c6,0")
    );
    assert_eq!(command, "MP-0 C6");
    assert!(response.unwrap().unwrap().is_success());

    session.disconnect().await;
    assert_eq!(second_peer.read_raw_line().await, None);
}

// ============================================
// PRECONDITIONS
// ============================================

#[tokio::test]
async fn given_unconnected_session_when_start_loops_or_send_then_not_authenticated() {
    let relay = MockRelay::start().await;
    let session = Session::new(relay.settings());

    assert!(matches!(
        session.start_background_loops().await,
        Err(SessionError::NotAuthenticated { .. })
    ));
    assert!(matches!(
        session.send_command("26,1").await,
        Err(SessionError::NotAuthenticated { .. })
    ));
}

#[tokio::test]
async fn given_running_loops_when_started_again_then_no_op() {
    let relay = MockRelay::start().await;
    let (session, _peer) = ready_session(&relay, relay.settings()).await;

    session.start_background_loops().await.unwrap();
    assert_eq!(session.status(), SessionStatus::Ready);

    session.disconnect().await;
}

// ============================================
// COMMANDS AND TELEMETRY
// ============================================

/// **VALUE**: A command goes out with the `MP-0 C` prefix and its response
/// comes back through the dispatcher.
#[tokio::test]
async fn given_ready_session_when_execute_then_returns_correlated_response() {
    // GIVEN
    let relay = MockRelay::start().await;
    let (session, mut peer) = ready_session(&relay, relay.settings()).await;

    // WHEN
    let (response, command) = tokio::join!(
        session.execute("26,1", Duration::from_secs(2)),
        peer.answer_next_command("MP-0 c26,0,OK")
    );

    // THEN
    assert_eq!(command, "MP-0 C26,1");
    let response = response.unwrap().unwrap();
    assert_eq!(response.code, Some(26));
    assert_eq!(response.result, Some(0));
    assert_eq!(response.message, "OK");

    session.disconnect().await;
}

/// **VALUE**: Unrecognised and blank lines do not break the keystream.
///
/// **BUG THIS CATCHES**: Skipping the rx cipher for ignored lines, after which
/// every later response decodes as garbage.
#[tokio::test]
async fn given_ignored_and_blank_lines_when_command_follows_then_response_still_decodes() {
    // GIVEN
    let relay = MockRelay::start().await;
    let (session, mut peer) = ready_session(&relay, relay.settings()).await;

    // WHEN
    let pending = session.send_command("11").await.unwrap();
    let command = peer.recv().await.unwrap();
    peer.send("MP-0 S87,M,32,...").await;
    peer.write_raw("\r\n").await;
    peer.send("not a protocol line").await;
    peer.send("MP-0 Z0").await;
    peer.send("MP-0 c11,1,no cable").await;

    // THEN
    assert_eq!(command, "MP-0 C11");
    let response = pending.wait_for_response(Duration::from_secs(2)).await.unwrap();
    assert_eq!(response.result, Some(1));
    assert_eq!(response.message, "no cable");
    assert!(!response.is_success());
    assert_eq!(session.status(), SessionStatus::Ready);

    session.disconnect().await;
}

#[tokio::test]
async fn given_firmware_and_environment_messages_when_received_then_telemetry_updates() {
    // GIVEN
    let relay = MockRelay::start().await;
    let (session, mut peer) = ready_session(&relay, relay.settings()).await;
    let telemetry = session.telemetry();
    let mut environment = vec!["0"; 17];
    environment.push("128");

    // WHEN
    peer.send("MP-0 Fv3.2.1,1FADP3,-70,1,Tesla,,,,ESP32-v1,4G").await;
    peer.send(&format!("MP-0 D{}", environment.join(","))).await;

    // THEN
    tokio::time::timeout(WAIT, async {
        while telemetry.get("hvac").await.is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Telemetry never updated");

    assert_eq!(
        telemetry.get("m_firmware").await,
        Some(TelemetryValue::Text("v3.2.1".into()))
    );
    assert_eq!(telemetry.get("hvac").await, Some(TelemetryValue::Flag(true)));

    session.disconnect().await;
}

/// **VALUE**: A second command waits until the first one is resolved.
///
/// **BUG THIS CATCHES**: Two outstanding commands sharing the single response
/// slot, so one caller receives the other's answer.
#[tokio::test]
async fn given_outstanding_command_when_second_sent_then_blocks_until_first_resolves() {
    // GIVEN
    let relay = MockRelay::start().await;
    let (session, mut peer) = ready_session(&relay, relay.settings()).await;
    let session = Arc::new(session);

    let first = session.send_command("20").await.unwrap();
    assert_eq!(peer.recv().await.unwrap(), "MP-0 C20");

    // WHEN
    let mut second = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.execute("22", Duration::from_secs(2)).await })
    };

    // THEN
    assert!(
        tokio::time::timeout(Duration::from_millis(150), &mut second)
            .await
            .is_err(),
        "second command must wait for the first"
    );

    peer.send("MP-0 c20,0").await;
    let first_response = first.wait_for_response(Duration::from_secs(2)).await.unwrap();
    assert_eq!(first_response.code, Some(20));

    let second_command = peer.answer_next_command("MP-0 c22,0").await;
    assert_eq!(second_command, "MP-0 C22");
    let second_response = second.await.unwrap().unwrap().unwrap();
    assert_eq!(second_response.code, Some(22));

    session.disconnect().await;
}

#[tokio::test]
async fn given_no_reply_when_execute_then_returns_none_and_session_stays_ready() {
    let relay = MockRelay::start().await;
    let (session, mut peer) = ready_session(&relay, relay.settings()).await;

    let (response, command) = tokio::join!(
        session.execute("18", Duration::from_millis(100)),
        peer.recv()
    );

    assert_eq!(command.as_deref(), Some("MP-0 C18"));
    assert_eq!(response.unwrap(), None);
    assert_eq!(session.status(), SessionStatus::Ready);

    session.disconnect().await;
}

// ============================================
// FAILURE AND SHUTDOWN
// ============================================

/// **VALUE**: EOF marks the session dead and releases a waiting caller.
///
/// **WHY THIS MATTERS**: Callers must learn about a dropped relay promptly,
/// not after their full command timeout.
#[tokio::test]
async fn given_pending_command_when_relay_closes_then_dead_and_waiter_returns_none() {
    // GIVEN
    let relay = MockRelay::start().await;
    let (session, mut peer) = ready_session(&relay, relay.settings()).await;
    let pending = session.send_command("25").await.unwrap();
    peer.recv().await.unwrap();

    // WHEN
    drop(peer);
    let started = std::time::Instant::now();
    let response = pending.wait_for_response(Duration::from_secs(30)).await;

    // THEN
    assert_eq!(response, None);
    assert!(started.elapsed() < Duration::from_secs(5));
    wait_for_status(&session, SessionStatus::Dead).await;
    assert!(matches!(
        session.send_command("25").await,
        Err(SessionError::Connection { .. })
    ));

    session.disconnect().await;
    assert_eq!(session.status(), SessionStatus::Disconnected);
}

#[tokio::test]
async fn given_undecodable_line_when_received_then_session_is_dead() {
    let relay = MockRelay::start().await;
    let (session, mut peer) = ready_session(&relay, relay.settings()).await;

    peer.write_raw("@@@ not base64 @@@\r\n").await;

    wait_for_status(&session, SessionStatus::Dead).await;
    session.disconnect().await;
}

/// **VALUE**: Keepalives go out on the configured interval and decode.
#[tokio::test]
async fn given_short_keepalive_interval_when_waiting_then_relay_receives_keepalives() {
    let relay = MockRelay::start().await;
    let settings = relay.settings().with_keepalive_interval(Duration::from_millis(50));
    let (session, mut peer) = ready_session(&relay, settings).await;

    assert_eq!(peer.recv().await.as_deref(), Some("MP-0 A"));
    assert_eq!(peer.recv().await.as_deref(), Some("MP-0 A"));

    session.disconnect().await;
}

/// **VALUE**: Keepalive and command writes share one keystream in order.
///
/// **BUG THIS CATCHES**: Concurrent writers interleaving tx cipher use.
#[tokio::test]
async fn given_keepalives_running_when_commands_sent_then_relay_decodes_everything() {
    let relay = MockRelay::start().await;
    let settings = relay.settings().with_keepalive_interval(Duration::from_millis(5));
    let (session, mut peer) = ready_session(&relay, settings).await;

    let mut commands_seen = 0;
    for code in ["6", "1", "3"] {
        let pending = session.send_command(code).await.unwrap();
        loop {
            let line = peer.recv().await.unwrap();
            if line == "MP-0 A" {
                continue;
            }
            assert_eq!(line, format!("MP-0 C{code}"));
            commands_seen += 1;
            break;
        }
        peer.send(&format!("MP-0 c{code},0")).await;
        assert!(pending.wait_for_response(Duration::from_secs(2)).await.is_some());
    }

    assert_eq!(commands_seen, 3);
    session.disconnect().await;
}

/// **VALUE**: A relay line that never ends kills the session once it passes
/// the line limit.
///
/// **BUG THIS CATCHES**: The dispatcher buffering an endless line until the
/// process runs out of memory.
#[tokio::test]
async fn given_line_longer_than_limit_when_received_then_session_is_dead() {
    let relay = MockRelay::start().await;
    let (session, mut peer) = ready_session(&relay, relay.settings()).await;

    peer.write_raw(&"A".repeat(MAX_LINE_LEN + 100)).await;

    wait_for_status(&session, SessionStatus::Dead).await;
    session.disconnect().await;
}

/// **VALUE**: A command write that fails kills the session and reports a
/// connection error.
#[tokio::test]
async fn given_broken_write_side_when_send_command_then_connection_error_and_dead() {
    // GIVEN
    let (client, broken, server) = BreakableStream::pair();
    let session = Session::new(in_memory_settings());
    let mut peer = RelayPeer::new(Box::new(server));
    let (connected, ()) = tokio::join!(
        session.connect_with_stream(Box::new(client)),
        peer.complete_handshake()
    );
    connected.unwrap();
    session.start_background_loops().await.unwrap();

    // WHEN
    broken.store(true, Ordering::SeqCst);
    let result = session.send_command("6").await;

    // THEN
    assert!(matches!(result, Err(SessionError::Connection { .. })));
    assert_eq!(session.status(), SessionStatus::Dead);

    session.disconnect().await;
}

/// **VALUE**: A keepalive that cannot be written kills the session even
/// while the relay keeps the read side open.
#[tokio::test]
async fn given_broken_write_side_when_keepalive_due_then_session_is_dead() {
    // GIVEN
    let (client, broken, server) = BreakableStream::pair();
    let session =
        Session::new(in_memory_settings().with_keepalive_interval(Duration::from_millis(50)));
    let mut peer = RelayPeer::new(Box::new(server));
    let (connected, ()) = tokio::join!(
        session.connect_with_stream(Box::new(client)),
        peer.complete_handshake()
    );
    connected.unwrap();
    session.start_background_loops().await.unwrap();

    // WHEN
    broken.store(true, Ordering::SeqCst);

    // THEN
    wait_for_status(&session, SessionStatus::Dead).await;
    assert!(matches!(
        session.send_command("6").await,
        Err(SessionError::Connection { .. })
    ));

    session.disconnect().await;
    drop(peer);
}

/// **VALUE**: A caller giving up mid-write does not corrupt the stream.
///
/// **BUG THIS CATCHES**: Dropping a half-written command after the tx
/// keystream already advanced, so the relay decodes every later line as
/// garbage while the session still reports `Ready`.
#[tokio::test]
async fn given_command_write_abandoned_by_caller_when_next_command_sent_then_relay_decodes_both() {
    // GIVEN
    let (client, server) = tokio::io::duplex(64);
    let session = Session::new(in_memory_settings());
    let mut peer = RelayPeer::new(Box::new(server));
    let (connected, ()) = tokio::join!(
        session.connect_with_stream(Box::new(client)),
        peer.complete_handshake()
    );
    connected.unwrap();
    let long_text = format!("7,{}", "x".repeat(400));

    // WHEN
    let abandoned =
        tokio::time::timeout(Duration::from_millis(100), session.send_command(&long_text)).await;
    assert!(abandoned.is_err(), "write should stall while the relay is not reading");

    // THEN
    assert_eq!(session.status(), SessionStatus::Ready);
    assert_eq!(peer.recv().await, Some(format!("MP-0 C{long_text}")));

    let (sent, next) = tokio::join!(session.send_command("6"), peer.recv());
    sent.unwrap();
    assert_eq!(next.as_deref(), Some("MP-0 C6"));

    session.disconnect().await;
}

#[tokio::test]
async fn given_ready_session_when_disconnect_twice_then_idempotent_and_peer_sees_eof() {
    // GIVEN
    let relay = MockRelay::start().await;
    let (session, mut peer) = ready_session(&relay, relay.settings()).await;

    // WHEN
    session.disconnect().await;
    session.disconnect().await;

    // THEN
    assert_eq!(session.status(), SessionStatus::Disconnected);
    assert!(!session.is_connected());
    assert_eq!(peer.read_raw_line().await, None);
    assert!(matches!(
        session.send_command("26,0").await,
        Err(SessionError::NotAuthenticated { .. })
    ));
}
