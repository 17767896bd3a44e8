// Unit tests for line encoding and frame splitting

use crate::cipher::CipherState;
use crate::codec::{
    Frame, LineRead, MAX_LINE_LEN, decode_line, encode_line, read_line, split_frame,
};
use crate::error::session::SessionError;

const DERIVED_KEY: [u8; 16] = [
    187, 189, 41, 113, 159, 12, 93, 237, 75, 119, 195, 81, 33, 150, 239, 52,
];

/// **VALUE**: Pins the first keepalive line for a known session key.
///
/// **BUG THIS CATCHES**: Missing CRLF, URL-safe base64, or encrypting the
/// terminator along with the payload.
#[test]
fn given_known_session_key_when_encode_keepalive_then_matches_pinned_wire_line() {
    let mut tx = CipherState::primed(&DERIVED_KEY).unwrap();
    assert_eq!(encode_line(&mut tx, "MP-0 A"), "1dqy+GSs\r\n");
}

/// **VALUE**: Decoding advances the rx keystream line after line.
///
/// **WHY THIS MATTERS**: The relay encrypts every line it sends on one
/// continuous keystream. Both lines must decode in order.
#[test]
fn given_consecutive_lines_when_decoded_in_order_then_both_recover_plaintext() {
    // GIVEN
    let mut tx = CipherState::primed(&DERIVED_KEY).unwrap();
    let mut rx = CipherState::primed(&DERIVED_KEY).unwrap();
    let first = encode_line(&mut tx, "MP-0 c26,0,OK");
    let second = encode_line(&mut tx, "MP-0 Fv3.2.1");

    // WHEN
    let first_plain = decode_line(&mut rx, &first).unwrap();
    let second_plain = decode_line(&mut rx, &second).unwrap();

    // THEN
    assert_eq!(first, "1dqy+GSO+We5pXB7kQ==\r\n");
    assert_eq!(first_plain, "MP-0 c26,0,OK");
    assert_eq!(second_plain, "MP-0 Fv3.2.1");
}

/// **VALUE**: Skipping a line leaves the receiver unable to read the next one.
///
/// **WHY THIS MATTERS**: Demonstrates why every inbound line must go through
/// the rx cipher even when its content is ignored.
#[test]
fn given_skipped_line_when_decoding_next_then_plaintext_is_garbled() {
    let mut tx = CipherState::primed(&DERIVED_KEY).unwrap();
    let mut rx = CipherState::primed(&DERIVED_KEY).unwrap();
    let _skipped = encode_line(&mut tx, "MP-0 S87,M,...");
    let wanted = encode_line(&mut tx, "MP-0 c26,0,OK");

    let decoded = decode_line(&mut rx, &wanted).unwrap();

    assert_ne!(decoded, "MP-0 c26,0,OK");
}

#[test]
fn given_invalid_base64_when_decode_then_returns_desync_error() {
    let mut rx = CipherState::primed(&DERIVED_KEY).unwrap();
    let result = decode_line(&mut rx, "not base64 at all!\r\n");
    let error = result.unwrap_err();
    assert!(matches!(error, SessionError::Desync { .. }));
    assert!(error.is_connection_class());
}

#[test]
fn given_preamble_line_when_split_frame_then_extracts_tag_and_payload() {
    let frame = split_frame("MP-0 c26,0,OK").unwrap();
    assert_eq!(
        frame,
        Frame {
            tag: 'c',
            payload: "26,0,OK"
        }
    );

    let bare = split_frame("MP-0 a").unwrap();
    assert_eq!(bare.tag, 'a');
    assert_eq!(bare.payload, "");
}

/// **BUG THIS CATCHES**: Treating unrecognised lines as fatal, which would
/// drop the session on any stray relay chatter.
#[test]
fn given_line_without_preamble_or_tag_when_split_frame_then_returns_non_fatal_error() {
    for line in ["hello", "MP-0 ", "MP-1 Xfoo"] {
        let error = split_frame(line).unwrap_err();
        assert!(matches!(error, SessionError::ProtocolDecode { .. }));
        assert!(!error.is_connection_class());
    }
}

// ============================================
// BOUNDED LINE READS
// ============================================

#[tokio::test]
async fn given_terminated_lines_when_read_then_returns_each_then_closed() {
    let mut input: &[u8] = b"first\r\nsecond\r\n";
    let mut buffer = Vec::new();

    assert_eq!(read_line(&mut input, &mut buffer).await.unwrap(), LineRead::Line);
    assert_eq!(buffer, b"first\r\n");

    buffer.clear();
    assert_eq!(read_line(&mut input, &mut buffer).await.unwrap(), LineRead::Line);
    assert_eq!(buffer, b"second\r\n");

    buffer.clear();
    assert_eq!(read_line(&mut input, &mut buffer).await.unwrap(), LineRead::Closed);
    assert!(buffer.is_empty());
}

/// **VALUE**: A peer that never sends a newline cannot grow the buffer
/// without bound.
///
/// **BUG THIS CATCHES**: An unbounded `read_until` buffering a hostile or
/// broken relay's stream until memory runs out.
#[tokio::test]
async fn given_line_longer_than_limit_when_read_then_too_long_after_limit_bytes() {
    // GIVEN
    let flood = vec![b'A'; MAX_LINE_LEN * 3];
    let mut input: &[u8] = &flood;
    let mut buffer = Vec::new();

    // WHEN
    let read = read_line(&mut input, &mut buffer).await.unwrap();

    // THEN
    assert_eq!(read, LineRead::TooLong);
    assert_eq!(buffer.len(), MAX_LINE_LEN);
}

#[tokio::test]
async fn given_line_of_exactly_limit_when_read_then_accepted() {
    let mut line = vec![b'A'; MAX_LINE_LEN - 2];
    line.extend_from_slice(b"\r\n");
    let mut input: &[u8] = &line;
    let mut buffer = Vec::new();

    assert_eq!(read_line(&mut input, &mut buffer).await.unwrap(), LineRead::Line);
    assert_eq!(buffer.len(), MAX_LINE_LEN);
}
