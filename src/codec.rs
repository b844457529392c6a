//! Text wire codec for bus frames.
//!
//! A frame carries three fields joined by [`DELIMITER`]:
//!
//! ```text
//! <source>/\<channel>/\<payload>
//! ```
//!
//! # Bounded tokenizing
//!
//! Decoding splits on the delimiter at most [`FRAME_FIELDS`] - 1 times. The
//! first two occurrences separate source and channel; every later occurrence
//! belongs to the payload and is kept verbatim. This is what lets multi-part
//! payloads built with [`join_parts`] travel inside a single frame:
//!
//! ```text
//! "Lobby/\chat/\alice/\hello"  →  ("Lobby", "chat", "alice/\hello")
//! ```
//!
//! Source and channel therefore must not contain the delimiter; identities
//! are validated at construction and the facade rejects such channels.

use crate::constants::{DELIMITER, FRAME_FIELDS};
use crate::error::{BusError, Result};

/// A decoded wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Name of the sending server (or the hub token).
    pub source: String,
    /// Application channel the payload belongs to.
    pub channel: String,
    /// Free-form text payload.
    pub payload: String,
}

impl Frame {
    /// Encode this frame into its wire text.
    pub fn encode(&self) -> String {
        encode(&self.source, &self.channel, &self.payload)
    }
}

/// Join the three frame fields into wire text.
pub fn encode(source: &str, channel: &str, payload: &str) -> String {
    let mut out = String::with_capacity(
        source.len() + channel.len() + payload.len() + 2 * DELIMITER.len(),
    );
    out.push_str(source);
    out.push_str(DELIMITER);
    out.push_str(channel);
    out.push_str(DELIMITER);
    out.push_str(payload);
    out
}

/// Split wire text into a [`Frame`].
///
/// # Errors
///
/// Returns [`BusError::MalformedFrame`] when the text holds fewer than two
/// delimiters.
pub fn decode(frame: &str) -> Result<Frame> {
    let mut parts = frame.splitn(FRAME_FIELDS, DELIMITER);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(source), Some(channel), Some(payload)) => Ok(Frame {
            source: source.to_owned(),
            channel: channel.to_owned(),
            payload: payload.to_owned(),
        }),
        _ => Err(BusError::MalformedFrame {
            frame: frame.to_owned(),
        }),
    }
}

/// Join payload pieces with the frame delimiter.
pub fn join_parts<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(DELIMITER)
}

/// Split a multi-part payload back into its pieces.
///
/// An empty payload yields a single empty piece, mirroring `join_parts` of a
/// one-element slice holding `""`.
pub fn split_parts(payload: &str) -> Vec<&str> {
    payload.split(DELIMITER).collect()
}

/// Whether `text` can be used as a frame header field.
pub fn is_header_safe(text: &str) -> bool {
    !text.contains(DELIMITER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        assert_eq!(encode("Lobby", "chat", "hi"), "Lobby/\\chat/\\hi");
    }

    #[test]
    fn test_decode_recovers_fields() {
        let frame = decode(&encode("Survival", "teleport", "alice 10 64 -3")).unwrap();
        assert_eq!(frame.source, "Survival");
        assert_eq!(frame.channel, "teleport");
        assert_eq!(frame.payload, "alice 10 64 -3");
    }

    #[test]
    fn test_decode_keeps_delimiters_inside_payload() {
        let payload = "alice/\\bob/\\carol";
        let frame = decode(&encode("HUB", "party", payload)).unwrap();
        assert_eq!(frame.channel, "party");
        assert_eq!(frame.payload, payload);
    }

    #[test]
    fn test_decode_allows_empty_fields() {
        let frame = decode("/\\/\\").unwrap();
        assert_eq!(frame.source, "");
        assert_eq!(frame.channel, "");
        assert_eq!(frame.payload, "");
    }

    #[test]
    fn test_decode_rejects_missing_fields() {
        for bad in ["", "Lobby", "Lobby/\\chat", "Lobby/chat\\hi"] {
            match decode(bad) {
                Err(BusError::MalformedFrame { frame }) => assert_eq!(frame, bad),
                other => panic!("expected MalformedFrame for {bad:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_lone_slash_or_backslash_is_not_a_delimiter() {
        let frame = decode("a/\\b/\\c/d\\e").unwrap();
        assert_eq!(frame.payload, "c/d\\e");
    }

    #[test]
    fn test_join_and_split_parts() {
        let joined = join_parts(&["alice", "kick", "spamming chat"]);
        assert_eq!(joined, "alice/\\kick/\\spamming chat");
        assert_eq!(split_parts(&joined), vec!["alice", "kick", "spamming chat"]);
    }

    #[test]
    fn test_header_safety() {
        assert!(is_header_safe("chat"));
        assert!(!is_header_safe("chat/\\x"));
    }
}
