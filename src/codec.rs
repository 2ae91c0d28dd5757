//! Wire codec: parsing and rendering of the `VERB[ PAYLOAD]` text protocol.
//!
//! One WebSocket text frame carries exactly one line. There is no framing
//! beyond what the transport already gives us, so this module is pure
//! string handling with no I/O of its own.

use std::fmt;

use thiserror::Error;

use crate::room::{RoomCode, SessionState};

/// The verbs recognized on the wire, in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    WaitingForConnectionCode,
    State,
    Connection,
    ConnectionResponse,
    StartCall,
    Offer,
    Answer,
    Ice,
}

impl Verb {
    fn as_str(self) -> &'static str {
        match self {
            Self::WaitingForConnectionCode => "WAITING_FOR_CONNECTION_CODE",
            Self::State => "STATE",
            Self::Connection => "CONNECTION",
            Self::ConnectionResponse => "CONNECTION_RESPONSE",
            Self::StartCall => "START_CALL",
            Self::Offer => "OFFER",
            Self::Answer => "ANSWER",
            Self::Ice => "ICE",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "WAITING_FOR_CONNECTION_CODE" => Some(Self::WaitingForConnectionCode),
            "STATE" => Some(Self::State),
            "CONNECTION" => Some(Self::Connection),
            "CONNECTION_RESPONSE" => Some(Self::ConnectionResponse),
            "START_CALL" => Some(Self::StartCall),
            "OFFER" => Some(Self::Offer),
            "ANSWER" => Some(Self::Answer),
            "ICE" => Some(Self::Ice),
            _ => None,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub verb: Verb,
    pub payload: String,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unrecognized verb {0:?}")]
    UnknownVerb(String),
}

/// Parse one wire line into a verb and payload.
///
/// The payload is everything after the first run of whitespace following
/// the verb token, with leading whitespace stripped; trailing whitespace is
/// left untouched since SDP/ICE payloads are opaque blobs. A verb with no
/// following whitespace has an empty payload.
pub fn parse(line: &str) -> Result<Message, CodecError> {
    let (token, rest) = match line.find(char::is_whitespace) {
        Some(idx) => (&line[..idx], line[idx..].trim_start()),
        None => (line, ""),
    };
    let verb = Verb::from_token(token).ok_or_else(|| CodecError::UnknownVerb(token.to_string()))?;
    Ok(Message {
        verb,
        payload: rest.to_string(),
    })
}

fn format(verb: Verb, payload: &str) -> String {
    if payload.is_empty() {
        verb.to_string()
    } else {
        format!("{verb} {payload}")
    }
}

/// A server-to-peer line, as a typed value rather than a hand-assembled
/// string at every call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    WaitingForConnectionCode,
    State(SessionState),
    Connected(RoomCode),
    RoomFull,
    StartCall,
    Offer(String),
    Answer(String),
    Ice(String),
}

impl Outbound {
    pub fn render(&self) -> String {
        match self {
            Self::WaitingForConnectionCode => format(Verb::WaitingForConnectionCode, ""),
            Self::State(state) => format(Verb::State, state.as_str()),
            Self::Connected(code) => format(Verb::ConnectionResponse, &format!("CONNECTED {code}")),
            Self::RoomFull => format(Verb::ConnectionResponse, "ROOM_FULL"),
            Self::StartCall => format(Verb::StartCall, ""),
            Self::Offer(sdp) => format(Verb::Offer, sdp),
            Self::Answer(sdp) => format(Verb::Answer, sdp),
            Self::Ice(candidate) => format(Verb::Ice, candidate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_verb_with_payload() {
        let msg = parse("CONNECTION ABCD23").unwrap();
        assert_eq!(msg.verb, Verb::Connection);
        assert_eq!(msg.payload, "ABCD23");
    }

    #[test]
    fn parses_verb_without_payload() {
        let msg = parse("START_CALL").unwrap();
        assert_eq!(msg.verb, Verb::StartCall);
        assert_eq!(msg.payload, "");
    }

    #[test]
    fn trailing_whitespace_in_payload_is_preserved() {
        let msg = parse("OFFER v=0\r\n").unwrap();
        assert_eq!(msg.payload, "v=0\r\n");
    }

    #[test]
    fn extra_leading_whitespace_before_payload_is_stripped() {
        let msg = parse("ICE    candidate:1 1 UDP").unwrap();
        assert_eq!(msg.payload, "candidate:1 1 UDP");
    }

    #[test]
    fn unknown_verb_is_malformed() {
        let err = parse("FOOBAR hello").unwrap_err();
        assert!(matches!(err, CodecError::UnknownVerb(t) if t == "FOOBAR"));
    }

    #[test]
    fn empty_line_is_malformed() {
        assert!(parse("").is_err());
    }

    #[test]
    fn format_roundtrips_with_parse() {
        let line = Outbound::Offer("v=0".into()).render();
        let msg = parse(&line).unwrap();
        assert_eq!(msg.verb, Verb::Offer);
        assert_eq!(msg.payload, "v=0");
    }

    #[test]
    fn format_omits_space_for_empty_payload() {
        assert_eq!(Outbound::StartCall.render(), "START_CALL");
        assert_eq!(Outbound::WaitingForConnectionCode.render(), "WAITING_FOR_CONNECTION_CODE");
    }

    #[test]
    fn connected_response_includes_code() {
        let code = RoomCode::new("ABCD23");
        assert_eq!(
            Outbound::Connected(code).render(),
            "CONNECTION_RESPONSE CONNECTED ABCD23"
        );
    }
}
