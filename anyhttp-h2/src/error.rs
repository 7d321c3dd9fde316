//! Errors raised while decoding or validating HTTP/2 input.
//!
//! Every variant corresponds to a connection error: when one is raised the
//! engine sends GOAWAY with the matching wire code and emits a terminal
//! event. Caller misuse never produces an `H2Error`; that path returns
//! `anyhttp_core::Error` synchronously.

/// A connection-fatal HTTP/2 decoding or validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum H2Error {
    /// The peer violated framing or state rules.
    Protocol(String),
    /// A frame had an invalid or oversized length.
    FrameSize,
    /// An HPACK header block could not be decoded.
    Compression,
    /// A flow-control window was violated.
    FlowControl,
}

impl H2Error {
    /// GOAWAY error code for this failure (RFC 9113 section 7).
    pub fn wire_code(&self) -> u32 {
        match self {
            H2Error::Protocol(_) => 0x1,
            H2Error::FrameSize => 0x6,
            H2Error::Compression => 0x9,
            H2Error::FlowControl => 0x3,
        }
    }
}

impl std::fmt::Display for H2Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            H2Error::Protocol(message) => write!(f, "protocol error: {message}"),
            H2Error::FrameSize => write!(f, "frame size error"),
            H2Error::Compression => write!(f, "HPACK compression error"),
            H2Error::FlowControl => write!(f, "flow control error"),
        }
    }
}

impl std::error::Error for H2Error {}
