//! Error taxonomy and per-version wire error codes.
//!
//! Synchronous API failures are [`Error`]. Peer misbehavior is never an
//! `Err`: it surfaces as `Event::ConnectionTerminated` with a
//! [`ErrorKind::ProtocolError`] code.

/// Errors returned synchronously from protocol operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The caller violated the API contract (submit on a retired stream,
    /// data after `end_stream`, headers while HTTP/1 is busy, ...).
    /// Connection state is unchanged.
    #[error("protocol misuse: {0}")]
    Misuse(String),

    /// No new stream can be allocated right now (HTTP/1 exchange in
    /// flight, GOAWAY seen, stream-id space exhausted).
    #[error("no stream can be opened on this connection right now")]
    NotAvailable,

    /// A wire-level failure detected synchronously, e.g. the peer
    /// negotiated an ALPN token no factory supports.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Transport-layer failure reported by the caller.
    #[error("transport: {0}")]
    Transport(String),

    /// Unexpected engine state.
    #[error("internal: {0}")]
    Internal(String),
}

/// Version-neutral reason for closing a stream or connection.
///
/// Engines translate kinds to the wire codes of their version via
/// [`ErrorCodes`]; callers never deal in raw codes. `Wire` carries a code
/// received from the peer that has no neutral equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Graceful, nothing went wrong.
    NoError,
    /// The peer violated our expectations.
    ProtocolError,
    /// Something went wrong on our side.
    InternalError,
    /// The stream is no longer wanted.
    Cancel,
    /// A CONNECT tunnel was reset or abnormally closed.
    ConnectError,
    /// A raw wire code outside the neutral set.
    Wire(u64),
}

/// Wire error codes for one HTTP version.
///
/// Each version expresses the same handful of conditions with different
/// numbers: HTTP/1 borrows status codes, HTTP/2 uses RFC 9113 section 7
/// codes, HTTP/3 the 0x1xx block from RFC 9114 section 8.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCodes {
    pub no_error: u64,
    pub protocol_error: u64,
    pub internal_error: u64,
    pub cancel: u64,
    pub connect_error: u64,
}

impl ErrorCodes {
    /// Translate a neutral kind into this version's wire code.
    pub const fn wire_code(&self, kind: ErrorKind) -> u64 {
        match kind {
            ErrorKind::NoError => self.no_error,
            ErrorKind::ProtocolError => self.protocol_error,
            ErrorKind::InternalError => self.internal_error,
            ErrorKind::Cancel => self.cancel,
            ErrorKind::ConnectError => self.connect_error,
            ErrorKind::Wire(code) => code,
        }
    }

    /// Translate a received wire code back into a neutral kind.
    pub const fn kind(&self, code: u64) -> ErrorKind {
        if code == self.no_error {
            ErrorKind::NoError
        } else if code == self.protocol_error {
            ErrorKind::ProtocolError
        } else if code == self.internal_error {
            ErrorKind::InternalError
        } else if code == self.cancel {
            ErrorKind::Cancel
        } else if code == self.connect_error {
            ErrorKind::ConnectError
        } else {
            ErrorKind::Wire(code)
        }
    }
}

/// HTTP/1 has no reset codes on the wire; status codes stand in.
pub const HTTP1_ERROR_CODES: ErrorCodes = ErrorCodes {
    no_error: 0,
    protocol_error: 400,
    internal_error: 500,
    cancel: 0,
    connect_error: 502,
};

/// HTTP/2 error codes (RFC 9113 section 7).
pub const HTTP2_ERROR_CODES: ErrorCodes = ErrorCodes {
    no_error: 0x0,
    protocol_error: 0x1,
    internal_error: 0x2,
    cancel: 0x8,
    connect_error: 0xa,
};

/// HTTP/3 error codes (RFC 9114 section 8.1).
pub const HTTP3_ERROR_CODES: ErrorCodes = ErrorCodes {
    no_error: 0x100,
    protocol_error: 0x101,
    internal_error: 0x102,
    cancel: 0x10c,
    connect_error: 0x10f,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_wire_code() {
        for codes in [HTTP1_ERROR_CODES, HTTP2_ERROR_CODES, HTTP3_ERROR_CODES] {
            for kind in [
                ErrorKind::NoError,
                ErrorKind::ProtocolError,
                ErrorKind::InternalError,
                ErrorKind::ConnectError,
            ] {
                assert_eq!(codes.kind(codes.wire_code(kind)), kind);
            }
        }
    }

    #[test]
    fn http1_cancel_aliases_no_error() {
        // HTTP/1 has no cancel primitive; both map to 0 and decode as NoError.
        assert_eq!(HTTP1_ERROR_CODES.wire_code(ErrorKind::Cancel), 0);
        assert_eq!(HTTP1_ERROR_CODES.kind(0), ErrorKind::NoError);
    }

    #[test]
    fn unknown_code_is_preserved() {
        let kind = HTTP2_ERROR_CODES.kind(0xb);
        assert_eq!(kind, ErrorKind::Wire(0xb));
        assert_eq!(HTTP2_ERROR_CODES.wire_code(kind), 0xb);
    }

    #[test]
    fn h3_cancel_is_request_cancelled() {
        assert_eq!(HTTP3_ERROR_CODES.wire_code(ErrorKind::Cancel), 0x10c);
    }
}
