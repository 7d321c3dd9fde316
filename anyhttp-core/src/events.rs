//! HTTP-level events emitted by every protocol engine.
//!
//! Events form a closed set so callers can match exhaustively. All stream
//! events carry the stream id; [`Event::ConnectionTerminated`] is terminal
//! for the whole connection.

use crate::error::ErrorKind;
use crate::headers::HeaderField;

/// Identifier of one HTTP stream (request/response exchange).
///
/// HTTP/1 connections use the single id 1. HTTP/2 ids are 31-bit with
/// client-initiated streams odd and server-initiated even. HTTP/3 inherits
/// the QUIC stream-id space (client bidirectional: 0, 4, 8, ...). Callers
/// treat the value as opaque and obtain fresh ids from
/// `HttpProtocol::get_available_stream_id`.
pub type StreamId = u64;

/// An HTTP event produced by a protocol engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The connection was terminated. No further events will follow.
    ConnectionTerminated {
        error_code: ErrorKind,
        message: Option<String>,
    },
    /// The peer sent GOAWAY: streams above `last_stream_id` will not be
    /// processed, but streams at or below it may still complete.
    GoawayReceived {
        last_stream_id: StreamId,
        error_code: ErrorKind,
    },
    /// A frame with HTTP headers was received.
    ///
    /// The list always contains the pseudo-headers for its direction, even
    /// on HTTP/1 where the engine synthesizes them from the request or
    /// status line.
    HeadersReceived {
        stream_id: StreamId,
        headers: Vec<HeaderField>,
        end_stream: bool,
    },
    /// A chunk of HTTP body data was received.
    DataReceived {
        stream_id: StreamId,
        data: Vec<u8>,
        end_stream: bool,
    },
    /// The peer reset one stream; the connection is unaffected.
    StreamResetReceived {
        stream_id: StreamId,
        error_code: ErrorKind,
    },
    /// We reset one stream, either on caller request or because the peer
    /// misbehaved on that stream.
    StreamResetSent {
        stream_id: StreamId,
        error_code: ErrorKind,
    },
}

impl Event {
    /// Stream id for per-stream events, `None` for connection-level ones.
    pub fn stream_id(&self) -> Option<StreamId> {
        match self {
            Event::HeadersReceived { stream_id, .. }
            | Event::DataReceived { stream_id, .. }
            | Event::StreamResetReceived { stream_id, .. }
            | Event::StreamResetSent { stream_id, .. } => Some(*stream_id),
            Event::ConnectionTerminated { .. } | Event::GoawayReceived { .. } => None,
        }
    }

    /// Whether this event closes the peer's sending side of its stream.
    pub fn ends_stream(&self) -> bool {
        matches!(
            self,
            Event::HeadersReceived {
                end_stream: true,
                ..
            } | Event::DataReceived {
                end_stream: true,
                ..
            }
        )
    }
}
