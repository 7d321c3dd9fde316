//! Per-request-stream bookkeeping.

use quinn_proto::StreamId as QuicStreamId;

/// State of one request/response stream.
///
/// A client allocates the entry before the QUIC stream exists on the
/// wire; `quic_id` stays `None` until the handshake allows opening it.
#[derive(Debug)]
pub(crate) struct RequestStream {
    /// Wire-level stream, once opened or accepted.
    pub quic_id: Option<QuicStreamId>,

    /// Frames waiting to be written (flow control or handshake pending).
    pub send_buf: Vec<u8>,
    /// FIN once `send_buf` drains.
    pub fin_pending: bool,
    /// We finished or reset our sending side.
    pub send_closed: bool,
    /// HEADERS were submitted; DATA may follow.
    pub headers_sent: bool,

    /// Partial frame data accumulated between reads.
    pub recv_buf: Vec<u8>,
    /// The peer's FIN arrived (possibly with frames still buffered).
    pub fin_received: bool,
    /// The first header block was surfaced.
    pub headers_received: bool,
    /// An `end_stream` event was emitted for the receive side.
    pub recv_closed: bool,

    /// The stream was reset in either direction.
    pub reset: bool,
}

impl RequestStream {
    pub fn opened(quic_id: QuicStreamId) -> Self {
        Self {
            quic_id: Some(quic_id),
            ..Self::pending()
        }
    }

    /// Entry for a client stream not yet opened on the wire.
    pub fn pending() -> Self {
        Self {
            quic_id: None,
            send_buf: Vec::new(),
            fin_pending: false,
            send_closed: false,
            headers_sent: false,
            recv_buf: Vec::new(),
            fin_received: false,
            headers_received: false,
            recv_closed: false,
            reset: false,
        }
    }

    /// Whether the caller may still submit frames on this stream.
    pub fn can_send(&self) -> bool {
        !self.send_closed && !self.reset
    }
}
