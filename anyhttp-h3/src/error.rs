//! HTTP/3 layer errors (RFC 9114 section 8.1, RFC 9204 section 6).
//!
//! Each variant is a connection error: the QUIC connection is closed with
//! the matching application error code and a terminal event is emitted.

/// A connection-fatal HTTP/3 or QPACK failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum H3Error {
    /// A frame arrived on a stream where it is not permitted, or a frame
    /// type reserved from HTTP/2 was seen.
    #[error("unexpected frame on this stream")]
    FrameUnexpected,

    /// A frame could not be parsed.
    #[error("malformed frame")]
    Frame,

    /// The control stream did not start with SETTINGS.
    #[error("missing SETTINGS on the control stream")]
    MissingSettings,

    /// A QPACK header block could not be decoded.
    #[error("QPACK decoding failed")]
    Qpack,

    /// The peer closed its control stream.
    #[error("critical stream closed")]
    ClosedCriticalStream,
}

impl H3Error {
    /// Application error code used on the QUIC CONNECTION_CLOSE frame.
    pub fn wire_code(&self) -> u64 {
        match self {
            H3Error::FrameUnexpected => 0x105,
            H3Error::Frame => 0x106,
            H3Error::MissingSettings => 0x10a,
            H3Error::Qpack => 0x200,
            H3Error::ClosedCriticalStream => 0x104,
        }
    }
}
