//! Per-stream state (RFC 9113 section 5.1).

use crate::window::Window;

/// Lifecycle of one HTTP/2 stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamState {
    Open,
    /// We sent END_STREAM; nothing more goes out.
    HalfClosedLocal,
    /// Peer sent END_STREAM; nothing more comes in.
    HalfClosedRemote,
    Closed,
}

/// State and flow-control bookkeeping for one stream.
///
/// Closed streams stay in the connection's map so retired ids keep being
/// rejected.
#[derive(Debug)]
pub(crate) struct Stream {
    pub state: StreamState,
    pub recv_window: Window,
    pub send_window: Window,
    /// Partial header block while HEADERS/CONTINUATION frames accumulate.
    pub fragments: Vec<u8>,
    /// END_STREAM flag of the HEADERS frame that started `fragments`.
    pub fragments_end_stream: bool,
    /// The first header block was already surfaced.
    pub headers_received: bool,
}

impl Stream {
    pub fn new(recv_window: i64, send_window: i64) -> Self {
        Self {
            state: StreamState::Open,
            recv_window: Window::new(recv_window),
            send_window: Window::new(send_window),
            fragments: Vec::new(),
            fragments_end_stream: false,
            headers_received: false,
        }
    }

    /// Whether we may still send on this stream.
    pub fn can_send(&self) -> bool {
        matches!(self.state, StreamState::Open | StreamState::HalfClosedRemote)
    }

    /// Whether the peer may still send on this stream.
    pub fn can_recv(&self) -> bool {
        matches!(self.state, StreamState::Open | StreamState::HalfClosedLocal)
    }

    /// Record that we sent END_STREAM.
    pub fn close_local(&mut self) {
        self.state = match self.state {
            StreamState::HalfClosedRemote => StreamState::Closed,
            _ => StreamState::HalfClosedLocal,
        };
    }

    /// Record that the peer sent END_STREAM.
    pub fn close_remote(&mut self) {
        self.state = match self.state {
            StreamState::HalfClosedLocal => StreamState::Closed,
            _ => StreamState::HalfClosedRemote,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_close_transitions() {
        let mut stream = Stream::new(65_535, 65_535);
        assert!(stream.can_send());
        assert!(stream.can_recv());

        stream.close_local();
        assert_eq!(stream.state, StreamState::HalfClosedLocal);
        assert!(!stream.can_send());
        assert!(stream.can_recv());

        stream.close_remote();
        assert_eq!(stream.state, StreamState::Closed);
        assert!(!stream.can_recv());
    }
}
