//! Sans-IO capability traits implemented by the protocol engines.
//!
//! Two orthogonal capability sets replace a deep inheritance chain: the
//! HTTP-level submit/poll contract ([`HttpProtocol`]) and a transport
//! shape, either byte-oriented ([`TcpTransport`]) or datagram-oriented
//! with integrated TLS and timers ([`QuicTransport`]). A concrete engine
//! provides both; [`HttpOverTcpProtocol`] and [`HttpOverQuicProtocol`] are
//! the object-safe combinations the connection layer works with.
//!
//! Every method is synchronous and returns promptly. `next_event()`
//! returning `None` is the engine's only way of saying "feed me more
//! input"; it never blocks and never waits.

use std::net::SocketAddr;
use std::time::Instant;

use crate::error::{Error, ErrorCodes, ErrorKind};
use crate::events::{Event, StreamId};
use crate::headers::HeaderField;

/// Which side of the connection an engine plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// A UDP datagram: payload plus the peer address.
pub type Datagram = (Vec<u8>, SocketAddr);

/// Addresses and diagnostics attached to a protocol instance.
///
/// The engine is a passive holder: the connection layer fills in the
/// addresses once the transport is established, and may stash arbitrary
/// diagnostic attributes.
#[derive(Debug, Clone, Default)]
pub struct ConnectionInfo {
    pub local_address: Option<SocketAddr>,
    pub remote_address: Option<SocketAddr>,
    extra_attributes: Vec<(String, String)>,
}

impl ConnectionInfo {
    /// Set a diagnostic attribute, replacing any previous value.
    pub fn set_extra(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if let Some(entry) = self.extra_attributes.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value.into();
        } else {
            self.extra_attributes.push((key, value.into()));
        }
    }

    /// Look up a diagnostic attribute.
    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extra_attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Version-agnostic sans-IO contract of an HTTP connection.
///
/// The contract is pull-based on both sides: callers submit actions and
/// poll events; engines never call out.
pub trait HttpProtocol {
    /// ALPN-style version tag: `"http/1.1"`, `"h2"` or `"h3"`.
    fn http_version(&self) -> &'static str;

    /// Whether this connection supports multiple parallel streams.
    fn multiplexed(&self) -> bool;

    /// Wire error codes for this HTTP version.
    fn error_codes(&self) -> ErrorCodes;

    /// Whether a new stream may be opened right now.
    fn is_available(&self) -> bool;

    /// Whether this connection is closed or should be closed.
    fn has_expired(&self) -> bool;

    /// Reserve and return the next usable stream id.
    ///
    /// Every returned id is distinct and respects the version's parity
    /// rule; the reservation happens at allocation, so two successive
    /// calls return different ids even without an intervening
    /// `submit_headers`. Fails with [`Error::NotAvailable`] when no
    /// stream can be opened (HTTP/1 busy, GOAWAY seen, id space
    /// exhausted).
    fn get_available_stream_id(&mut self) -> Result<StreamId, Error>;

    /// Submit a frame with HTTP headers.
    ///
    /// On a client connection this starts a request; on a server
    /// connection, a response.
    fn submit_headers(
        &mut self,
        stream_id: StreamId,
        headers: &[HeaderField],
        end_stream: bool,
    ) -> Result<(), Error>;

    /// Submit a frame with HTTP body data.
    fn submit_data(
        &mut self,
        stream_id: StreamId,
        data: &[u8],
        end_stream: bool,
    ) -> Result<(), Error>;

    /// Immediately terminate one stream.
    fn submit_stream_reset(
        &mut self,
        stream_id: StreamId,
        error_code: ErrorKind,
    ) -> Result<(), Error>;

    /// Initiate graceful shutdown of the whole connection.
    fn submit_close(&mut self, error_code: ErrorKind) -> Result<(), Error>;

    /// Consume the next HTTP event.
    ///
    /// Returns `None` when the queue is empty and more input is needed.
    /// `Event::ConnectionTerminated` is returned exactly once; afterwards
    /// every call returns `None`.
    fn next_event(&mut self) -> Option<Event>;

    /// Addresses and diagnostics holder.
    fn info(&self) -> &ConnectionInfo;
    fn info_mut(&mut self) -> &mut ConnectionInfo;

    /// Local transport address, once set by the connection layer.
    fn local_address(&self) -> Option<SocketAddr> {
        self.info().local_address
    }

    /// Remote transport address, once set by the connection layer.
    fn remote_address(&self) -> Option<SocketAddr> {
        self.info().remote_address
    }
}

/// Byte-oriented transport capability (HTTP/1 and HTTP/2).
pub trait TcpTransport {
    /// Feed bytes received from the transport. The parser advances
    /// opportunistically; drain `next_event()` afterwards.
    fn bytes_received(&mut self, data: &[u8]);

    /// Drain pending outbound bytes (possibly empty).
    ///
    /// Bytes produced after action A and before action B contain the wire
    /// encoding of A and any earlier buffered actions, in submission
    /// order.
    fn bytes_to_send(&mut self) -> Vec<u8>;

    /// The peer signalled it will send no more data.
    fn eof_received(&mut self);

    /// The transport was lost abruptly. Synthesizes
    /// `ConnectionTerminated` unless the connection is already terminal.
    fn connection_lost(&mut self, message: Option<String>);
}

/// Datagram-oriented transport capability with integrated TLS and timers
/// (HTTP/3 over QUIC).
pub trait QuicTransport {
    /// Tell the engine what time it is. Due retransmit/ack timers fire
    /// from here; the engine never reads the system clock itself.
    fn clock(&mut self, now: Instant);

    /// Next instant at which the engine needs [`clock`](Self::clock) to be
    /// called even without new I/O, or `None` when no timer is armed.
    fn get_timer(&self) -> Option<Instant>;

    /// Feed one received UDP datagram.
    fn datagram_received(&mut self, datagram: Datagram);

    /// Drain the batch of outbound datagrams generated since the last
    /// call. The caller must also (re-)arm a timer for
    /// [`get_timer`](Self::get_timer).
    fn datagrams_to_send(&mut self) -> Vec<Datagram>;

    /// Currently valid QUIC connection IDs, for packet routing by
    /// listeners and load balancers.
    fn connection_ids(&self) -> Vec<Vec<u8>>;

    /// The transport was lost abruptly.
    fn connection_lost(&mut self, message: Option<String>);
}

/// An HTTP protocol running over a byte-oriented transport.
pub trait HttpOverTcpProtocol: HttpProtocol + TcpTransport + Send {}
impl<T: HttpProtocol + TcpTransport + Send> HttpOverTcpProtocol for T {}

/// An HTTP protocol running over a QUIC datagram transport.
pub trait HttpOverQuicProtocol: HttpProtocol + QuicTransport + Send {}
impl<T: HttpProtocol + QuicTransport + Send> HttpOverQuicProtocol for T {}
