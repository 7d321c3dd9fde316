//! Version-neutral core of the anyhttp protocol engines.
//!
//! This crate defines the vocabulary shared by the HTTP/1.1, HTTP/2 and
//! HTTP/3 engines: the event and action model, the header list type, the
//! per-version error-code tables, TLS configuration records, and the
//! sans-IO capability traits every engine implements. It performs no I/O
//! of its own — engines consume transport bytes (or datagrams) fed by the
//! caller and hand back outbound bytes, while HTTP-level activity is
//! drained as [`Event`]s.
//!
//! # Architecture
//!
//! ```text
//!   transport bytes / datagrams
//!        |
//!   +----v--------------------+
//!   | anyhttp-h1 / -h2 / -h3  |  one engine per connection
//!   | impl HttpProtocol       |  Event: HeadersReceived, DataReceived, ...
//!   |      + TcpTransport     |
//!   |        or QuicTransport |
//!   +-------------------------+
//! ```
//!
//! The same pull-based loop drives every version: feed input, drain
//! [`Event`]s with `next_event()`, submit actions, drain output.
//!
//! # Example
//!
//! ```rust,ignore
//! use anyhttp_core::{Event, HeaderField, HttpOverTcpProtocol};
//!
//! fn pump(proto: &mut dyn HttpOverTcpProtocol, received: &[u8]) {
//!     proto.bytes_received(received);
//!     while let Some(event) = proto.next_event() {
//!         match event {
//!             Event::HeadersReceived { stream_id, headers, end_stream } => { /* ... */ }
//!             Event::DataReceived { stream_id, data, end_stream } => { /* ... */ }
//!             _ => {}
//!         }
//!     }
//!     let outgoing = proto.bytes_to_send();
//!     transport_send(&outgoing);
//! }
//! ```

pub mod alpn;
pub mod config;
pub mod error;
pub mod events;
pub mod factory;
pub mod headers;
pub mod proto;
pub mod registry;

pub use alpn::AlpnFactory;
pub use config::{ClientTlsConfig, Handshake, ServerTlsConfig};
pub use error::{Error, ErrorCodes, ErrorKind};
pub use events::{Event, StreamId};
pub use factory::{
    ALPN_H2, ALPN_H3, ALPN_HTTP1, HttpOverQuicClientFactory, HttpOverQuicServerFactory,
    HttpOverTcpFactory,
};
pub use headers::HeaderField;
pub use proto::{
    ConnectionInfo, Datagram, HttpOverQuicProtocol, HttpOverTcpProtocol, HttpProtocol,
    QuicTransport, Role, TcpTransport,
};
pub use registry::ProtocolRegistry;
