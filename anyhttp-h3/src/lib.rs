//! HTTP/3 engine over QUIC.
//!
//! [`Http3Protocol`] maps HTTP/3 (RFC 9114) onto the sans-IO QUIC state
//! machine from [quinn-proto](https://docs.rs/quinn-proto). TLS 1.3 is
//! integrated into QUIC, so a protocol instance is driven entirely by
//! datagrams and a clock:
//!
//! ```text
//!   UDP datagrams + clock
//!        |
//!   +----v------------------+
//!   | quinn_proto::Endpoint |  QUIC transport, one connection
//!   +----+------------------+
//!        | stream data
//!   +----v------------------+
//!   | anyhttp-h3            |  HTTP/3 framing + QPACK (static table)
//!   | Http3Protocol         |  Event: HeadersReceived, DataReceived, ...
//!   +-----------------------+
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Instant;
//! use anyhttp_core::{HttpProtocol, QuicTransport};
//!
//! let mut h3 = factory.create(remote, "example.com", &tls_config)?;
//! h3.clock(Instant::now());
//! let stream_id = h3.get_available_stream_id()?;
//! h3.submit_headers(stream_id, &request_headers, true)?;
//! for (payload, peer) in h3.datagrams_to_send() {
//!     socket.send_to(&payload, peer)?;
//! }
//! ```

pub mod connection;
pub mod error;
pub mod factory;
mod huffman;
pub mod qpack;
pub mod settings;
mod stream;
pub mod wire;

pub use connection::Http3Protocol;
pub use error::H3Error;
pub use factory::{Http3ClientFactory, Http3ServerFactory};
pub use settings::Settings;
pub use wire::Frame;
