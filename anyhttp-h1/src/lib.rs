//! Sans-IO HTTP/1.1 engine.
//!
//! [`Http1Protocol`] parses and serializes RFC 9112 messages while
//! presenting the same stream-oriented contract as the multiplexed
//! versions: request and status lines are translated to and from
//! HTTP/2-style pseudo-headers, and the single exchange in flight is
//! always stream 1. Feed bytes with `bytes_received()`, drain events with
//! `next_event()`, pull outgoing bytes with `bytes_to_send()`.
//!
//! # Example
//!
//! ```rust,ignore
//! use anyhttp_core::{HeaderField, HttpProtocol, TcpTransport};
//! use anyhttp_h1::Http1Protocol;
//!
//! let mut h1 = Http1Protocol::client(false);
//! let stream_id = h1.get_available_stream_id()?;
//! h1.submit_headers(stream_id, &[
//!     HeaderField::new(b":method", b"GET"),
//!     HeaderField::new(b":scheme", b"http"),
//!     HeaderField::new(b":authority", b"example.com"),
//!     HeaderField::new(b":path", b"/"),
//! ], true)?;
//! transport_send(&h1.bytes_to_send());
//! ```

pub mod factory;
mod message;
pub mod protocol;

pub use factory::{Http1ClientFactory, Http1ServerFactory};
pub use protocol::Http1Protocol;
