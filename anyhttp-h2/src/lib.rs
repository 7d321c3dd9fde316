//! Sans-IO HTTP/2 engine.
//!
//! [`Http2Protocol`] is a pure state machine for one RFC 9113 connection,
//! client- or server-side. The caller feeds TLS-decrypted bytes in via
//! `bytes_received()`, pulls frames to write via `bytes_to_send()`, and
//! drains HTTP-level events with `next_event()`. Framing, HPACK with
//! dynamic tables, SETTINGS exchange, flow-control windows and stream-id
//! allocation all live here; nothing touches a socket.
//!
//! # Example
//!
//! ```rust,ignore
//! use anyhttp_core::{HeaderField, HttpProtocol, TcpTransport};
//! use anyhttp_h2::Http2Protocol;
//!
//! let mut h2 = Http2Protocol::client();
//! transport_send(&h2.bytes_to_send()); // connection preface + SETTINGS
//!
//! let stream_id = h2.get_available_stream_id()?;
//! h2.submit_headers(stream_id, &[
//!     HeaderField::new(b":method", b"GET"),
//!     HeaderField::new(b":scheme", b"https"),
//!     HeaderField::new(b":authority", b"example.com"),
//!     HeaderField::new(b":path", b"/"),
//! ], true)?;
//! transport_send(&h2.bytes_to_send());
//!
//! h2.bytes_received(&received);
//! while let Some(event) = h2.next_event() { /* ... */ }
//! ```

pub mod connection;
pub mod error;
pub mod factory;
pub mod frame;
pub mod hpack;
mod huffman;
pub mod settings;
mod stream;
mod window;

pub use connection::Http2Protocol;
pub use error::H2Error;
pub use factory::{Http2ClientFactory, Http2ServerFactory};
pub use frame::Frame;
pub use settings::Settings;
