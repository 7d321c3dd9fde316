//! One sans-IO protocol surface for HTTP/1.1, HTTP/2 and HTTP/3.
//!
//! This crate ties the per-version engines together: it re-exports the
//! shared vocabulary from `anyhttp-core`, the engines and factories from
//! `anyhttp-h1`/`-h2`/`-h3`, and wires them into a ready-to-use
//! [`ProtocolRegistry`].
//!
//! Every version is driven the same way: feed transport input, drain
//! [`Event`]s, submit actions, pull transport output. HTTP/1.1 degrades
//! to a single stream with id 1; HTTP/2 and HTTP/3 multiplex. The
//! engines perform no I/O, no logging and hold no locks — they are plain
//! state machines owned by whoever pumps the transport.
//!
//! # Example
//!
//! ```rust,ignore
//! use anyhttp::{Handshake, default_registry};
//!
//! let registry = default_registry();
//! let factory = registry.http1_client("default").unwrap();
//! let mut proto = factory.create(&Handshake::plaintext())?;
//! ```

pub use anyhttp_core::{
    ALPN_H2, ALPN_H3, ALPN_HTTP1, AlpnFactory, ClientTlsConfig, ConnectionInfo, Datagram, Error,
    ErrorCodes, ErrorKind, Event, Handshake, HeaderField, HttpOverQuicClientFactory,
    HttpOverQuicProtocol, HttpOverQuicServerFactory, HttpOverTcpFactory, HttpOverTcpProtocol,
    HttpProtocol, ProtocolRegistry, QuicTransport, Role, ServerTlsConfig, StreamId, TcpTransport,
};
pub use anyhttp_h1::{Http1ClientFactory, Http1Protocol, Http1ServerFactory};
pub use anyhttp_h2::{Http2ClientFactory, Http2Protocol, Http2ServerFactory};
pub use anyhttp_h3::{Http3ClientFactory, Http3Protocol, Http3ServerFactory};

use std::sync::Arc;

/// A registry with the bundled engines registered under `"default"`.
pub fn default_registry() -> ProtocolRegistry {
    let mut registry = ProtocolRegistry::new();
    registry.register_http1_server("default", Arc::new(Http1ServerFactory));
    registry.register_http2_server("default", Arc::new(Http2ServerFactory));
    registry.register_http3_server("default", Arc::new(Http3ServerFactory));
    registry.register_http1_client("default", Arc::new(Http1ClientFactory));
    registry.register_http2_client("default", Arc::new(Http2ClientFactory));
    registry.register_http3_client("default", Arc::new(Http3ClientFactory));
    registry
}
