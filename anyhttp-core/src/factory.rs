//! Protocol factories.
//!
//! The [`HttpProtocol`](crate::HttpProtocol) traits deliberately leave
//! construction out of the contract: every engine takes different options.
//! Factories unify creation so clients, servers and proxies can swap
//! protocol implementations without knowing their constructors. Role
//! (client vs server) is fixed when the factory is built.

use std::net::SocketAddr;

use crate::config::{ClientTlsConfig, Handshake, ServerTlsConfig};
use crate::error::Error;
use crate::proto::{HttpOverQuicProtocol, HttpOverTcpProtocol};

/// ALPN token for HTTP/1.1.
pub const ALPN_HTTP1: &[u8] = b"http/1.1";
/// ALPN token for HTTP/2.
pub const ALPN_H2: &[u8] = b"h2";
/// ALPN token for HTTP/3.
pub const ALPN_H3: &[u8] = b"h3";

/// Creates protocol instances for HTTP versions carried over TCP.
pub trait HttpOverTcpFactory: Send + Sync {
    /// ALPN protocols to offer in a TLS handshake, most preferred first.
    fn alpn_protocols(&self) -> Vec<Vec<u8>>;

    /// Create a fresh engine for one connection.
    ///
    /// `handshake` describes the completed TLS handshake, or is
    /// [`Handshake::plaintext`] for insecure connections.
    fn create(&self, handshake: &Handshake) -> Result<Box<dyn HttpOverTcpProtocol>, Error>;
}

/// Creates client-side HTTP-over-QUIC protocol instances.
///
/// QUIC integrates TLS, so the factory needs the TLS configuration and the
/// SNI name up front, and the destination address because UDP packets are
/// addressed at the QUIC layer.
pub trait HttpOverQuicClientFactory: Send + Sync {
    /// ALPN protocols offered in the QUIC-TLS handshake.
    fn alpn_protocols(&self) -> Vec<Vec<u8>>;

    fn create(
        &self,
        remote_address: SocketAddr,
        server_name: &str,
        tls_config: &ClientTlsConfig,
    ) -> Result<Box<dyn HttpOverQuicProtocol>, Error>;
}

/// Creates server-side HTTP-over-QUIC protocol instances.
pub trait HttpOverQuicServerFactory: Send + Sync {
    /// ALPN protocols accepted in the QUIC-TLS handshake.
    fn alpn_protocols(&self) -> Vec<Vec<u8>>;

    /// Length in bytes of the QUIC connection IDs this factory's engines
    /// issue. Listeners use it to sniff and route packets before any
    /// protocol instance exists.
    fn quic_connection_id_length(&self) -> usize;

    /// QUIC versions the engines accept, for the same routing purpose.
    fn quic_supported_versions(&self) -> Vec<u32>;

    /// Create a fresh engine for the connection whose Initial packet
    /// arrived from `remote_address`.
    fn create(
        &self,
        remote_address: SocketAddr,
        tls_config: &ServerTlsConfig,
    ) -> Result<Box<dyn HttpOverQuicProtocol>, Error>;
}
