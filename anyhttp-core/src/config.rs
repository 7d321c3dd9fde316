//! TLS configuration records and TCP handshake descriptors.
//!
//! These are plain data: certificate and key material is carried as
//! in-memory DER, never as file paths. Loading certificates from disk is
//! the facade's job, not the protocol core's. Records are immutable after
//! setup and shared between factories via `Arc`.

use rustls::RootCertStore;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};

/// TLS configuration for server-side connections.
#[derive(Debug)]
pub struct ServerTlsConfig {
    /// Certificate chain presented to clients, leaf first.
    pub cert_chain: Vec<CertificateDer<'static>>,
    /// Private key for the leaf certificate.
    pub private_key: PrivateKeyDer<'static>,
    /// When set, clients must present a certificate chaining to one of
    /// these roots.
    pub client_auth_roots: Option<RootCertStore>,
    /// ALPN protocols advertised, most preferred first.
    pub alpn_protocols: Vec<Vec<u8>>,
}

impl ServerTlsConfig {
    pub fn new(cert_chain: Vec<CertificateDer<'static>>, private_key: PrivateKeyDer<'static>) -> Self {
        Self {
            cert_chain,
            private_key,
            client_auth_roots: None,
            alpn_protocols: Vec::new(),
        }
    }
}

impl Clone for ServerTlsConfig {
    fn clone(&self) -> Self {
        Self {
            cert_chain: self.cert_chain.clone(),
            private_key: self.private_key.clone_key(),
            client_auth_roots: self.client_auth_roots.clone(),
            alpn_protocols: self.alpn_protocols.clone(),
        }
    }
}

/// TLS configuration for client-side connections.
#[derive(Debug)]
pub struct ClientTlsConfig {
    /// CA certificates trusted for server verification.
    pub roots: RootCertStore,
    /// Overrides the SNI name derived from the target host.
    pub server_name: Option<String>,
    /// ALPN protocols offered, most preferred first.
    pub alpn_protocols: Vec<Vec<u8>>,
    /// Client certificate chain and key, when the server requires one.
    pub client_cert: Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>,
}

impl ClientTlsConfig {
    pub fn new(roots: RootCertStore) -> Self {
        Self {
            roots,
            server_name: None,
            alpn_protocols: Vec::new(),
            client_cert: None,
        }
    }
}

impl Clone for ClientTlsConfig {
    fn clone(&self) -> Self {
        Self {
            roots: self.roots.clone(),
            server_name: self.server_name.clone(),
            alpn_protocols: self.alpn_protocols.clone(),
            client_cert: self
                .client_cert
                .as_ref()
                .map(|(chain, key)| (chain.clone(), key.clone_key())),
        }
    }
}

/// Outcome of the transport-level TLS handshake on a TCP connection.
///
/// TCP factories receive this so the right engine can be instantiated:
/// `tls_version` is `None` for plaintext connections, and
/// `alpn_protocol` is `None` when ALPN was not negotiated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Handshake {
    pub tls_version: Option<String>,
    pub alpn_protocol: Option<Vec<u8>>,
}

impl Handshake {
    /// A plaintext connection: no TLS, no ALPN.
    pub fn plaintext() -> Self {
        Self::default()
    }

    /// A TLS connection with the given negotiated version and ALPN token.
    pub fn tls(version: impl Into<String>, alpn_protocol: Option<Vec<u8>>) -> Self {
        Self {
            tls_version: Some(version.into()),
            alpn_protocol,
        }
    }

    /// Whether the connection is secure.
    pub fn is_tls(&self) -> bool {
        self.tls_version.is_some()
    }
}
