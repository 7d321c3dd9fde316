//! Factories for the HTTP/3 engine.
//!
//! These translate the transport-agnostic TLS records into quinn-proto
//! QUIC configurations. TLS 1.3 is mandatory for QUIC and the ring crypto
//! provider is selected explicitly, so the process-wide rustls default
//! does not matter.

use std::net::SocketAddr;
use std::sync::Arc;

use quinn_proto::crypto::rustls::{QuicClientConfig, QuicServerConfig};
use rustls::server::WebPkiClientVerifier;

use anyhttp_core::{
    ALPN_H3, ClientTlsConfig, Error, HttpOverQuicClientFactory, HttpOverQuicProtocol,
    HttpOverQuicServerFactory, ServerTlsConfig,
};

use crate::connection::{CID_LEN, Http3Protocol, SUPPORTED_QUIC_VERSIONS};

fn crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn alpn_or_h3(alpn_protocols: &[Vec<u8>]) -> Vec<Vec<u8>> {
    if alpn_protocols.is_empty() {
        vec![ALPN_H3.to_vec()]
    } else {
        alpn_protocols.to_vec()
    }
}

fn internal(error: impl std::fmt::Display) -> Error {
    Error::Internal(error.to_string())
}

fn build_client_config(tls_config: &ClientTlsConfig) -> Result<quinn_proto::ClientConfig, Error> {
    let builder = rustls::ClientConfig::builder_with_provider(crypto_provider())
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(internal)?
        .with_root_certificates(tls_config.roots.clone());
    let mut rustls_config = match &tls_config.client_cert {
        Some((chain, key)) => builder
            .with_client_auth_cert(chain.clone(), key.clone_key())
            .map_err(internal)?,
        None => builder.with_no_client_auth(),
    };
    rustls_config.alpn_protocols = alpn_or_h3(&tls_config.alpn_protocols);

    let crypto = QuicClientConfig::try_from(Arc::new(rustls_config)).map_err(internal)?;
    Ok(quinn_proto::ClientConfig::new(Arc::new(crypto)))
}

fn build_server_config(tls_config: &ServerTlsConfig) -> Result<Arc<quinn_proto::ServerConfig>, Error> {
    let provider = crypto_provider();
    let builder = rustls::ServerConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(internal)?;
    let builder = match &tls_config.client_auth_roots {
        Some(roots) => {
            let verifier =
                WebPkiClientVerifier::builder_with_provider(Arc::new(roots.clone()), provider)
                    .build()
                    .map_err(internal)?;
            builder.with_client_cert_verifier(verifier)
        }
        None => builder.with_no_client_auth(),
    };
    let mut rustls_config = builder
        .with_single_cert(
            tls_config.cert_chain.clone(),
            tls_config.private_key.clone_key(),
        )
        .map_err(internal)?;
    rustls_config.alpn_protocols = alpn_or_h3(&tls_config.alpn_protocols);

    let crypto = QuicServerConfig::try_from(Arc::new(rustls_config)).map_err(internal)?;
    Ok(Arc::new(quinn_proto::ServerConfig::with_crypto(Arc::new(
        crypto,
    ))))
}

/// Creates client-side [`Http3Protocol`] instances.
#[derive(Debug, Default, Clone, Copy)]
pub struct Http3ClientFactory;

impl HttpOverQuicClientFactory for Http3ClientFactory {
    fn alpn_protocols(&self) -> Vec<Vec<u8>> {
        vec![ALPN_H3.to_vec()]
    }

    fn create(
        &self,
        remote_address: SocketAddr,
        server_name: &str,
        tls_config: &ClientTlsConfig,
    ) -> Result<Box<dyn HttpOverQuicProtocol>, Error> {
        let config = build_client_config(tls_config)?;
        let sni = tls_config
            .server_name
            .clone()
            .unwrap_or_else(|| server_name.to_string());
        Ok(Box::new(Http3Protocol::client(config, remote_address, sni)))
    }
}

/// Creates server-side [`Http3Protocol`] instances.
#[derive(Debug, Default, Clone, Copy)]
pub struct Http3ServerFactory;

impl HttpOverQuicServerFactory for Http3ServerFactory {
    fn alpn_protocols(&self) -> Vec<Vec<u8>> {
        vec![ALPN_H3.to_vec()]
    }

    fn quic_connection_id_length(&self) -> usize {
        CID_LEN
    }

    fn quic_supported_versions(&self) -> Vec<u32> {
        SUPPORTED_QUIC_VERSIONS.to_vec()
    }

    fn create(
        &self,
        remote_address: SocketAddr,
        tls_config: &ServerTlsConfig,
    ) -> Result<Box<dyn HttpOverQuicProtocol>, Error> {
        let config = build_server_config(tls_config)?;
        Ok(Box::new(Http3Protocol::server(config, remote_address)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustls::RootCertStore;
    use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

    fn self_signed() -> (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>) {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let key = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());
        (vec![CertificateDer::from(cert.cert)], key.into())
    }

    #[test]
    fn factories_declare_h3() {
        assert_eq!(Http3ClientFactory.alpn_protocols(), vec![b"h3".to_vec()]);
        assert_eq!(Http3ServerFactory.alpn_protocols(), vec![b"h3".to_vec()]);
        assert_eq!(Http3ServerFactory.quic_connection_id_length(), 8);
        assert_eq!(Http3ServerFactory.quic_supported_versions(), vec![1]);
    }

    #[test]
    fn client_factory_builds_protocol() {
        let (certs, _key) = self_signed();
        let mut roots = RootCertStore::empty();
        roots.add(certs[0].clone()).unwrap();
        let tls_config = ClientTlsConfig::new(roots);
        let proto = Http3ClientFactory
            .create("127.0.0.1:443".parse().unwrap(), "localhost", &tls_config)
            .unwrap();
        assert_eq!(proto.http_version(), "h3");
        assert!(proto.multiplexed());
        assert!(proto.is_available());
    }

    #[test]
    fn server_factory_builds_protocol() {
        let (certs, key) = self_signed();
        let tls_config = ServerTlsConfig::new(certs, key);
        let proto = Http3ServerFactory
            .create("127.0.0.1:50000".parse().unwrap(), &tls_config)
            .unwrap();
        assert_eq!(proto.http_version(), "h3");
        assert_eq!(
            proto.remote_address(),
            Some("127.0.0.1:50000".parse().unwrap())
        );
    }
}
