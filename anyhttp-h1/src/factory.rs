//! Factories for the HTTP/1.1 engine.

use anyhttp_core::{ALPN_HTTP1, Error, Handshake, HttpOverTcpFactory, HttpOverTcpProtocol, Role};

use crate::protocol::Http1Protocol;

/// Creates client-side [`Http1Protocol`] instances.
#[derive(Debug, Default, Clone, Copy)]
pub struct Http1ClientFactory;

impl HttpOverTcpFactory for Http1ClientFactory {
    fn alpn_protocols(&self) -> Vec<Vec<u8>> {
        vec![ALPN_HTTP1.to_vec()]
    }

    fn create(&self, handshake: &Handshake) -> Result<Box<dyn HttpOverTcpProtocol>, Error> {
        Ok(Box::new(Http1Protocol::new(
            Role::Client,
            handshake.is_tls(),
        )))
    }
}

/// Creates server-side [`Http1Protocol`] instances.
#[derive(Debug, Default, Clone, Copy)]
pub struct Http1ServerFactory;

impl HttpOverTcpFactory for Http1ServerFactory {
    fn alpn_protocols(&self) -> Vec<Vec<u8>> {
        vec![ALPN_HTTP1.to_vec()]
    }

    fn create(&self, handshake: &Handshake) -> Result<Box<dyn HttpOverTcpProtocol>, Error> {
        Ok(Box::new(Http1Protocol::new(
            Role::Server,
            handshake.is_tls(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factories_declare_http1_alpn() {
        assert_eq!(
            Http1ClientFactory.alpn_protocols(),
            vec![b"http/1.1".to_vec()]
        );
        assert_eq!(
            Http1ServerFactory.alpn_protocols(),
            vec![b"http/1.1".to_vec()]
        );
    }

    #[test]
    fn created_protocol_reports_version() {
        let proto = Http1ClientFactory.create(&Handshake::plaintext()).unwrap();
        assert_eq!(proto.http_version(), "http/1.1");
        assert!(!proto.multiplexed());
    }
}
