//! Factories for the HTTP/2 engine.

use anyhttp_core::{ALPN_H2, Error, Handshake, HttpOverTcpFactory, HttpOverTcpProtocol, Role};

use crate::connection::Http2Protocol;

/// HTTP/2 over TLS requires ALPN; a TLS connection whose handshake did not
/// negotiate it cannot be h2 (RFC 9113 section 3.3). Plaintext prior
/// knowledge carries no handshake and is always accepted.
fn check_alpn(handshake: &Handshake) -> Result<(), Error> {
    if handshake.is_tls() && handshake.alpn_protocol.is_none() {
        return Err(Error::Protocol(
            "HTTP/2 was not negotiated via ALPN in the TLS handshake".into(),
        ));
    }
    Ok(())
}

/// Creates client-side [`Http2Protocol`] instances.
#[derive(Debug, Default, Clone, Copy)]
pub struct Http2ClientFactory;

impl HttpOverTcpFactory for Http2ClientFactory {
    fn alpn_protocols(&self) -> Vec<Vec<u8>> {
        vec![ALPN_H2.to_vec()]
    }

    fn create(&self, handshake: &Handshake) -> Result<Box<dyn HttpOverTcpProtocol>, Error> {
        check_alpn(handshake)?;
        Ok(Box::new(Http2Protocol::new(Role::Client)))
    }
}

/// Creates server-side [`Http2Protocol`] instances.
#[derive(Debug, Default, Clone, Copy)]
pub struct Http2ServerFactory;

impl HttpOverTcpFactory for Http2ServerFactory {
    fn alpn_protocols(&self) -> Vec<Vec<u8>> {
        vec![ALPN_H2.to_vec()]
    }

    fn create(&self, handshake: &Handshake) -> Result<Box<dyn HttpOverTcpProtocol>, Error> {
        check_alpn(handshake)?;
        Ok(Box::new(Http2Protocol::new(Role::Server)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factories_declare_h2_alpn() {
        assert_eq!(Http2ClientFactory.alpn_protocols(), vec![b"h2".to_vec()]);
        assert_eq!(Http2ServerFactory.alpn_protocols(), vec![b"h2".to_vec()]);
    }

    #[test]
    fn plaintext_prior_knowledge_is_accepted() {
        let proto = Http2ClientFactory.create(&Handshake::plaintext()).unwrap();
        assert_eq!(proto.http_version(), "h2");
        assert!(proto.multiplexed());
    }

    #[test]
    fn tls_without_alpn_is_rejected() {
        let handshake = Handshake::tls("TLSv1.3", None);
        assert!(matches!(
            Http2ServerFactory.create(&handshake),
            Err(Error::Protocol(_))
        ));

        let handshake = Handshake::tls("TLSv1.3", Some(b"h2".to_vec()));
        assert!(Http2ServerFactory.create(&handshake).is_ok());
    }
}
