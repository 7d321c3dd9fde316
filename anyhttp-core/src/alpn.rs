//! ALPN-based selection between TCP protocol factories.
//!
//! A listener that serves both HTTP/1.1 and HTTP/2 on one port advertises
//! the union of its children's ALPN tokens and instantiates the matching
//! engine once the handshake has settled on one.

use std::sync::Arc;

use crate::config::Handshake;
use crate::error::Error;
use crate::factory::HttpOverTcpFactory;
use crate::proto::HttpOverTcpProtocol;

/// A factory that selects between child factories based on the negotiated
/// ALPN token.
///
/// Children are ordered from most to least preferred; that order is
/// reflected in the advertised token list. When the peer did not negotiate
/// ALPN at all (plaintext, or a client without the extension), the first
/// child is used.
pub struct AlpnFactory {
    children: Vec<Arc<dyn HttpOverTcpFactory>>,
}

impl AlpnFactory {
    /// Build from an ordered list of child factories.
    ///
    /// # Panics
    ///
    /// Panics if `children` is empty: a selector with nothing to select
    /// from is a configuration bug.
    pub fn new(children: Vec<Arc<dyn HttpOverTcpFactory>>) -> Self {
        assert!(!children.is_empty(), "AlpnFactory needs at least one child");
        Self { children }
    }
}

impl HttpOverTcpFactory for AlpnFactory {
    fn alpn_protocols(&self) -> Vec<Vec<u8>> {
        let mut tokens: Vec<Vec<u8>> = Vec::new();
        for child in &self.children {
            for token in child.alpn_protocols() {
                if !tokens.contains(&token) {
                    tokens.push(token);
                }
            }
        }
        tokens
    }

    fn create(&self, handshake: &Handshake) -> Result<Box<dyn HttpOverTcpProtocol>, Error> {
        let Some(token) = handshake.alpn_protocol.as_deref() else {
            return self.children[0].create(handshake);
        };
        for child in &self.children {
            if child.alpn_protocols().iter().any(|t| t == token) {
                return child.create(handshake);
            }
        }
        Err(Error::Protocol(format!(
            "peer negotiated unsupported ALPN protocol {:?}",
            String::from_utf8_lossy(token)
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Child stub that identifies itself through the error it returns.
    struct StubFactory {
        token: &'static [u8],
    }

    impl HttpOverTcpFactory for StubFactory {
        fn alpn_protocols(&self) -> Vec<Vec<u8>> {
            vec![self.token.to_vec()]
        }

        fn create(&self, _handshake: &Handshake) -> Result<Box<dyn HttpOverTcpProtocol>, Error> {
            Err(Error::Internal(
                String::from_utf8_lossy(self.token).into_owned(),
            ))
        }
    }

    fn mux() -> AlpnFactory {
        AlpnFactory::new(vec![
            Arc::new(StubFactory { token: b"h2" }),
            Arc::new(StubFactory { token: b"http/1.1" }),
        ])
    }

    fn created_by(result: Result<Box<dyn HttpOverTcpProtocol>, Error>) -> String {
        match result {
            Err(Error::Internal(token)) => token,
            Err(other) => panic!("expected stub marker, got {other:?}"),
            Ok(_) => panic!("expected stub marker, got Ok(_)"),
        }
    }

    #[test]
    fn advertises_union_in_preference_order() {
        assert_eq!(
            mux().alpn_protocols(),
            vec![b"h2".to_vec(), b"http/1.1".to_vec()]
        );
    }

    #[test]
    fn duplicate_tokens_collapse_to_first() {
        let mux = AlpnFactory::new(vec![
            Arc::new(StubFactory { token: b"h2" }),
            Arc::new(StubFactory { token: b"h2" }),
        ]);
        assert_eq!(mux.alpn_protocols(), vec![b"h2".to_vec()]);
    }

    #[test]
    fn picks_child_matching_negotiated_token() {
        let handshake = Handshake::tls("TLSv1.3", Some(b"http/1.1".to_vec()));
        assert_eq!(created_by(mux().create(&handshake)), "http/1.1");

        let handshake = Handshake::tls("TLSv1.3", Some(b"h2".to_vec()));
        assert_eq!(created_by(mux().create(&handshake)), "h2");
    }

    #[test]
    fn falls_back_to_first_child_without_alpn() {
        assert_eq!(created_by(mux().create(&Handshake::plaintext())), "h2");
    }

    #[test]
    fn unknown_token_is_a_protocol_error() {
        let handshake = Handshake::tls("TLSv1.3", Some(b"spdy/3".to_vec()));
        assert!(matches!(mux().create(&handshake), Err(Error::Protocol(_))));
    }
}
