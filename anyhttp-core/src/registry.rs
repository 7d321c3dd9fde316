//! Registry of protocol implementations.
//!
//! A process-wide table mapping implementation names to factories, one map
//! per (HTTP version, role) pair. Registration is explicit: whoever wires
//! the process calls the `register_*` methods during startup, then shares
//! the registry immutably. There is no ambient discovery.

use std::collections::HashMap;
use std::sync::Arc;

use crate::factory::{HttpOverQuicClientFactory, HttpOverQuicServerFactory, HttpOverTcpFactory};

/// Named protocol factories, indexed by version and role.
#[derive(Default)]
pub struct ProtocolRegistry {
    http1_servers: HashMap<String, Arc<dyn HttpOverTcpFactory>>,
    http2_servers: HashMap<String, Arc<dyn HttpOverTcpFactory>>,
    http3_servers: HashMap<String, Arc<dyn HttpOverQuicServerFactory>>,
    http1_clients: HashMap<String, Arc<dyn HttpOverTcpFactory>>,
    http2_clients: HashMap<String, Arc<dyn HttpOverTcpFactory>>,
    http3_clients: HashMap<String, Arc<dyn HttpOverQuicClientFactory>>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_http1_server(
        &mut self,
        name: impl Into<String>,
        factory: Arc<dyn HttpOverTcpFactory>,
    ) {
        self.http1_servers.insert(name.into(), factory);
    }

    pub fn register_http2_server(
        &mut self,
        name: impl Into<String>,
        factory: Arc<dyn HttpOverTcpFactory>,
    ) {
        self.http2_servers.insert(name.into(), factory);
    }

    pub fn register_http3_server(
        &mut self,
        name: impl Into<String>,
        factory: Arc<dyn HttpOverQuicServerFactory>,
    ) {
        self.http3_servers.insert(name.into(), factory);
    }

    pub fn register_http1_client(
        &mut self,
        name: impl Into<String>,
        factory: Arc<dyn HttpOverTcpFactory>,
    ) {
        self.http1_clients.insert(name.into(), factory);
    }

    pub fn register_http2_client(
        &mut self,
        name: impl Into<String>,
        factory: Arc<dyn HttpOverTcpFactory>,
    ) {
        self.http2_clients.insert(name.into(), factory);
    }

    pub fn register_http3_client(
        &mut self,
        name: impl Into<String>,
        factory: Arc<dyn HttpOverQuicClientFactory>,
    ) {
        self.http3_clients.insert(name.into(), factory);
    }

    pub fn http1_server(&self, name: &str) -> Option<Arc<dyn HttpOverTcpFactory>> {
        self.http1_servers.get(name).cloned()
    }

    pub fn http2_server(&self, name: &str) -> Option<Arc<dyn HttpOverTcpFactory>> {
        self.http2_servers.get(name).cloned()
    }

    pub fn http3_server(&self, name: &str) -> Option<Arc<dyn HttpOverQuicServerFactory>> {
        self.http3_servers.get(name).cloned()
    }

    pub fn http1_client(&self, name: &str) -> Option<Arc<dyn HttpOverTcpFactory>> {
        self.http1_clients.get(name).cloned()
    }

    pub fn http2_client(&self, name: &str) -> Option<Arc<dyn HttpOverTcpFactory>> {
        self.http2_clients.get(name).cloned()
    }

    pub fn http3_client(&self, name: &str) -> Option<Arc<dyn HttpOverQuicClientFactory>> {
        self.http3_clients.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Handshake;
    use crate::error::Error;
    use crate::proto::HttpOverTcpProtocol;

    struct StubFactory;

    impl HttpOverTcpFactory for StubFactory {
        fn alpn_protocols(&self) -> Vec<Vec<u8>> {
            vec![b"h2".to_vec()]
        }

        fn create(&self, _handshake: &Handshake) -> Result<Box<dyn HttpOverTcpProtocol>, Error> {
            Err(Error::Internal("stub".into()))
        }
    }

    #[test]
    fn register_and_look_up() {
        let mut registry = ProtocolRegistry::new();
        assert!(registry.http2_client("default").is_none());

        registry.register_http2_client("default", Arc::new(StubFactory));
        let factory = registry.http2_client("default").expect("registered");
        assert_eq!(factory.alpn_protocols(), vec![b"h2".to_vec()]);

        // Clients and servers are separate namespaces.
        assert!(registry.http2_server("default").is_none());
    }

    #[test]
    fn re_registration_replaces() {
        let mut registry = ProtocolRegistry::new();
        registry.register_http1_client("default", Arc::new(StubFactory));
        registry.register_http1_client("default", Arc::new(StubFactory));
        assert!(registry.http1_client("default").is_some());
    }
}
