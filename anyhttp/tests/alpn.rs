//! ALPN-multiplexed factory selection: one listener endpoint serving both
//! HTTP/2 and HTTP/1.1, instantiating the engine the handshake settled on.

use std::sync::Arc;

use anyhttp::{
    AlpnFactory, Error, Handshake, Http1ServerFactory, Http2ServerFactory, HttpOverTcpFactory,
};

fn mux() -> AlpnFactory {
    AlpnFactory::new(vec![
        Arc::new(Http2ServerFactory),
        Arc::new(Http1ServerFactory),
    ])
}

#[test]
fn advertises_children_in_preference_order() {
    assert_eq!(
        mux().alpn_protocols(),
        vec![b"h2".to_vec(), b"http/1.1".to_vec()]
    );
}

#[test]
fn negotiated_h2_instantiates_the_http2_engine() {
    let handshake = Handshake::tls("TLSv1.3", Some(b"h2".to_vec()));
    let proto = mux().create(&handshake).unwrap();
    assert_eq!(proto.http_version(), "h2");
    assert!(proto.multiplexed());
}

#[test]
fn negotiated_http1_instantiates_the_http1_engine() {
    let handshake = Handshake::tls("TLSv1.3", Some(b"http/1.1".to_vec()));
    let proto = mux().create(&handshake).unwrap();
    assert_eq!(proto.http_version(), "http/1.1");
    assert!(!proto.multiplexed());
}

#[test]
fn no_alpn_falls_back_to_the_first_child() {
    let proto = mux().create(&Handshake::plaintext()).unwrap();
    assert_eq!(proto.http_version(), "h2");
}

#[test]
fn unsupported_token_fails_the_connection() {
    let handshake = Handshake::tls("TLSv1.3", Some(b"spdy/3".to_vec()));
    assert!(matches!(mux().create(&handshake), Err(Error::Protocol(_))));
}
