//! End-to-end HTTP/3: a client and a server engine exchange QUIC
//! datagrams purely in memory, with the test advancing a synthetic clock
//! so handshake and retransmit timers fire deterministically.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhttp::{
    ClientTlsConfig, ErrorKind, Event, HeaderField, Http3ClientFactory, Http3ServerFactory,
    HttpOverQuicClientFactory, HttpOverQuicProtocol, HttpOverQuicServerFactory, ServerTlsConfig,
};
use rustls::RootCertStore;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

const CLIENT_ADDR: &str = "127.0.0.1:40000";
const SERVER_ADDR: &str = "127.0.0.1:4433";

fn self_signed() -> (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>) {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let key = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());
    (vec![CertificateDer::from(cert.cert)], key.into())
}

struct Pair {
    client: Box<dyn HttpOverQuicProtocol>,
    server: Box<dyn HttpOverQuicProtocol>,
    client_addr: SocketAddr,
    server_addr: SocketAddr,
    now: Instant,
}

impl Pair {
    fn new() -> Self {
        let (certs, key) = self_signed();
        let mut roots = RootCertStore::empty();
        roots.add(certs[0].clone()).unwrap();

        let server_tls = ServerTlsConfig::new(certs, key);
        let client_tls = ClientTlsConfig::new(roots);

        let client_addr: SocketAddr = CLIENT_ADDR.parse().unwrap();
        let server_addr: SocketAddr = SERVER_ADDR.parse().unwrap();

        let client = Http3ClientFactory
            .create(server_addr, "localhost", &client_tls)
            .unwrap();
        let server = Http3ServerFactory.create(client_addr, &server_tls).unwrap();

        let mut pair = Self {
            client,
            server,
            client_addr,
            server_addr,
            now: Instant::now(),
        };
        pair.client.clock(pair.now);
        pair.server.clock(pair.now);
        pair
    }

    /// Shuttle datagrams both ways until the pair goes quiet, advancing
    /// the clock along engine timers while idle.
    fn drive(&mut self) {
        let mut idle_rounds = 0;
        for _ in 0..500 {
            self.client.clock(self.now);
            self.server.clock(self.now);

            let mut progressed = false;
            for (payload, _destination) in self.client.datagrams_to_send() {
                progressed = true;
                self.server.datagram_received((payload, self.client_addr));
            }
            for (payload, _destination) in self.server.datagrams_to_send() {
                progressed = true;
                self.client.datagram_received((payload, self.server_addr));
            }

            if progressed {
                idle_rounds = 0;
                continue;
            }
            idle_rounds += 1;
            if idle_rounds > 3 {
                break;
            }
            // Nothing in flight: jump to the next engine timer.
            let deadline = [self.client.get_timer(), self.server.get_timer()]
                .into_iter()
                .flatten()
                .min();
            self.now = match deadline {
                Some(deadline) if deadline > self.now => deadline,
                _ => self.now + Duration::from_millis(10),
            };
        }
    }

    fn client_events(&mut self) -> Vec<Event> {
        std::iter::from_fn(|| self.client.next_event()).collect()
    }

    fn server_events(&mut self) -> Vec<Event> {
        std::iter::from_fn(|| self.server.next_event()).collect()
    }
}

fn get_request() -> Vec<HeaderField> {
    vec![
        HeaderField::new(b":method", b"GET"),
        HeaderField::new(b":scheme", b"https"),
        HeaderField::new(b":authority", b"localhost"),
        HeaderField::new(b":path", b"/"),
    ]
}

#[test]
fn request_response_with_three_data_frames() {
    let mut pair = Pair::new();

    let stream_id = pair.client.get_available_stream_id().unwrap();
    assert_eq!(stream_id, 0);
    pair.client
        .submit_headers(stream_id, &get_request(), true)
        .unwrap();
    pair.drive();

    let events = pair.server_events();
    let request = events
        .iter()
        .find(|event| matches!(event, Event::HeadersReceived { .. }))
        .expect("request headers");
    match request {
        Event::HeadersReceived {
            stream_id,
            headers,
            end_stream,
        } => {
            assert_eq!(*stream_id, 0);
            assert!(*end_stream);
            assert_eq!(headers[0], HeaderField::new(b":method", b"GET"));
            assert_eq!(headers[3], HeaderField::new(b":path", b"/"));
        }
        _ => unreachable!(),
    }

    pair.server
        .submit_headers(0, &[HeaderField::new(b":status", b"200")], false)
        .unwrap();
    pair.server.submit_data(0, &[0x61; 10], false).unwrap();
    pair.server.submit_data(0, &[0x62; 10], false).unwrap();
    pair.server.submit_data(0, &[0x63; 10], true).unwrap();
    pair.drive();

    let events = pair.client_events();
    assert!(matches!(
        &events[0],
        Event::HeadersReceived {
            stream_id: 0,
            end_stream: false,
            ..
        }
    ));
    let data_events: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            Event::DataReceived {
                data, end_stream, ..
            } => Some((data.clone(), *end_stream)),
            _ => None,
        })
        .collect();
    assert_eq!(data_events.len(), 3);
    assert_eq!(data_events[0], ([0x61; 10].to_vec(), false));
    assert_eq!(data_events[1], ([0x62; 10].to_vec(), false));
    assert_eq!(data_events[2], ([0x63; 10].to_vec(), true));
}

#[test]
fn stream_ids_follow_quic_parity() {
    let mut pair = Pair::new();
    let first = pair.client.get_available_stream_id().unwrap();
    let second = pair.client.get_available_stream_id().unwrap();
    let third = pair.client.get_available_stream_id().unwrap();
    assert_eq!((first, second, third), (0, 4, 8));
}

#[test]
fn client_reset_reaches_the_server() {
    let mut pair = Pair::new();

    let stream_id = pair.client.get_available_stream_id().unwrap();
    pair.client
        .submit_headers(stream_id, &get_request(), false)
        .unwrap();
    pair.drive();
    let _ = pair.server_events();

    pair.client
        .submit_stream_reset(stream_id, ErrorKind::Cancel)
        .unwrap();
    pair.drive();

    let events = pair.client_events();
    assert!(matches!(
        events[0],
        Event::StreamResetSent {
            stream_id: 0,
            error_code: ErrorKind::Cancel,
        }
    ));
    let events = pair.server_events();
    assert!(events.iter().any(|event| matches!(
        event,
        Event::StreamResetReceived {
            stream_id: 0,
            error_code: ErrorKind::Cancel,
        }
    )));

    assert!(pair.client.submit_data(stream_id, b"late", false).is_err());
}

#[test]
fn close_terminates_both_ends() {
    let mut pair = Pair::new();

    let stream_id = pair.client.get_available_stream_id().unwrap();
    pair.client
        .submit_headers(stream_id, &get_request(), true)
        .unwrap();
    pair.drive();
    let _ = pair.server_events();
    pair.server
        .submit_headers(0, &[HeaderField::new(b":status", b"204")], true)
        .unwrap();
    pair.drive();
    let _ = pair.client_events();

    pair.server.submit_close(ErrorKind::NoError).unwrap();
    assert!(!pair.server.is_available());
    pair.drive();

    let events = pair.client_events();
    assert!(events.iter().any(|event| matches!(
        event,
        Event::ConnectionTerminated {
            error_code: ErrorKind::NoError,
            ..
        }
    )));
    assert!(pair.client.get_available_stream_id().is_err());
}

#[test]
fn connection_ids_are_exposed_after_the_handshake() {
    let mut pair = Pair::new();
    let stream_id = pair.client.get_available_stream_id().unwrap();
    pair.client
        .submit_headers(stream_id, &get_request(), true)
        .unwrap();
    pair.drive();

    let client_cids = pair.client.connection_ids();
    let server_cids = pair.server.connection_ids();
    assert!(!client_cids.is_empty());
    assert!(!server_cids.is_empty());
    for cid in client_cids.iter().chain(&server_cids) {
        assert_eq!(cid.len(), 8);
    }
}
