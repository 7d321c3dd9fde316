//! End-to-end scenarios over the byte-oriented engines: paired client and
//! server instances drive each other's `bytes_received` with the other's
//! `bytes_to_send` output. No sockets anywhere.

use anyhttp::{
    ErrorKind, Event, Handshake, HeaderField, HttpOverTcpProtocol, default_registry,
};

fn pump(a: &mut dyn HttpOverTcpProtocol, b: &mut dyn HttpOverTcpProtocol) {
    loop {
        let a_out = a.bytes_to_send();
        let b_out = b.bytes_to_send();
        if a_out.is_empty() && b_out.is_empty() {
            break;
        }
        b.bytes_received(&a_out);
        a.bytes_received(&b_out);
    }
}

fn drain(proto: &mut dyn HttpOverTcpProtocol) -> Vec<Event> {
    std::iter::from_fn(|| proto.next_event()).collect()
}

fn h1_pair() -> (Box<dyn HttpOverTcpProtocol>, Box<dyn HttpOverTcpProtocol>) {
    let registry = default_registry();
    let handshake = Handshake::plaintext();
    let client = registry
        .http1_client("default")
        .unwrap()
        .create(&handshake)
        .unwrap();
    let server = registry
        .http1_server("default")
        .unwrap()
        .create(&handshake)
        .unwrap();
    (client, server)
}

fn h2_pair() -> (Box<dyn HttpOverTcpProtocol>, Box<dyn HttpOverTcpProtocol>) {
    let registry = default_registry();
    let handshake = Handshake::tls("TLSv1.3", Some(b"h2".to_vec()));
    let mut client = registry
        .http2_client("default")
        .unwrap()
        .create(&handshake)
        .unwrap();
    let mut server = registry
        .http2_server("default")
        .unwrap()
        .create(&handshake)
        .unwrap();
    pump(client.as_mut(), server.as_mut());
    (client, server)
}

fn get_request(scheme: &str) -> Vec<HeaderField> {
    vec![
        HeaderField::new(b":method", b"GET"),
        HeaderField::new(b":scheme", scheme.as_bytes()),
        HeaderField::new(b":authority", b"example.test"),
        HeaderField::new(b":path", b"/"),
    ]
}

#[test]
fn http1_get_exchange() {
    let (mut client, mut server) = h1_pair();
    assert_eq!(client.http_version(), "http/1.1");
    assert!(!client.multiplexed());

    let stream_id = client.get_available_stream_id().unwrap();
    assert_eq!(stream_id, 1);
    client
        .submit_headers(stream_id, &get_request("http"), true)
        .unwrap();
    pump(client.as_mut(), server.as_mut());

    let events = drain(server.as_mut());
    match &events[0] {
        Event::HeadersReceived {
            stream_id,
            headers,
            end_stream,
        } => {
            assert_eq!(*stream_id, 1);
            assert!(*end_stream);
            assert_eq!(headers[0], HeaderField::new(b":method", b"GET"));
            assert_eq!(headers[2], HeaderField::new(b":authority", b"example.test"));
        }
        other => panic!("expected HeadersReceived, got {other:?}"),
    }

    server
        .submit_headers(
            1,
            &[
                HeaderField::new(b":status", b"200"),
                HeaderField::new(b"content-length", b"2"),
            ],
            false,
        )
        .unwrap();
    server.submit_data(1, b"hi", true).unwrap();
    pump(client.as_mut(), server.as_mut());

    let events = drain(client.as_mut());
    assert!(matches!(
        &events[0],
        Event::HeadersReceived { end_stream: false, .. }
    ));
    match &events[1] {
        Event::DataReceived {
            data, end_stream, ..
        } => {
            assert_eq!(data, b"hi");
            assert!(*end_stream);
        }
        other => panic!("expected DataReceived, got {other:?}"),
    }

    // The connection is reusable again on both ends.
    assert!(client.is_available());
    assert!(server.is_available());
}

#[test]
fn http2_concurrent_streams_answered_out_of_order() {
    let (mut client, mut server) = h2_pair();
    assert_eq!(client.http_version(), "h2");
    assert!(client.multiplexed());

    let first = client.get_available_stream_id().unwrap();
    let second = client.get_available_stream_id().unwrap();
    assert_eq!((first, second), (1, 3));

    client
        .submit_headers(first, &get_request("https"), true)
        .unwrap();
    client
        .submit_headers(second, &get_request("https"), true)
        .unwrap();
    pump(client.as_mut(), server.as_mut());

    let request_ids: Vec<_> = drain(server.as_mut())
        .iter()
        .filter_map(Event::stream_id)
        .collect();
    assert_eq!(request_ids, vec![1, 3]);

    // Responses land in the order the server sent them, 3 before 1.
    server
        .submit_headers(second, &[HeaderField::new(b":status", b"200")], true)
        .unwrap();
    server
        .submit_headers(first, &[HeaderField::new(b":status", b"200")], true)
        .unwrap();
    pump(client.as_mut(), server.as_mut());

    let response_ids: Vec<_> = drain(client.as_mut())
        .iter()
        .filter_map(Event::stream_id)
        .collect();
    assert_eq!(response_ids, vec![3, 1]);
}

#[test]
fn http2_reset_stream_retires_the_id() {
    let (mut client, mut server) = h2_pair();

    let stream_id = client.get_available_stream_id().unwrap();
    client
        .submit_headers(stream_id, &get_request("https"), false)
        .unwrap();
    pump(client.as_mut(), server.as_mut());
    let _ = drain(server.as_mut());

    server
        .submit_stream_reset(stream_id, ErrorKind::Cancel)
        .unwrap();
    pump(client.as_mut(), server.as_mut());

    let events = drain(client.as_mut());
    assert!(matches!(
        events[0],
        Event::StreamResetReceived {
            stream_id: 1,
            error_code: ErrorKind::Cancel,
        }
    ));
    assert!(client.submit_data(stream_id, b"more", false).is_err());
}

#[test]
fn http2_goaway_after_completed_exchange() {
    let (mut client, mut server) = h2_pair();

    let stream_id = client.get_available_stream_id().unwrap();
    client
        .submit_headers(stream_id, &get_request("https"), true)
        .unwrap();
    pump(client.as_mut(), server.as_mut());
    let _ = drain(server.as_mut());
    server
        .submit_headers(stream_id, &[HeaderField::new(b":status", b"204")], true)
        .unwrap();
    server.submit_close(ErrorKind::NoError).unwrap();
    pump(client.as_mut(), server.as_mut());

    let events = drain(client.as_mut());
    assert!(events.iter().any(|event| matches!(
        event,
        Event::GoawayReceived {
            last_stream_id: 1,
            error_code: ErrorKind::NoError,
        }
    )));
    assert!(client.get_available_stream_id().is_err());
}

#[test]
fn terminal_event_is_final_for_both_versions() {
    for (mut client, _server) in [h1_pair(), h2_pair()] {
        client.connection_lost(Some("carrier lost".into()));
        let events = drain(client.as_mut());
        assert!(matches!(
            events.last().unwrap(),
            Event::ConnectionTerminated {
                error_code: ErrorKind::InternalError,
                ..
            }
        ));
        for _ in 0..8 {
            assert!(client.next_event().is_none());
        }
        assert!(client.submit_data(1, b"x", false).is_err());
        assert!(client.has_expired());
    }
}

#[test]
fn submission_order_is_preserved_in_output() {
    let (mut client, mut server) = h2_pair();
    let first = client.get_available_stream_id().unwrap();
    let second = client.get_available_stream_id().unwrap();

    // Interleave actions across streams; arrival order must match.
    client
        .submit_headers(first, &get_request("https"), false)
        .unwrap();
    client
        .submit_headers(second, &get_request("https"), false)
        .unwrap();
    client.submit_data(second, b"b", true).unwrap();
    client.submit_data(first, b"a", true).unwrap();
    pump(client.as_mut(), server.as_mut());

    let order: Vec<_> = drain(server.as_mut())
        .iter()
        .map(|event| (event.stream_id().unwrap(), event.ends_stream()))
        .collect();
    assert_eq!(order, vec![(1, false), (3, false), (3, true), (1, true)]);
}
