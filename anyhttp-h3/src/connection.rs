//! HTTP/3 connection state machine over the quinn-proto QUIC engine.
//!
//! Each [`Http3Protocol`] owns a private `quinn_proto::Endpoint` hosting
//! exactly one connection, so the instance is a self-contained datagram
//! state machine: feed datagrams with `datagram_received()`, drive timers
//! with `clock()`, drain packets with `datagrams_to_send()` and events
//! with `next_event()`. TLS runs inside QUIC; there is no separate
//! handshake surface.
//!
//! Request/response streams are QUIC bidirectional streams and keep their
//! numeric QUIC id as the common stream id. The control stream and QPACK
//! streams are managed internally and never surfaced.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use quinn_proto::{
    ClientConfig, Connection, ConnectionError, ConnectionHandle, ConnectionId,
    ConnectionIdGenerator, DatagramEvent, Dir, Endpoint, EndpointConfig, Event as QuicEvent,
    RandomConnectionIdGenerator, ReadError, ServerConfig, StreamEvent,
    StreamId as QuicStreamId, VarInt, WriteError,
};

use anyhttp_core::error::HTTP3_ERROR_CODES;
use anyhttp_core::{
    ConnectionInfo, Datagram, Error, ErrorCodes, ErrorKind, Event, HeaderField, HttpProtocol,
    QuicTransport, Role, StreamId,
};

use crate::error::H3Error;
use crate::qpack;
use crate::settings::Settings;
use crate::stream::RequestStream;
use crate::wire::{
    self, Frame, STREAM_TYPE_CONTROL, STREAM_TYPE_QPACK_DECODER, STREAM_TYPE_QPACK_ENCODER,
};

/// Connection-id length issued by the embedded endpoint.
pub(crate) const CID_LEN: usize = 8;

/// QUIC versions the embedded endpoint accepts.
pub(crate) const SUPPORTED_QUIC_VERSIONS: [u32; 1] = [0x0000_0001];

/// H3_STREAM_CREATION_ERROR, for streams the peer may not open.
const STREAM_CREATION_ERROR: u32 = 0x103;

/// Records every connection id the endpoint issues, so the engine can
/// expose them for packet routing.
struct RecordingCidGenerator {
    inner: RandomConnectionIdGenerator,
    issued: Arc<Mutex<BTreeSet<Vec<u8>>>>,
}

impl ConnectionIdGenerator for RecordingCidGenerator {
    fn generate_cid(&mut self) -> ConnectionId {
        let cid = self.inner.generate_cid();
        if let Ok(mut issued) = self.issued.lock() {
            issued.insert(cid.to_vec());
        }
        cid
    }

    fn cid_len(&self) -> usize {
        self.inner.cid_len()
    }

    fn cid_lifetime(&self) -> Option<Duration> {
        self.inner.cid_lifetime()
    }
}

/// A sans-IO HTTP/3 client or server connection.
pub struct Http3Protocol {
    role: Role,
    endpoint: Endpoint,
    handle: Option<ConnectionHandle>,
    conn: Option<Connection>,
    /// Client configuration for the lazy connect on first use.
    client_config: Option<ClientConfig>,
    remote: SocketAddr,
    server_name: String,

    /// Engine clock, advanced only by `clock()`.
    now: Option<Instant>,
    /// Cached `poll_timeout`, refreshed whenever the connection runs.
    timer: Option<Instant>,
    connected: bool,

    local_settings: Settings,
    remote_settings: Option<Settings>,

    /// Request/response streams by their wire stream id.
    requests: HashMap<u64, RequestStream>,
    /// Client: ids allocated but not yet opened on the wire, in order.
    pending_open: VecDeque<u64>,
    /// Client: next bidirectional stream id (0, 4, 8, ...).
    next_request_id: u64,
    /// Server: highest client request stream seen, for GOAWAY.
    highest_peer_request: u64,

    /// Our control stream and bytes waiting to go out on it.
    control_out: Option<QuicStreamId>,
    control_send: Vec<u8>,
    /// The peer's control stream and its partial frame data.
    control_in: Option<QuicStreamId>,
    control_recv: Vec<u8>,

    /// Incoming unidirectional streams whose type varint is still
    /// incomplete.
    uni_pending: HashMap<u64, Vec<u8>>,
    /// Unidirectional streams read and discarded (QPACK, unknown types).
    uni_discard: HashSet<u64>,

    events: VecDeque<Event>,
    out_packets: VecDeque<Datagram>,

    /// Close requested; applied on the next pump.
    pending_close: Option<(u64, String)>,
    /// Neutral kind to report when quinn confirms our own close.
    closing_kind: Option<ErrorKind>,

    goaway_sent: bool,
    goaway_received: bool,
    terminated: bool,

    /// Connection ids issued by the endpoint, shared with its generator.
    cids: Arc<Mutex<BTreeSet<Vec<u8>>>>,

    transmit_buf: Vec<u8>,
    response_buf: Vec<u8>,

    info: ConnectionInfo,
}

fn endpoint_config(cids: &Arc<Mutex<BTreeSet<Vec<u8>>>>) -> EndpointConfig {
    let mut config = EndpointConfig::default();
    let issued = cids.clone();
    config.cid_generator(move || {
        Box::new(RecordingCidGenerator {
            inner: RandomConnectionIdGenerator::new(CID_LEN),
            issued: issued.clone(),
        })
    });
    config
}

impl Http3Protocol {
    /// Client-side connection toward `remote`, connecting lazily once the
    /// clock is set.
    pub fn client(
        config: ClientConfig,
        remote: SocketAddr,
        server_name: impl Into<String>,
    ) -> Self {
        let cids = Arc::new(Mutex::new(BTreeSet::new()));
        let endpoint = Endpoint::new(Arc::new(endpoint_config(&cids)), None, true, None);
        Self::with_endpoint(Role::Client, endpoint, Some(config), remote, server_name.into(), cids)
    }

    /// Server-side connection for the peer whose Initial packet arrived
    /// from `remote`.
    pub fn server(config: Arc<ServerConfig>, remote: SocketAddr) -> Self {
        let cids = Arc::new(Mutex::new(BTreeSet::new()));
        let endpoint = Endpoint::new(Arc::new(endpoint_config(&cids)), Some(config), true, None);
        Self::with_endpoint(Role::Server, endpoint, None, remote, String::new(), cids)
    }

    fn with_endpoint(
        role: Role,
        endpoint: Endpoint,
        client_config: Option<ClientConfig>,
        remote: SocketAddr,
        server_name: String,
        cids: Arc<Mutex<BTreeSet<Vec<u8>>>>,
    ) -> Self {
        let mut info = ConnectionInfo::default();
        info.remote_address = Some(remote);
        Self {
            role,
            endpoint,
            handle: None,
            conn: None,
            client_config,
            remote,
            server_name,
            now: None,
            timer: None,
            connected: false,
            local_settings: Settings::default(),
            remote_settings: None,
            requests: HashMap::new(),
            pending_open: VecDeque::new(),
            next_request_id: 0,
            highest_peer_request: 0,
            control_out: None,
            control_send: Vec::new(),
            control_in: None,
            control_recv: Vec::new(),
            uni_pending: HashMap::new(),
            uni_discard: HashSet::new(),
            events: VecDeque::new(),
            out_packets: VecDeque::new(),
            pending_close: None,
            closing_kind: None,
            goaway_sent: false,
            goaway_received: false,
            terminated: false,
            cids,
            transmit_buf: Vec::with_capacity(1500),
            response_buf: Vec::with_capacity(1500),
            info,
        }
    }

    // ── Termination ─────────────────────────────────────────────────

    fn push_event(&mut self, event: Event) {
        if !self.terminated {
            self.events.push_back(event);
        }
    }

    fn terminate(&mut self, error_code: ErrorKind, message: Option<String>) {
        if self.terminated {
            return;
        }
        self.events.push_back(Event::ConnectionTerminated {
            error_code,
            message,
        });
        self.terminated = true;
    }

    /// Fatal HTTP/3 error: close the QUIC connection with the mapped
    /// application code and emit the terminal event.
    fn connection_error(&mut self, error: H3Error) {
        if self.terminated {
            return;
        }
        self.pending_close = Some((error.wire_code(), error.to_string()));
        self.terminate(ErrorKind::ProtocolError, Some(error.to_string()));
    }

    // ── Connection driving ──────────────────────────────────────────

    fn ensure_connected(&mut self) -> Result<(), Error> {
        if self.conn.is_some() {
            return Ok(());
        }
        match self.role {
            Role::Server => Err(Error::Misuse(
                "no datagram has been received from the client yet".into(),
            )),
            Role::Client => {
                let Some(now) = self.now else {
                    return Err(Error::Misuse("the clock has not been set".into()));
                };
                let config = self
                    .client_config
                    .clone()
                    .ok_or_else(|| Error::Internal("client configuration missing".into()))?;
                let (handle, conn) = self
                    .endpoint
                    .connect(now, config, self.remote, &self.server_name)
                    .map_err(|error| Error::Internal(error.to_string()))?;
                self.handle = Some(handle);
                self.conn = Some(conn);
                Ok(())
            }
        }
    }

    /// Run the QUIC machinery: shuttle events between endpoint and
    /// connection, surface application events, flush stream buffers,
    /// apply a pending close and collect outgoing packets.
    fn pump(&mut self) {
        let Some(now) = self.now else { return };
        let Some(handle) = self.handle else { return };
        let Some(mut conn) = self.conn.take() else { return };

        loop {
            let mut progressed = false;
            while let Some(endpoint_event) = conn.poll_endpoint_events() {
                progressed = true;
                if let Some(conn_event) = self.endpoint.handle_event(handle, endpoint_event) {
                    conn.handle_event(conn_event);
                }
            }
            while let Some(event) = conn.poll() {
                progressed = true;
                self.handle_quic_event(&mut conn, event);
            }
            if !progressed {
                break;
            }
        }

        self.flush_control(&mut conn);
        self.flush_streams(&mut conn);

        if let Some((code, reason)) = self.pending_close.take() {
            let code = VarInt::from_u64(code).unwrap_or(VarInt::from_u32(0));
            conn.close(now, code, Bytes::from(reason.into_bytes()));
            while let Some(event) = conn.poll() {
                self.handle_quic_event(&mut conn, event);
            }
        }

        self.collect_transmits(&mut conn, now);
        while let Some(endpoint_event) = conn.poll_endpoint_events() {
            if let Some(conn_event) = self.endpoint.handle_event(handle, endpoint_event) {
                conn.handle_event(conn_event);
            }
        }
        self.collect_transmits(&mut conn, now);

        self.timer = conn.poll_timeout();
        self.conn = Some(conn);
    }

    fn collect_transmits(&mut self, conn: &mut Connection, now: Instant) {
        loop {
            self.transmit_buf.clear();
            match conn.poll_transmit(now, 1, &mut self.transmit_buf) {
                Some(transmit) => {
                    self.out_packets.push_back((
                        self.transmit_buf[..transmit.size].to_vec(),
                        transmit.destination,
                    ));
                }
                None => break,
            }
        }
    }

    fn handle_quic_event(&mut self, conn: &mut Connection, event: QuicEvent) {
        match event {
            QuicEvent::Connected => {
                self.connected = true;
                self.open_control(conn);
                self.open_pending_requests(conn);
            }
            QuicEvent::ConnectionLost { reason } => self.handle_connection_lost(reason),
            QuicEvent::Stream(StreamEvent::Opened { dir }) => loop {
                let Some(quic_id) = conn.streams().accept(dir) else {
                    break;
                };
                self.handle_new_peer_stream(conn, quic_id, dir);
            },
            QuicEvent::Stream(StreamEvent::Readable { id }) => self.route_readable(conn, id),
            QuicEvent::Stream(StreamEvent::Writable { id }) => {
                self.flush_one(conn, u64::from(id));
            }
            QuicEvent::Stream(StreamEvent::Available { dir }) => {
                if dir == Dir::Bi {
                    self.open_pending_requests(conn);
                } else {
                    self.open_control(conn);
                }
            }
            QuicEvent::Stream(StreamEvent::Stopped { id, error_code }) => {
                let stream_id = u64::from(id);
                if let Some(entry) = self.requests.get_mut(&stream_id)
                    && !entry.reset
                {
                    entry.reset = true;
                    entry.send_closed = true;
                    entry.send_buf.clear();
                    self.push_event(Event::StreamResetReceived {
                        stream_id,
                        error_code: HTTP3_ERROR_CODES.kind(error_code.into_inner()),
                    });
                }
            }
            QuicEvent::Stream(StreamEvent::Finished { .. }) => {}
            QuicEvent::HandshakeDataReady
            | QuicEvent::DatagramReceived
            | QuicEvent::DatagramsUnblocked => {}
        }
    }

    fn handle_connection_lost(&mut self, reason: ConnectionError) {
        if self.terminated {
            return;
        }
        let (kind, message) = match reason {
            ConnectionError::ApplicationClosed(close) => (
                HTTP3_ERROR_CODES.kind(close.error_code.into_inner()),
                Some(String::from_utf8_lossy(&close.reason).into_owned()),
            ),
            ConnectionError::LocallyClosed => {
                (self.closing_kind.take().unwrap_or(ErrorKind::NoError), None)
            }
            ConnectionError::TimedOut => {
                (ErrorKind::InternalError, Some("idle timeout".into()))
            }
            other => (ErrorKind::ProtocolError, Some(other.to_string())),
        };
        self.terminate(kind, message);
    }

    fn handle_new_peer_stream(&mut self, conn: &mut Connection, quic_id: QuicStreamId, dir: Dir) {
        if dir == Dir::Bi {
            if self.role == Role::Server {
                let stream_id = u64::from(quic_id);
                self.highest_peer_request = self.highest_peer_request.max(stream_id);
                self.requests
                    .insert(stream_id, RequestStream::opened(quic_id));
                // Data may have arrived in the packet that opened the
                // stream; quinn will not signal Readable separately.
                self.read_request_stream(conn, quic_id);
            } else {
                // A server must not open bidirectional streams.
                let _ = conn
                    .recv_stream(quic_id)
                    .stop(VarInt::from_u32(STREAM_CREATION_ERROR));
            }
        } else {
            self.uni_pending.insert(u64::from(quic_id), Vec::new());
            self.read_uni_stream(conn, quic_id);
        }
    }

    // ── Our control stream ──────────────────────────────────────────

    fn open_control(&mut self, conn: &mut Connection) {
        if !self.connected || self.control_out.is_some() {
            return;
        }
        let Some(quic_id) = conn.streams().open(Dir::Uni) else {
            return;
        };
        self.control_out = Some(quic_id);
        let mut preamble = Vec::new();
        wire::put_varint(&mut preamble, STREAM_TYPE_CONTROL);
        Frame::Settings(self.local_settings.clone()).encode(&mut preamble);
        // Anything queued before the stream existed goes after SETTINGS.
        preamble.append(&mut self.control_send);
        self.control_send = preamble;
        self.flush_control(conn);
    }

    fn flush_control(&mut self, conn: &mut Connection) {
        let Some(quic_id) = self.control_out else {
            return;
        };
        if self.control_send.is_empty() {
            return;
        }
        match conn.send_stream(quic_id).write(&self.control_send) {
            Ok(written) => {
                self.control_send.drain(..written);
            }
            Err(WriteError::Blocked) => {}
            Err(_) => self.control_send.clear(),
        }
        // The control stream is never finished: closing it is a
        // connection error for the peer (RFC 9114 section 6.2.1).
    }

    // ── Incoming streams ────────────────────────────────────────────

    fn route_readable(&mut self, conn: &mut Connection, quic_id: QuicStreamId) {
        let key = u64::from(quic_id);
        if self.control_in == Some(quic_id) {
            self.read_control_stream(conn, quic_id);
        } else if self.uni_pending.contains_key(&key) || self.uni_discard.contains(&key) {
            self.read_uni_stream(conn, quic_id);
        } else if self.requests.contains_key(&key) {
            self.read_request_stream(conn, quic_id);
        }
    }

    /// Pull everything currently readable from a stream.
    fn read_chunks(
        conn: &mut Connection,
        quic_id: QuicStreamId,
    ) -> (Vec<u8>, bool, Option<u64>) {
        let mut data = Vec::new();
        let mut fin = false;
        let mut reset = None;
        let mut recv = conn.recv_stream(quic_id);
        if let Ok(mut chunks) = recv.read(true) {
            loop {
                match chunks.next(usize::MAX) {
                    Ok(Some(chunk)) => data.extend_from_slice(&chunk.bytes),
                    Ok(None) => {
                        fin = true;
                        break;
                    }
                    Err(ReadError::Blocked) => break,
                    Err(ReadError::Reset(code)) => {
                        reset = Some(code.into_inner());
                        break;
                    }
                }
            }
            let _ = chunks.finalize();
        }
        (data, fin, reset)
    }

    fn read_uni_stream(&mut self, conn: &mut Connection, quic_id: QuicStreamId) {
        let key = u64::from(quic_id);
        let (data, fin, reset) = Self::read_chunks(conn, quic_id);
        if reset.is_some() {
            // A reset unidirectional stream is simply forgotten.
            self.uni_pending.remove(&key);
            self.uni_discard.remove(&key);
            return;
        }
        if self.uni_discard.contains(&key) {
            // QPACK or unknown stream type: drain and drop.
            if fin {
                self.uni_discard.remove(&key);
            }
            return;
        }

        let Some(buffered) = self.uni_pending.get_mut(&key) else {
            return;
        };
        buffered.extend_from_slice(&data);

        let mut pos = 0;
        let Some(stream_type) = wire::get_varint(buffered, &mut pos) else {
            if fin {
                self.uni_pending.remove(&key);
            }
            return;
        };
        let rest = buffered[pos..].to_vec();
        self.uni_pending.remove(&key);

        match stream_type {
            STREAM_TYPE_CONTROL => {
                if self.control_in.is_some() {
                    // A second control stream is a connection error.
                    self.connection_error(H3Error::FrameUnexpected);
                    return;
                }
                self.control_in = Some(quic_id);
                self.control_recv = rest;
                if fin {
                    self.connection_error(H3Error::ClosedCriticalStream);
                    return;
                }
                self.process_control_frames();
            }
            STREAM_TYPE_QPACK_ENCODER | STREAM_TYPE_QPACK_DECODER => {
                // Static-table QPACK: accepted, contents ignored.
                if !fin {
                    self.uni_discard.insert(key);
                }
            }
            _ => {
                // Unknown unidirectional stream types MUST be ignored.
                if !fin {
                    self.uni_discard.insert(key);
                }
            }
        }
    }

    fn read_control_stream(&mut self, conn: &mut Connection, quic_id: QuicStreamId) {
        let (data, fin, reset) = Self::read_chunks(conn, quic_id);
        self.control_recv.extend_from_slice(&data);
        if reset.is_some() || fin {
            self.connection_error(H3Error::ClosedCriticalStream);
            return;
        }
        self.process_control_frames();
    }

    fn process_control_frames(&mut self) {
        loop {
            match wire::decode_frame(&self.control_recv) {
                Ok(Some((frame, consumed))) => {
                    self.control_recv.drain(..consumed);
                    match frame {
                        Frame::Settings(settings) => {
                            if self.remote_settings.is_some() {
                                self.connection_error(H3Error::FrameUnexpected);
                                return;
                            }
                            self.remote_settings = Some(settings);
                        }
                        Frame::Goaway { stream_id } => {
                            if self.remote_settings.is_none() {
                                self.connection_error(H3Error::MissingSettings);
                                return;
                            }
                            self.goaway_received = true;
                            self.push_event(Event::GoawayReceived {
                                last_stream_id: stream_id,
                                error_code: ErrorKind::NoError,
                            });
                        }
                        Frame::Data { .. } | Frame::Headers { .. } => {
                            self.connection_error(H3Error::FrameUnexpected);
                            return;
                        }
                        Frame::Unknown { .. } => {
                            if self.remote_settings.is_none() {
                                // The first control frame must be SETTINGS.
                                self.connection_error(H3Error::MissingSettings);
                                return;
                            }
                        }
                    }
                }
                Ok(None) => break,
                Err(error) => {
                    self.connection_error(error);
                    break;
                }
            }
        }
    }

    fn read_request_stream(&mut self, conn: &mut Connection, quic_id: QuicStreamId) {
        let stream_id = u64::from(quic_id);
        let (data, fin, reset) = Self::read_chunks(conn, quic_id);

        if let Some(code) = reset {
            if let Some(entry) = self.requests.get_mut(&stream_id)
                && !entry.reset
            {
                entry.reset = true;
                self.push_event(Event::StreamResetReceived {
                    stream_id,
                    error_code: HTTP3_ERROR_CODES.kind(code),
                });
            }
            return;
        }

        let Some(entry) = self.requests.get_mut(&stream_id) else {
            return;
        };
        entry.recv_buf.extend_from_slice(&data);
        if fin {
            entry.fin_received = true;
        }
        self.parse_request_frames(stream_id);
    }

    fn parse_request_frames(&mut self, stream_id: u64) {
        let Some(entry) = self.requests.get_mut(&stream_id) else {
            return;
        };
        let fin = entry.fin_received;
        let mut buf = std::mem::take(&mut entry.recv_buf);
        let mut headers_received = entry.headers_received;
        let mut recv_closed = entry.recv_closed;

        let mut pending = Vec::new();
        let mut error = None;
        let mut offset = 0;

        while offset < buf.len() {
            match wire::decode_frame(&buf[offset..]) {
                Ok(Some((frame, consumed))) => {
                    offset += consumed;
                    let at_end = fin && offset == buf.len();
                    match frame {
                        Frame::Headers { block } => match qpack::decode(&block) {
                            Ok(headers) => {
                                headers_received = true;
                                recv_closed |= at_end;
                                pending.push(Event::HeadersReceived {
                                    stream_id,
                                    headers,
                                    end_stream: at_end,
                                });
                            }
                            Err(decode_error) => {
                                error = Some(decode_error);
                                break;
                            }
                        },
                        Frame::Data { payload } => {
                            if !headers_received {
                                error = Some(H3Error::FrameUnexpected);
                                break;
                            }
                            recv_closed |= at_end;
                            pending.push(Event::DataReceived {
                                stream_id,
                                data: payload,
                                end_stream: at_end,
                            });
                        }
                        Frame::Settings(_) | Frame::Goaway { .. } => {
                            error = Some(H3Error::FrameUnexpected);
                            break;
                        }
                        Frame::Unknown { .. } => {}
                    }
                }
                Ok(None) => break,
                Err(decode_error) => {
                    error = Some(decode_error);
                    break;
                }
            }
        }

        // A FIN that arrives after the last frame still has to close the
        // stream for the application.
        if error.is_none() && fin && offset == buf.len() && headers_received && !recv_closed {
            recv_closed = true;
            pending.push(Event::DataReceived {
                stream_id,
                data: Vec::new(),
                end_stream: true,
            });
        }

        buf.drain(..offset);
        let entry = self.requests.get_mut(&stream_id).expect("stream exists");
        entry.recv_buf = buf;
        entry.headers_received = headers_received;
        entry.recv_closed = recv_closed;

        for event in pending {
            self.push_event(event);
        }
        if let Some(error) = error {
            self.connection_error(error);
        }
    }

    // ── Outgoing streams ────────────────────────────────────────────

    fn open_pending_requests(&mut self, conn: &mut Connection) {
        if !self.connected {
            return;
        }
        while let Some(&stream_id) = self.pending_open.front() {
            let Some(quic_id) = conn.streams().open(Dir::Bi) else {
                break;
            };
            // The engine is the only opener, so quinn hands out ids in
            // exactly the order we allocated them.
            debug_assert_eq!(u64::from(quic_id), stream_id);
            self.pending_open.pop_front();
            if let Some(entry) = self.requests.get_mut(&stream_id) {
                entry.quic_id = Some(quic_id);
            }
            self.flush_one(conn, stream_id);
        }
    }

    fn flush_streams(&mut self, conn: &mut Connection) {
        let ready: Vec<u64> = self
            .requests
            .iter()
            .filter(|(_, entry)| {
                entry.quic_id.is_some()
                    && !entry.send_closed
                    && !entry.reset
                    && (!entry.send_buf.is_empty() || entry.fin_pending)
            })
            .map(|(&stream_id, _)| stream_id)
            .collect();
        for stream_id in ready {
            self.flush_one(conn, stream_id);
        }
    }

    fn flush_one(&mut self, conn: &mut Connection, stream_id: u64) {
        let Some(entry) = self.requests.get_mut(&stream_id) else {
            return;
        };
        let Some(quic_id) = entry.quic_id else {
            return;
        };
        if entry.send_closed || entry.reset {
            return;
        }
        if !entry.send_buf.is_empty() {
            match conn.send_stream(quic_id).write(&entry.send_buf) {
                Ok(written) => {
                    entry.send_buf.drain(..written);
                }
                Err(WriteError::Blocked) => return,
                Err(_) => {
                    entry.send_buf.clear();
                    entry.send_closed = true;
                    return;
                }
            }
        }
        if entry.send_buf.is_empty()
            && entry.fin_pending
            && conn.send_stream(quic_id).finish().is_ok()
        {
            entry.send_closed = true;
        }
    }
}

impl HttpProtocol for Http3Protocol {
    fn http_version(&self) -> &'static str {
        "h3"
    }

    fn multiplexed(&self) -> bool {
        true
    }

    fn error_codes(&self) -> ErrorCodes {
        HTTP3_ERROR_CODES
    }

    fn is_available(&self) -> bool {
        !self.terminated && !self.goaway_received && !self.goaway_sent
    }

    fn has_expired(&self) -> bool {
        self.terminated
    }

    fn get_available_stream_id(&mut self) -> Result<StreamId, Error> {
        if self.role == Role::Server {
            return Err(Error::Misuse(
                "servers cannot initiate HTTP/3 request streams".into(),
            ));
        }
        if !self.is_available() {
            return Err(Error::NotAvailable);
        }
        let stream_id = self.next_request_id;
        self.next_request_id += 4;
        self.requests.insert(stream_id, RequestStream::pending());
        self.pending_open.push_back(stream_id);
        Ok(stream_id)
    }

    fn submit_headers(
        &mut self,
        stream_id: StreamId,
        headers: &[HeaderField],
        end_stream: bool,
    ) -> Result<(), Error> {
        if self.terminated {
            return Err(Error::Misuse("connection terminated".into()));
        }
        self.ensure_connected()?;
        let Some(entry) = self.requests.get_mut(&stream_id) else {
            return Err(Error::Misuse(format!("unknown stream {stream_id}")));
        };
        if !entry.can_send() {
            return Err(Error::Misuse(format!(
                "stream {stream_id} is closed for sending"
            )));
        }

        let mut block = Vec::new();
        qpack::encode(headers, &mut block);
        Frame::Headers { block }.encode(&mut entry.send_buf);
        entry.headers_sent = true;
        if end_stream {
            entry.fin_pending = true;
        }
        self.pump();
        Ok(())
    }

    fn submit_data(
        &mut self,
        stream_id: StreamId,
        data: &[u8],
        end_stream: bool,
    ) -> Result<(), Error> {
        if self.terminated {
            return Err(Error::Misuse("connection terminated".into()));
        }
        self.ensure_connected()?;
        let Some(entry) = self.requests.get_mut(&stream_id) else {
            return Err(Error::Misuse(format!("unknown stream {stream_id}")));
        };
        if !entry.can_send() {
            return Err(Error::Misuse(format!(
                "stream {stream_id} is closed for sending"
            )));
        }
        if !entry.headers_sent {
            return Err(Error::Misuse("DATA submitted before headers".into()));
        }

        Frame::Data {
            payload: data.to_vec(),
        }
        .encode(&mut entry.send_buf);
        if end_stream {
            entry.fin_pending = true;
        }
        self.pump();
        Ok(())
    }

    fn submit_stream_reset(
        &mut self,
        stream_id: StreamId,
        error_code: ErrorKind,
    ) -> Result<(), Error> {
        if self.terminated {
            return Err(Error::Misuse("connection terminated".into()));
        }
        let Some(entry) = self.requests.get_mut(&stream_id) else {
            return Err(Error::Misuse(format!("unknown stream {stream_id}")));
        };
        entry.reset = true;
        entry.send_closed = true;
        entry.send_buf.clear();
        let quic_id = entry.quic_id;
        if let (Some(conn), Some(quic_id)) = (self.conn.as_mut(), quic_id) {
            let code = VarInt::from_u64(HTTP3_ERROR_CODES.wire_code(error_code))
                .unwrap_or(VarInt::from_u32(0));
            let _ = conn.send_stream(quic_id).reset(code);
        }
        self.push_event(Event::StreamResetSent {
            stream_id,
            error_code,
        });
        self.pump();
        Ok(())
    }

    fn submit_close(&mut self, error_code: ErrorKind) -> Result<(), Error> {
        if self.terminated {
            return Err(Error::Misuse("connection terminated".into()));
        }
        if !self.goaway_sent {
            self.goaway_sent = true;
            let last_stream_id = match self.role {
                Role::Server => self.highest_peer_request,
                Role::Client => 0,
            };
            // Best effort: the GOAWAY shares the flight with the close.
            Frame::Goaway {
                stream_id: last_stream_id,
            }
            .encode(&mut self.control_send);
            self.closing_kind = Some(error_code);
            self.pending_close =
                Some((HTTP3_ERROR_CODES.wire_code(error_code), String::new()));
        }
        self.pump();
        Ok(())
    }

    fn next_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut ConnectionInfo {
        &mut self.info
    }
}

impl QuicTransport for Http3Protocol {
    fn clock(&mut self, now: Instant) {
        self.now = Some(now);
        if let Some(conn) = self.conn.as_mut()
            && let Some(deadline) = conn.poll_timeout()
            && deadline <= now
        {
            conn.handle_timeout(now);
        }
        self.pump();
    }

    fn get_timer(&self) -> Option<Instant> {
        self.timer
    }

    fn datagram_received(&mut self, datagram: Datagram) {
        if self.terminated {
            return;
        }
        let (payload, peer) = datagram;
        // The driver must set the clock before feeding datagrams.
        let Some(now) = self.now else { return };

        let local_ip = self.info.local_address.map(|address| address.ip());
        let event = self.endpoint.handle(
            now,
            peer,
            local_ip,
            None,
            BytesMut::from(&payload[..]),
            &mut self.response_buf,
        );
        match event {
            Some(DatagramEvent::ConnectionEvent(handle, conn_event)) => {
                if self.handle == Some(handle)
                    && let Some(conn) = self.conn.as_mut()
                {
                    conn.handle_event(conn_event);
                }
            }
            Some(DatagramEvent::NewConnection(incoming)) => {
                if self.conn.is_some() {
                    // One connection per protocol instance.
                    let transmit = self.endpoint.refuse(incoming, &mut self.response_buf);
                    self.out_packets.push_back((
                        self.response_buf[..transmit.size].to_vec(),
                        transmit.destination,
                    ));
                } else {
                    match self
                        .endpoint
                        .accept(incoming, now, &mut self.response_buf, None)
                    {
                        Ok((handle, conn)) => {
                            self.handle = Some(handle);
                            self.conn = Some(conn);
                            self.remote = peer;
                            self.info.remote_address = Some(peer);
                        }
                        Err(_) => {
                            // Accept failed (e.g. config rejected); drop.
                        }
                    }
                }
            }
            Some(DatagramEvent::Response(transmit)) => {
                // Stateless response: version negotiation or retry.
                self.out_packets.push_back((
                    self.response_buf[..transmit.size].to_vec(),
                    transmit.destination,
                ));
            }
            None => {}
        }
        self.pump();
    }

    fn datagrams_to_send(&mut self) -> Vec<Datagram> {
        if self.role == Role::Client && self.conn.is_none() && self.now.is_some() {
            // First call after the clock is set starts the handshake.
            let _ = self.ensure_connected();
        }
        self.pump();
        self.out_packets.drain(..).collect()
    }

    fn connection_ids(&self) -> Vec<Vec<u8>> {
        self.cids
            .lock()
            .map(|issued| issued.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn connection_lost(&mut self, message: Option<String>) {
        match message {
            Some(message) => self.terminate(ErrorKind::InternalError, Some(message)),
            None => self.terminate(ErrorKind::NoError, None),
        }
    }
}
