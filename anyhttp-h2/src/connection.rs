//! HTTP/2 connection state machine.
//!
//! Role-aware sans-IO engine: feed bytes with `bytes_received()`, drain
//! [`Event`]s with `next_event()`, pull outgoing bytes with
//! `bytes_to_send()`. Peer misbehavior terminates the connection with a
//! GOAWAY and a terminal event; caller misbehavior fails synchronously
//! and leaves the connection untouched.

use std::collections::{HashMap, VecDeque};

use anyhttp_core::error::HTTP2_ERROR_CODES;
use anyhttp_core::{
    ConnectionInfo, Error, ErrorCodes, ErrorKind, Event, HeaderField, HttpProtocol, Role, StreamId,
    TcpTransport,
};

use crate::error::H2Error;
use crate::frame::{self, Frame};
use crate::hpack::{Decoder, Encoder};
use crate::settings::{self, Settings};
use crate::stream::{Stream, StreamState};
use crate::window::{self, Window};

/// Connection preface sent by clients (RFC 9113 section 3.4).
const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Send WINDOW_UPDATE once a receive window dips below half the default.
const WINDOW_UPDATE_THRESHOLD: i64 = 32_768;

/// Highest stream id expressible in a 31-bit field.
const MAX_STREAM_ID: u64 = 0x7fff_ffff;

/// RST_STREAM code for streams beyond the advertised concurrency limit.
const REFUSED_STREAM: u32 = 0x7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    /// Server only: the 24-byte client magic has not arrived yet.
    AwaitingMagic,
    /// The peer's first SETTINGS frame has not arrived yet.
    AwaitingSettings,
    Ready,
}

/// A sans-IO HTTP/2 client or server connection.
pub struct Http2Protocol {
    role: Role,
    state: ConnState,
    local_settings: Settings,
    remote_settings: Settings,

    /// All streams ever seen; closed streams stay so retired ids are
    /// rejected.
    streams: HashMap<u64, Stream>,
    /// Next id on our side of the id space; advanced at reservation.
    next_stream_id: u64,
    /// Highest peer-initiated stream id seen.
    highest_peer_stream: u64,

    conn_recv_window: Window,
    conn_send_window: Window,
    initial_recv_window: i64,

    encoder: Encoder,
    decoder: Decoder,

    /// Stream in the middle of a HEADERS + CONTINUATION sequence; no
    /// other frame may interleave until END_HEADERS.
    continuation_stream: Option<u64>,

    recv_buf: Vec<u8>,
    send_buf: Vec<u8>,
    events: VecDeque<Event>,

    goaway_sent: bool,
    goaway_received: bool,
    terminated: bool,

    info: ConnectionInfo,
}

impl Http2Protocol {
    pub fn new(role: Role) -> Self {
        Self::with_settings(role, Settings::default())
    }

    pub fn with_settings(role: Role, local_settings: Settings) -> Self {
        let initial_recv = i64::from(local_settings.initial_window_size);
        let mut send_buf = Vec::new();
        if role == Role::Client {
            send_buf.extend_from_slice(PREFACE);
        }
        Frame::Settings {
            ack: false,
            settings: local_settings.clone(),
        }
        .encode(&mut send_buf);
        if initial_recv > window::DEFAULT_WINDOW {
            Frame::WindowUpdate {
                stream_id: 0,
                increment: (initial_recv - window::DEFAULT_WINDOW) as u32,
            }
            .encode(&mut send_buf);
        }

        Self {
            role,
            state: if role == Role::Server {
                ConnState::AwaitingMagic
            } else {
                ConnState::AwaitingSettings
            },
            decoder: Decoder::new(local_settings.header_table_size as usize),
            local_settings,
            remote_settings: settings::peer_initial(),
            streams: HashMap::new(),
            next_stream_id: if role == Role::Client { 1 } else { 2 },
            highest_peer_stream: 0,
            conn_recv_window: Window::new(initial_recv),
            conn_send_window: Window::default(),
            initial_recv_window: initial_recv,
            // Peer default table size until its SETTINGS arrive.
            encoder: Encoder::new(4096),
            continuation_stream: None,
            recv_buf: Vec::new(),
            send_buf,
            events: VecDeque::new(),
            goaway_sent: false,
            goaway_received: false,
            terminated: false,
            info: ConnectionInfo::default(),
        }
    }

    /// Shorthand for a client-side connection.
    pub fn client() -> Self {
        Self::new(Role::Client)
    }

    /// Shorthand for a server-side connection.
    pub fn server() -> Self {
        Self::new(Role::Server)
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

    /// Fatal peer error: send GOAWAY and emit the terminal event.
    fn connection_error(&mut self, error: H2Error) {
        if self.terminated {
            return;
        }
        let code = error.wire_code();
        Frame::Goaway {
            last_stream_id: self.highest_peer_stream as u32,
            error_code: code,
            debug_data: Vec::new(),
        }
        .encode(&mut self.send_buf);
        self.goaway_sent = true;
        self.terminate(
            HTTP2_ERROR_CODES.kind(u64::from(code)),
            Some(error.to_string()),
        );
    }

    // ── Receive path ────────────────────────────────────────────────

    fn process_recv_buf(&mut self) {
        if self.state == ConnState::AwaitingMagic {
            if self.recv_buf.len() < PREFACE.len() {
                return;
            }
            if &self.recv_buf[..PREFACE.len()] != PREFACE {
                self.connection_error(H2Error::Protocol("invalid connection preface".into()));
                return;
            }
            self.recv_buf.drain(..PREFACE.len());
            self.state = ConnState::AwaitingSettings;
        }

        while !self.terminated {
            match frame::decode_frame(&self.recv_buf, self.local_settings.max_frame_size) {
                Ok(Some((frame, consumed))) => {
                    self.recv_buf.drain(..consumed);
                    if let Err(error) = self.handle_frame(frame) {
                        self.connection_error(error);
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

    fn handle_frame(&mut self, frame: Frame) -> Result<(), H2Error> {
        if let Some(expected) = self.continuation_stream {
            match &frame {
                Frame::Continuation { stream_id, .. } if u64::from(*stream_id) == expected => {}
                _ => {
                    return Err(H2Error::Protocol(
                        "expected CONTINUATION for the open header block".into(),
                    ));
                }
            }
        }

        if self.state == ConnState::AwaitingSettings
            && !matches!(frame, Frame::Settings { ack: false, .. })
        {
            return Err(H2Error::Protocol(
                "the first frame must be SETTINGS".into(),
            ));
        }

        match frame {
            Frame::Settings { ack, settings } => self.handle_settings(ack, settings)?,
            Frame::Headers {
                stream_id,
                fragment,
                end_stream,
                end_headers,
            } => self.handle_headers(u64::from(stream_id), fragment, end_stream, end_headers)?,
            Frame::Continuation {
                stream_id,
                fragment,
                end_headers,
            } => self.handle_continuation(u64::from(stream_id), fragment, end_headers)?,
            Frame::Data {
                stream_id,
                payload,
                end_stream,
            } => self.handle_data(u64::from(stream_id), payload, end_stream)?,
            Frame::RstStream {
                stream_id,
                error_code,
            } => {
                let stream_id = u64::from(stream_id);
                if let Some(stream) = self.streams.get_mut(&stream_id) {
                    stream.state = StreamState::Closed;
                    self.push_event(Event::StreamResetReceived {
                        stream_id,
                        error_code: HTTP2_ERROR_CODES.kind(u64::from(error_code)),
                    });
                }
            }
            Frame::Ping { ack, payload } => {
                if !ack {
                    Frame::Ping { ack: true, payload }.encode(&mut self.send_buf);
                }
            }
            Frame::Goaway {
                last_stream_id,
                error_code,
                ..
            } => {
                self.goaway_received = true;
                self.push_event(Event::GoawayReceived {
                    last_stream_id: u64::from(last_stream_id),
                    error_code: HTTP2_ERROR_CODES.kind(u64::from(error_code)),
                });
            }
            Frame::WindowUpdate {
                stream_id,
                increment,
            } => {
                if stream_id == 0 {
                    self.conn_send_window.add(increment)?;
                } else if let Some(stream) = self.streams.get_mut(&u64::from(stream_id)) {
                    stream.send_window.add(increment)?;
                }
            }
            Frame::PushPromise { .. } => {
                // ENABLE_PUSH=0 is always advertised.
                return Err(H2Error::Protocol(
                    "PUSH_PROMISE received with push disabled".into(),
                ));
            }
            Frame::Priority { .. } | Frame::Unknown { .. } => {}
        }
        Ok(())
    }

    fn handle_settings(&mut self, ack: bool, settings: Settings) -> Result<(), H2Error> {
        if ack {
            return Ok(());
        }

        let delta = i64::from(settings.initial_window_size)
            - i64::from(self.remote_settings.initial_window_size);
        let table_changed =
            settings.header_table_size != self.remote_settings.header_table_size;
        self.remote_settings = settings;
        if table_changed {
            self.encoder
                .set_capacity(self.remote_settings.header_table_size as usize);
        }

        // All stream send windows track INITIAL_WINDOW_SIZE changes
        // (RFC 9113 section 6.9.2).
        if delta != 0 {
            for stream in self.streams.values_mut() {
                if stream.state != StreamState::Closed {
                    stream.send_window.apply_delta(delta)?;
                }
            }
        }

        Frame::Settings {
            ack: true,
            settings: Settings::default(),
        }
        .encode(&mut self.send_buf);

        if self.state == ConnState::AwaitingSettings {
            self.state = ConnState::Ready;
        }
        Ok(())
    }

    fn handle_headers(
        &mut self,
        stream_id: u64,
        fragment: Vec<u8>,
        end_stream: bool,
        end_headers: bool,
    ) -> Result<(), H2Error> {
        if !self.streams.contains_key(&stream_id) {
            if !self.accept_peer_stream(stream_id)? {
                return Ok(());
            }
        } else if !self.streams[&stream_id].can_recv() {
            // Frames may race a reset we sent; drop them.
            return Ok(());
        }

        if end_headers {
            let stream = self.streams.get_mut(&stream_id).expect("stream exists");
            let mut block = std::mem::take(&mut stream.fragments);
            block.extend_from_slice(&fragment);
            self.finish_header_block(stream_id, &block, end_stream)?;
        } else {
            let stream = self.streams.get_mut(&stream_id).expect("stream exists");
            stream.fragments.extend_from_slice(&fragment);
            stream.fragments_end_stream = end_stream;
            self.continuation_stream = Some(stream_id);
        }
        Ok(())
    }

    /// Register a stream opened by the peer. Returns false when the frame
    /// should be ignored instead.
    fn accept_peer_stream(&mut self, stream_id: u64) -> Result<bool, H2Error> {
        let peer_parity = match self.role {
            // Clients open odd streams, servers would push even ones.
            Role::Server => 1,
            Role::Client => 0,
        };
        if stream_id % 2 != peer_parity {
            // On our side of the id space: either one we already closed
            // long ago (ignore) or one that never existed (error).
            if stream_id < self.next_stream_id {
                return Ok(false);
            }
            return Err(H2Error::Protocol("HEADERS on an unopened stream".into()));
        }
        if self.role == Role::Client {
            // Without push the server cannot open streams.
            return Err(H2Error::Protocol(
                "server-initiated stream with push disabled".into(),
            ));
        }
        if stream_id <= self.highest_peer_stream {
            // Reuse of an old peer id; it was closed, ignore stragglers.
            return Ok(false);
        }
        if self.goaway_sent {
            // We told the peer to stop; refuse quietly.
            return Ok(false);
        }
        self.highest_peer_stream = stream_id;
        let mut stream = Stream::new(
            self.initial_recv_window,
            i64::from(self.remote_settings.initial_window_size),
        );
        // Our advertised concurrency limit (RFC 9113 section 5.1.2):
        // excess streams are refused so the peer can retry them later.
        // The entry is still registered, closed, so the header block
        // keeps flowing through the HPACK decoder.
        if self
            .local_settings
            .max_concurrent_streams
            .is_some_and(|limit| self.open_peer_streams() >= limit as usize)
        {
            stream.state = StreamState::Closed;
            Frame::RstStream {
                stream_id: stream_id as u32,
                error_code: REFUSED_STREAM,
            }
            .encode(&mut self.send_buf);
            self.push_event(Event::StreamResetSent {
                stream_id,
                error_code: HTTP2_ERROR_CODES.kind(u64::from(REFUSED_STREAM)),
            });
        }
        self.streams.insert(stream_id, stream);
        Ok(true)
    }

    fn handle_continuation(
        &mut self,
        stream_id: u64,
        fragment: Vec<u8>,
        end_headers: bool,
    ) -> Result<(), H2Error> {
        let Some(stream) = self.streams.get_mut(&stream_id) else {
            return Err(H2Error::Protocol("CONTINUATION on an unknown stream".into()));
        };
        stream.fragments.extend_from_slice(&fragment);
        if end_headers {
            self.continuation_stream = None;
            let stream = self.streams.get_mut(&stream_id).expect("stream exists");
            let block = std::mem::take(&mut stream.fragments);
            let end_stream = stream.fragments_end_stream;
            self.finish_header_block(stream_id, &block, end_stream)?;
        }
        Ok(())
    }

    fn finish_header_block(
        &mut self,
        stream_id: u64,
        block: &[u8],
        end_stream: bool,
    ) -> Result<(), H2Error> {
        let headers = self.decoder.decode(block)?;
        let stream = self.streams.get_mut(&stream_id).expect("stream exists");
        // A refused stream's block still had to feed the decoder above,
        // but nothing is surfaced for it.
        if !stream.can_recv() {
            return Ok(());
        }
        stream.headers_received = true;
        if end_stream {
            stream.close_remote();
        }
        self.push_event(Event::HeadersReceived {
            stream_id,
            headers,
            end_stream,
        });
        Ok(())
    }

    fn handle_data(
        &mut self,
        stream_id: u64,
        payload: Vec<u8>,
        end_stream: bool,
    ) -> Result<(), H2Error> {
        let len = payload.len();
        if len > 0 {
            self.conn_recv_window.take(len)?;
        }

        let Some(stream) = self.streams.get_mut(&stream_id) else {
            // A stream that was never opened is a connection error; an id
            // below the high-water mark raced a reset and is dropped.
            let peer_parity = match self.role {
                Role::Server => 1,
                Role::Client => 0,
            };
            let idle = if stream_id % 2 == peer_parity {
                stream_id > self.highest_peer_stream
            } else {
                stream_id >= self.next_stream_id
            };
            if idle {
                return Err(H2Error::Protocol("DATA on an idle stream".into()));
            }
            self.replenish_connection_window();
            return Ok(());
        };
        if !stream.can_recv() || !stream.headers_received {
            if !stream.headers_received && stream.state != StreamState::Closed {
                return Err(H2Error::Protocol("DATA before HEADERS".into()));
            }
            self.replenish_connection_window();
            return Ok(());
        }

        if len > 0 {
            stream.recv_window.take(len)?;
        }
        if end_stream {
            stream.close_remote();
        }
        self.push_event(Event::DataReceived {
            stream_id,
            data: payload,
            end_stream,
        });
        self.replenish_stream_window(stream_id);
        self.replenish_connection_window();
        Ok(())
    }

    /// Top up the connection receive window when it runs low.
    fn replenish_connection_window(&mut self) {
        if self.conn_recv_window.size() >= WINDOW_UPDATE_THRESHOLD {
            return;
        }
        let increment = (self.initial_recv_window - self.conn_recv_window.size()) as u32;
        if increment == 0 {
            return;
        }
        Frame::WindowUpdate {
            stream_id: 0,
            increment,
        }
        .encode(&mut self.send_buf);
        let _ = self.conn_recv_window.add(increment);
    }

    /// Top up one stream's receive window when it runs low.
    fn replenish_stream_window(&mut self, stream_id: u64) {
        let Some(stream) = self.streams.get_mut(&stream_id) else {
            return;
        };
        if !stream.can_recv() || stream.recv_window.size() >= WINDOW_UPDATE_THRESHOLD {
            return;
        }
        let increment = (self.initial_recv_window - stream.recv_window.size()) as u32;
        if increment == 0 {
            return;
        }
        let _ = stream.recv_window.add(increment);
        Frame::WindowUpdate {
            stream_id: stream_id as u32,
            increment,
        }
        .encode(&mut self.send_buf);
    }

    // ── Submit helpers ──────────────────────────────────────────────

    fn check_live(&self) -> Result<(), Error> {
        if self.terminated {
            return Err(Error::Misuse("connection terminated".into()));
        }
        Ok(())
    }

    fn our_parity(&self) -> u64 {
        match self.role {
            Role::Client => 1,
            Role::Server => 0,
        }
    }

    /// Streams we opened that are still running.
    fn open_local_streams(&self) -> usize {
        let parity = self.our_parity();
        self.streams
            .iter()
            .filter(|(id, stream)| **id % 2 == parity && stream.state != StreamState::Closed)
            .count()
    }

    /// Peer-initiated streams that are still running.
    fn open_peer_streams(&self) -> usize {
        let parity = 1 - self.our_parity();
        self.streams
            .iter()
            .filter(|(id, stream)| **id % 2 == parity && stream.state != StreamState::Closed)
            .count()
    }
}

impl HttpProtocol for Http2Protocol {
    fn http_version(&self) -> &'static str {
        "h2"
    }

    fn multiplexed(&self) -> bool {
        true
    }

    fn error_codes(&self) -> ErrorCodes {
        HTTP2_ERROR_CODES
    }

    fn is_available(&self) -> bool {
        !self.terminated
            && !self.goaway_received
            && !self.goaway_sent
            && self.next_stream_id <= MAX_STREAM_ID
            && self
                .remote_settings
                .max_concurrent_streams
                .is_none_or(|limit| self.open_local_streams() < limit as usize)
    }

    fn has_expired(&self) -> bool {
        self.terminated || self.next_stream_id > MAX_STREAM_ID
    }

    fn get_available_stream_id(&mut self) -> Result<StreamId, Error> {
        if self.role == Role::Server {
            // Server-initiated streams only exist for push, which is
            // disabled.
            return Err(Error::Misuse(
                "servers cannot initiate HTTP/2 streams".into(),
            ));
        }
        if !self.is_available() {
            return Err(Error::NotAvailable);
        }
        let stream_id = self.next_stream_id;
        self.next_stream_id += 2;
        Ok(stream_id)
    }

    fn submit_headers(
        &mut self,
        stream_id: StreamId,
        headers: &[HeaderField],
        end_stream: bool,
    ) -> Result<(), Error> {
        self.check_live()?;

        if let Some(stream) = self.streams.get(&stream_id) {
            // Response or trailers on an existing stream.
            if !stream.can_send() {
                return Err(Error::Misuse(format!(
                    "stream {stream_id} is closed for sending"
                )));
            }
        } else {
            // Opening a new stream; only our side may do that.
            if stream_id % 2 != self.our_parity() || stream_id > MAX_STREAM_ID {
                return Err(Error::Misuse(format!(
                    "stream id {stream_id} cannot be opened by this endpoint"
                )));
            }
            if self.role == Role::Server {
                return Err(Error::Misuse(
                    "server-initiated streams require server push, which is disabled".into(),
                ));
            }
            // The same gate as the allocator: no new streams after a
            // GOAWAY in either direction or past the peer's concurrency
            // limit, even with a hand-picked id.
            if !self.is_available() {
                return Err(Error::Misuse(
                    "no new stream may be opened on this connection".into(),
                ));
            }
            if stream_id >= self.next_stream_id {
                // Everything up to this id becomes reserved.
                self.next_stream_id = stream_id + 2;
            }
            self.streams.insert(
                stream_id,
                Stream::new(
                    self.initial_recv_window,
                    i64::from(self.remote_settings.initial_window_size),
                ),
            );
        }

        let mut fragment = Vec::new();
        self.encoder.encode(headers, &mut fragment);
        Frame::Headers {
            stream_id: stream_id as u32,
            fragment,
            end_stream,
            end_headers: true,
        }
        .encode(&mut self.send_buf);

        if end_stream {
            self.streams
                .get_mut(&stream_id)
                .expect("stream exists")
                .close_local();
        }
        Ok(())
    }

    fn submit_data(
        &mut self,
        stream_id: StreamId,
        data: &[u8],
        end_stream: bool,
    ) -> Result<(), Error> {
        self.check_live()?;
        let Some(stream) = self.streams.get_mut(&stream_id) else {
            return Err(Error::Misuse(format!("unknown stream {stream_id}")));
        };
        if !stream.can_send() {
            return Err(Error::Misuse(format!(
                "stream {stream_id} is closed for sending"
            )));
        }

        if !data.is_empty() {
            self.conn_send_window
                .take(data.len())
                .map_err(|_| Error::Misuse("connection send window exhausted".into()))?;
            stream
                .send_window
                .take(data.len())
                .map_err(|_| Error::Misuse("stream send window exhausted".into()))?;
        }

        // Respect the peer's frame size limit.
        let max_frame = self.remote_settings.max_frame_size as usize;
        let mut chunks = data.chunks(max_frame).peekable();
        if data.is_empty() {
            Frame::Data {
                stream_id: stream_id as u32,
                payload: Vec::new(),
                end_stream,
            }
            .encode(&mut self.send_buf);
        }
        while let Some(chunk) = chunks.next() {
            Frame::Data {
                stream_id: stream_id as u32,
                payload: chunk.to_vec(),
                end_stream: end_stream && chunks.peek().is_none(),
            }
            .encode(&mut self.send_buf);
        }

        if end_stream {
            self.streams
                .get_mut(&stream_id)
                .expect("stream exists")
                .close_local();
        }
        Ok(())
    }

    fn submit_stream_reset(
        &mut self,
        stream_id: StreamId,
        error_code: ErrorKind,
    ) -> Result<(), Error> {
        self.check_live()?;
        let Some(stream) = self.streams.get_mut(&stream_id) else {
            return Err(Error::Misuse(format!("unknown stream {stream_id}")));
        };
        stream.state = StreamState::Closed;
        Frame::RstStream {
            stream_id: stream_id as u32,
            error_code: HTTP2_ERROR_CODES.wire_code(error_code) as u32,
        }
        .encode(&mut self.send_buf);
        self.push_event(Event::StreamResetSent {
            stream_id,
            error_code,
        });
        Ok(())
    }

    fn submit_close(&mut self, error_code: ErrorKind) -> Result<(), Error> {
        self.check_live()?;
        if self.goaway_sent {
            return Ok(());
        }
        Frame::Goaway {
            last_stream_id: self.highest_peer_stream as u32,
            error_code: HTTP2_ERROR_CODES.wire_code(error_code) as u32,
            debug_data: Vec::new(),
        }
        .encode(&mut self.send_buf);
        self.goaway_sent = true;
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

impl TcpTransport for Http2Protocol {
    fn bytes_received(&mut self, data: &[u8]) {
        if data.is_empty() || self.terminated {
            return;
        }
        self.recv_buf.extend_from_slice(data);
        self.process_recv_buf();
    }

    fn bytes_to_send(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.send_buf)
    }

    fn eof_received(&mut self) {
        self.terminate(ErrorKind::NoError, None);
    }

    fn connection_lost(&mut self, message: Option<String>) {
        match message {
            Some(message) => self.terminate(ErrorKind::InternalError, Some(message)),
            None => self.terminate(ErrorKind::NoError, None),
        }
    }
}
