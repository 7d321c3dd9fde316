//! HTTP/1.1 connection state machine.
//!
//! One exchange at a time, always on stream 1. The engine translates
//! between request/status lines and pseudo-headers in both directions,
//! chooses body framing on send, and returns to the available state after
//! a keep-alive exchange completes. There is no pipelining.

use std::collections::VecDeque;

use bytes::BytesMut;

use anyhttp_core::error::HTTP1_ERROR_CODES;
use anyhttp_core::headers::{
    self, PSEUDO_AUTHORITY, PSEUDO_METHOD, PSEUDO_PATH, PSEUDO_SCHEME, PSEUDO_STATUS,
};
use anyhttp_core::{
    ConnectionInfo, Error, ErrorCodes, ErrorKind, Event, HeaderField, HttpProtocol, Role, StreamId,
    TcpTransport,
};

use crate::message::{
    BodyLen, ChunkDecoder, ChunkProgress, find_head_end, parse_request_head, parse_response_head,
    request_body_len, response_body_len, write_header, write_request_line, write_status_line,
};

/// The only stream id an HTTP/1 connection ever uses.
const STREAM_ID: StreamId = 1;

#[derive(Debug)]
enum RecvState {
    /// Collecting a request or status head.
    Head,
    /// Receiving a delimited body.
    Body(BodyDecoder),
    /// CONNECT seen; incoming bytes are held until the tunnel outcome is
    /// known.
    Paused,
    /// Inbound message complete for this cycle.
    Done,
}

#[derive(Debug)]
enum BodyDecoder {
    Known { remaining: u64 },
    Chunked(ChunkDecoder),
    UntilClose,
}

#[derive(Debug)]
enum SendState {
    Idle,
    Body(SendBody),
    /// CONNECT request sent; nothing may be written until the response.
    Paused,
    Done,
}

#[derive(Debug)]
enum SendBody {
    Known { remaining: u64 },
    Chunked,
}

/// A sans-IO HTTP/1.1 client or server connection.
pub struct Http1Protocol {
    role: Role,
    /// Scheme synthesized into `:scheme` for received requests.
    scheme: &'static [u8],

    recv_buf: BytesMut,
    send_buf: Vec<u8>,
    events: VecDeque<Event>,

    recv_state: RecvState,
    send_state: SendState,

    /// Client: method of the request in flight (HEAD and CONNECT change
    /// response framing).
    sent_method: Option<Vec<u8>>,
    /// Server: method of the request being answered.
    recv_method: Option<Vec<u8>>,

    /// The connection must terminate once the current exchange completes.
    close_after: bool,
    /// CONNECT tunnel established; bytes pass through unframed.
    tunnel: bool,
    terminated: bool,

    info: ConnectionInfo,
}

impl Http1Protocol {
    pub fn new(role: Role, secure: bool) -> Self {
        Self {
            role,
            scheme: if secure { b"https" } else { b"http" },
            recv_buf: BytesMut::new(),
            send_buf: Vec::new(),
            events: VecDeque::new(),
            recv_state: RecvState::Head,
            send_state: SendState::Idle,
            sent_method: None,
            recv_method: None,
            close_after: false,
            tunnel: false,
            terminated: false,
            info: ConnectionInfo::default(),
        }
    }

    /// Shorthand for a client-side connection.
    pub fn client(secure: bool) -> Self {
        Self::new(Role::Client, secure)
    }

    /// Shorthand for a server-side connection.
    pub fn server(secure: bool) -> Self {
        Self::new(Role::Server, secure)
    }

    // ── Event plumbing ──────────────────────────────────────────────

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

    fn protocol_error(&mut self, message: impl Into<String>) {
        self.terminate(ErrorKind::ProtocolError, Some(message.into()));
    }

    // ── Receive direction ───────────────────────────────────────────

    fn process_recv(&mut self) {
        loop {
            if self.terminated {
                return;
            }
            if self.tunnel {
                self.drain_tunnel_bytes();
                return;
            }
            match &mut self.recv_state {
                RecvState::Head => {
                    if !self.process_head() {
                        return;
                    }
                }
                RecvState::Body(_) => {
                    if !self.process_body() {
                        return;
                    }
                }
                RecvState::Paused | RecvState::Done => return,
            }
        }
    }

    fn drain_tunnel_bytes(&mut self) {
        if self.recv_buf.is_empty() {
            return;
        }
        let data = self.recv_buf.split().to_vec();
        self.push_event(Event::DataReceived {
            stream_id: STREAM_ID,
            data,
            end_stream: false,
        });
    }

    /// Parse one head if complete. Returns whether progress was made.
    fn process_head(&mut self) -> bool {
        let Some(head_end) = find_head_end(&self.recv_buf) else {
            return false;
        };
        let head = self.recv_buf.split_to(head_end);
        let head = &head[..head.len() - 4];
        match self.role {
            Role::Server => self.process_request_head(head),
            Role::Client => self.process_response_head(head),
        }
        true
    }

    fn process_request_head(&mut self, head: &[u8]) {
        let request = match parse_request_head(head) {
            Ok(request) => request,
            Err(message) => return self.protocol_error(message),
        };

        if request.version_minor == 0 {
            // Keep-alive is opt-in for HTTP/1.0 peers.
            self.close_after = !headers::find_header(&request.headers, b"connection")
                .is_some_and(|v| v.eq_ignore_ascii_case(b"keep-alive"));
        } else if headers::find_header(&request.headers, b"connection")
            .is_some_and(|v| v.eq_ignore_ascii_case(b"close"))
        {
            self.close_after = true;
        }

        let mut host = None;
        let mut regular = Vec::with_capacity(request.headers.len());
        for h in request.headers {
            if h.name.eq_ignore_ascii_case(b"host") {
                if host.is_some() {
                    return self.protocol_error("duplicate Host header");
                }
                host = Some(h.value);
            } else {
                regular.push(h);
            }
        }

        let is_connect = request.method == b"CONNECT";
        let mut pseudo = Vec::with_capacity(4);
        pseudo.push(HeaderField::new(PSEUDO_METHOD, request.method.clone()));
        if is_connect {
            pseudo.push(HeaderField::new(PSEUDO_AUTHORITY, request.target));
        } else if let Some((scheme, authority, path)) = split_absolute_form(&request.target) {
            pseudo.push(HeaderField::new(PSEUDO_SCHEME, scheme));
            pseudo.push(HeaderField::new(PSEUDO_AUTHORITY, authority));
            pseudo.push(HeaderField::new(PSEUDO_PATH, path));
        } else {
            let authority = match host {
                Some(host) => host,
                // HTTP/1.0 requests may omit Host; synthesize empty.
                None if request.version_minor == 0 => Vec::new(),
                None => return self.protocol_error("missing Host header"),
            };
            pseudo.push(HeaderField::new(PSEUDO_SCHEME, self.scheme));
            pseudo.push(HeaderField::new(PSEUDO_AUTHORITY, authority));
            pseudo.push(HeaderField::new(PSEUDO_PATH, request.target));
        }
        pseudo.extend(regular);

        let body = if is_connect {
            BodyLen::Empty
        } else {
            match request_body_len(&pseudo) {
                Ok(body) => body,
                Err(message) => return self.protocol_error(message),
            }
        };

        self.recv_method = Some(request.method);
        let end_stream = body == BodyLen::Empty && !is_connect;
        self.push_event(Event::HeadersReceived {
            stream_id: STREAM_ID,
            headers: pseudo,
            end_stream,
        });

        self.recv_state = if is_connect {
            RecvState::Paused
        } else {
            match body {
                BodyLen::Empty => RecvState::Done,
                BodyLen::Known(n) => RecvState::Body(BodyDecoder::Known { remaining: n }),
                BodyLen::Chunked => RecvState::Body(BodyDecoder::Chunked(ChunkDecoder::new())),
                BodyLen::UntilClose => {
                    return self.protocol_error("request body without length");
                }
            }
        };
        self.maybe_finish_cycle();
    }

    fn process_response_head(&mut self, head: &[u8]) {
        let Some(sent_method) = self.sent_method.clone() else {
            return self.protocol_error("response without a request in flight");
        };
        let response = match parse_response_head(head) {
            Ok(response) => response,
            Err(message) => return self.protocol_error(message),
        };

        let mut headers = Vec::with_capacity(response.headers.len() + 1);
        headers.push(HeaderField::new(
            PSEUDO_STATUS,
            response.status.to_string(),
        ));
        headers.extend(response.headers);

        if response.status < 200 {
            // Informational; the final response is still to come.
            self.push_event(Event::HeadersReceived {
                stream_id: STREAM_ID,
                headers,
                end_stream: false,
            });
            return;
        }

        if headers::find_header(&headers, b"connection")
            .is_some_and(|v| v.eq_ignore_ascii_case(b"close"))
        {
            self.close_after = true;
        }

        if sent_method == b"CONNECT" && (200..300).contains(&response.status) {
            self.push_event(Event::HeadersReceived {
                stream_id: STREAM_ID,
                headers,
                end_stream: false,
            });
            self.tunnel = true;
            self.drain_tunnel_bytes();
            return;
        }

        let body = match response_body_len(response.status, sent_method == b"HEAD", &headers) {
            Ok(body) => body,
            Err(message) => return self.protocol_error(message),
        };
        // A CONNECT refusal taints the connection for reuse.
        if sent_method == b"CONNECT" {
            self.close_after = true;
            // The request left sending paused; the exchange is over.
            self.send_state = SendState::Done;
        }

        self.push_event(Event::HeadersReceived {
            stream_id: STREAM_ID,
            headers,
            end_stream: body == BodyLen::Empty,
        });
        self.recv_state = match body {
            BodyLen::Empty => RecvState::Done,
            BodyLen::Known(n) => RecvState::Body(BodyDecoder::Known { remaining: n }),
            BodyLen::Chunked => RecvState::Body(BodyDecoder::Chunked(ChunkDecoder::new())),
            BodyLen::UntilClose => {
                self.close_after = true;
                RecvState::Body(BodyDecoder::UntilClose)
            }
        };
        self.maybe_finish_cycle();
    }

    /// Advance the body decoder. Returns whether progress was made.
    fn process_body(&mut self) -> bool {
        if self.recv_buf.is_empty() {
            return false;
        }
        let RecvState::Body(decoder) = &mut self.recv_state else {
            return false;
        };
        match decoder {
            BodyDecoder::Known { remaining } => {
                let take = (*remaining).min(self.recv_buf.len() as u64) as usize;
                *remaining -= take as u64;
                let finished = *remaining == 0;
                let data = self.recv_buf.split_to(take).to_vec();
                self.push_event(Event::DataReceived {
                    stream_id: STREAM_ID,
                    data,
                    end_stream: finished,
                });
                if finished {
                    self.recv_state = RecvState::Done;
                    self.maybe_finish_cycle();
                }
                true
            }
            BodyDecoder::Chunked(chunk_decoder) => {
                let (progress, consumed) = match chunk_decoder.advance(&self.recv_buf) {
                    Ok(step) => step,
                    Err(message) => {
                        self.protocol_error(message);
                        return false;
                    }
                };
                let _ = self.recv_buf.split_to(consumed);
                match progress {
                    ChunkProgress::NeedMore => false,
                    ChunkProgress::Data(data) => {
                        if !data.is_empty() {
                            self.push_event(Event::DataReceived {
                                stream_id: STREAM_ID,
                                data,
                                end_stream: false,
                            });
                        }
                        consumed > 0
                    }
                    ChunkProgress::Finished => {
                        self.push_event(Event::DataReceived {
                            stream_id: STREAM_ID,
                            data: Vec::new(),
                            end_stream: true,
                        });
                        self.recv_state = RecvState::Done;
                        self.maybe_finish_cycle();
                        true
                    }
                }
            }
            BodyDecoder::UntilClose => {
                let data = self.recv_buf.split().to_vec();
                self.push_event(Event::DataReceived {
                    stream_id: STREAM_ID,
                    data,
                    end_stream: false,
                });
                true
            }
        }
    }

    // ── Cycle management ────────────────────────────────────────────

    fn recv_done(&self) -> bool {
        matches!(self.recv_state, RecvState::Done)
    }

    fn send_done(&self) -> bool {
        matches!(self.send_state, SendState::Done)
    }

    fn maybe_finish_cycle(&mut self) {
        if !(self.recv_done() && self.send_done()) {
            return;
        }
        if self.close_after {
            self.terminate(ErrorKind::NoError, None);
            return;
        }
        self.recv_state = RecvState::Head;
        self.send_state = SendState::Idle;
        self.sent_method = None;
        self.recv_method = None;
    }

    fn idle(&self) -> bool {
        matches!(self.send_state, SendState::Idle)
            && matches!(self.recv_state, RecvState::Head)
            && self.recv_method.is_none()
            && self.sent_method.is_none()
    }

    // ── Send direction ──────────────────────────────────────────────

    fn submit_request_headers(
        &mut self,
        headers: &[HeaderField],
        end_stream: bool,
    ) -> Result<(), Error> {
        if !matches!(self.send_state, SendState::Idle) {
            return Err(Error::Misuse("a request is already in flight".into()));
        }

        let mut method = None;
        let mut scheme = None;
        let mut authority = None;
        let mut path = None;
        let mut content_length: Option<u64> = None;
        let mut host: Option<Vec<u8>> = None;
        let mut has_body_framing = false;
        let mut regular: Vec<(&[u8], &[u8])> = Vec::new();

        for h in headers {
            if h.is_pseudo() {
                let slot = match h.name.as_slice() {
                    n if n == PSEUDO_METHOD => &mut method,
                    n if n == PSEUDO_SCHEME => &mut scheme,
                    n if n == PSEUDO_AUTHORITY => &mut authority,
                    n if n == PSEUDO_PATH => &mut path,
                    _ => {
                        return Err(Error::Misuse(format!(
                            "unexpected request pseudo-header {:?}",
                            String::from_utf8_lossy(&h.name)
                        )));
                    }
                };
                if slot.is_some() {
                    return Err(Error::Misuse("duplicate pseudo-header".into()));
                }
                *slot = Some(h.value.as_slice());
                continue;
            }
            if h.name.eq_ignore_ascii_case(b"host") {
                if host.is_some() {
                    return Err(Error::Misuse("duplicate Host header".into()));
                }
                host = Some(h.value.clone());
            }
            if h.name.eq_ignore_ascii_case(b"content-length") {
                let parsed = std::str::from_utf8(&h.value)
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .ok_or_else(|| Error::Misuse("malformed Content-Length".into()))?;
                content_length = Some(parsed);
                has_body_framing = true;
            }
            if h.name.eq_ignore_ascii_case(b"transfer-encoding") {
                has_body_framing = true;
            }
            regular.push((&h.name, &h.value));
        }

        let method = method.ok_or_else(|| Error::Misuse("missing :method".into()))?;
        let authority = authority.ok_or_else(|| Error::Misuse("missing :authority".into()))?;
        if let Some(host) = &host
            && host != authority
        {
            return Err(Error::Misuse("Host header does not match :authority".into()));
        }

        let is_connect = method == b"CONNECT";
        let target: &[u8] = if is_connect {
            if scheme.is_some() || path.is_some() {
                return Err(Error::Misuse(
                    "CONNECT request must not carry :scheme or :path".into(),
                ));
            }
            authority
        } else {
            if scheme.is_none() {
                return Err(Error::Misuse("missing :scheme".into()));
            }
            path.ok_or_else(|| Error::Misuse("missing :path".into()))?
        };
        if end_stream && content_length.is_some_and(|n| n > 0) {
            return Err(Error::Misuse(
                "end_stream with a non-zero Content-Length".into(),
            ));
        }

        let mut head = Vec::with_capacity(256);
        write_request_line(&mut head, method, target);
        if host.is_none() {
            write_header(&mut head, b"host", authority);
        }
        let use_chunked = !is_connect && !end_stream && !has_body_framing;
        let add_empty_length = !is_connect && end_stream && !has_body_framing;
        for (name, value) in regular {
            write_header(&mut head, name, value);
        }
        if use_chunked {
            write_header(&mut head, b"transfer-encoding", b"chunked");
        }
        if add_empty_length {
            write_header(&mut head, b"content-length", b"0");
        }
        head.extend_from_slice(b"\r\n");
        self.send_buf.extend_from_slice(&head);

        self.sent_method = Some(method.to_vec());
        self.send_state = if end_stream {
            SendState::Done
        } else if is_connect {
            SendState::Paused
        } else if use_chunked {
            SendState::Body(SendBody::Chunked)
        } else {
            SendState::Body(SendBody::Known {
                remaining: content_length.unwrap_or(0),
            })
        };
        self.maybe_finish_cycle();
        Ok(())
    }

    fn submit_response_headers(
        &mut self,
        headers: &[HeaderField],
        end_stream: bool,
    ) -> Result<(), Error> {
        if self.recv_method.is_none() {
            return Err(Error::Misuse("no request to respond to".into()));
        }
        if !matches!(self.send_state, SendState::Idle) {
            return Err(Error::Misuse("a response is already in flight".into()));
        }

        let mut status = None;
        let mut content_length: Option<u64> = None;
        let mut has_body_framing = false;
        let mut regular: Vec<(&[u8], &[u8])> = Vec::new();

        for h in headers {
            if h.is_pseudo() {
                if h.name != PSEUDO_STATUS {
                    return Err(Error::Misuse(format!(
                        "unexpected response pseudo-header {:?}",
                        String::from_utf8_lossy(&h.name)
                    )));
                }
                if status.is_some() {
                    return Err(Error::Misuse("duplicate :status".into()));
                }
                status = Some(
                    std::str::from_utf8(&h.value)
                        .ok()
                        .and_then(|s| s.parse::<u16>().ok())
                        .filter(|s| (100..600).contains(s))
                        .ok_or_else(|| Error::Misuse("malformed :status".into()))?,
                );
                continue;
            }
            if h.name.eq_ignore_ascii_case(b"content-length") {
                let parsed = std::str::from_utf8(&h.value)
                    .ok()
                    .and_then(|s| s.parse::<u64>().ok())
                    .ok_or_else(|| Error::Misuse("malformed Content-Length".into()))?;
                content_length = Some(parsed);
                has_body_framing = true;
            }
            if h.name.eq_ignore_ascii_case(b"transfer-encoding") {
                has_body_framing = true;
            }
            regular.push((&h.name, &h.value));
        }
        let status = status.ok_or_else(|| Error::Misuse("missing :status".into()))?;

        if status < 200 {
            if end_stream {
                return Err(Error::Misuse(
                    "informational response cannot end the stream".into(),
                ));
            }
            let mut head = Vec::with_capacity(128);
            write_status_line(&mut head, status);
            for (name, value) in regular {
                write_header(&mut head, name, value);
            }
            head.extend_from_slice(b"\r\n");
            self.send_buf.extend_from_slice(&head);
            return Ok(());
        }

        let answering_connect = self.recv_method.as_deref() == Some(b"CONNECT");
        let answering_head = self.recv_method.as_deref() == Some(b"HEAD");
        let tunnel_established = answering_connect && (200..300).contains(&status);
        let bodyless_status = status == 204 || status == 304;

        let mut head = Vec::with_capacity(256);
        write_status_line(&mut head, status);
        let suppress_body = tunnel_established || answering_head || bodyless_status;
        let use_chunked = !suppress_body && !end_stream && !has_body_framing;
        let add_empty_length = !suppress_body && end_stream && !has_body_framing;
        for (name, value) in regular {
            write_header(&mut head, name, value);
        }
        if use_chunked {
            write_header(&mut head, b"transfer-encoding", b"chunked");
        }
        if add_empty_length {
            write_header(&mut head, b"content-length", b"0");
        }
        head.extend_from_slice(b"\r\n");
        self.send_buf.extend_from_slice(&head);

        if tunnel_established {
            self.tunnel = true;
            self.send_state = SendState::Done;
            self.drain_tunnel_bytes();
            return Ok(());
        }
        if answering_connect {
            // Refused CONNECT: the exchange ends and the connection with it.
            self.close_after = true;
            self.recv_state = RecvState::Done;
        }

        self.send_state = if end_stream || suppress_body {
            SendState::Done
        } else if use_chunked {
            SendState::Body(SendBody::Chunked)
        } else {
            SendState::Body(SendBody::Known {
                remaining: content_length.unwrap_or(0),
            })
        };
        self.maybe_finish_cycle();
        Ok(())
    }
}

impl HttpProtocol for Http1Protocol {
    fn http_version(&self) -> &'static str {
        "http/1.1"
    }

    fn multiplexed(&self) -> bool {
        false
    }

    fn error_codes(&self) -> ErrorCodes {
        HTTP1_ERROR_CODES
    }

    fn is_available(&self) -> bool {
        !self.terminated && !self.tunnel && !self.close_after && self.idle()
    }

    fn has_expired(&self) -> bool {
        self.terminated
    }

    fn get_available_stream_id(&mut self) -> Result<StreamId, Error> {
        if self.role != Role::Client {
            return Err(Error::Misuse(
                "only clients initiate HTTP/1 exchanges".into(),
            ));
        }
        if !self.is_available() {
            return Err(Error::NotAvailable);
        }
        Ok(STREAM_ID)
    }

    fn submit_headers(
        &mut self,
        stream_id: StreamId,
        headers: &[HeaderField],
        end_stream: bool,
    ) -> Result<(), Error> {
        self.check_stream(stream_id)?;
        if self.tunnel {
            return Err(Error::Misuse("connection is tunnelling".into()));
        }
        match self.role {
            Role::Client => self.submit_request_headers(headers, end_stream),
            Role::Server => self.submit_response_headers(headers, end_stream),
        }
    }

    fn submit_data(
        &mut self,
        stream_id: StreamId,
        data: &[u8],
        end_stream: bool,
    ) -> Result<(), Error> {
        self.check_stream(stream_id)?;
        if self.tunnel {
            self.send_buf.extend_from_slice(data);
            if end_stream {
                self.terminate(ErrorKind::NoError, None);
            }
            return Ok(());
        }
        let SendState::Body(body) = &mut self.send_state else {
            return Err(Error::Misuse("no message body to send".into()));
        };
        match body {
            SendBody::Known { remaining } => {
                if (data.len() as u64) > *remaining {
                    return Err(Error::Misuse("data exceeds declared Content-Length".into()));
                }
                *remaining -= data.len() as u64;
                self.send_buf.extend_from_slice(data);
                if end_stream {
                    if *remaining != 0 {
                        return Err(Error::Misuse(
                            "stream ended short of declared Content-Length".into(),
                        ));
                    }
                    self.send_state = SendState::Done;
                    self.maybe_finish_cycle();
                }
            }
            SendBody::Chunked => {
                if !data.is_empty() {
                    self.send_buf
                        .extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
                    self.send_buf.extend_from_slice(data);
                    self.send_buf.extend_from_slice(b"\r\n");
                }
                if end_stream {
                    self.send_buf.extend_from_slice(b"0\r\n\r\n");
                    self.send_state = SendState::Done;
                    self.maybe_finish_cycle();
                }
            }
        }
        Ok(())
    }

    fn submit_stream_reset(
        &mut self,
        stream_id: StreamId,
        error_code: ErrorKind,
    ) -> Result<(), Error> {
        self.check_stream(stream_id)?;
        // HTTP/1 has no reset primitive; the stream is the connection.
        self.push_event(Event::StreamResetSent {
            stream_id: STREAM_ID,
            error_code,
        });
        self.terminate(ErrorKind::NoError, None);
        Ok(())
    }

    fn submit_close(&mut self, error_code: ErrorKind) -> Result<(), Error> {
        if self.terminated {
            return Err(Error::Misuse("connection already terminated".into()));
        }
        if self.idle() || self.tunnel {
            self.terminate(error_code, None);
        } else {
            self.close_after = true;
        }
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

impl Http1Protocol {
    fn check_stream(&self, stream_id: StreamId) -> Result<(), Error> {
        if stream_id != STREAM_ID {
            return Err(Error::Misuse(format!(
                "invalid HTTP/1 stream id {stream_id}"
            )));
        }
        if self.terminated {
            return Err(Error::Misuse("connection terminated".into()));
        }
        Ok(())
    }
}

impl TcpTransport for Http1Protocol {
    fn bytes_received(&mut self, data: &[u8]) {
        if data.is_empty() || self.terminated {
            return;
        }
        self.recv_buf.extend_from_slice(data);
        self.process_recv();
    }

    fn bytes_to_send(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.send_buf)
    }

    fn eof_received(&mut self) {
        if self.terminated {
            return;
        }
        if self.tunnel {
            self.terminate(ErrorKind::NoError, None);
            return;
        }
        match &self.recv_state {
            RecvState::Body(BodyDecoder::UntilClose) => {
                // Close legitimately delimits this response body.
                self.push_event(Event::DataReceived {
                    stream_id: STREAM_ID,
                    data: Vec::new(),
                    end_stream: true,
                });
                self.terminate(ErrorKind::NoError, None);
            }
            RecvState::Body(_) => {
                self.protocol_error("peer closed inside a message body");
            }
            RecvState::Head if !self.recv_buf.is_empty() => {
                self.protocol_error("peer closed inside a message head");
            }
            _ => self.terminate(ErrorKind::NoError, None),
        }
    }

    fn connection_lost(&mut self, message: Option<String>) {
        if self.terminated {
            return;
        }
        match message {
            Some(message) => self.terminate(ErrorKind::InternalError, Some(message)),
            None => self.terminate(ErrorKind::NoError, None),
        }
    }
}

/// Split an absolute-form request target into scheme, authority and path.
fn split_absolute_form(target: &[u8]) -> Option<(Vec<u8>, Vec<u8>, Vec<u8>)> {
    let scheme_len = if target.starts_with(b"http://") {
        4
    } else if target.starts_with(b"https://") {
        5
    } else {
        return None;
    };
    let rest = &target[scheme_len + 3..];
    let path_start = rest.iter().position(|&b| b == b'/');
    let (authority, path) = match path_start {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, &b"/"[..]),
    };
    Some((
        target[..scheme_len].to_vec(),
        authority.to_vec(),
        path.to_vec(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_request(authority: &str, path: &str) -> Vec<HeaderField> {
        vec![
            HeaderField::new(b":method", b"GET"),
            HeaderField::new(b":scheme", b"http"),
            HeaderField::new(PSEUDO_AUTHORITY, authority.as_bytes()),
            HeaderField::new(PSEUDO_PATH, path.as_bytes()),
        ]
    }

    fn drain(proto: &mut Http1Protocol) -> Vec<Event> {
        std::iter::from_fn(|| proto.next_event()).collect()
    }

    #[test]
    fn client_serializes_get_request() {
        let mut client = Http1Protocol::client(false);
        let stream_id = client.get_available_stream_id().unwrap();
        assert_eq!(stream_id, 1);
        client
            .submit_headers(stream_id, &get_request("example.test", "/"), true)
            .unwrap();
        let bytes = client.bytes_to_send();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("GET / HTTP/1.1\r\n"));
        assert!(text.contains("host: example.test\r\n"));
        assert!(text.contains("content-length: 0\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn server_synthesizes_request_pseudo_headers() {
        let mut server = Http1Protocol::server(false);
        server.bytes_received(b"GET /x HTTP/1.1\r\nHost: example.test\r\nAccept: */*\r\n\r\n");
        let events = drain(&mut server);
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::HeadersReceived {
                stream_id,
                headers,
                end_stream,
            } => {
                assert_eq!(*stream_id, 1);
                assert!(*end_stream);
                assert_eq!(headers[0], HeaderField::new(b":method", b"GET"));
                assert_eq!(headers[1], HeaderField::new(b":scheme", b"http"));
                assert_eq!(headers[2], HeaderField::new(b":authority", b"example.test"));
                assert_eq!(headers[3], HeaderField::new(b":path", b"/x"));
                // Host was folded into :authority; Accept kept its case.
                assert_eq!(headers[4], HeaderField::new(b"Accept", b"*/*"));
            }
            other => panic!("expected HeadersReceived, got {other:?}"),
        }
    }

    #[test]
    fn server_requires_host_for_http11() {
        let mut server = Http1Protocol::server(false);
        server.bytes_received(b"GET / HTTP/1.1\r\n\r\n");
        let events = drain(&mut server);
        assert!(matches!(
            events[0],
            Event::ConnectionTerminated {
                error_code: ErrorKind::ProtocolError,
                ..
            }
        ));
        assert!(server.has_expired());
    }

    #[test]
    fn absolute_form_target_is_split() {
        let mut server = Http1Protocol::server(false);
        server.bytes_received(b"GET http://proxy.test/a/b HTTP/1.1\r\nhost: proxy.test\r\n\r\n");
        let events = drain(&mut server);
        match &events[0] {
            Event::HeadersReceived { headers, .. } => {
                assert_eq!(headers[1], HeaderField::new(b":scheme", b"http"));
                assert_eq!(headers[2], HeaderField::new(b":authority", b"proxy.test"));
                assert_eq!(headers[3], HeaderField::new(b":path", b"/a/b"));
            }
            other => panic!("expected HeadersReceived, got {other:?}"),
        }
    }

    #[test]
    fn full_exchange_and_reuse() {
        let mut client = Http1Protocol::client(false);
        let mut server = Http1Protocol::server(false);

        let stream_id = client.get_available_stream_id().unwrap();
        client
            .submit_headers(stream_id, &get_request("example.test", "/"), true)
            .unwrap();
        assert!(!client.is_available());
        server.bytes_received(&client.bytes_to_send());
        let _request = drain(&mut server);

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
        client.bytes_received(&server.bytes_to_send());

        let events = drain(&mut client);
        assert_eq!(events.len(), 2);
        match &events[0] {
            Event::HeadersReceived {
                headers,
                end_stream,
                ..
            } => {
                assert_eq!(headers[0], HeaderField::new(b":status", b"200"));
                assert!(!*end_stream);
            }
            other => panic!("expected HeadersReceived, got {other:?}"),
        }
        match &events[1] {
            Event::DataReceived {
                data, end_stream, ..
            } => {
                assert_eq!(data, b"hi");
                assert!(*end_stream);
            }
            other => panic!("expected DataReceived, got {other:?}"),
        }

        // Both sides are reusable and stream 1 is valid again.
        assert!(client.is_available());
        assert!(server.is_available());
        assert_eq!(client.get_available_stream_id().unwrap(), 1);
    }

    #[test]
    fn chunked_request_round_trip() {
        let mut client = Http1Protocol::client(false);
        let mut server = Http1Protocol::server(false);

        let mut headers = get_request("example.test", "/upload");
        headers[0] = HeaderField::new(b":method", b"POST");
        client.submit_headers(1, &headers, false).unwrap();
        client.submit_data(1, b"hello ", false).unwrap();
        client.submit_data(1, b"world", true).unwrap();

        let wire = client.bytes_to_send();
        let text = String::from_utf8(wire.clone()).unwrap();
        assert!(text.contains("transfer-encoding: chunked\r\n"));
        assert!(text.contains("6\r\nhello \r\n"));
        assert!(text.ends_with("0\r\n\r\n"));

        server.bytes_received(&wire);
        let events = drain(&mut server);
        let body: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                Event::DataReceived { data, .. } => Some(data.clone()),
                _ => None,
            })
            .flatten()
            .collect();
        assert_eq!(body, b"hello world");
        assert!(events.last().unwrap().ends_stream());
    }

    #[test]
    fn close_delimited_response_ends_on_eof() {
        let mut client = Http1Protocol::client(false);
        client
            .submit_headers(1, &get_request("example.test", "/"), true)
            .unwrap();
        let _ = client.bytes_to_send();

        client.bytes_received(b"HTTP/1.1 200 OK\r\n\r\nstream");
        client.bytes_received(b" of bytes");
        client.eof_received();

        let events = drain(&mut client);
        let body: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                Event::DataReceived { data, .. } => Some(data.clone()),
                _ => None,
            })
            .flatten()
            .collect();
        assert_eq!(body, b"stream of bytes");
        assert!(matches!(
            events.last().unwrap(),
            Event::ConnectionTerminated {
                error_code: ErrorKind::NoError,
                ..
            }
        ));
    }

    #[test]
    fn connection_close_header_ends_connection_after_exchange() {
        let mut server = Http1Protocol::server(false);
        server.bytes_received(
            b"GET / HTTP/1.1\r\nhost: example.test\r\nconnection: close\r\n\r\n",
        );
        let _ = drain(&mut server);
        server
            .submit_headers(1, &[HeaderField::new(b":status", b"204")], true)
            .unwrap();
        let events = drain(&mut server);
        assert!(matches!(
            events.last().unwrap(),
            Event::ConnectionTerminated {
                error_code: ErrorKind::NoError,
                ..
            }
        ));
        assert!(!server.is_available());
    }

    #[test]
    fn http10_request_without_host_gets_empty_authority() {
        let mut server = Http1Protocol::server(false);
        server.bytes_received(b"GET / HTTP/1.0\r\n\r\n");
        let events = drain(&mut server);
        match &events[0] {
            Event::HeadersReceived { headers, .. } => {
                assert_eq!(headers[2], HeaderField::new(b":authority", b""));
            }
            other => panic!("expected HeadersReceived, got {other:?}"),
        }
    }

    #[test]
    fn stream_reset_forces_connection_close() {
        let mut client = Http1Protocol::client(false);
        client
            .submit_headers(1, &get_request("example.test", "/"), true)
            .unwrap();
        client.submit_stream_reset(1, ErrorKind::Cancel).unwrap();
        let events = drain(&mut client);
        assert!(matches!(
            events[0],
            Event::StreamResetSent {
                stream_id: 1,
                error_code: ErrorKind::Cancel,
            }
        ));
        assert!(matches!(events[1], Event::ConnectionTerminated { .. }));
        // Invariant: the queue stays empty forever afterwards.
        assert!(client.next_event().is_none());
        assert!(client.next_event().is_none());
    }

    #[test]
    fn busy_connection_rejects_new_streams() {
        let mut client = Http1Protocol::client(false);
        client
            .submit_headers(1, &get_request("example.test", "/"), true)
            .unwrap();
        assert!(matches!(
            client.get_available_stream_id(),
            Err(Error::NotAvailable)
        ));
        assert!(matches!(
            client.submit_headers(1, &get_request("example.test", "/"), true),
            Err(Error::Misuse(_))
        ));
    }

    #[test]
    fn submit_data_without_body_is_misuse() {
        let mut client = Http1Protocol::client(false);
        assert!(matches!(
            client.submit_data(1, b"x", false),
            Err(Error::Misuse(_))
        ));
    }

    #[test]
    fn informational_response_keeps_waiting() {
        let mut client = Http1Protocol::client(false);
        client
            .submit_headers(1, &get_request("example.test", "/"), true)
            .unwrap();
        let _ = client.bytes_to_send();
        client.bytes_received(b"HTTP/1.1 100 Continue\r\n\r\n");
        client.bytes_received(b"HTTP/1.1 204 No Content\r\n\r\n");
        let events = drain(&mut client);
        assert_eq!(events.len(), 2);
        assert!(!events[0].ends_stream());
        assert!(events[1].ends_stream());
        assert!(client.is_available());
    }

    #[test]
    fn connect_establishes_tunnel() {
        let mut client = Http1Protocol::client(false);
        let mut server = Http1Protocol::server(false);

        client
            .submit_headers(
                1,
                &[
                    HeaderField::new(b":method", b"CONNECT"),
                    HeaderField::new(b":authority", b"example.test:443"),
                ],
                false,
            )
            .unwrap();
        server.bytes_received(&client.bytes_to_send());
        let events = drain(&mut server);
        match &events[0] {
            Event::HeadersReceived {
                headers,
                end_stream,
                ..
            } => {
                assert_eq!(headers[0], HeaderField::new(b":method", b"CONNECT"));
                assert_eq!(
                    headers[1],
                    HeaderField::new(b":authority", b"example.test:443")
                );
                assert!(!*end_stream);
            }
            other => panic!("expected HeadersReceived, got {other:?}"),
        }

        server
            .submit_headers(1, &[HeaderField::new(b":status", b"200")], false)
            .unwrap();
        client.bytes_received(&server.bytes_to_send());
        let _ = drain(&mut client);

        // Tunnel bytes pass through unframed, in both directions.
        client.submit_data(1, b"raw client bytes", false).unwrap();
        server.bytes_received(&client.bytes_to_send());
        let events = drain(&mut server);
        assert_eq!(
            events[0],
            Event::DataReceived {
                stream_id: 1,
                data: b"raw client bytes".to_vec(),
                end_stream: false,
            }
        );

        server.submit_data(1, b"raw server bytes", false).unwrap();
        client.bytes_received(&server.bytes_to_send());
        let events = drain(&mut client);
        assert_eq!(
            events[0],
            Event::DataReceived {
                stream_id: 1,
                data: b"raw server bytes".to_vec(),
                end_stream: false,
            }
        );

        // No new exchanges on a tunnelling connection.
        assert!(!client.is_available());
        assert!(matches!(
            client.submit_headers(1, &get_request("example.test", "/"), true),
            Err(Error::Misuse(_))
        ));
    }

    #[test]
    fn head_response_has_no_body() {
        let mut client = Http1Protocol::client(false);
        let mut headers = get_request("example.test", "/");
        headers[0] = HeaderField::new(b":method", b"HEAD");
        client.submit_headers(1, &headers, true).unwrap();
        let _ = client.bytes_to_send();
        client.bytes_received(b"HTTP/1.1 200 OK\r\ncontent-length: 1234\r\n\r\n");
        let events = drain(&mut client);
        assert_eq!(events.len(), 1);
        assert!(events[0].ends_stream());
        assert!(client.is_available());
    }

    #[test]
    fn submit_close_when_idle_terminates() {
        let mut client = Http1Protocol::client(false);
        client.submit_close(ErrorKind::NoError).unwrap();
        assert!(matches!(
            drain(&mut client)[0],
            Event::ConnectionTerminated {
                error_code: ErrorKind::NoError,
                ..
            }
        ));
    }

    #[test]
    fn submit_close_mid_exchange_defers() {
        let mut server = Http1Protocol::server(false);
        server.bytes_received(b"GET / HTTP/1.1\r\nhost: a\r\n\r\n");
        let _ = drain(&mut server);
        server.submit_close(ErrorKind::NoError).unwrap();
        assert!(drain(&mut server).is_empty());
        server
            .submit_headers(1, &[HeaderField::new(b":status", b"204")], true)
            .unwrap();
        assert!(matches!(
            drain(&mut server)[0],
            Event::ConnectionTerminated { .. }
        ));
    }

    #[test]
    fn eof_inside_message_is_a_protocol_error() {
        let mut server = Http1Protocol::server(false);
        server.bytes_received(b"POST / HTTP/1.1\r\nhost: a\r\ncontent-length: 10\r\n\r\nabc");
        server.eof_received();
        let events = drain(&mut server);
        assert!(matches!(
            events.last().unwrap(),
            Event::ConnectionTerminated {
                error_code: ErrorKind::ProtocolError,
                ..
            }
        ));
    }

    #[test]
    fn connection_lost_synthesizes_internal_error() {
        let mut client = Http1Protocol::client(false);
        client.connection_lost(Some("broken pipe".into()));
        match &drain(&mut client)[0] {
            Event::ConnectionTerminated {
                error_code,
                message,
            } => {
                assert_eq!(*error_code, ErrorKind::InternalError);
                assert_eq!(message.as_deref(), Some("broken pipe"));
            }
            other => panic!("expected ConnectionTerminated, got {other:?}"),
        }
    }
}
