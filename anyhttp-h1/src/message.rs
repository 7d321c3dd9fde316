//! HTTP/1.1 message syntax: head parsing, chunked transfer decoding, and
//! serialization helpers (RFC 9112).
//!
//! Parsing works on raw bytes; header values are not required to be UTF-8.
//! Regular header names are preserved as received and written lowercase on
//! the way out.

use anyhttp_core::HeaderField;

/// Parsed request line plus header block.
#[derive(Debug)]
pub(crate) struct RequestHead {
    pub method: Vec<u8>,
    pub target: Vec<u8>,
    /// Minor version of `HTTP/1.x`.
    pub version_minor: u8,
    pub headers: Vec<HeaderField>,
}

/// Parsed status line plus header block.
#[derive(Debug)]
pub(crate) struct ResponseHead {
    pub status: u16,
    pub headers: Vec<HeaderField>,
}

/// Index just past the `\r\n\r\n` terminating the head, if present.
pub(crate) fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

fn split_lines(head: &[u8]) -> impl Iterator<Item = &[u8]> {
    head.split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.is_empty())
}

fn parse_version(token: &[u8]) -> Result<u8, String> {
    match token {
        b"HTTP/1.1" => Ok(1),
        b"HTTP/1.0" => Ok(0),
        _ => Err(format!(
            "unsupported HTTP version {:?}",
            String::from_utf8_lossy(token)
        )),
    }
}

fn parse_header_lines<'a>(
    lines: impl Iterator<Item = &'a [u8]>,
) -> Result<Vec<HeaderField>, String> {
    let mut headers = Vec::new();
    for line in lines {
        let colon = line
            .iter()
            .position(|&b| b == b':')
            .ok_or_else(|| "header line without colon".to_string())?;
        let name = &line[..colon];
        if name.is_empty() || name.iter().any(|&b| b == b' ' || b == b'\t') {
            return Err("malformed header name".into());
        }
        let value = trim_ows(&line[colon + 1..]);
        if name[0] == b':' {
            return Err("pseudo-header not allowed in HTTP/1".into());
        }
        headers.push(HeaderField::new(name, value));
    }
    Ok(headers)
}

fn trim_ows(value: &[u8]) -> &[u8] {
    let start = value
        .iter()
        .position(|&b| b != b' ' && b != b'\t')
        .unwrap_or(value.len());
    let end = value
        .iter()
        .rposition(|&b| b != b' ' && b != b'\t')
        .map_or(start, |i| i + 1);
    &value[start..end]
}

/// Parse a request head (`head` excludes the final `\r\n\r\n`).
pub(crate) fn parse_request_head(head: &[u8]) -> Result<RequestHead, String> {
    let mut lines = split_lines(head);
    let request_line = lines.next().ok_or("empty request head")?;
    let mut parts = request_line.splitn(3, |&b| b == b' ');
    let method = parts.next().filter(|m| !m.is_empty()).ok_or("missing method")?;
    let target = parts.next().filter(|t| !t.is_empty()).ok_or("missing request target")?;
    let version = parts.next().ok_or("missing HTTP version")?;
    Ok(RequestHead {
        method: method.to_vec(),
        target: target.to_vec(),
        version_minor: parse_version(version)?,
        headers: parse_header_lines(lines)?,
    })
}

/// Parse a response head (`head` excludes the final `\r\n\r\n`).
///
/// The reason phrase is discarded.
pub(crate) fn parse_response_head(head: &[u8]) -> Result<ResponseHead, String> {
    let mut lines = split_lines(head);
    let status_line = lines.next().ok_or("empty response head")?;
    let mut parts = status_line.splitn(3, |&b| b == b' ');
    let version = parts.next().ok_or("missing HTTP version")?;
    parse_version(version)?;
    let status_token = parts.next().ok_or("missing status code")?;
    let status: u16 = std::str::from_utf8(status_token)
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|s| (100..600).contains(s))
        .ok_or("malformed status code")?;
    Ok(ResponseHead {
        status,
        headers: parse_header_lines(lines)?,
    })
}

// ── Body framing ────────────────────────────────────────────────────

/// How the body of a message is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyLen {
    Empty,
    Known(u64),
    Chunked,
    /// Client responses only: the body runs until the connection closes.
    UntilClose,
}

fn content_length(headers: &[HeaderField]) -> Result<Option<u64>, String> {
    let mut result = None;
    for h in headers {
        if h.name.eq_ignore_ascii_case(b"content-length") {
            let value: u64 = std::str::from_utf8(&h.value)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .ok_or("malformed Content-Length")?;
            if let Some(previous) = result
                && previous != value
            {
                return Err("conflicting Content-Length headers".into());
            }
            result = Some(value);
        }
    }
    Ok(result)
}

fn is_chunked(headers: &[HeaderField]) -> bool {
    headers.iter().any(|h| {
        h.name.eq_ignore_ascii_case(b"transfer-encoding")
            && h.value
                .split(|&b| b == b',')
                .any(|v| trim_ows(v).eq_ignore_ascii_case(b"chunked"))
    })
}

/// Body delimitation of a received request.
pub(crate) fn request_body_len(headers: &[HeaderField]) -> Result<BodyLen, String> {
    if is_chunked(headers) {
        return Ok(BodyLen::Chunked);
    }
    Ok(match content_length(headers)? {
        Some(0) | None => BodyLen::Empty,
        Some(n) => BodyLen::Known(n),
    })
}

/// Body delimitation of a received response.
pub(crate) fn response_body_len(
    status: u16,
    request_was_head: bool,
    headers: &[HeaderField],
) -> Result<BodyLen, String> {
    if request_was_head || status == 204 || status == 304 {
        return Ok(BodyLen::Empty);
    }
    if is_chunked(headers) {
        return Ok(BodyLen::Chunked);
    }
    Ok(match content_length(headers)? {
        Some(0) => BodyLen::Empty,
        Some(n) => BodyLen::Known(n),
        None => BodyLen::UntilClose,
    })
}

// ── Chunked transfer decoding ───────────────────────────────────────

/// Incremental decoder for chunked transfer encoding.
///
/// Trailer fields after the last chunk are consumed and dropped.
#[derive(Debug)]
pub(crate) struct ChunkDecoder {
    state: ChunkState,
}

#[derive(Debug)]
enum ChunkState {
    Size,
    Data { remaining: u64 },
    DataCrlf,
    Trailers,
    Finished,
}

/// One step of chunked decoding.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ChunkProgress {
    /// Nothing decodable yet; feed more bytes.
    NeedMore,
    /// A slice of body data was decoded.
    Data(Vec<u8>),
    /// The terminal chunk (and any trailers) were consumed.
    Finished,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self {
            state: ChunkState::Size,
        }
    }

    /// Decode one step from `buf`, returning the progress made and the
    /// number of bytes consumed.
    pub fn advance(&mut self, buf: &[u8]) -> Result<(ChunkProgress, usize), String> {
        match self.state {
            ChunkState::Size => {
                let Some(line_end) = find_crlf(buf) else {
                    return Ok((ChunkProgress::NeedMore, 0));
                };
                let size_token = &buf[..line_end];
                // Chunk extensions are discarded.
                let size_hex = size_token
                    .split(|&b| b == b';')
                    .next()
                    .map(trim_ows)
                    .unwrap_or_default();
                let size = std::str::from_utf8(size_hex)
                    .ok()
                    .and_then(|s| u64::from_str_radix(s, 16).ok())
                    .ok_or("malformed chunk size")?;
                self.state = if size == 0 {
                    ChunkState::Trailers
                } else {
                    ChunkState::Data { remaining: size }
                };
                Ok((ChunkProgress::Data(Vec::new()), line_end + 2))
            }
            ChunkState::Data { remaining } => {
                if buf.is_empty() {
                    return Ok((ChunkProgress::NeedMore, 0));
                }
                let take = remaining.min(buf.len() as u64) as usize;
                let left = remaining - take as u64;
                self.state = if left == 0 {
                    ChunkState::DataCrlf
                } else {
                    ChunkState::Data { remaining: left }
                };
                Ok((ChunkProgress::Data(buf[..take].to_vec()), take))
            }
            ChunkState::DataCrlf => {
                if buf.len() < 2 {
                    return Ok((ChunkProgress::NeedMore, 0));
                }
                if &buf[..2] != b"\r\n" {
                    return Err("chunk data not terminated by CRLF".into());
                }
                self.state = ChunkState::Size;
                Ok((ChunkProgress::Data(Vec::new()), 2))
            }
            ChunkState::Trailers => {
                let Some(line_end) = find_crlf(buf) else {
                    return Ok((ChunkProgress::NeedMore, 0));
                };
                if line_end == 0 {
                    self.state = ChunkState::Finished;
                    return Ok((ChunkProgress::Finished, 2));
                }
                // A trailer field; drop it and keep scanning.
                Ok((ChunkProgress::Data(Vec::new()), line_end + 2))
            }
            ChunkState::Finished => Ok((ChunkProgress::Finished, 0)),
        }
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

// ── Serialization ───────────────────────────────────────────────────

pub(crate) fn write_request_line(buf: &mut Vec<u8>, method: &[u8], target: &[u8]) {
    buf.extend_from_slice(method);
    buf.push(b' ');
    buf.extend_from_slice(target);
    buf.extend_from_slice(b" HTTP/1.1\r\n");
}

pub(crate) fn write_status_line(buf: &mut Vec<u8>, status: u16) {
    buf.extend_from_slice(b"HTTP/1.1 ");
    buf.extend_from_slice(status.to_string().as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(reason_phrase(status).as_bytes());
    buf.extend_from_slice(b"\r\n");
}

pub(crate) fn write_header(buf: &mut Vec<u8>, name: &[u8], value: &[u8]) {
    buf.extend(name.iter().map(|b| b.to_ascii_lowercase()));
    buf.extend_from_slice(b": ");
    buf.extend_from_slice(value);
    buf.extend_from_slice(b"\r\n");
}

/// Reason phrase for common status codes; empty otherwise (the phrase is
/// advisory and receivers discard it).
pub(crate) fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        411 => "Length Required",
        413 => "Content Too Large",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "",
    }
}
