//! HTTP/2 frame codec (RFC 9113 section 4).
//!
//! Every frame starts with a fixed 9-byte header: 24-bit payload length,
//! 8-bit type, 8-bit flags and a 31-bit stream identifier. Frames the
//! engine never sends (PRIORITY, PUSH_PROMISE) decode to skeleton variants
//! carrying only what the connection layer needs to ignore or reject them.

use crate::error::H2Error;
use crate::settings::Settings;

/// Frame header size in bytes.
pub const FRAME_HEADER_LEN: usize = 9;

/// Frame flags (RFC 9113 section 6).
pub mod flags {
    pub const END_STREAM: u8 = 0x1;
    pub const ACK: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

/// HTTP/2 frame types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Data,
    Headers,
    Priority,
    RstStream,
    Settings,
    PushPromise,
    Ping,
    Goaway,
    WindowUpdate,
    Continuation,
    Unknown(u8),
}

impl FrameType {
    pub fn from_wire(value: u8) -> Self {
        match value {
            0x0 => FrameType::Data,
            0x1 => FrameType::Headers,
            0x2 => FrameType::Priority,
            0x3 => FrameType::RstStream,
            0x4 => FrameType::Settings,
            0x5 => FrameType::PushPromise,
            0x6 => FrameType::Ping,
            0x7 => FrameType::Goaway,
            0x8 => FrameType::WindowUpdate,
            0x9 => FrameType::Continuation,
            other => FrameType::Unknown(other),
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            FrameType::Data => 0x0,
            FrameType::Headers => 0x1,
            FrameType::Priority => 0x2,
            FrameType::RstStream => 0x3,
            FrameType::Settings => 0x4,
            FrameType::PushPromise => 0x5,
            FrameType::Ping => 0x6,
            FrameType::Goaway => 0x7,
            FrameType::WindowUpdate => 0x8,
            FrameType::Continuation => 0x9,
            FrameType::Unknown(other) => other,
        }
    }
}

/// One decoded HTTP/2 frame.
#[derive(Debug, Clone)]
pub enum Frame {
    Data {
        stream_id: u32,
        payload: Vec<u8>,
        end_stream: bool,
    },
    Headers {
        stream_id: u32,
        /// HPACK-encoded header block fragment (padding and priority
        /// information already stripped).
        fragment: Vec<u8>,
        end_stream: bool,
        end_headers: bool,
    },
    /// Advisory; the engine ignores priority signals.
    Priority { stream_id: u32 },
    RstStream {
        stream_id: u32,
        error_code: u32,
    },
    Settings {
        ack: bool,
        settings: Settings,
    },
    /// Push is always rejected, so only the ids are retained.
    PushPromise {
        stream_id: u32,
        promised_stream_id: u32,
    },
    Ping {
        ack: bool,
        payload: [u8; 8],
    },
    Goaway {
        last_stream_id: u32,
        error_code: u32,
        debug_data: Vec<u8>,
    },
    WindowUpdate {
        stream_id: u32,
        increment: u32,
    },
    Continuation {
        stream_id: u32,
        fragment: Vec<u8>,
        end_headers: bool,
    },
    /// Unknown frame types MUST be ignored.
    Unknown { frame_type: u8 },
}

// ── Encoding ────────────────────────────────────────────────────────

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

/// Write a 9-byte frame header.
pub fn encode_frame_header(
    buf: &mut Vec<u8>,
    payload_len: usize,
    frame_type: FrameType,
    frame_flags: u8,
    stream_id: u32,
) {
    let len = payload_len as u32;
    buf.push((len >> 16) as u8);
    buf.push((len >> 8) as u8);
    buf.push(len as u8);
    buf.push(frame_type.to_wire());
    buf.push(frame_flags);
    put_u32(buf, stream_id & 0x7fff_ffff);
}

impl Frame {
    /// Append the wire encoding of this frame to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Frame::Data {
                stream_id,
                payload,
                end_stream,
            } => {
                let frame_flags = if *end_stream { flags::END_STREAM } else { 0 };
                encode_frame_header(buf, payload.len(), FrameType::Data, frame_flags, *stream_id);
                buf.extend_from_slice(payload);
            }
            Frame::Headers {
                stream_id,
                fragment,
                end_stream,
                end_headers,
            } => {
                let mut frame_flags = 0;
                if *end_stream {
                    frame_flags |= flags::END_STREAM;
                }
                if *end_headers {
                    frame_flags |= flags::END_HEADERS;
                }
                encode_frame_header(
                    buf,
                    fragment.len(),
                    FrameType::Headers,
                    frame_flags,
                    *stream_id,
                );
                buf.extend_from_slice(fragment);
            }
            Frame::Priority { stream_id } => {
                // 4 bytes dependency + 1 byte weight, all defaults.
                encode_frame_header(buf, 5, FrameType::Priority, 0, *stream_id);
                put_u32(buf, 0);
                buf.push(0);
            }
            Frame::RstStream {
                stream_id,
                error_code,
            } => {
                encode_frame_header(buf, 4, FrameType::RstStream, 0, *stream_id);
                put_u32(buf, *error_code);
            }
            Frame::Settings { ack, settings } => {
                if *ack {
                    encode_frame_header(buf, 0, FrameType::Settings, flags::ACK, 0);
                } else {
                    let payload = settings.encode_to_vec();
                    encode_frame_header(buf, payload.len(), FrameType::Settings, 0, 0);
                    buf.extend_from_slice(&payload);
                }
            }
            Frame::PushPromise {
                stream_id,
                promised_stream_id,
            } => {
                encode_frame_header(buf, 4, FrameType::PushPromise, flags::END_HEADERS, *stream_id);
                put_u32(buf, *promised_stream_id & 0x7fff_ffff);
            }
            Frame::Ping { ack, payload } => {
                let frame_flags = if *ack { flags::ACK } else { 0 };
                encode_frame_header(buf, 8, FrameType::Ping, frame_flags, 0);
                buf.extend_from_slice(payload);
            }
            Frame::Goaway {
                last_stream_id,
                error_code,
                debug_data,
            } => {
                encode_frame_header(buf, 8 + debug_data.len(), FrameType::Goaway, 0, 0);
                put_u32(buf, *last_stream_id & 0x7fff_ffff);
                put_u32(buf, *error_code);
                buf.extend_from_slice(debug_data);
            }
            Frame::WindowUpdate {
                stream_id,
                increment,
            } => {
                encode_frame_header(buf, 4, FrameType::WindowUpdate, 0, *stream_id);
                put_u32(buf, *increment & 0x7fff_ffff);
            }
            Frame::Continuation {
                stream_id,
                fragment,
                end_headers,
            } => {
                let frame_flags = if *end_headers { flags::END_HEADERS } else { 0 };
                encode_frame_header(
                    buf,
                    fragment.len(),
                    FrameType::Continuation,
                    frame_flags,
                    *stream_id,
                );
                buf.extend_from_slice(fragment);
            }
            Frame::Unknown { frame_type } => {
                encode_frame_header(buf, 0, FrameType::Unknown(*frame_type), 0, 0);
            }
        }
    }
}

// ── Decoding ────────────────────────────────────────────────────────

fn get_u32(buf: &[u8]) -> u32 {
    u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])
}

struct RawFrame<'a> {
    frame_type: FrameType,
    frame_flags: u8,
    stream_id: u32,
    payload: &'a [u8],
}

fn decode_raw(buf: &[u8], max_frame_size: u32) -> Result<Option<(RawFrame<'_>, usize)>, H2Error> {
    if buf.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }
    let length =
        (usize::from(buf[0]) << 16) | (usize::from(buf[1]) << 8) | usize::from(buf[2]);
    let frame_type = FrameType::from_wire(buf[3]);
    // SETTINGS is exempt from the limit: its size scales with the number
    // of parameters, which may exceed a lowered max_frame_size.
    if length > max_frame_size as usize && frame_type != FrameType::Settings {
        return Err(H2Error::FrameSize);
    }
    let total = FRAME_HEADER_LEN + length;
    if buf.len() < total {
        return Ok(None);
    }
    Ok(Some((
        RawFrame {
            frame_type,
            frame_flags: buf[4],
            stream_id: get_u32(&buf[5..9]) & 0x7fff_ffff,
            payload: &buf[FRAME_HEADER_LEN..total],
        },
        total,
    )))
}

/// Strip the padding length octet and trailing padding when PADDED is set.
fn unpad<'a>(payload: &'a [u8], frame_flags: u8) -> Result<&'a [u8], H2Error> {
    if frame_flags & flags::PADDED == 0 {
        return Ok(payload);
    }
    let Some((&pad_len, rest)) = payload.split_first() else {
        return Err(H2Error::FrameSize);
    };
    let pad_len = usize::from(pad_len);
    if pad_len > rest.len() {
        return Err(H2Error::Protocol("padding exceeds payload".into()));
    }
    Ok(&rest[..rest.len() - pad_len])
}

fn require_stream(raw: &RawFrame<'_>, name: &str) -> Result<(), H2Error> {
    if raw.stream_id == 0 {
        return Err(H2Error::Protocol(format!("{name} frame on stream 0")));
    }
    Ok(())
}

fn require_connection(raw: &RawFrame<'_>, name: &str) -> Result<(), H2Error> {
    if raw.stream_id != 0 {
        return Err(H2Error::Protocol(format!("{name} frame on a stream")));
    }
    Ok(())
}

/// Decode one frame from the front of `buf`.
///
/// Returns `Ok(Some((frame, bytes_consumed)))`, `Ok(None)` when the buffer
/// holds an incomplete frame, or a connection error.
pub fn decode_frame(buf: &[u8], max_frame_size: u32) -> Result<Option<(Frame, usize)>, H2Error> {
    let Some((raw, consumed)) = decode_raw(buf, max_frame_size)? else {
        return Ok(None);
    };
    let frame_flags = raw.frame_flags;
    let stream_id = raw.stream_id;

    let frame = match raw.frame_type {
        FrameType::Data => {
            require_stream(&raw, "DATA")?;
            let payload = unpad(raw.payload, frame_flags)?;
            Frame::Data {
                stream_id,
                payload: payload.to_vec(),
                end_stream: frame_flags & flags::END_STREAM != 0,
            }
        }
        FrameType::Headers => {
            require_stream(&raw, "HEADERS")?;
            let mut fragment = unpad(raw.payload, frame_flags)?;
            if frame_flags & flags::PRIORITY != 0 {
                // Exclusive bit, dependency and weight are discarded.
                if fragment.len() < 5 {
                    return Err(H2Error::FrameSize);
                }
                fragment = &fragment[5..];
            }
            Frame::Headers {
                stream_id,
                fragment: fragment.to_vec(),
                end_stream: frame_flags & flags::END_STREAM != 0,
                end_headers: frame_flags & flags::END_HEADERS != 0,
            }
        }
        FrameType::Priority => {
            require_stream(&raw, "PRIORITY")?;
            if raw.payload.len() != 5 {
                return Err(H2Error::FrameSize);
            }
            Frame::Priority { stream_id }
        }
        FrameType::RstStream => {
            require_stream(&raw, "RST_STREAM")?;
            if raw.payload.len() != 4 {
                return Err(H2Error::FrameSize);
            }
            Frame::RstStream {
                stream_id,
                error_code: get_u32(raw.payload),
            }
        }
        FrameType::Settings => {
            require_connection(&raw, "SETTINGS")?;
            if frame_flags & flags::ACK != 0 {
                if !raw.payload.is_empty() {
                    return Err(H2Error::FrameSize);
                }
                Frame::Settings {
                    ack: true,
                    settings: Settings::default(),
                }
            } else {
                Frame::Settings {
                    ack: false,
                    settings: Settings::decode(raw.payload)?,
                }
            }
        }
        FrameType::PushPromise => {
            require_stream(&raw, "PUSH_PROMISE")?;
            let payload = unpad(raw.payload, frame_flags)?;
            if payload.len() < 4 {
                return Err(H2Error::FrameSize);
            }
            Frame::PushPromise {
                stream_id,
                promised_stream_id: get_u32(payload) & 0x7fff_ffff,
            }
        }
        FrameType::Ping => {
            require_connection(&raw, "PING")?;
            if raw.payload.len() != 8 {
                return Err(H2Error::FrameSize);
            }
            let mut payload = [0u8; 8];
            payload.copy_from_slice(raw.payload);
            Frame::Ping {
                ack: frame_flags & flags::ACK != 0,
                payload,
            }
        }
        FrameType::Goaway => {
            require_connection(&raw, "GOAWAY")?;
            if raw.payload.len() < 8 {
                return Err(H2Error::FrameSize);
            }
            Frame::Goaway {
                last_stream_id: get_u32(raw.payload) & 0x7fff_ffff,
                error_code: get_u32(&raw.payload[4..8]),
                debug_data: raw.payload[8..].to_vec(),
            }
        }
        FrameType::WindowUpdate => {
            if raw.payload.len() != 4 {
                return Err(H2Error::FrameSize);
            }
            let increment = get_u32(raw.payload) & 0x7fff_ffff;
            if increment == 0 {
                return Err(H2Error::Protocol("WINDOW_UPDATE with zero increment".into()));
            }
            Frame::WindowUpdate {
                stream_id,
                increment,
            }
        }
        FrameType::Continuation => {
            require_stream(&raw, "CONTINUATION")?;
            Frame::Continuation {
                stream_id,
                fragment: raw.payload.to_vec(),
                end_headers: frame_flags & flags::END_HEADERS != 0,
            }
        }
        FrameType::Unknown(frame_type) => Frame::Unknown { frame_type },
    };

    Ok(Some((frame, consumed)))
}
