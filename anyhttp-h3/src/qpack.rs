//! QPACK header compression, static table only (RFC 9204).
//!
//! The engine advertises a dynamic table capacity of zero and never
//! references one, so header blocks are stateless: Required Insert Count
//! and Delta Base are always zero, and only static-table and literal
//! representations appear. This covers the standard header vocabulary
//! and sidesteps the encoder/decoder stream machinery entirely.

use anyhttp_core::HeaderField;

use crate::error::H3Error;
use crate::huffman;

/// Static table (RFC 9204 Appendix A), indices 0..=98.
const STATIC_TABLE: [(&[u8], &[u8]); 99] = [
    (b":authority", b""),
    (b":path", b"/"),
    (b"age", b"0"),
    (b"content-disposition", b""),
    (b"content-length", b"0"),
    (b"cookie", b""),
    (b"date", b""),
    (b"etag", b""),
    (b"if-modified-since", b""),
    (b"if-none-match", b""),
    (b"last-modified", b""),
    (b"link", b""),
    (b"location", b""),
    (b"referer", b""),
    (b"set-cookie", b""),
    (b":method", b"CONNECT"),
    (b":method", b"DELETE"),
    (b":method", b"GET"),
    (b":method", b"HEAD"),
    (b":method", b"OPTIONS"),
    (b":method", b"POST"),
    (b":method", b"PUT"),
    (b":scheme", b"http"),
    (b":scheme", b"https"),
    (b":status", b"103"),
    (b":status", b"200"),
    (b":status", b"304"),
    (b":status", b"404"),
    (b":status", b"503"),
    (b"accept", b"*/*"),
    (b"accept", b"application/dns-message"),
    (b"accept-encoding", b"gzip, deflate, br"),
    (b"accept-ranges", b"bytes"),
    (b"access-control-allow-headers", b"cache-control"),
    (b"access-control-allow-headers", b"content-type"),
    (b"access-control-allow-origin", b"*"),
    (b"cache-control", b"max-age=0"),
    (b"cache-control", b"max-age=2592000"),
    (b"cache-control", b"max-age=604800"),
    (b"cache-control", b"no-cache"),
    (b"cache-control", b"no-store"),
    (b"cache-control", b"public, max-age=31536000"),
    (b"content-encoding", b"br"),
    (b"content-encoding", b"gzip"),
    (b"content-type", b"application/dns-message"),
    (b"content-type", b"application/javascript"),
    (b"content-type", b"application/json"),
    (b"content-type", b"application/x-www-form-urlencoded"),
    (b"content-type", b"image/gif"),
    (b"content-type", b"image/jpeg"),
    (b"content-type", b"image/png"),
    (b"content-type", b"text/css"),
    (b"content-type", b"text/html; charset=utf-8"),
    (b"content-type", b"text/plain"),
    (b"content-type", b"text/plain;charset=utf-8"),
    (b"range", b"bytes=0-"),
    (b"strict-transport-security", b"max-age=31536000"),
    (b"strict-transport-security", b"max-age=31536000; includesubdomains"),
    (
        b"strict-transport-security",
        b"max-age=31536000; includesubdomains; preload",
    ),
    (b"vary", b"accept-encoding"),
    (b"vary", b"origin"),
    (b"x-content-type-options", b"nosniff"),
    (b"x-xss-protection", b"1; mode=block"),
    (b":status", b"100"),
    (b":status", b"204"),
    (b":status", b"206"),
    (b":status", b"302"),
    (b":status", b"400"),
    (b":status", b"403"),
    (b":status", b"421"),
    (b":status", b"425"),
    (b":status", b"500"),
    (b"accept-language", b""),
    (b"access-control-allow-credentials", b"FALSE"),
    (b"access-control-allow-credentials", b"TRUE"),
    (b"access-control-allow-headers", b"*"),
    (b"access-control-allow-methods", b"get"),
    (b"access-control-allow-methods", b"get, post, options"),
    (b"access-control-allow-methods", b"options"),
    (b"access-control-expose-headers", b"content-length"),
    (b"access-control-request-headers", b"content-type"),
    (b"access-control-request-method", b"get"),
    (b"access-control-request-method", b"post"),
    (b"alt-svc", b"clear"),
    (b"authorization", b""),
    (
        b"content-security-policy",
        b"script-src 'none'; object-src 'none'; base-uri 'none'",
    ),
    (b"early-data", b"1"),
    (b"expect-ct", b""),
    (b"forwarded", b""),
    (b"if-range", b""),
    (b"origin", b""),
    (b"purpose", b"prefetch"),
    (b"server", b""),
    (b"timing-allow-origin", b"*"),
    (b"upgrade-insecure-requests", b"1"),
    (b"user-agent", b""),
    (b"x-forwarded-for", b""),
    (b"x-frame-options", b"deny"),
    (b"x-frame-options", b"sameorigin"),
];

// ── Prefix-coded integers (RFC 9204 section 4.1.1) ──────────────────

fn encode_int(buf: &mut Vec<u8>, value: u64, prefix_bits: u8, pattern: u8) {
    let limit = (1u64 << prefix_bits) - 1;
    if value < limit {
        buf.push(pattern | value as u8);
        return;
    }
    buf.push(pattern | limit as u8);
    let mut rest = value - limit;
    while rest >= 0x80 {
        buf.push(0x80 | (rest & 0x7f) as u8);
        rest >>= 7;
    }
    buf.push(rest as u8);
}

fn decode_int(buf: &[u8], prefix_bits: u8) -> Option<(u64, usize)> {
    let first = *buf.first()?;
    let limit = (1u64 << prefix_bits) - 1;
    let prefix = u64::from(first) & limit;
    if prefix < limit {
        return Some((prefix, 1));
    }
    let mut value = limit;
    let mut shift = 0u32;
    for (i, &byte) in buf[1..].iter().enumerate() {
        value += u64::from(byte & 0x7f) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Some((value, i + 2));
        }
        if shift > 56 {
            return None;
        }
    }
    None
}

// ── String literals ─────────────────────────────────────────────────

/// Write a length-prefixed string; `huffman_bit` marks the H flag within
/// the prefix pattern.
fn encode_string(buf: &mut Vec<u8>, data: &[u8], prefix_bits: u8, pattern: u8, huffman_bit: u8) {
    let huffman_len = huffman::encoded_len(data);
    if huffman_len < data.len() {
        encode_int(buf, huffman_len as u64, prefix_bits, pattern | huffman_bit);
        huffman::encode(data, buf);
    } else {
        encode_int(buf, data.len() as u64, prefix_bits, pattern);
        buf.extend_from_slice(data);
    }
}

fn decode_string(
    buf: &[u8],
    prefix_bits: u8,
    huffman_bit: u8,
) -> Result<(Vec<u8>, usize), H3Error> {
    let first = *buf.first().ok_or(H3Error::Qpack)?;
    let huffman_coded = first & huffman_bit != 0;
    let (len, consumed) = decode_int(buf, prefix_bits).ok_or(H3Error::Qpack)?;
    let end = consumed + len as usize;
    if buf.len() < end {
        return Err(H3Error::Qpack);
    }
    let raw = &buf[consumed..end];
    let value = if huffman_coded {
        huffman::decode(raw).map_err(|_| H3Error::Qpack)?
    } else {
        raw.to_vec()
    };
    Ok((value, end))
}

// ── Encoding ────────────────────────────────────────────────────────

fn find_full(field: &HeaderField) -> Option<u64> {
    STATIC_TABLE
        .iter()
        .position(|&(name, value)| name == field.name && value == field.value)
        .map(|i| i as u64)
}

fn find_name(field: &HeaderField) -> Option<u64> {
    STATIC_TABLE
        .iter()
        .position(|&(name, _)| name == field.name)
        .map(|i| i as u64)
}

/// Encode a header list into one field section.
pub fn encode(headers: &[HeaderField], buf: &mut Vec<u8>) {
    // Field section prefix (section 4.5.1): Required Insert Count 0 and
    // Delta Base 0 — no dynamic table.
    buf.push(0x00);
    buf.push(0x00);

    for field in headers {
        if let Some(index) = find_full(field) {
            // Indexed field line, static table (section 4.5.2).
            encode_int(buf, index, 6, 0xc0);
        } else if let Some(name_index) = find_name(field) {
            // Literal with static name reference (section 4.5.4).
            encode_int(buf, name_index, 4, 0x50);
            encode_string(buf, &field.value, 7, 0x00, 0x80);
        } else {
            // Literal with literal name (section 4.5.6).
            encode_string(buf, &field.name, 3, 0x20, 0x08);
            encode_string(buf, &field.value, 7, 0x00, 0x80);
        }
    }
}

// ── Decoding ────────────────────────────────────────────────────────

/// Decode one field section.
pub fn decode(buf: &[u8]) -> Result<Vec<HeaderField>, H3Error> {
    let mut pos = 0;

    let (required_insert_count, consumed) = decode_int(buf, 8).ok_or(H3Error::Qpack)?;
    pos += consumed;
    if required_insert_count != 0 {
        // The peer referenced a dynamic table we never allowed.
        return Err(H3Error::Qpack);
    }
    let (_delta_base, consumed) = decode_int(buf.get(pos..).ok_or(H3Error::Qpack)?, 7)
        .ok_or(H3Error::Qpack)?;
    pos += consumed;

    let mut headers = Vec::new();
    while pos < buf.len() {
        let rest = &buf[pos..];
        let first = rest[0];

        if first & 0x80 != 0 {
            // Indexed field line (section 4.5.2); T bit selects the table.
            if first & 0x40 == 0 {
                return Err(H3Error::Qpack);
            }
            let (index, consumed) = decode_int(rest, 6).ok_or(H3Error::Qpack)?;
            pos += consumed;
            let &(name, value) = STATIC_TABLE.get(index as usize).ok_or(H3Error::Qpack)?;
            headers.push(HeaderField::new(name, value));
        } else if first & 0x40 != 0 {
            // Literal with name reference (section 4.5.4).
            if first & 0x10 == 0 {
                return Err(H3Error::Qpack);
            }
            let (name_index, mut consumed) = decode_int(rest, 4).ok_or(H3Error::Qpack)?;
            let &(name, _) = STATIC_TABLE
                .get(name_index as usize)
                .ok_or(H3Error::Qpack)?;
            let (value, n) = decode_string(&rest[consumed..], 7, 0x80)?;
            consumed += n;
            pos += consumed;
            headers.push(HeaderField::new(name, value));
        } else if first & 0x20 != 0 {
            // Literal with literal name (section 4.5.6).
            let (name, mut consumed) = decode_string(rest, 3, 0x08)?;
            let (value, n) = decode_string(&rest[consumed..], 7, 0x80)?;
            consumed += n;
            pos += consumed;
            headers.push(HeaderField { name, value });
        } else {
            // Post-base representations (sections 4.5.3 and 4.5.5) need a
            // dynamic table.
            return Err(H3Error::Qpack);
        }
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(headers: &[HeaderField]) -> Vec<HeaderField> {
        let mut buf = Vec::new();
        encode(headers, &mut buf);
        decode(&buf).unwrap()
    }

    #[test]
    fn static_table_shape() {
        assert_eq!(STATIC_TABLE.len(), 99);
        assert_eq!(STATIC_TABLE[17], (&b":method"[..], &b"GET"[..]));
        assert_eq!(STATIC_TABLE[25], (&b":status"[..], &b"200"[..]));
    }

    #[test]
    fn indexed_fields_round_trip() {
        let headers = vec![
            HeaderField::new(b":method", b"GET"),
            HeaderField::new(b":scheme", b"https"),
            HeaderField::new(b":path", b"/"),
        ];
        let mut buf = Vec::new();
        encode(&headers, &mut buf);
        // Prefix plus one byte per fully indexed field.
        assert_eq!(buf.len(), 2 + 3);
        assert_eq!(decode(&buf).unwrap(), headers);
    }

    #[test]
    fn name_reference_round_trip() {
        let headers = vec![
            HeaderField::new(b":path", b"/somewhere/else"),
            HeaderField::new(b":authority", b"example.test"),
        ];
        assert_eq!(round_trip(&headers), headers);
    }

    #[test]
    fn literal_name_round_trip() {
        let headers = vec![
            HeaderField::new(b"x-request-id", b"abc-123"),
            HeaderField::new(b"x-empty", b""),
        ];
        assert_eq!(round_trip(&headers), headers);
    }

    #[test]
    fn mixed_request_round_trip() {
        let headers = vec![
            HeaderField::new(b":method", b"POST"),
            HeaderField::new(b":scheme", b"https"),
            HeaderField::new(b":authority", b"example.test"),
            HeaderField::new(b":path", b"/upload"),
            HeaderField::new(b"content-type", b"application/json"),
            HeaderField::new(b"x-trace", b"deadbeef"),
        ];
        assert_eq!(round_trip(&headers), headers);
    }

    #[test]
    fn empty_section_round_trips() {
        assert_eq!(round_trip(&[]), vec![]);
    }

    #[test]
    fn dynamic_table_references_rejected() {
        // Required Insert Count != 0.
        assert!(decode(&[0x01, 0x00, 0xc0]).is_err());
        // Indexed field line with T=0 (dynamic table).
        assert!(decode(&[0x00, 0x00, 0x80]).is_err());
        // Post-base indexed field line.
        assert!(decode(&[0x00, 0x00, 0x10]).is_err());
    }

    #[test]
    fn truncated_section_rejected() {
        let headers = vec![HeaderField::new(b"x-request-id", b"abc-123")];
        let mut buf = Vec::new();
        encode(&headers, &mut buf);
        assert!(decode(&buf[..buf.len() - 1]).is_err());
    }
}
