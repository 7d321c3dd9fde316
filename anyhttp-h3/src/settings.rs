//! HTTP/3 SETTINGS parameters (RFC 9114 section 7.2.4).

use crate::wire::{get_varint, put_varint, varint_len};

const QPACK_MAX_TABLE_CAPACITY: u64 = 0x01;
const MAX_FIELD_SECTION_SIZE: u64 = 0x06;
const QPACK_BLOCKED_STREAMS: u64 = 0x07;

/// Settings carried on the control stream.
///
/// The engine runs QPACK without a dynamic table, so the defaults are
/// what it always advertises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// SETTINGS_QPACK_MAX_TABLE_CAPACITY. 0 disables the dynamic table.
    pub qpack_max_table_capacity: u64,
    /// SETTINGS_MAX_FIELD_SECTION_SIZE. Default unlimited.
    pub max_field_section_size: u64,
    /// SETTINGS_QPACK_BLOCKED_STREAMS.
    pub qpack_blocked_streams: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            qpack_max_table_capacity: 0,
            max_field_section_size: u64::MAX,
            qpack_blocked_streams: 0,
        }
    }
}

impl Settings {
    fn pairs(&self) -> Vec<(u64, u64)> {
        let mut pairs = Vec::new();
        if self.qpack_max_table_capacity != 0 {
            pairs.push((QPACK_MAX_TABLE_CAPACITY, self.qpack_max_table_capacity));
        }
        if self.max_field_section_size != u64::MAX {
            pairs.push((MAX_FIELD_SECTION_SIZE, self.max_field_section_size));
        }
        if self.qpack_blocked_streams != 0 {
            pairs.push((QPACK_BLOCKED_STREAMS, self.qpack_blocked_streams));
        }
        pairs
    }

    /// Encode as (identifier, value) varint pairs; defaults are omitted.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        for (id, value) in self.pairs() {
            put_varint(buf, id);
            put_varint(buf, value);
        }
    }

    /// Byte length of [`encode`](Self::encode)'s output.
    pub fn encoded_len(&self) -> usize {
        self.pairs()
            .iter()
            .map(|&(id, value)| varint_len(id) + varint_len(value))
            .sum()
    }

    /// Decode a SETTINGS frame payload. Unknown identifiers are ignored.
    pub fn decode(payload: &[u8]) -> Option<Self> {
        let mut settings = Settings::default();
        let mut pos = 0;
        while pos < payload.len() {
            let id = get_varint(payload, &mut pos)?;
            let value = get_varint(payload, &mut pos)?;
            match id {
                QPACK_MAX_TABLE_CAPACITY => settings.qpack_max_table_capacity = value,
                MAX_FIELD_SECTION_SIZE => settings.max_field_section_size = value,
                QPACK_BLOCKED_STREAMS => settings.qpack_blocked_streams = value,
                _ => {}
            }
        }
        Some(settings)
    }
}
