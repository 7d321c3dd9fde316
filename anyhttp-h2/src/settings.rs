//! HTTP/2 SETTINGS parameters (RFC 9113 section 6.5).

use crate::error::H2Error;

const HEADER_TABLE_SIZE: u16 = 0x1;
const ENABLE_PUSH: u16 = 0x2;
const MAX_CONCURRENT_STREAMS: u16 = 0x3;
const INITIAL_WINDOW_SIZE: u16 = 0x4;
const MAX_FRAME_SIZE: u16 = 0x5;
const MAX_HEADER_LIST_SIZE: u16 = 0x6;

/// Settings advertised by one side of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// SETTINGS_HEADER_TABLE_SIZE. Default 4096.
    pub header_table_size: u32,
    /// SETTINGS_ENABLE_PUSH. The engine always advertises `false`; server
    /// push is rejected.
    pub enable_push: bool,
    /// SETTINGS_MAX_CONCURRENT_STREAMS. Default unlimited.
    pub max_concurrent_streams: Option<u32>,
    /// SETTINGS_INITIAL_WINDOW_SIZE. Default 65535.
    pub initial_window_size: u32,
    /// SETTINGS_MAX_FRAME_SIZE. Default 16384.
    pub max_frame_size: u32,
    /// SETTINGS_MAX_HEADER_LIST_SIZE. Default unlimited.
    pub max_header_list_size: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            header_table_size: 4096,
            enable_push: false,
            max_concurrent_streams: None,
            initial_window_size: 65535,
            max_frame_size: 16384,
            max_header_list_size: None,
        }
    }
}

/// Peer defaults before its SETTINGS frame arrives (RFC values, including
/// push enabled).
pub(crate) fn peer_initial() -> Settings {
    Settings {
        enable_push: true,
        ..Settings::default()
    }
}

impl Settings {
    /// Encode as a sequence of 6-byte (identifier, value) pairs.
    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut pairs: Vec<(u16, u32)> = vec![
            (HEADER_TABLE_SIZE, self.header_table_size),
            (ENABLE_PUSH, u32::from(self.enable_push)),
            (INITIAL_WINDOW_SIZE, self.initial_window_size),
            (MAX_FRAME_SIZE, self.max_frame_size),
        ];
        if let Some(value) = self.max_concurrent_streams {
            pairs.push((MAX_CONCURRENT_STREAMS, value));
        }
        if let Some(value) = self.max_header_list_size {
            pairs.push((MAX_HEADER_LIST_SIZE, value));
        }

        let mut buf = Vec::with_capacity(pairs.len() * 6);
        for (id, value) in pairs {
            buf.extend_from_slice(&id.to_be_bytes());
            buf.extend_from_slice(&value.to_be_bytes());
        }
        buf
    }

    /// Decode from a SETTINGS frame payload.
    pub fn decode(payload: &[u8]) -> Result<Self, H2Error> {
        if payload.len() % 6 != 0 {
            return Err(H2Error::FrameSize);
        }
        let mut settings = peer_initial();
        for pair in payload.chunks_exact(6) {
            let id = u16::from_be_bytes([pair[0], pair[1]]);
            let value = u32::from_be_bytes([pair[2], pair[3], pair[4], pair[5]]);
            match id {
                HEADER_TABLE_SIZE => settings.header_table_size = value,
                ENABLE_PUSH => {
                    settings.enable_push = match value {
                        0 => false,
                        1 => true,
                        _ => {
                            return Err(H2Error::Protocol(
                                "ENABLE_PUSH must be 0 or 1".into(),
                            ));
                        }
                    };
                }
                MAX_CONCURRENT_STREAMS => settings.max_concurrent_streams = Some(value),
                INITIAL_WINDOW_SIZE => {
                    if value > 0x7fff_ffff {
                        return Err(H2Error::FlowControl);
                    }
                    settings.initial_window_size = value;
                }
                MAX_FRAME_SIZE => {
                    if !(16_384..=16_777_215).contains(&value) {
                        return Err(H2Error::Protocol("MAX_FRAME_SIZE out of range".into()));
                    }
                    settings.max_frame_size = value;
                }
                MAX_HEADER_LIST_SIZE => settings.max_header_list_size = Some(value),
                // Unknown identifiers MUST be ignored.
                _ => {}
            }
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip() {
        let encoded = Settings::default().encode_to_vec();
        let decoded = Settings::decode(&encoded).unwrap();
        assert_eq!(decoded, Settings::default());
    }

    #[test]
    fn optional_fields_round_trip() {
        let settings = Settings {
            header_table_size: 8192,
            enable_push: false,
            max_concurrent_streams: Some(100),
            initial_window_size: 1_048_576,
            max_frame_size: 32_768,
            max_header_list_size: Some(65_536),
        };
        let decoded = Settings::decode(&settings.encode_to_vec()).unwrap();
        assert_eq!(decoded, settings);
    }

    #[test]
    fn truncated_payload_rejected() {
        assert!(matches!(
            Settings::decode(&[0, 1, 0, 0]),
            Err(H2Error::FrameSize)
        ));
    }

    #[test]
    fn invalid_values_rejected() {
        // ENABLE_PUSH = 2.
        assert!(Settings::decode(&[0, 2, 0, 0, 0, 2]).is_err());
        // INITIAL_WINDOW_SIZE > 2^31 - 1.
        assert!(Settings::decode(&[0, 4, 0x80, 0, 0, 0]).is_err());
        // MAX_FRAME_SIZE below the floor.
        assert!(Settings::decode(&[0, 5, 0, 0, 0, 100]).is_err());
    }

    #[test]
    fn unknown_identifier_ignored() {
        let decoded = Settings::decode(&[0xff, 0xff, 0, 0, 0, 42]).unwrap();
        assert_eq!(decoded, peer_initial());
    }
}
