//! SIA-DCS wire framing: `<CRC:4><LENGTH:4><body:N>`, CRLF-terminated.
//!
//! Panels are lenient about surrounding whitespace: a leading `\n` is
//! common, as is a trailing `\r\n`. This module strips that framing
//! noise before parsing the fixed-width CRC/LENGTH header.

use crate::crc::{crc16_arc, crc16_ccitt, to_hex4};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame too short: {0} bytes (need at least 8 for CRC+LENGTH header)")]
    TooShort(usize),
    #[error("LENGTH field is not valid hex: {0:?}")]
    BadLengthHex(String),
    #[error("CRC field is not valid hex: {0:?}")]
    BadCrcHex(String),
    #[error("BAD_LENGTH: declared {declared} bytes, have {available}")]
    BadLength { declared: usize, available: usize },
    #[error("BAD_CRC: declared {declared}, computed {computed}")]
    BadCrc { declared: String, computed: String },
}

/// Header size: 4 hex chars of CRC + 4 hex chars of LENGTH.
pub const HEADER_LEN: usize = 8;

/// A decoded SIA-DCS wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// CRC field exactly as it appeared on the wire (4 uppercase hex chars).
    pub crc: String,
    /// Raw body bytes (between the LENGTH field and the frame's end).
    pub body: Vec<u8>,
    /// Which CRC variant matched during decode; always `Arc` for frames
    /// this service emits itself.
    pub crc_variant: CrcVariant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcVariant {
    Arc,
    CcittFalse,
}

/// Strip the punctuation a panel may wrap a frame in: a leading `\n`
/// and/or a trailing `\r\n` (or bare `\n`/`\r`).
fn strip_framing_whitespace(data: &[u8]) -> &[u8] {
    let mut start = 0;
    while start < data.len() && (data[start] == b'\n' || data[start] == b'\r') {
        start += 1;
    }
    let mut end = data.len();
    while end > start && (data[end - 1] == b'\n' || data[end - 1] == b'\r') {
        end -= 1;
    }
    &data[start..end]
}

impl Frame {
    /// Build a frame around a body, ready for [`Frame::encode`].
    pub fn new(body: Vec<u8>) -> Self {
        let crc = to_hex4(crc16_arc(&body));
        Self {
            crc,
            body,
            crc_variant: CrcVariant::Arc,
        }
    }

    /// Decode one frame from `data`, accepting either CRC-16/ARC (the
    /// correct DC-09 variant) or CRC-16/CCITT-FALSE (a latent bug seen
    /// in some panel firmware and test simulators) on input.
    ///
    /// Returns the frame and the number of input bytes consumed,
    /// *after* any leading whitespace this call skipped itself — the
    /// caller should drain `consumed` bytes from the point it handed
    /// `data` in from, including that leading whitespace.
    pub fn decode(data: &[u8]) -> Result<(Self, usize), FrameError> {
        let leading = leading_whitespace_len(data);
        let trimmed = strip_framing_whitespace(data);

        if trimmed.len() < HEADER_LEN {
            return Err(FrameError::TooShort(trimmed.len()));
        }

        let crc_field = std::str::from_utf8(&trimmed[0..4])
            .ok()
            .filter(|s| s.chars().all(|c| c.is_ascii_hexdigit()))
            .ok_or_else(|| FrameError::BadCrcHex(lossy(&trimmed[0..4])))?
            .to_ascii_uppercase();

        let length_field = std::str::from_utf8(&trimmed[4..8])
            .ok()
            .filter(|s| s.chars().all(|c| c.is_ascii_hexdigit()))
            .ok_or_else(|| FrameError::BadLengthHex(lossy(&trimmed[4..8])))?;
        let declared_len = u16::from_str_radix(length_field, 16)
            .map_err(|_| FrameError::BadLengthHex(length_field.to_string()))? as usize;

        if trimmed.len() < HEADER_LEN + declared_len {
            return Err(FrameError::BadLength {
                declared: declared_len,
                available: trimmed.len() - HEADER_LEN,
            });
        }

        let body = trimmed[HEADER_LEN..HEADER_LEN + declared_len].to_vec();

        let arc = to_hex4(crc16_arc(&body));
        let variant = if arc == crc_field {
            CrcVariant::Arc
        } else {
            let ccitt = to_hex4(crc16_ccitt(&body));
            if ccitt == crc_field {
                CrcVariant::CcittFalse
            } else {
                return Err(FrameError::BadCrc {
                    declared: crc_field,
                    computed: arc,
                });
            }
        };

        // Bytes consumed out of the *original* (un-stripped) buffer.
        let consumed = leading + HEADER_LEN + declared_len;

        Ok((
            Self {
                crc: crc_field,
                body,
                crc_variant: variant,
            },
            consumed,
        ))
    }

    /// Encode `<CRC><LENGTH><body>` for an outbound frame (no CRLF —
    /// callers append `\r\n` themselves if the transport wants it).
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.body.len());
        out.extend_from_slice(self.crc.as_bytes());
        out.extend_from_slice(format!("{:04X}", self.body.len()).as_bytes());
        out.extend_from_slice(&self.body);
        out
    }
}

fn leading_whitespace_len(data: &[u8]) -> usize {
    data.iter().take_while(|&&b| b == b'\n' || b == b'\r').count()
}

fn lossy(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_body() -> Vec<u8> {
        br#""SIA-DCS"0001R1L1#AAA[#AAA|NBA001]"#.to_vec()
    }

    #[test]
    fn roundtrip() {
        let frame = Frame::new(sample_body());
        let bytes = frame.encode();
        let (decoded, consumed) = Frame::decode(&bytes).unwrap();
        assert_eq!(decoded.body, sample_body());
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded.crc_variant, CrcVariant::Arc);
    }

    #[test]
    fn pinned_crc_vector() {
        let frame = Frame::new(sample_body());
        assert_eq!(frame.crc, "C520");
    }

    #[test]
    fn accepts_leading_lf_and_trailing_crlf() {
        let frame = Frame::new(sample_body());
        let mut wire = vec![b'\n'];
        wire.extend_from_slice(&frame.encode());
        wire.extend_from_slice(b"\r\n");

        let (decoded, consumed) = Frame::decode(&wire).unwrap();
        assert_eq!(decoded.body, sample_body());
        assert_eq!(consumed, wire.len());
    }

    #[test]
    fn bad_crc_is_rejected() {
        let mut frame = Frame::new(sample_body());
        // Flip a hex digit in the CRC so neither ARC nor CCITT matches.
        frame.crc = "0000".to_string();
        let bytes = frame.encode();
        let err = Frame::decode(&bytes).unwrap_err();
        assert!(matches!(err, FrameError::BadCrc { .. }));
    }

    #[test]
    fn truncated_body_is_bad_length() {
        let frame = Frame::new(sample_body());
        let mut bytes = frame.encode();
        bytes.truncate(bytes.len() - 5);
        let err = Frame::decode(&bytes).unwrap_err();
        assert!(matches!(err, FrameError::BadLength { .. }));
    }

    #[test]
    fn lenient_decode_accepts_ccitt() {
        let body = sample_body();
        let crc = to_hex4(crc16_ccitt(&body));
        let mut wire = Vec::new();
        wire.extend_from_slice(crc.as_bytes());
        wire.extend_from_slice(format!("{:04X}", body.len()).as_bytes());
        wire.extend_from_slice(&body);

        let (decoded, _) = Frame::decode(&wire).unwrap();
        assert_eq!(decoded.crc_variant, CrcVariant::CcittFalse);
        assert_eq!(decoded.body, body);
    }
}
