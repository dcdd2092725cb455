//! Parsing of the SIA-DCS body: the `"SIA-DCS"`/`seq`/`R`/`L`/`#account`
//! preamble, the bracketed content block (ciphertext or plaintext), and
//! the optional trailing timestamp.
//!
//! Mirrors the field-by-field extraction style of `ro2-common`'s RMI
//! packet parser (`packet::parser::RmiMessage::parse`), but over an
//! ASCII preamble instead of a fixed binary header.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContentError {
    #[error("body does not start with \"SIA-DCS\" or *SIA-DCS")]
    MissingDcsMarker,
    #[error("body is missing the 4-digit sequence number")]
    MissingSequence,
    #[error("body is missing the L<line> field")]
    MissingLine,
    #[error("body is missing the #<account> preamble field")]
    MissingAccountPreamble,
    #[error("body has no opening '[' for the content block")]
    MissingOpenBracket,
    #[error("body has no closing ']' for the content block")]
    MissingCloseBracket,
    #[error("content block is empty")]
    EmptyContentBlock,
    #[error("content block does not start with '#'")]
    MissingHash,
    #[error("content block is missing the '|' separator")]
    MissingPipe,
    #[error("message_type is missing or not a single letter")]
    BadMessageType,
    #[error("event code is missing or not two letters")]
    BadCode,
    #[error("timestamp does not match _HH:MM:SS,MM-DD-YYYY")]
    BadTimestamp,
}

/// Which of the two DC-09 marker spellings introduced the body.
/// `*SIA-DCS` signals the bracketed content is hex-encoded; plain
/// `"SIA-DCS"` signals raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DcsVariant {
    Quoted,
    Star,
}

/// Everything extracted from the body before the crypto layer runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyPreamble {
    pub variant: DcsVariant,
    pub sequence: u32,
    pub receiver: Option<String>,
    pub line: String,
    /// Account id taken from the cleartext preamble (`#AAA` before `[`),
    /// used to select the account's key before the content block is
    /// decrypted.
    pub account: String,
    /// Raw bytes between `[` and `]` — ciphertext for a keyed account,
    /// plaintext content block for an unkeyed one.
    pub content_block_raw: Vec<u8>,
    /// Raw `_HH:MM:SS,MM-DD-YYYY` suffix after `]`, if present.
    pub timestamp_raw: Option<String>,
}

/// Fields parsed out of the (already decrypted, if applicable) content
/// block: `#<account>|<type><code><qualifier>`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContentFields {
    pub account: String,
    pub message_type: char,
    pub code: String,
    pub zone: Option<String>,
    pub partition: Option<String>,
    pub extras: BTreeMap<String, String>,
}

/// Parse the preamble up to and including the bracketed content block
/// and optional timestamp suffix. The bracketed bytes are returned
/// un-decrypted; the caller runs the crypto layer (if the account is
/// keyed) before calling [`parse_content_block`].
pub fn parse_preamble(body: &[u8]) -> Result<BodyPreamble, ContentError> {
    let (variant, rest) = if let Some(rest) = body.strip_prefix(b"\"SIA-DCS\"") {
        (DcsVariant::Quoted, rest)
    } else if let Some(rest) = body.strip_prefix(b"*SIA-DCS") {
        (DcsVariant::Star, rest)
    } else {
        return Err(ContentError::MissingDcsMarker);
    };

    // Sequence: 4 ASCII digits.
    if rest.len() < 4 || !rest[0..4].iter().all(u8::is_ascii_digit) {
        return Err(ContentError::MissingSequence);
    }
    let sequence: u32 = std::str::from_utf8(&rest[0..4])
        .unwrap()
        .parse()
        .map_err(|_| ContentError::MissingSequence)?;
    let mut rest = &rest[4..];

    // Optional receiver: R<hex>{1,6}
    let mut receiver = None;
    if rest.first() == Some(&b'R') {
        let digits = take_hex_run(&rest[1..], 6);
        if !digits.is_empty() {
            receiver = Some(String::from_utf8_lossy(digits).into_owned());
            rest = &rest[1 + digits.len()..];
        }
    }

    // Required line: L<hex>{1,6}
    if rest.first() != Some(&b'L') {
        return Err(ContentError::MissingLine);
    }
    let digits = take_hex_run(&rest[1..], 6);
    if digits.is_empty() {
        return Err(ContentError::MissingLine);
    }
    let line = String::from_utf8_lossy(digits).into_owned();
    rest = &rest[1 + digits.len()..];

    // Required preamble account: #<hex>{3,16}
    if rest.first() != Some(&b'#') {
        return Err(ContentError::MissingAccountPreamble);
    }
    let digits = take_hex_run(&rest[1..], 16);
    if digits.len() < 3 {
        return Err(ContentError::MissingAccountPreamble);
    }
    let account = String::from_utf8_lossy(digits).into_owned();
    rest = &rest[1 + digits.len()..];

    // Bracketed content block.
    if rest.first() != Some(&b'[') {
        return Err(ContentError::MissingOpenBracket);
    }
    let close = rest
        .iter()
        .position(|&b| b == b']')
        .ok_or(ContentError::MissingCloseBracket)?;
    let content_block_raw = rest[1..close].to_vec();
    let rest = &rest[close + 1..];

    // Optional trailing timestamp, `_HH:MM:SS,MM-DD-YYYY`.
    let timestamp_raw = if rest.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(rest).into_owned())
    };

    Ok(BodyPreamble {
        variant,
        sequence,
        receiver,
        line,
        account,
        content_block_raw,
        timestamp_raw,
    })
}

fn take_hex_run(data: &[u8], max: usize) -> &[u8] {
    let n = data
        .iter()
        .take(max)
        .take_while(|b| b.is_ascii_hexdigit())
        .count();
    &data[..n]
}

/// Parse a decrypted (or, for an unkeyed account, verbatim) content
/// block: `#<account>|<type><code><qualifier>`.
pub fn parse_content_block(plain: &[u8]) -> Result<ContentFields, ContentError> {
    if plain.is_empty() {
        return Err(ContentError::EmptyContentBlock);
    }
    let text = String::from_utf8_lossy(plain);
    let text = text.trim_end_matches('\0');

    let rest = text.strip_prefix('#').ok_or(ContentError::MissingHash)?;
    let pipe = rest.find('|').ok_or(ContentError::MissingPipe)?;
    let account = rest[..pipe].to_string();
    let mut rest = &rest[pipe + 1..];

    let message_type = rest.chars().next().ok_or(ContentError::BadMessageType)?;
    if !message_type.is_ascii_alphabetic() {
        return Err(ContentError::BadMessageType);
    }
    rest = &rest[message_type.len_utf8()..];

    // Optional `ri<digits>/` partition prefix.
    let mut partition = None;
    if let Some(after_ri) = rest.strip_prefix("ri") {
        if let Some(slash) = after_ri.find('/') {
            let digits = &after_ri[..slash];
            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                partition = Some(format!("{:0>2}", digits));
                rest = &after_ri[slash + 1..];
            }
        }
    }

    if rest.len() < 2 || !rest.chars().take(2).all(|c| c.is_ascii_alphabetic()) {
        return Err(ContentError::BadCode);
    }
    let code = rest[..2].to_ascii_uppercase();
    let qualifier = &rest[2..];

    let (zone, extras) = parse_qualifier(qualifier);

    Ok(ContentFields {
        account,
        message_type,
        code,
        zone,
        partition,
        extras,
    })
}

fn parse_qualifier(qualifier: &str) -> (Option<String>, BTreeMap<String, String>) {
    let mut extras = BTreeMap::new();
    let mut leftover = String::new();

    for token in qualifier.split_whitespace() {
        if let Some((k, v)) = token.split_once('=') {
            extras.insert(k.to_string(), v.to_string());
        } else {
            leftover.push_str(token);
        }
    }
    if leftover.is_empty() && extras.is_empty() {
        leftover.push_str(qualifier.trim());
    }

    let trailing_digits: String = leftover
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .chars()
        .rev()
        .collect();

    let zone = if trailing_digits.is_empty() {
        None
    } else {
        Some(trailing_digits)
    };

    (zone, extras)
}

/// Parse a `_HH:MM:SS,MM-DD-YYYY` suffix as a UTC instant.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ContentError> {
    let raw = raw.strip_prefix('_').unwrap_or(raw);
    let naive = NaiveDateTime::parse_from_str(raw, "%H:%M:%S,%m-%d-%Y")
        .map_err(|_| ContentError::BadTimestamp)?;
    Ok(DateTime::from_naive_utc_and_offset(naive, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unencrypted_preamble() {
        let body = br#""SIA-DCS"0001R1L1#AAA[#AAA|NBA001]"#;
        let pre = parse_preamble(body).unwrap();
        assert_eq!(pre.variant, DcsVariant::Quoted);
        assert_eq!(pre.sequence, 1);
        assert_eq!(pre.receiver.as_deref(), Some("1"));
        assert_eq!(pre.line, "1");
        assert_eq!(pre.account, "AAA");
        assert_eq!(pre.content_block_raw, b"#AAA|NBA001");
        assert_eq!(pre.timestamp_raw, None);
    }

    #[test]
    fn parses_content_block_with_zone() {
        let fields = parse_content_block(b"#AAA|NBA001").unwrap();
        assert_eq!(fields.account, "AAA");
        assert_eq!(fields.message_type, 'N');
        assert_eq!(fields.code, "BA");
        assert_eq!(fields.zone.as_deref(), Some("001"));
        assert_eq!(fields.partition, None);
        assert!(fields.extras.is_empty());
    }

    #[test]
    fn parses_partition_prefix() {
        let fields = parse_content_block(b"#AAA|Nri2/FA005").unwrap();
        assert_eq!(fields.code, "FA");
        assert_eq!(fields.zone.as_deref(), Some("005"));
        assert_eq!(fields.partition.as_deref(), Some("02"));
    }

    #[test]
    fn heartbeat_zone_000_is_preserved() {
        let fields = parse_content_block(b"#AAA|NYK000").unwrap();
        assert_eq!(fields.code, "YK");
        assert_eq!(fields.zone.as_deref(), Some("000"));
    }

    #[test]
    fn key_value_qualifiers_become_extras() {
        let fields = parse_content_block(b"#AAA|NBA id=42 note=test").unwrap();
        assert_eq!(fields.extras.get("id").map(String::as_str), Some("42"));
        assert_eq!(fields.extras.get("note").map(String::as_str), Some("test"));
        assert_eq!(fields.zone, None);
    }

    #[test]
    fn missing_pipe_is_rejected() {
        assert_eq!(
            parse_content_block(b"#AAANBA001").unwrap_err(),
            ContentError::MissingPipe
        );
    }

    #[test]
    fn timestamp_parses_as_utc() {
        let dt = parse_timestamp("_07:52:50,10-20-2025").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-10-20T07:52:50+00:00");
    }

    #[test]
    fn star_variant_preamble() {
        let body = b"*SIA-DCS0002R1L1#BBB[deadbeef]";
        let pre = parse_preamble(body).unwrap();
        assert_eq!(pre.variant, DcsVariant::Star);
        assert_eq!(pre.content_block_raw, b"deadbeef");
    }
}
