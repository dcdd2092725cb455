//! Synthesis of `"ACK"`/`"NAK"`/`"DUH"` protocol responses.
//!
//! Mirrors the response-builder style of `ro2-common`'s
//! `ProudNetHandler::build_connection_success` — assemble the payload
//! field by field, then hand it to the framing layer.

use chrono::{DateTime, Utc};

use crate::content::DcsVariant;
use crate::crypto::{AesKey, CryptoError, encrypt_cbc_zero_iv, pad_front_to_block};
use crate::frame::Frame;

/// The subset of preamble fields a response needs to echo back.
/// Built from a successfully parsed [`crate::content::BodyPreamble`];
/// falls back to placeholder values when the inbound frame couldn't be
/// parsed far enough to know them.
#[derive(Debug, Clone)]
pub struct ResponseContext {
    pub sequence: u32,
    pub receiver: Option<String>,
    pub line: String,
    pub account: String,
    pub variant: DcsVariant,
}

impl ResponseContext {
    /// Best-effort context for a frame that failed to decode far enough
    /// to recover a real preamble (e.g. a CRC or length error).
    pub fn unknown() -> Self {
        Self {
            sequence: 0,
            receiver: None,
            line: "0".to_string(),
            account: String::new(),
            variant: DcsVariant::Quoted,
        }
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("_%H:%M:%S,%m-%d-%Y").to_string()
}

/// Build one `"<KIND>"<seq>R<receiver>?L<line>#<account>[<bracket>]<ts>`
/// body and wrap it with length+CRC. `bracket` is the (already
/// encrypted, if applicable) content the caller wants inside `[...]`.
fn build_response(kind: &str, ctx: &ResponseContext, bracket: &str, now: DateTime<Utc>) -> Vec<u8> {
    let mut body = format!("\"{kind}\"{:04}", ctx.sequence % 10_000);
    if let Some(receiver) = &ctx.receiver {
        body.push('R');
        body.push_str(receiver);
    }
    body.push('L');
    body.push_str(&ctx.line);
    body.push('#');
    body.push_str(&ctx.account);
    body.push('[');
    body.push_str(bracket);
    body.push(']');
    body.push_str(&format_timestamp(now));

    Frame::new(body.into_bytes()).encode()
}

/// Build the ACK response. On a keyed account the bracket content is
/// AES-CBC-encrypted per spec.md §4.2's in-band ACK encryption
/// requirement; a failure to encrypt is propagated rather than
/// silently downgraded to a plaintext `[]` bracket, since an
/// unencrypted ACK to a keyed account would violate that requirement.
pub fn build_ack(ctx: &ResponseContext, key: Option<&AesKey>, now: DateTime<Utc>) -> Result<Vec<u8>, CryptoError> {
    let bracket = match key {
        Some(key) => {
            let padded = pad_front_to_block(b"");
            let ciphertext = encrypt_cbc_zero_iv(key, &padded)?;
            match ctx.variant {
                DcsVariant::Star => hex::encode_upper(ciphertext),
                DcsVariant::Quoted => String::from_utf8_lossy(&ciphertext).into_owned(),
            }
        }
        None => String::new(),
    };
    Ok(build_response("ACK", ctx, &bracket, now))
}

/// NAK and DUH never carry an encrypted bracket, so unlike
/// [`build_ack`] they cannot fail.
pub fn build_nak(ctx: &ResponseContext, now: DateTime<Utc>) -> Vec<u8> {
    build_response("NAK", ctx, "", now)
}

pub fn build_duh(ctx: &ResponseContext, now: DateTime<Utc>) -> Vec<u8> {
    build_response("DUH", ctx, "", now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ctx() -> ResponseContext {
        ResponseContext {
            sequence: 1,
            receiver: Some("1".to_string()),
            line: "1".to_string(),
            account: "AAA".to_string(),
            variant: DcsVariant::Quoted,
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-10-20T07:52:50+00:00")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn ack_round_trips_through_framing() {
        let wire = build_ack(&sample_ctx(), None, fixed_now()).unwrap();
        let (frame, consumed) = Frame::decode(&wire).unwrap();
        assert_eq!(consumed, wire.len());
        let body = String::from_utf8(frame.body).unwrap();
        assert_eq!(body, "\"ACK\"0001R1L1#AAA[]_07:52:50,10-20-2025");
    }

    #[test]
    fn nak_has_no_receiver_when_unknown() {
        let ctx = ResponseContext::unknown();
        let wire = build_nak(&ctx, fixed_now());
        let (frame, _) = Frame::decode(&wire).unwrap();
        let body = String::from_utf8(frame.body).unwrap();
        assert_eq!(body, "\"NAK\"0000L0#[]_07:52:50,10-20-2025");
    }

    #[test]
    fn ack_on_keyed_account_encrypts_empty_bracket() {
        let key = AesKey::from_bytes(&[0x11u8; 16]).unwrap();
        let ctx = sample_ctx();
        let wire = build_ack(&ctx, Some(&key), fixed_now()).unwrap();
        let (frame, _) = Frame::decode(&wire).unwrap();
        let body = String::from_utf8_lossy(&frame.body).into_owned();
        assert!(body.starts_with("\"ACK\"0001R1L1#AAA["));
        assert!(!body.contains("[]"));
    }

    #[test]
    fn ack_on_keyed_star_variant_encrypts_to_valid_hex() {
        let key = AesKey::from_bytes(&[0x11u8; 16]).unwrap();
        let mut ctx = sample_ctx();
        ctx.variant = DcsVariant::Star;
        let wire = build_ack(&ctx, Some(&key), fixed_now()).unwrap();
        let (frame, _) = Frame::decode(&wire).unwrap();
        let body = String::from_utf8_lossy(&frame.body).into_owned();

        let open = body.find('[').unwrap();
        let close = body.find(']').unwrap();
        let bracket = &body[open + 1..close];
        assert_eq!(bracket.len(), 32, "one 16-byte AES block, hex-encoded");
        let ciphertext = hex::decode(bracket).expect("bracket must be valid hex");

        let plain = crate::crypto::decrypt_cbc_zero_iv(&key, &ciphertext).unwrap();
        assert_eq!(crate::crypto::strip_leading_pad(&plain), b"");
    }
}
