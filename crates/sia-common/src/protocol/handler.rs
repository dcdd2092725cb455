//! Per-connection SIA-DCS state machine: decode, validate, decrypt,
//! parse, track sequence, and synthesize a response — one call per
//! inbound frame.
//!
//! Structurally this is `ro2-common`'s `ProudNetHandler` (a per-connection
//! struct holding crypto/session state behind a single `handle` entry
//! point) generalized from an opcode dispatch table to SIA-DCS's fixed
//! seven-step validation pipeline.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::account::AccountRegistry;
use crate::content::{ContentFields, parse_content_block, parse_preamble, parse_timestamp};
use crate::crypto::{decrypt_cbc_zero_iv, strip_leading_pad};
use crate::model::ParsedEvent;
use crate::protocol::response::{ResponseContext, build_ack, build_duh, build_nak};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NakReason {
    Framing,
    UnknownAccount,
    DecryptFail,
    /// Encrypting the outbound ACK for a keyed account failed. Distinct
    /// from `DecryptFail` (which is about the *inbound* content block)
    /// so logs and tests can tell which direction the crypto layer
    /// failed in.
    EncryptFail,
    ClockSkew,
    DuplicateSequenceConflict,
}

/// Result of handling one inbound frame.
pub enum HandlerOutcome {
    /// Frame accepted; `event` should be enqueued for forwarding.
    Accepted { event: Box<ParsedEvent>, response: Vec<u8> },
    /// Same sequence and content as the last accepted frame on this
    /// connection — re-send the cached ACK, do not enqueue again.
    DuplicateAccepted { response: Vec<u8> },
    Nak { response: Vec<u8>, reason: NakReason },
    /// Framing and account/crypto layers succeeded but the content
    /// block itself could not be parsed.
    Duh { response: Vec<u8> },
}

impl HandlerOutcome {
    pub fn response_bytes(&self) -> &[u8] {
        match self {
            HandlerOutcome::Accepted { response, .. } => response,
            HandlerOutcome::DuplicateAccepted { response } => response,
            HandlerOutcome::Nak { response, .. } => response,
            HandlerOutcome::Duh { response } => response,
        }
    }
}

/// Per-connection state: which account this socket has been talking as
/// (panels stick to one account per connection in practice, but nothing
/// here assumes it) and the last accepted (sequence, content) pair for
/// duplicate detection.
pub struct SiaConnectionHandler {
    remote_addr: String,
    accounts: Arc<AccountRegistry>,
    last_accepted: Option<(u32, Vec<u8>)>,
    last_ack_response: Option<Vec<u8>>,
}

impl SiaConnectionHandler {
    pub fn new(remote_addr: impl Into<String>, accounts: Arc<AccountRegistry>) -> Self {
        Self {
            remote_addr: remote_addr.into(),
            accounts,
            last_accepted: None,
            last_ack_response: None,
        }
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    /// Run one frame body through the validate/decrypt/parse/respond
    /// pipeline described for the connection handler.
    pub fn handle_frame(&mut self, frame_body: &[u8], now: DateTime<Utc>) -> HandlerOutcome {
        let preamble = match parse_preamble(frame_body) {
            Ok(p) => p,
            Err(err) => {
                warn!(peer = %self.remote_addr, error = %err, "framing error, responding NAK");
                return HandlerOutcome::Nak {
                    response: build_nak(&ResponseContext::unknown(), now),
                    reason: NakReason::Framing,
                };
            }
        };

        let ctx = ResponseContext {
            sequence: preamble.sequence,
            receiver: preamble.receiver.clone(),
            line: preamble.line.clone(),
            account: preamble.account.clone(),
            variant: preamble.variant,
        };

        let account = match self.accounts.get(&preamble.account) {
            Ok(account) => account,
            Err(_) => {
                warn!(peer = %self.remote_addr, account = %preamble.account, "unknown account, responding NAK");
                return HandlerOutcome::Nak {
                    response: build_nak(&ctx, now),
                    reason: NakReason::UnknownAccount,
                };
            }
        };

        let plain = match &account.key {
            Some(key) => {
                let ciphertext = match preamble.variant {
                    crate::content::DcsVariant::Star => {
                        match hex::decode(&preamble.content_block_raw) {
                            Ok(bytes) => bytes,
                            Err(_) => {
                                warn!(peer = %self.remote_addr, account = %preamble.account, "content block is not valid hex, responding NAK");
                                return HandlerOutcome::Nak {
                                    response: build_nak(&ctx, now),
                                    reason: NakReason::DecryptFail,
                                };
                            }
                        }
                    }
                    crate::content::DcsVariant::Quoted => preamble.content_block_raw.clone(),
                };
                match decrypt_cbc_zero_iv(key, &ciphertext) {
                    Ok(plain) => strip_leading_pad(&plain).to_vec(),
                    Err(err) => {
                        warn!(peer = %self.remote_addr, account = %preamble.account, error = %err, "decrypt failed, responding NAK");
                        return HandlerOutcome::Nak {
                            response: build_nak(&ctx, now),
                            reason: NakReason::DecryptFail,
                        };
                    }
                }
            }
            None => preamble.content_block_raw.clone(),
        };

        let content: ContentFields = match parse_content_block(&plain) {
            Ok(content) => content,
            Err(err) => {
                debug!(peer = %self.remote_addr, account = %preamble.account, error = %err, "content block unparseable, responding DUH");
                return HandlerOutcome::Duh {
                    response: build_duh(&ctx, now),
                };
            }
        };

        let panel_timestamp = match &preamble.timestamp_raw {
            Some(raw) => match parse_timestamp(raw) {
                Ok(ts) => Some(ts),
                Err(err) => {
                    debug!(peer = %self.remote_addr, account = %preamble.account, error = %err, "timestamp unparseable, responding DUH");
                    return HandlerOutcome::Duh {
                        response: build_duh(&ctx, now),
                    };
                }
            },
            None => None,
        };

        if let Some(ts) = panel_timestamp {
            let skew = (now - ts).num_seconds().unsigned_abs();
            if skew > account.allowed_timeband.as_secs() {
                warn!(peer = %self.remote_addr, account = %preamble.account, skew_secs = skew, "timestamp outside allowed window, responding NAK");
                return HandlerOutcome::Nak {
                    response: build_nak(&ctx, now),
                    reason: NakReason::ClockSkew,
                };
            }
        }

        if let Some((last_seq, last_content)) = &self.last_accepted {
            if *last_seq == preamble.sequence {
                if *last_content == preamble.content_block_raw {
                    debug!(peer = %self.remote_addr, account = %preamble.account, seq = preamble.sequence, "duplicate frame, resending cached ACK");
                    let response = match &self.last_ack_response {
                        Some(cached) => cached.clone(),
                        None => match build_ack(&ctx, account.key.as_ref(), now) {
                            Ok(response) => response,
                            Err(err) => {
                                error!(peer = %self.remote_addr, account = %preamble.account, error = %err, "failed to encrypt duplicate ACK, responding NAK");
                                return HandlerOutcome::Nak {
                                    response: build_nak(&ctx, now),
                                    reason: NakReason::EncryptFail,
                                };
                            }
                        },
                    };
                    return HandlerOutcome::DuplicateAccepted { response };
                }
                warn!(peer = %self.remote_addr, account = %preamble.account, seq = preamble.sequence, "sequence reused with different content, responding NAK");
                return HandlerOutcome::Nak {
                    response: build_nak(&ctx, now),
                    reason: NakReason::DuplicateSequenceConflict,
                };
            }
        }

        let response = match build_ack(&ctx, account.key.as_ref(), now) {
            Ok(response) => response,
            Err(err) => {
                error!(peer = %self.remote_addr, account = %preamble.account, error = %err, "failed to encrypt ACK, responding NAK");
                return HandlerOutcome::Nak {
                    response: build_nak(&ctx, now),
                    reason: NakReason::EncryptFail,
                };
            }
        };
        self.last_accepted = Some((preamble.sequence, preamble.content_block_raw.clone()));
        self.last_ack_response = Some(response.clone());

        let event = ParsedEvent::from_parts(
            &preamble,
            content,
            panel_timestamp,
            now,
            self.remote_addr.clone(),
            String::from_utf8_lossy(frame_body).into_owned(),
        );

        info!(
            peer = %self.remote_addr,
            account = %event.account,
            seq = event.sequence,
            code = %event.code,
            "frame accepted"
        );

        HandlerOutcome::Accepted {
            event: Box::new(event),
            response,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{encrypt_cbc_zero_iv, pad_front_to_block};
    use crate::frame::Frame;
    use chrono_tz::Tz;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-10-20T07:52:50+00:00")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn registry_with(id: &str, key: Option<&[u8]>) -> Arc<AccountRegistry> {
        let mut reg = AccountRegistry::new();
        reg.insert(id, key, Tz::UTC, 600).unwrap();
        Arc::new(reg)
    }

    #[test]
    fn unencrypted_new_event_is_accepted() {
        let accounts = registry_with("AAA", None);
        let mut handler = SiaConnectionHandler::new("127.0.0.1:4000", accounts);
        let body = br#""SIA-DCS"0001R1L1#AAA[#AAA|NBA001]"#;

        match handler.handle_frame(body, now()) {
            HandlerOutcome::Accepted { event, .. } => {
                assert_eq!(event.account, "AAA");
                assert_eq!(event.code, "BA");
                assert_eq!(event.zone.as_deref(), Some("001"));
            }
            _ => panic!("expected Accepted"),
        }
    }

    #[test]
    fn unknown_account_is_nak() {
        let accounts = registry_with("AAA", None);
        let mut handler = SiaConnectionHandler::new("127.0.0.1:4000", accounts);
        let body = br#""SIA-DCS"0001R1L1#ZZZ[#ZZZ|NBA001]"#;

        match handler.handle_frame(body, now()) {
            HandlerOutcome::Nak { reason, .. } => assert_eq!(reason, NakReason::UnknownAccount),
            _ => panic!("expected Nak"),
        }
    }

    #[test]
    fn duplicate_sequence_same_content_is_idempotent_ack() {
        let accounts = registry_with("AAA", None);
        let mut handler = SiaConnectionHandler::new("127.0.0.1:4000", accounts);
        let body = br#""SIA-DCS"0001R1L1#AAA[#AAA|NBA001]"#;

        assert!(matches!(
            handler.handle_frame(body, now()),
            HandlerOutcome::Accepted { .. }
        ));
        assert!(matches!(
            handler.handle_frame(body, now()),
            HandlerOutcome::DuplicateAccepted { .. }
        ));
    }

    #[test]
    fn duplicate_sequence_different_content_is_nak() {
        let accounts = registry_with("AAA", None);
        let mut handler = SiaConnectionHandler::new("127.0.0.1:4000", accounts);
        let first = br#""SIA-DCS"0001R1L1#AAA[#AAA|NBA001]"#;
        let second = br#""SIA-DCS"0001R1L1#AAA[#AAA|NBA002]"#;

        assert!(matches!(
            handler.handle_frame(first, now()),
            HandlerOutcome::Accepted { .. }
        ));
        match handler.handle_frame(second, now()) {
            HandlerOutcome::Nak { reason, .. } => {
                assert_eq!(reason, NakReason::DuplicateSequenceConflict)
            }
            _ => panic!("expected Nak"),
        }
    }

    #[test]
    fn encrypted_account_round_trips_through_handler() {
        let key_bytes = [0x11u8; 16];
        let accounts = registry_with("BBB", Some(&key_bytes));
        let mut handler = SiaConnectionHandler::new("127.0.0.1:4000", accounts);

        let key = crate::crypto::AesKey::from_bytes(&key_bytes).unwrap();
        let padded = pad_front_to_block(b"#BBB|NFA002");
        let ciphertext = encrypt_cbc_zero_iv(&key, &padded).unwrap();
        let hex_cipher = hex::encode_upper(&ciphertext);

        let mut body = Vec::new();
        body.extend_from_slice(b"*SIA-DCS0002R1L1#BBB[");
        body.extend_from_slice(hex_cipher.as_bytes());
        body.extend_from_slice(b"]");

        match handler.handle_frame(&body, now()) {
            HandlerOutcome::Accepted { event, response } => {
                assert_eq!(event.code, "FA");
                assert_eq!(event.zone.as_deref(), Some("002"));
                let (frame, _) = Frame::decode(&response).unwrap();
                assert!(frame.body.starts_with(b"\"ACK\"0002"));
            }
            _ => panic!("expected Accepted"),
        }
    }

    #[test]
    fn unparseable_content_is_duh() {
        let accounts = registry_with("AAA", None);
        let mut handler = SiaConnectionHandler::new("127.0.0.1:4000", accounts);
        let body = br#""SIA-DCS"0001R1L1#AAA[not-a-content-block]"#;

        assert!(matches!(
            handler.handle_frame(body, now()),
            HandlerOutcome::Duh { .. }
        ));
    }

    #[test]
    fn stale_timestamp_outside_timeband_is_nak() {
        let accounts = registry_with("AAA", None);
        let mut handler = SiaConnectionHandler::new("127.0.0.1:4000", accounts);
        let body = br#""SIA-DCS"0001R1L1#AAA[#AAA|NBA001]_07:52:50,01-01-2000"#;

        match handler.handle_frame(body, now()) {
            HandlerOutcome::Nak { reason, .. } => assert_eq!(reason, NakReason::ClockSkew),
            _ => panic!("expected Nak"),
        }
    }
}
