//! The data model a connection handler produces and hands to the
//! queue: one [`ParsedEvent`] per accepted frame.
//!
//! Grounded on `ro2-common`'s plain data-struct style for wire-derived
//! records (e.g. `packet::framing::PacketFrame`) — no behavior, just
//! fields plus constructors.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::{BodyPreamble, ContentFields};

/// One normalized alarm event, ready to be mapped to the downstream
/// JSON contract and enqueued for forwarding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedEvent {
    pub account: String,
    pub sequence: u32,
    pub receiver: Option<String>,
    pub line: String,
    pub message_type: char,
    pub code: String,
    pub zone: Option<String>,
    pub partition: Option<String>,
    pub extras: BTreeMap<String, String>,
    /// Event timestamp: the panel's own `_HH:MM:SS,MM-DD-YYYY` suffix
    /// if present, otherwise receipt time.
    pub timestamp: DateTime<Utc>,
    /// `true` when the panel supplied its own timestamp rather than
    /// this being the receiver's receipt time.
    pub timestamp_from_panel: bool,
    pub remote_addr: String,
    /// The original frame body, as received, for downstream audit trails.
    pub raw: String,
}

impl ParsedEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        preamble: &BodyPreamble,
        content: ContentFields,
        timestamp: Option<DateTime<Utc>>,
        received_at: DateTime<Utc>,
        remote_addr: impl Into<String>,
        raw: impl Into<String>,
    ) -> Self {
        let timestamp_from_panel = timestamp.is_some();
        Self {
            account: content.account,
            sequence: preamble.sequence,
            receiver: preamble.receiver.clone(),
            line: preamble.line.clone(),
            message_type: content.message_type,
            code: content.code,
            zone: content.zone,
            partition: content.partition,
            extras: content.extras,
            timestamp: timestamp.unwrap_or(received_at),
            timestamp_from_panel,
            raw: raw.into(),
            remote_addr: remote_addr.into(),
        }
    }
}

/// Queue item handed from the receiver side to the forward worker.
/// Carries the [`ParsedEvent`] itself rather than an already-mapped
/// JSON body, so the event mapper (§4.5/C7) runs in the forward
/// worker, matching the `C8 drains C6 -> C7 maps -> HTTP POST` data
/// flow instead of mapping ahead of the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardItem {
    pub event: ParsedEvent,
    pub attempt: u32,
}

impl ForwardItem {
    pub fn new(event: ParsedEvent) -> Self {
        Self { event, attempt: 0 }
    }
}
