//! Administrative HTTP surface (§6.3): `/health`, `/sia-dc/status`,
//! `/replay`. Not present in the teacher repo — grounded on the
//! broader retrieval pack's use of `axum` for a small JSON admin API,
//! see DESIGN.md.

use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::app::AppContext;
use sia_common::ForwardItem;

pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sia-dc/status", get(sia_dc_status))
        .route("/replay", post(replay))
        .with_state(ctx)
}

async fn health(State(ctx): State<AppContext>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "sia_port": ctx.config.sia_port,
        "forward_url": ctx.config.forward_url,
        "queue_size": ctx.queue.depth(),
    }))
}

async fn sia_dc_status(State(ctx): State<AppContext>) -> Json<Value> {
    let encrypted_accounts: Vec<&str> = ctx
        .config
        .sia_accounts
        .iter()
        .enumerate()
        .filter(|(i, _)| ctx.config.key_bytes_for(*i).is_some())
        .map(|(_, account)| account.as_str())
        .collect();

    Json(json!({
        "listening_host": if ctx.config.sia_host.is_empty() { "0.0.0.0" } else { &ctx.config.sia_host },
        "listening_port": ctx.config.sia_port,
        "allowed_accounts": ctx.config.sia_accounts,
        "encrypted_accounts": encrypted_accounts,
    }))
}

/// Body for `POST /replay`: synthesizes a ForwardItem bypassing the
/// wire decoder, for exercising the downstream integration directly.
#[derive(Debug, Deserialize)]
pub struct ReplayEvent {
    #[serde(default = "default_account")]
    pub account: String,
    #[serde(default = "default_message_type")]
    pub message_type: String,
    #[serde(default = "default_code")]
    pub code: String,
    pub zone: Option<String>,
    pub partition: Option<String>,
    pub timestamp: Option<chrono::DateTime<Utc>>,
    #[serde(default)]
    pub extras: std::collections::BTreeMap<String, String>,
}

fn default_account() -> String {
    "AAA".to_string()
}
fn default_message_type() -> String {
    "N".to_string()
}
fn default_code() -> String {
    "BA".to_string()
}

async fn replay(State(ctx): State<AppContext>, Json(event): Json<ReplayEvent>) -> Json<Value> {
    let parsed = sia_common::ParsedEvent {
        account: event.account,
        sequence: 0,
        receiver: None,
        line: "0".to_string(),
        message_type: event.message_type.chars().next().unwrap_or('N'),
        code: event.code,
        zone: event.zone,
        partition: event.partition,
        extras: event.extras,
        timestamp: event.timestamp.unwrap_or_else(Utc::now),
        timestamp_from_panel: event.timestamp.is_some(),
        remote_addr: "replay".to_string(),
        raw: "TEST".to_string(),
    };

    // Bypasses the wire decoder (§6.3); C7 mapping still happens in
    // the forward worker once this item is dequeued, same as a frame
    // that arrived over the wire.
    let queued = ctx.queue.try_enqueue(ForwardItem::new(parsed));
    Json(json!({ "queued": queued }))
}
