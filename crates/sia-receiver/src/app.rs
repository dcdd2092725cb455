//! Shared application state, passed explicitly to every task instead
//! of living in module globals.
//!
//! Grounded on spec.md §9's design note ("process-wide queue and
//! events as module globals... become fields of an application
//! context constructed at startup") — the Rust analogue of
//! `original_source/app/services/bus.py`'s globals.

use std::sync::Arc;

use sia_common::AccountRegistry;
use tokio::sync::Notify;

use crate::config::AppConfig;
use crate::queue::ForwardQueue;

/// Everything a connection task or admin handler needs, shared via `Arc`.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub accounts: Arc<AccountRegistry>,
    pub queue: ForwardQueue,
    pub shutdown: Arc<Notify>,
}

impl AppContext {
    pub fn new(
        config: Arc<AppConfig>,
        accounts: Arc<AccountRegistry>,
        queue: ForwardQueue,
        shutdown: Arc<Notify>,
    ) -> Self {
        Self { config, accounts, queue, shutdown }
    }
}
