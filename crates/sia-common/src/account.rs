//! Account registry: per-account AES key and timezone, loaded once at
//! startup and shared read-only across every connection.
//!
//! Grounded on `ro2-common::database::Account` (a flat id/key/metadata
//! struct) but without the sqlx backing — accounts are configured, not
//! persisted, per the no-database Non-goal.

use std::collections::HashMap;
use std::time::Duration;

use chrono_tz::Tz;
use thiserror::Error;

use crate::crypto::{AesKey, CryptoError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountError {
    #[error("account key for {0:?} must be 16, 24, or 32 bytes")]
    BadKeyLength(String),
    #[error("unknown account id {0:?}")]
    Unknown(String),
    #[error("account id {0:?} declared more than once")]
    Duplicate(String),
}

/// One configured panel account.
#[derive(Clone)]
pub struct Account {
    pub id: String,
    /// `None` for an account that sends content blocks in the clear.
    pub key: Option<AesKey>,
    pub timezone: Tz,
    /// Half-width of the accepted timestamp skew window, each side of now.
    pub allowed_timeband: Duration,
}

impl Account {
    pub fn new(id: impl Into<String>, key: Option<AesKey>, timezone: Tz, timeband_secs: u64) -> Self {
        Self {
            id: id.into(),
            key,
            timezone,
            allowed_timeband: Duration::from_secs(timeband_secs),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.key.is_some()
    }
}

/// Read-only lookup table of accounts, built once from configuration
/// and shared (via `Arc`) across every connection handler.
#[derive(Clone, Default)]
pub struct AccountRegistry {
    accounts: HashMap<String, Account>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account, rejecting duplicate ids and malformed keys
    /// up front so bad configuration fails at startup, not on the wire.
    pub fn insert(
        &mut self,
        id: impl Into<String>,
        key_bytes: Option<&[u8]>,
        timezone: Tz,
        timeband_secs: u64,
    ) -> Result<(), AccountError> {
        let id = id.into();
        if self.accounts.contains_key(&id) {
            return Err(AccountError::Duplicate(id));
        }
        let key = match key_bytes {
            Some(bytes) => Some(
                AesKey::from_bytes(bytes)
                    .map_err(|_: CryptoError| AccountError::BadKeyLength(id.clone()))?,
            ),
            None => None,
        };
        self.accounts
            .insert(id.clone(), Account::new(id, key, timezone, timeband_secs));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&Account, AccountError> {
        self.accounts
            .get(id)
            .ok_or_else(|| AccountError::Unknown(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.accounts.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.accounts.keys().map(String::as_str)
    }
}
