//! SIA-DCS Common Library
//!
//! Shared functionality for the SIA Digital Communications Standard
//! (SIA-DCS / ANSI SIA DC-09) alarm event receiver:
//! - Wire framing and CRC-16 (ARC/CCITT-FALSE)
//! - AES-128/192/256-CBC content encryption
//! - Content block and body preamble parsing
//! - Account registry
//! - Connection handler state machine and response synthesis

pub mod account;
pub mod content;
pub mod crc;
pub mod crypto;
pub mod frame;
pub mod model;
pub mod protocol;

pub use account::{Account, AccountRegistry};
pub use frame::Frame;
pub use model::{ForwardItem, ParsedEvent};
pub use protocol::{HandlerOutcome, SiaConnectionHandler};

/// Common result type for sia-common operations.
pub type Result<T> = anyhow::Result<T>;
