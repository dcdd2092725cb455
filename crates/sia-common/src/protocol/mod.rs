pub mod handler;
pub mod response;

pub use handler::{HandlerOutcome, NakReason, SiaConnectionHandler};
pub use response::{ResponseContext, build_ack, build_duh, build_nak};
