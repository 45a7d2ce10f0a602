pub mod client;
pub(crate) mod outbox;

pub use client::{ConnectionState, ReconnectStatus, WsClient, WsClientConfig};
