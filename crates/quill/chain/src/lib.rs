//! Chain access for the quill client.
//!
//! Everything that talks to the node or the log database lives here: the
//! JSON-RPC adapter, legacy transaction signing, minimal ABI helpers, the
//! log-store interface and the event-log tailer. All other crates go
//! through these types; none of them dials the node directly.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod abi;
pub mod db;
pub mod events;
pub mod rpc;
pub mod tailer;
pub mod tx;

pub use db::MysqlLogStore;
pub use events::{EventLog, LogStore, Timestamped};
pub use rpc::ChainClient;
pub use tailer::spawn_event_listener;

use alloy_primitives::B256;
use std::time::Duration;
use thiserror::Error;

/// Bound on waiting for a sent transaction to be mined.
pub const DEFAULT_TX_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors surfaced by chain access.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The node returned a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Node-provided message (includes revert reasons).
        message: String,
    },

    /// Transport-level failure talking to the node.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The node response did not have the expected shape.
    #[error("invalid rpc response: {0}")]
    InvalidResponse(String),

    /// ABI payload too short or malformed.
    #[error("abi decoding error: {0}")]
    Abi(String),

    /// A private key could not be parsed.
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    /// Signing failed.
    #[error("signing error: {0}")]
    Signature(String),

    /// The RPC URL was malformed.
    #[error("invalid rpc url: {0}")]
    Url(#[from] url::ParseError),

    /// Log database failure.
    #[error("log database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored log row could not be decoded.
    #[error("malformed log row: {0}")]
    MalformedLog(String),

    /// The transaction was mined but reverted.
    #[error("transaction {0} reverted")]
    TxReverted(B256),

    /// The transaction was not mined within the timeout.
    #[error("timed out waiting for transaction {0} to be mined")]
    TxTimeout(B256),
}
