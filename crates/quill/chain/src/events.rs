//! Event-log records and the log-store interface.
//!
//! The relational log database is an external collaborator; the client
//! sees it only through [`LogStore`].

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;

use crate::ChainError;

/// One emitted contract event, as stored by the chain indexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLog {
    /// Emitting contract.
    pub address: Address,
    /// topic0 (event id) followed by indexed parameters.
    pub topics: Vec<B256>,
    /// Non-indexed parameters, ABI-encoded.
    pub data: Bytes,
    /// Block number the event was mined in.
    pub block_number: u64,
    /// Block timestamp, unix seconds.
    pub timestamp: u64,
}

impl EventLog {
    /// The `index`-th topic, if present.
    pub fn topic(&self, index: usize) -> Option<B256> {
        self.topics.get(index).copied()
    }
}

/// Parsed events that carry their emission timestamp; the tailer uses it
/// to advance its cursor.
pub trait Timestamped {
    /// Event-carried unix timestamp.
    fn event_timestamp(&self) -> u64;
}

/// Source of indexed event logs filtered by contract and topic0 over a
/// block-timestamp window `(from_unix, to_unix]`.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Fetch matching logs ordered by emission.
    async fn fetch_logs_by_address_and_topic0(
        &self,
        address: Address,
        topic0: B256,
        from_unix: i64,
        to_unix: i64,
    ) -> Result<Vec<EventLog>, ChainError>;
}
