//! Relay contract client.

use std::sync::Arc;

use alloy_primitives::{Address, B256};
use quill_chain::abi::event_topic0;
use quill_chain::{spawn_event_listener, LogStore};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::events::{
    parse_signing_policy_initialized, SigningPolicyInitialized, SIGNING_POLICY_INITIALIZED,
};
use crate::RelayClient;

/// Concrete relay client; only tails events, never transacts.
pub struct RelayContract {
    address: Address,
    signing_policy_topic0: B256,
}

impl RelayContract {
    /// Build the client for the relay at `address`.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            signing_policy_topic0: event_topic0(SIGNING_POLICY_INITIALIZED),
        }
    }
}

impl RelayClient for RelayContract {
    fn signing_policy_listener(
        &self,
        logs: Arc<dyn LogStore>,
        from_timestamp: u64,
    ) -> UnboundedReceiver<SigningPolicyInitialized> {
        spawn_event_listener(
            logs,
            self.address,
            self.signing_policy_topic0,
            from_timestamp as i64,
            parse_signing_policy_initialized,
        )
    }
}
