//! Voter-registry contract client.

use std::sync::Arc;

use alloy_primitives::Address;
use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use quill_chain::abi::{selector, CallBuilder};
use quill_chain::{ChainClient, ChainError, DEFAULT_TX_TIMEOUT};
use quill_epoch::retry::{execute_with_retry, MAX_TX_SEND_RETRIES, TX_RETRY_INTERVAL};
use quill_epoch::ExecuteStatus;
use tracing::info;

use crate::RegistryClient;

/// Concrete voter-registry client over the chain adapter.
pub struct RegistryContract {
    chain: Arc<ChainClient>,
    address: Address,
    sender_key: SigningKey,
    register_selector: [u8; 4],
}

impl RegistryContract {
    /// Build the client.
    pub fn new(chain: Arc<ChainClient>, address: Address, sender_key: SigningKey) -> Self {
        Self {
            chain,
            address,
            sender_key,
            register_selector: selector("registerVoter(uint256,address)"),
        }
    }
}

#[async_trait]
impl RegistryClient for RegistryContract {
    async fn register_voter(
        &self,
        reward_epoch_id: i64,
        identity_address: Address,
    ) -> ExecuteStatus<()> {
        execute_with_retry(
            || async {
                let calldata = CallBuilder::new(self.register_selector)
                    .push_u64(reward_epoch_id as u64)
                    .push_address(identity_address)
                    .build();
                let tx_hash = self
                    .chain
                    .send_raw_tx(&self.sender_key, self.address, calldata.to_vec())
                    .await?;
                self.chain
                    .wait_until_mined(tx_hash, DEFAULT_TX_TIMEOUT)
                    .await?;
                info!(
                    target: "quill::registration",
                    reward_epoch_id,
                    identity = %identity_address,
                    "voter registered"
                );
                Ok::<_, ChainError>(())
            },
            MAX_TX_SEND_RETRIES,
            TX_RETRY_INTERVAL,
        )
        .await
    }
}
