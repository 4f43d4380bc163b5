//! Systems-manager contract client.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use quill_chain::abi::{event_topic0, selector, AbiReader, CallBuilder};
use quill_chain::tx::{eth_text_hash, sign_recoverable};
use quill_chain::{spawn_event_listener, ChainClient, ChainError, LogStore, DEFAULT_TX_TIMEOUT};
use quill_epoch::retry::{execute_with_retry, TX_RETRY_INTERVAL};
use quill_epoch::{Epoch, ExecuteStatus};
use quill_policy::signing_policy_hash;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

use crate::events::{
    parse_vote_power_block_selected, VotePowerBlockSelected, VOTE_POWER_BLOCK_SELECTED,
};
use crate::SystemsManagerClient;

/// Retry bound for `signNewSigningPolicy`.
const SIGN_POLICY_RETRIES: u32 = 3;

/// Retry bound for the epoch-verification view.
const VERIFY_EPOCH_RETRIES: u32 = 1;

/// Chain rejections that mean the work is already done.
const NON_FATAL_SIGN_ERRORS: [&str; 1] = ["new signing policy already signed"];

/// True when a signing rejection is an idempotent no-op.
pub fn is_non_fatal_sign_error(message: &str) -> bool {
    quill_epoch::retry::exists_as_substring(&NON_FATAL_SIGN_ERRORS, message)
}

/// Concrete systems-manager client over the chain adapter.
pub struct SystemsManagerContract {
    chain: Arc<ChainClient>,
    address: Address,
    sender_key: SigningKey,
    signer_key: SigningKey,
    sign_selector: [u8; 4],
    current_epoch_selector: [u8; 4],
    vote_power_block_topic0: B256,
}

impl SystemsManagerContract {
    /// Build the client; selectors are derived from the fixed method list.
    pub fn new(
        chain: Arc<ChainClient>,
        address: Address,
        sender_key: SigningKey,
        signer_key: SigningKey,
    ) -> Self {
        Self {
            chain,
            address,
            sender_key,
            signer_key,
            sign_selector: selector("signNewSigningPolicy(uint256,bytes32,(bytes32,bytes32,uint8))"),
            current_epoch_selector: selector("getCurrentRewardEpochId()"),
            vote_power_block_topic0: event_topic0(VOTE_POWER_BLOCK_SELECTED),
        }
    }

    async fn send_sign_new_signing_policy(
        &self,
        reward_epoch_id: i64,
        signing_policy_bytes: &[u8],
    ) -> Result<(), ChainError> {
        let policy_hash = signing_policy_hash(signing_policy_bytes);
        let signature = sign_recoverable(&self.signer_key, eth_text_hash(policy_hash.as_slice()))?;

        let calldata = CallBuilder::new(self.sign_selector)
            .push_u64(reward_epoch_id as u64)
            .push_b256(policy_hash)
            .push_b256(B256::from_slice(&signature[..32]))
            .push_b256(B256::from_slice(&signature[32..64]))
            .push_u256(U256::from(signature[64] + 27))
            .build();

        // Preflight call so contract rejections carry their revert reason;
        // a raw broadcast would only surface a reverted receipt.
        if let Err(err) = self.chain.call(self.address, calldata.clone()).await {
            let message = err.to_string();
            if is_non_fatal_sign_error(&message) {
                info!(target: "quill::registration", reward_epoch_id, %message, "non fatal error sending sign new signing policy");
                return Ok(());
            }
            return Err(err);
        }

        let tx_hash = self
            .chain
            .send_raw_tx(&self.sender_key, self.address, calldata.to_vec())
            .await?;
        self.chain
            .wait_until_mined(tx_hash, DEFAULT_TX_TIMEOUT)
            .await?;
        info!(target: "quill::registration", reward_epoch_id, "new signing policy sent");
        Ok(())
    }
}

#[async_trait]
impl SystemsManagerClient for SystemsManagerContract {
    fn vote_power_block_listener(
        &self,
        logs: Arc<dyn LogStore>,
        reward_epoch: &Epoch,
    ) -> UnboundedReceiver<VotePowerBlockSelected> {
        // anchor one reward epoch back for bounded backfill
        let from_unix = reward_epoch.start_unix(reward_epoch.current_index() - 1);
        spawn_event_listener(
            logs,
            self.address,
            self.vote_power_block_topic0,
            from_unix,
            parse_vote_power_block_selected,
        )
    }

    async fn get_current_reward_epoch_id(&self) -> ExecuteStatus<i64> {
        execute_with_retry(
            || async {
                let result = self
                    .chain
                    .call(
                        self.address,
                        CallBuilder::new(self.current_epoch_selector).build(),
                    )
                    .await?;
                let id = AbiReader::new(&result).u64(0)?;
                Ok::<_, ChainError>(id as i64)
            },
            VERIFY_EPOCH_RETRIES,
            TX_RETRY_INTERVAL,
        )
        .await
    }

    async fn sign_new_signing_policy(
        &self,
        reward_epoch_id: i64,
        signing_policy_bytes: &[u8],
    ) -> ExecuteStatus<()> {
        execute_with_retry(
            || self.send_sign_new_signing_policy(reward_epoch_id, signing_policy_bytes),
            SIGN_POLICY_RETRIES,
            TX_RETRY_INTERVAL,
        )
        .await
    }
}

async fn call_u64_view(
    chain: &ChainClient,
    address: Address,
    signature: &str,
) -> Result<u64, ChainError> {
    let result = chain
        .call(address, CallBuilder::new(selector(signature)).build())
        .await?;
    AbiReader::new(&result).u64(0)
}

/// Read the reward-epoch descriptor from the systems manager.
pub async fn reward_epoch_from_chain(
    chain: &ChainClient,
    address: Address,
) -> Result<Epoch, ChainError> {
    let start = call_u64_view(chain, address, "rewardEpochsStartTs()").await?;
    let period = call_u64_view(chain, address, "rewardEpochDurationSeconds()").await?;
    Ok(Epoch::new(start as i64, Duration::from_secs(period)))
}

/// Read the voting-epoch descriptor from the systems manager.
pub async fn voting_epoch_from_chain(
    chain: &ChainClient,
    address: Address,
) -> Result<Epoch, ChainError> {
    let start = call_u64_view(chain, address, "firstVotingRoundStartTs()").await?;
    let period = call_u64_view(chain, address, "votingEpochDurationSeconds()").await?;
    Ok(Epoch::new(start as i64, Duration::from_secs(period)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_signed_is_non_fatal() {
        assert!(is_non_fatal_sign_error(
            "rpc error 3: execution reverted: new signing policy already signed"
        ));
        assert!(!is_non_fatal_sign_error("rpc error 3: execution reverted: not registered"));
    }
}
