//! Reward-epoch registration pipeline.
//!
//! Once per reward epoch the pipeline waits for the vote-power-block
//! event, registers the configured identity with the voter registry, waits
//! for the next signing policy to be initialized, indexes it and signs it.
//! Every step after the initial wait is skippable: a failure returns the
//! loop to waiting without advancing any cursor.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod events;
pub mod pipeline;
pub mod registry;
pub mod relay;
pub mod system_manager;

pub use events::{SigningPolicyInitialized, VotePowerBlockSelected};
pub use pipeline::RegistrationPipeline;
pub use registry::RegistryContract;
pub use relay::RelayContract;
pub use system_manager::{
    reward_epoch_from_chain, voting_epoch_from_chain, SystemsManagerContract,
};

use std::sync::Arc;

use alloy_primitives::Address;
use async_trait::async_trait;
use quill_chain::LogStore;
use quill_epoch::{Epoch, ExecuteStatus};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;

/// Pipeline-terminating failures. Per-epoch failures are not errors; they
/// skip the iteration.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// The process-wide cancellation token fired.
    #[error("registration pipeline cancelled")]
    Cancelled,

    /// An event listener task went away.
    #[error("event listener channel closed")]
    ListenerClosed,
}

/// Systems-manager contract operations used by the pipeline.
#[async_trait]
pub trait SystemsManagerClient: Send + Sync {
    /// Tail `VotePowerBlockSelected` events, starting one reward epoch
    /// back for bounded backfill.
    fn vote_power_block_listener(
        &self,
        logs: Arc<dyn LogStore>,
        reward_epoch: &Epoch,
    ) -> UnboundedReceiver<VotePowerBlockSelected>;

    /// `getCurrentRewardEpochId()` view.
    async fn get_current_reward_epoch_id(&self) -> ExecuteStatus<i64>;

    /// Hash, sign and submit `signNewSigningPolicy`. An "already signed"
    /// rejection is success.
    async fn sign_new_signing_policy(
        &self,
        reward_epoch_id: i64,
        signing_policy_bytes: &[u8],
    ) -> ExecuteStatus<()>;
}

/// Relay contract operations used by the pipeline.
pub trait RelayClient: Send + Sync {
    /// Tail `SigningPolicyInitialized` events from `from_timestamp`.
    fn signing_policy_listener(
        &self,
        logs: Arc<dyn LogStore>,
        from_timestamp: u64,
    ) -> UnboundedReceiver<SigningPolicyInitialized>;
}

/// Voter-registry contract operations used by the pipeline.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// `registerVoter(rewardEpochId, identityAddress)`; the mined receipt
    /// is sufficient evidence of registration.
    async fn register_voter(
        &self,
        reward_epoch_id: i64,
        identity_address: Address,
    ) -> ExecuteStatus<()>;
}
