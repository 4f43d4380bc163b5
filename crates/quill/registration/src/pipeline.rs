//! The per-reward-epoch registration state machine.

use std::sync::Arc;

use alloy_primitives::Address;
use quill_chain::LogStore;
use quill_epoch::{Epoch, ExecuteStatus};
use quill_policy::PolicyStore;
use quill_telemetry::Telemetry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{RegistrationError, RegistryClient, RelayClient, SystemsManagerClient};

/// Sequential per-reward-epoch pipeline:
/// await vote-power block → verify epoch → register → await signing
/// policy → sign. Every step after the first is skippable.
pub struct RegistrationPipeline<S, R, V> {
    logs: Arc<dyn LogStore>,
    systems_manager: S,
    relay: R,
    registry: V,
    policies: Arc<PolicyStore>,
    identity_address: Address,
    reward_epoch: Epoch,
}

impl<S, R, V> RegistrationPipeline<S, R, V>
where
    S: SystemsManagerClient,
    R: RelayClient,
    V: RegistryClient,
{
    /// Assemble the pipeline.
    pub fn new(
        logs: Arc<dyn LogStore>,
        systems_manager: S,
        relay: R,
        registry: V,
        policies: Arc<PolicyStore>,
        identity_address: Address,
        reward_epoch: Epoch,
    ) -> Self {
        Self {
            logs,
            systems_manager,
            relay,
            registry,
            policies,
            identity_address,
            reward_epoch,
        }
    }

    /// Run until cancelled. Only cancellation or a dead listener ends the
    /// loop; per-epoch failures skip back to waiting.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), RegistrationError> {
        let mut vote_power_blocks = self
            .systems_manager
            .vote_power_block_listener(Arc::clone(&self.logs), &self.reward_epoch);

        loop {
            debug!(target: "quill::registration", "waiting for VotePowerBlockSelected event");

            let power_block = tokio::select! {
                _ = cancel.cancelled() => return Err(RegistrationError::Cancelled),
                event = vote_power_blocks.recv() => {
                    event.ok_or(RegistrationError::ListenerClosed)?
                }
            };
            info!(
                target: "quill::registration",
                reward_epoch_id = power_block.reward_epoch_id,
                "VotePowerBlockSelected event emitted"
            );
            Telemetry::global().record_event_observed("VotePowerBlockSelected");

            if !self.verify_epoch(power_block.reward_epoch_id).await {
                info!(
                    target: "quill::registration",
                    reward_epoch_id = power_block.reward_epoch_id,
                    "skipping registration process"
                );
                continue;
            }

            let registered = self
                .registry
                .register_voter(power_block.reward_epoch_id, self.identity_address)
                .await;
            if let ExecuteStatus::Failure(message) = registered {
                error!(target: "quill::registration", %message, "RegisterVoter failed");
                continue;
            }
            Telemetry::global().record_registration();

            // The VoterRegistered event is a side effect of the mined
            // receipt; the pipeline does not separately await it.

            let mut signing_policies = self
                .relay
                .signing_policy_listener(Arc::clone(&self.logs), power_block.timestamp);
            let Some(policy_event) = signing_policies.recv().await else {
                return Err(RegistrationError::ListenerClosed);
            };
            info!(
                target: "quill::registration",
                reward_epoch_id = policy_event.reward_epoch_id,
                "SigningPolicyInitialized event emitted"
            );
            Telemetry::global().record_event_observed("SigningPolicyInitialized");

            let reward_epoch_id = policy_event.reward_epoch_id;
            let policy_bytes = policy_event.signing_policy_bytes.clone();
            if let Err(err) = self.policies.add(policy_event.into_policy()) {
                // a later event may supply the missing epoch
                warn!(target: "quill::registration", error = %err, "signing policy not indexed");
            }

            match self
                .systems_manager
                .sign_new_signing_policy(reward_epoch_id, &policy_bytes)
                .await
            {
                ExecuteStatus::Success(()) => Telemetry::global().record_policy_signed(),
                ExecuteStatus::Failure(message) => {
                    error!(target: "quill::registration", %message, "SignNewSigningPolicy failed");
                    continue;
                }
            }
        }
    }

    async fn verify_epoch(&self, reward_epoch_id: i64) -> bool {
        let current = match self.systems_manager.get_current_reward_epoch_id().await {
            ExecuteStatus::Success(id) => id,
            ExecuteStatus::Failure(message) => {
                error!(target: "quill::registration", %message, "GetCurrentRewardEpochId failed");
                return false;
            }
        };
        if reward_epoch_id <= current {
            warn!(
                target: "quill::registration",
                current, next = reward_epoch_id, "epoch mismatch"
            );
            return false;
        }
        true
    }
}
