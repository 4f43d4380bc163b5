//! Typed views of the two chain events the pipeline consumes.

use alloy_primitives::{Address, Bytes, U256};
use quill_chain::abi::AbiReader;
use quill_chain::{ChainError, EventLog, Timestamped};
use quill_policy::SigningPolicy;

/// Canonical signature of the vote-power-block event on the systems
/// manager.
pub const VOTE_POWER_BLOCK_SELECTED: &str = "VotePowerBlockSelected(uint256,uint64)";

/// Canonical signature of the signing-policy event on the relay.
pub const SIGNING_POLICY_INITIALIZED: &str =
    "SigningPolicyInitialized(uint256,uint32,uint16,uint256,address[],uint16[],bytes,uint64)";

/// `VotePowerBlockSelected(rewardEpochId indexed, timestamp)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VotePowerBlockSelected {
    /// Reward epoch whose vote power block was selected.
    pub reward_epoch_id: i64,
    /// Selection timestamp, unix seconds.
    pub timestamp: u64,
}

impl Timestamped for VotePowerBlockSelected {
    fn event_timestamp(&self) -> u64 {
        self.timestamp
    }
}

/// Parse a [`VotePowerBlockSelected`] log: the epoch id is indexed, the
/// timestamp sits in the data.
pub fn parse_vote_power_block_selected(
    log: &EventLog,
) -> Result<VotePowerBlockSelected, ChainError> {
    let epoch_topic = log
        .topic(1)
        .ok_or_else(|| ChainError::Abi("VotePowerBlockSelected missing epoch topic".to_string()))?;
    let reward_epoch_id = i64::try_from(U256::from_be_slice(epoch_topic.as_slice()))
        .map_err(|_| ChainError::Abi("reward epoch id out of range".to_string()))?;
    let timestamp = AbiReader::new(&log.data).u64(0)?;
    Ok(VotePowerBlockSelected {
        reward_epoch_id,
        timestamp,
    })
}

/// `SigningPolicyInitialized(rewardEpochId indexed, startVotingRoundId,
/// threshold, seed, voters[], weights[], signingPolicyBytes, timestamp)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningPolicyInitialized {
    /// Reward epoch the policy belongs to.
    pub reward_epoch_id: i64,
    /// First voting round the policy is effective for.
    pub start_voting_round_id: u32,
    /// Signing weight threshold.
    pub threshold: u16,
    /// Published seed.
    pub seed: U256,
    /// Voter addresses in policy order.
    pub voters: Vec<Address>,
    /// Weights parallel to `voters`.
    pub weights: Vec<u16>,
    /// Canonical policy serialization.
    pub signing_policy_bytes: Bytes,
    /// Initialization timestamp, unix seconds.
    pub timestamp: u64,
}

impl Timestamped for SigningPolicyInitialized {
    fn event_timestamp(&self) -> u64 {
        self.timestamp
    }
}

impl SigningPolicyInitialized {
    /// The policy as the store holds it.
    pub fn into_policy(self) -> SigningPolicy {
        SigningPolicy {
            reward_epoch_id: self.reward_epoch_id,
            start_voting_round_id: self.start_voting_round_id,
            threshold: self.threshold,
            seed: self.seed,
            voters: self.voters,
            weights: self.weights,
            raw_bytes: self.signing_policy_bytes,
            block_timestamp: self.timestamp,
        }
    }
}

/// Parse a [`SigningPolicyInitialized`] log.
pub fn parse_signing_policy_initialized(
    log: &EventLog,
) -> Result<SigningPolicyInitialized, ChainError> {
    let epoch_topic = log.topic(1).ok_or_else(|| {
        ChainError::Abi("SigningPolicyInitialized missing epoch topic".to_string())
    })?;
    let reward_epoch_id = i64::try_from(U256::from_be_slice(epoch_topic.as_slice()))
        .map_err(|_| ChainError::Abi("reward epoch id out of range".to_string()))?;

    let reader = AbiReader::new(&log.data);
    let voters = reader.dyn_address_array(3)?;
    let weights = reader.dyn_u16_array(4)?;
    if voters.len() != weights.len() {
        return Err(ChainError::Abi(format!(
            "signing policy has {} voters but {} weights",
            voters.len(),
            weights.len()
        )));
    }
    Ok(SigningPolicyInitialized {
        reward_epoch_id,
        start_voting_round_id: reader.u32(0)?,
        threshold: reader.u16(1)?,
        seed: reader.u256(2)?,
        voters,
        weights,
        signing_policy_bytes: Bytes::from(reader.dyn_bytes(5)?.to_vec()),
        timestamp: reader.u64(6)?,
    })
}
