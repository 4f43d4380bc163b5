//! Signing policies: model, ordered in-memory store and canonical codec.
//!
//! A signing policy is the on-chain-published validator set for one reward
//! epoch, effective from its start voting round. Policies are immutable
//! once inserted into the store.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod codec;
pub mod store;

pub use codec::{encode_signing_policy, signing_policy_hash};
pub use store::PolicyStore;

use alloy_primitives::{Address, Bytes, U256};
use thiserror::Error;

/// An on-chain signing policy for one reward epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningPolicy {
    /// Reward epoch this policy belongs to.
    pub reward_epoch_id: i64,
    /// First voting round the policy is effective for.
    pub start_voting_round_id: u32,
    /// Signing weight threshold.
    pub threshold: u16,
    /// Random seed published with the policy.
    pub seed: U256,
    /// Voter addresses, in policy order.
    pub voters: Vec<Address>,
    /// Voter weights, parallel to `voters`.
    pub weights: Vec<u16>,
    /// Canonical on-chain serialization of the policy.
    pub raw_bytes: Bytes,
    /// Timestamp of the block that initialized the policy.
    pub block_timestamp: u64,
}

/// Per-policy voter record: position in the voter list and its weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoterEntry {
    /// Index of the voter's first occurrence in the policy.
    pub index: usize,
    /// Weight at that index.
    pub weight: u16,
}

/// Store insertion failures. The offending policy is not inserted; a later
/// event may supply the missing epoch.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    /// Policies must arrive with contiguous reward epoch ids.
    #[error("missing signing policy for reward epoch id {0}")]
    MissingPreviousEpoch(i64),

    /// Start voting rounds must be non-decreasing across epochs.
    #[error("signing policy for reward epoch id {0} has smaller start voting round id than the previous policy")]
    StartRoundRegression(i64),
}
