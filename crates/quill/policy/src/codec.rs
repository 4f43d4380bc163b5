//! Canonical signing-policy serialization and the chained policy hash.

use alloy_primitives::{keccak256, Bytes, B256};

use crate::SigningPolicy;

/// Canonical on-chain encoding:
/// `u16(|voters|) || u32(rewardEpochId) || u32(startVotingRoundId) ||
/// u16(threshold) || seed_bytes || (addr20 || u16(weight))*`, big-endian,
/// with the seed written as its minimal big-endian byte string.
pub fn encode_signing_policy(policy: &SigningPolicy) -> Bytes {
    let size = policy.voters.len();
    let mut buffer = Vec::with_capacity(12 + 32 + size * 22);

    buffer.extend_from_slice(&(size as u16).to_be_bytes());
    buffer.extend_from_slice(&(policy.reward_epoch_id as u32).to_be_bytes());
    buffer.extend_from_slice(&policy.start_voting_round_id.to_be_bytes());
    buffer.extend_from_slice(&policy.threshold.to_be_bytes());
    buffer.extend_from_slice(&policy.seed.to_be_bytes_trimmed_vec());

    for (voter, weight) in policy.voters.iter().zip(&policy.weights) {
        buffer.extend_from_slice(voter.as_slice());
        buffer.extend_from_slice(&weight.to_be_bytes());
    }
    Bytes::from(buffer)
}

/// Hash of the canonical policy bytes, as the on-chain verifier computes
/// it: zero-pad to a multiple of 32, seed with keccak over the first two
/// tiles, then left-fold keccak over each remaining 32-byte tile. This is
/// deliberately not a keccak over the whole buffer.
pub fn signing_policy_hash(signing_policy: &[u8]) -> B256 {
    let mut padded = signing_policy.to_vec();
    if padded.len() % 32 != 0 {
        let fill = 32 - padded.len() % 32;
        padded.resize(padded.len() + fill, 0);
    }
    if padded.len() < 64 {
        padded.resize(64, 0);
    }

    let mut input = [0u8; 64];
    input.copy_from_slice(&padded[..64]);
    let mut hash = keccak256(input);
    for tile in padded[64..].chunks_exact(32) {
        input[..32].copy_from_slice(hash.as_slice());
        input[32..].copy_from_slice(tile);
        hash = keccak256(input);
    }
    hash
}
