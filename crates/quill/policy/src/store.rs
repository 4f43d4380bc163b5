//! Thread-safe ordered index of signing policies.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use alloy_primitives::Address;

use crate::{PolicyError, SigningPolicy, VoterEntry};

/// Ordered signing-policy index, sorted by reward epoch id and (therefore)
/// by start voting round id. All access is serialized under one mutex.
#[derive(Debug, Default)]
pub struct PolicyStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    policies: Vec<Arc<SigningPolicy>>,
    /// reward epoch id -> voter address -> (index, weight)
    voter_map: HashMap<i64, HashMap<Address, VoterEntry>>,
}

impl PolicyStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a policy. The new policy's reward epoch must directly follow
    /// the last stored one, and its start voting round must not regress.
    /// Voters are indexed first-wins: a duplicate address keeps the entry
    /// of its first occurrence.
    pub fn add(&self, policy: SigningPolicy) -> Result<(), PolicyError> {
        let mut inner = self.lock();

        if let Some(last) = inner.policies.last() {
            if last.reward_epoch_id != policy.reward_epoch_id - 1 {
                return Err(PolicyError::MissingPreviousEpoch(policy.reward_epoch_id - 1));
            }
            if policy.start_voting_round_id < last.start_voting_round_id {
                return Err(PolicyError::StartRoundRegression(policy.reward_epoch_id));
            }
        }

        let mut voters = HashMap::new();
        for (index, voter) in policy.voters.iter().enumerate() {
            voters
                .entry(*voter)
                .or_insert(VoterEntry {
                    index,
                    weight: policy.weights[index],
                });
        }
        inner.voter_map.insert(policy.reward_epoch_id, voters);
        inner.policies.push(Arc::new(policy));
        Ok(())
    }

    /// The policy effective for `voting_round_id`: the greatest stored
    /// policy whose start voting round is `<=` the argument.
    pub fn get_for_voting_round(&self, voting_round_id: u32) -> Option<Arc<SigningPolicy>> {
        let inner = self.lock();
        find_by_voting_round(&inner.policies, voting_round_id).cloned()
    }

    /// The oldest stored policy.
    pub fn first(&self) -> Option<Arc<SigningPolicy>> {
        self.lock().policies.first().cloned()
    }

    /// Drop every front policy with start voting round `<= voting_round_id`
    /// and return the removed reward epoch ids, oldest first.
    pub fn remove_by_voting_round(&self, voting_round_id: u32) -> Vec<u32> {
        let mut inner = self.lock();
        let keep = inner
            .policies
            .partition_point(|p| p.start_voting_round_id <= voting_round_id);
        let removed: Vec<u32> = inner
            .policies
            .drain(..keep)
            .map(|p| p.reward_epoch_id as u32)
            .collect();
        for epoch in &removed {
            inner.voter_map.remove(&i64::from(*epoch));
        }
        removed
    }

    /// The voter entry for `voter` in `reward_epoch_id`, if registered.
    pub fn voter_entry(&self, reward_epoch_id: i64, voter: Address) -> Option<VoterEntry> {
        self.lock()
            .voter_map
            .get(&reward_epoch_id)
            .and_then(|m| m.get(&voter))
            .copied()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Binary search for the last policy starting at or before
/// `voting_round_id`. The list is sorted by start voting round.
fn find_by_voting_round(
    policies: &[Arc<SigningPolicy>],
    voting_round_id: u32,
) -> Option<&Arc<SigningPolicy>> {
    let idx = policies.partition_point(|p| p.start_voting_round_id < voting_round_id);
    if let Some(policy) = policies.get(idx) {
        if policy.start_voting_round_id == voting_round_id {
            return Some(policy);
        }
    }
    if idx == 0 {
        None
    } else {
        policies.get(idx - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Bytes, U256};

    fn policy(reward_epoch_id: i64, start_voting_round_id: u32) -> SigningPolicy {
        SigningPolicy {
            reward_epoch_id,
            start_voting_round_id,
            threshold: 500,
            seed: U256::from(7u64),
            voters: vec![Address::repeat_byte(1), Address::repeat_byte(2)],
            weights: vec![100, 200],
            raw_bytes: Bytes::new(),
            block_timestamp: 0,
        }
    }

    #[test]
    fn add_requires_contiguous_reward_epochs() {
        let store = PolicyStore::new();
        store.add(policy(4, 400)).unwrap();
        store.add(policy(5, 500)).unwrap();

        assert_eq!(
            store.add(policy(7, 700)),
            Err(PolicyError::MissingPreviousEpoch(6))
        );
        assert_eq!(
            store.add(policy(5, 600)),
            Err(PolicyError::MissingPreviousEpoch(4))
        );
        // the rejected policies were not inserted
        assert_eq!(store.first().unwrap().reward_epoch_id, 4);
    }

    #[test]
    fn add_rejects_start_round_regression() {
        let store = PolicyStore::new();
        store.add(policy(4, 400)).unwrap();
        assert_eq!(
            store.add(policy(5, 399)),
            Err(PolicyError::StartRoundRegression(5))
        );
        // equal start rounds are allowed
        store.add(policy(5, 400)).unwrap();
    }

    #[test]
    fn get_for_voting_round_finds_effective_policy() {
        let store = PolicyStore::new();
        store.add(policy(4, 400)).unwrap();
        store.add(policy(5, 500)).unwrap();
        store.add(policy(6, 600)).unwrap();

        assert!(store.get_for_voting_round(399).is_none());
        assert_eq!(store.get_for_voting_round(400).unwrap().reward_epoch_id, 4);
        assert_eq!(store.get_for_voting_round(499).unwrap().reward_epoch_id, 4);
        assert_eq!(store.get_for_voting_round(500).unwrap().reward_epoch_id, 5);
        assert_eq!(store.get_for_voting_round(1_000).unwrap().reward_epoch_id, 6);
    }

    #[test]
    fn remove_by_voting_round_drops_prefix() {
        let store = PolicyStore::new();
        store.add(policy(4, 400)).unwrap();
        store.add(policy(5, 500)).unwrap();
        store.add(policy(6, 600)).unwrap();

        assert_eq!(store.remove_by_voting_round(550), vec![4, 5]);
        assert_eq!(store.first().unwrap().reward_epoch_id, 6);
        // voter maps of removed epochs are gone
        assert!(store.voter_entry(4, Address::repeat_byte(1)).is_none());
        assert!(store.voter_entry(6, Address::repeat_byte(1)).is_some());

        assert_eq!(store.remove_by_voting_round(100), Vec::<u32>::new());
        assert_eq!(store.remove_by_voting_round(600), vec![6]);
        assert!(store.first().is_none());
    }

    #[test]
    fn duplicate_voter_keeps_first_entry() {
        let dup = Address::repeat_byte(9);
        let mut p = policy(1, 10);
        p.voters = vec![dup, Address::repeat_byte(2), dup];
        p.weights = vec![111, 222, 333];

        let store = PolicyStore::new();
        store.add(p).unwrap();

        let entry = store.voter_entry(1, dup).unwrap();
        assert_eq!(entry.index, 0);
        assert_eq!(entry.weight, 111);
    }
}
