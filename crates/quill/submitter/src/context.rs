//! Keys and addresses the submission pipeline operates with.

use alloy_primitives::Address;
use k256::ecdsa::SigningKey;
use quill_chain::tx::address_of;

/// Per-role keys and derived addresses. Built once at startup and shared
/// read-only by every submitter.
pub struct ProtocolContext {
    /// Signs submit1/submit2/submit3 transactions.
    pub submit_key: SigningKey,
    /// Signs submitSignatures transactions.
    pub submit_signatures_key: SigningKey,
    /// Signs attestation data and signing-policy hashes.
    pub signer_key: SigningKey,

    /// The submission contract.
    pub submit_contract_address: Address,
    /// Address of `signer_key`.
    pub signing_address: Address,
    /// Address of `submit_key`.
    pub submit_address: Address,
    /// Address of `submit_signatures_key`.
    pub submit_signatures_address: Address,
}

impl ProtocolContext {
    /// Derive the role addresses from the keys.
    pub fn new(
        submit_key: SigningKey,
        submit_signatures_key: SigningKey,
        signer_key: SigningKey,
        submit_contract_address: Address,
    ) -> Self {
        let signing_address = address_of(&signer_key);
        let submit_address = address_of(&submit_key);
        let submit_signatures_address = address_of(&submit_signatures_key);
        Self {
            submit_key,
            submit_signatures_key,
            signer_key,
            submit_contract_address,
            signing_address,
            submit_address,
            submit_signatures_address,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(fill: u8) -> SigningKey {
        let mut bytes = [0u8; 32];
        bytes[31] = fill;
        SigningKey::from_slice(&bytes).unwrap()
    }

    #[test]
    fn addresses_follow_their_keys() {
        let context = ProtocolContext::new(key(1), key(2), key(3), Address::repeat_byte(9));
        assert_eq!(context.submit_address, address_of(&key(1)));
        assert_eq!(context.submit_signatures_address, address_of(&key(2)));
        assert_eq!(context.signing_address, address_of(&key(3)));
        assert_ne!(context.submit_address, context.submit_signatures_address);
    }
}
