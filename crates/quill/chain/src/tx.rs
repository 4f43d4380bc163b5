//! Key handling and legacy transaction signing.

use alloy_primitives::{hex, keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{Encodable, Header};
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;

use crate::ChainError;

/// Parse a hex-encoded secp256k1 private key (optional `0x`, surrounding
/// whitespace tolerated — keys come straight out of key files).
pub fn parse_private_key(raw: &str) -> Result<SigningKey, ChainError> {
    let trimmed = raw.trim().trim_start_matches("0x");
    let bytes =
        hex::decode(trimmed).map_err(|err| ChainError::InvalidKey(err.to_string()))?;
    SigningKey::from_slice(&bytes).map_err(|err| ChainError::InvalidKey(err.to_string()))
}

/// The address controlled by a private key (keccak of the uncompressed
/// public key, last 20 bytes).
pub fn address_of(key: &SigningKey) -> Address {
    let point = key.verifying_key().to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Sign a 32-byte digest, returning the 65-byte `R || S || recovery_id`
/// form used by the payload codec.
pub fn sign_recoverable(key: &SigningKey, digest: B256) -> Result<[u8; 65], ChainError> {
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(digest.as_slice())
        .map_err(|err| ChainError::Signature(err.to_string()))?;
    let mut out = [0u8; 65];
    out[..64].copy_from_slice(&signature.to_bytes());
    out[64] = recovery_id.to_byte();
    Ok(out)
}

/// keccak of the text-prefixed message, as wallets sign it.
pub fn eth_text_hash(message: &[u8]) -> B256 {
    let mut prefixed = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
    prefixed.extend_from_slice(message);
    keccak256(&prefixed)
}

/// An unsigned legacy transaction.
#[derive(Debug, Clone)]
pub struct LegacyTx {
    /// Sender account nonce.
    pub nonce: u64,
    /// Gas price in wei.
    pub gas_price: u128,
    /// Gas limit.
    pub gas_limit: u64,
    /// Recipient contract.
    pub to: Address,
    /// Value in wei (always zero for protocol calls).
    pub value: U256,
    /// Calldata.
    pub data: Bytes,
}

impl LegacyTx {
    /// EIP-155 signing hash.
    pub fn signing_hash(&self, chain_id: u64) -> B256 {
        let mut payload = Vec::new();
        self.encode_body(&mut payload);
        chain_id.encode(&mut payload);
        0u8.encode(&mut payload);
        0u8.encode(&mut payload);
        keccak256(rlp_list(payload))
    }

    /// Raw signed transaction bytes ready for `eth_sendRawTransaction`.
    pub fn encode_signed(&self, chain_id: u64, signature: &[u8; 65]) -> Vec<u8> {
        let v = 35 + 2 * chain_id + u64::from(signature[64]);
        let r = U256::from_be_slice(&signature[..32]);
        let s = U256::from_be_slice(&signature[32..64]);

        let mut payload = Vec::new();
        self.encode_body(&mut payload);
        v.encode(&mut payload);
        r.encode(&mut payload);
        s.encode(&mut payload);
        rlp_list(payload)
    }

    fn encode_body(&self, out: &mut Vec<u8>) {
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas_limit.encode(out);
        self.to.encode(out);
        self.value.encode(out);
        self.data.encode(out);
    }
}

fn rlp_list(payload: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 9);
    Header {
        list: true,
        payload_length: payload.len(),
    }
    .encode(&mut out);
    out.extend_from_slice(&payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

    fn test_key() -> SigningKey {
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        SigningKey::from_slice(&bytes).expect("valid key")
    }

    #[test]
    fn address_of_known_key() {
        // address of private key 0x...01
        let expected: Address = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
            .parse()
            .unwrap();
        assert_eq!(address_of(&test_key()), expected);
    }

    #[test]
    fn parse_private_key_accepts_prefix_and_whitespace() {
        let key = parse_private_key(
            " 0x0000000000000000000000000000000000000000000000000000000000000001\n",
        )
        .unwrap();
        assert_eq!(address_of(&key), address_of(&test_key()));
        assert!(parse_private_key("zz").is_err());
        assert!(parse_private_key("0x00").is_err());
    }

    #[test]
    fn recoverable_signature_recovers_signer() {
        let key = test_key();
        let digest = keccak256(b"attestation data");
        let sig = sign_recoverable(&key, digest).unwrap();

        let parsed = Signature::from_slice(&sig[..64]).unwrap();
        let rec_id = RecoveryId::from_byte(sig[64]).unwrap();
        let recovered =
            VerifyingKey::recover_from_prehash(digest.as_slice(), &parsed, rec_id).unwrap();
        assert_eq!(recovered, *key.verifying_key());
    }

    #[test]
    fn text_hash_differs_from_plain_keccak() {
        let digest = keccak256(b"payload");
        let text = eth_text_hash(digest.as_slice());
        assert_ne!(text, keccak256(digest.as_slice()));
        // prefix commits to the 32-byte length
        assert_eq!(text, eth_text_hash(&digest.0));
    }

    #[test]
    fn signed_tx_commits_to_chain_id() {
        let tx = LegacyTx {
            nonce: 7,
            gas_price: 25_000_000_000,
            gas_limit: 500_000,
            to: Address::repeat_byte(0x22),
            value: U256::ZERO,
            data: Bytes::from(vec![1, 2, 3]),
        };
        assert_ne!(tx.signing_hash(14), tx.signing_hash(15));

        let sig = sign_recoverable(&test_key(), tx.signing_hash(14)).unwrap();
        let raw = tx.encode_signed(14, &sig);
        // a signed legacy tx is a single RLP list covering the whole buffer
        let mut rest = raw.as_slice();
        let header = Header::decode(&mut rest).unwrap();
        assert!(header.list);
        assert_eq!(header.payload_length, rest.len());
    }
}
