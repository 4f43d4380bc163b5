//! Binary framing for `submitSignatures` entries.

use alloy_primitives::keccak256;
use k256::ecdsa::SigningKey;
use quill_chain::tx::{eth_text_hash, sign_recoverable};

use crate::{SubProtocolResponse, SubmitterError};

/// Protocol id byte at the head of every entry.
pub const ENTRY_PROTOCOL_ID: u8 = 100;

/// Entry type byte.
pub const ENTRY_TYPE: u8 = 0;

/// Fixed entry length before additional data.
pub const ENTRY_FIXED_LEN: usize = 111;

/// Append one signature entry to `buffer`. The response must already have
/// passed the signature verifier (38-byte data, bounded additional data).
///
/// Layout, big-endian where wider than one byte:
/// protocol id (1) | target epoch (4) | length = 104 + |additional| (2) |
/// type (1) | data (38) | V (1) | R (32) | S (32) | additional data.
pub fn write_signature_entry(
    buffer: &mut Vec<u8>,
    signer_key: &SigningKey,
    target_epoch: i64,
    response: &SubProtocolResponse,
) -> Result<(), SubmitterError> {
    let digest = eth_text_hash(keccak256(&response.data).as_slice());
    let signature = sign_recoverable(signer_key, digest)?;

    let length = 104 + response.additional_data.len();

    buffer.push(ENTRY_PROTOCOL_ID);
    buffer.extend_from_slice(&(target_epoch as u32).to_be_bytes());
    buffer.extend_from_slice(&(length as u16).to_be_bytes());
    buffer.push(ENTRY_TYPE);
    buffer.extend_from_slice(&response.data);
    buffer.push(signature[64] + 27);
    buffer.extend_from_slice(&signature[..32]);
    buffer.extend_from_slice(&signature[32..64]);
    buffer.extend_from_slice(&response.additional_data);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Bytes;
    use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

    fn signer() -> SigningKey {
        let mut bytes = [0u8; 32];
        bytes[31] = 7;
        SigningKey::from_slice(&bytes).unwrap()
    }

    fn response(additional: Vec<u8>) -> SubProtocolResponse {
        SubProtocolResponse {
            status: "OK".to_string(),
            data: Bytes::from(vec![0x5au8; 38]),
            additional_data: Bytes::from(additional),
        }
    }

    #[test]
    fn entry_layout_matches_offsets() {
        let key = signer();
        let response = response(vec![0xde, 0xad, 0xbe, 0xef]);
        let mut buffer = Vec::new();
        write_signature_entry(&mut buffer, &key, 41, &response).unwrap();

        assert_eq!(buffer.len(), ENTRY_FIXED_LEN + 4);
        assert_eq!(buffer[0], ENTRY_PROTOCOL_ID);
        assert_eq!(&buffer[1..5], &41u32.to_be_bytes());
        assert_eq!(&buffer[5..7], &(104u16 + 4).to_be_bytes());
        assert_eq!(buffer[7], ENTRY_TYPE);
        assert_eq!(&buffer[8..46], response.data.as_ref());
        assert!(buffer[46] == 27 || buffer[46] == 28);
        assert_eq!(&buffer[111..], &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn entry_signature_recovers_the_signer() {
        let key = signer();
        let response = response(Vec::new());
        let mut buffer = Vec::new();
        write_signature_entry(&mut buffer, &key, 41, &response).unwrap();

        // R || S live at offsets 47 and 79; V at 46 carries +27
        let mut compact = [0u8; 64];
        compact[..32].copy_from_slice(&buffer[47..79]);
        compact[32..].copy_from_slice(&buffer[79..111]);
        let parsed = Signature::from_slice(&compact).unwrap();
        let rec_id = RecoveryId::from_byte(buffer[46] - 27).unwrap();

        let digest = eth_text_hash(keccak256(&response.data).as_slice());
        let recovered =
            VerifyingKey::recover_from_prehash(digest.as_slice(), &parsed, rec_id).unwrap();
        assert_eq!(recovered, *key.verifying_key());
    }

    #[test]
    fn entries_concatenate_cleanly() {
        let key = signer();
        let mut buffer = vec![1, 2, 3, 4]; // selector seed
        write_signature_entry(&mut buffer, &key, 41, &response(Vec::new())).unwrap();
        write_signature_entry(&mut buffer, &key, 41, &response(vec![9])).unwrap();
        assert_eq!(buffer.len(), 4 + ENTRY_FIXED_LEN + ENTRY_FIXED_LEN + 1);
        // second entry starts with the protocol id again
        assert_eq!(buffer[4 + ENTRY_FIXED_LEN], ENTRY_PROTOCOL_ID);
    }
}
