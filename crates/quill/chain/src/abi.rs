//! Minimal ABI helpers.
//!
//! Selectors are 4-byte keccak prefixes of canonical method signatures,
//! computed at startup from a fixed list rather than from an ABI document.
//! Encoding covers only the static word types the client calls with;
//! decoding additionally handles the dynamic tails of the relay event.

use alloy_primitives::{keccak256, Address, B256, Bytes, U256};

use crate::ChainError;

/// 4-byte method selector for a canonical signature, e.g. `"submit1()"`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// topic0 for a canonical event signature.
pub fn event_topic0(signature: &str) -> B256 {
    keccak256(signature.as_bytes())
}

/// Builds calldata: selector followed by 32-byte words.
#[derive(Debug, Clone)]
pub struct CallBuilder {
    data: Vec<u8>,
}

impl CallBuilder {
    /// Start a call with the given selector.
    pub fn new(selector: [u8; 4]) -> Self {
        Self {
            data: selector.to_vec(),
        }
    }

    /// Append a uint256 word.
    pub fn push_u256(mut self, value: U256) -> Self {
        self.data.extend_from_slice(&value.to_be_bytes::<32>());
        self
    }

    /// Append a uint word from a u64.
    pub fn push_u64(self, value: u64) -> Self {
        self.push_u256(U256::from(value))
    }

    /// Append a left-padded address word.
    pub fn push_address(mut self, value: Address) -> Self {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(value.as_slice());
        self.data.extend_from_slice(&word);
        self
    }

    /// Append a bytes32 word.
    pub fn push_b256(mut self, value: B256) -> Self {
        self.data.extend_from_slice(value.as_slice());
        self
    }

    /// Finish the calldata.
    pub fn build(self) -> Bytes {
        Bytes::from(self.data)
    }
}

/// Reads 32-byte words and dynamic tails out of ABI-encoded data.
#[derive(Debug, Clone, Copy)]
pub struct AbiReader<'a> {
    data: &'a [u8],
}

impl<'a> AbiReader<'a> {
    /// Wrap an encoded buffer.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// The `index`-th 32-byte word.
    pub fn word(&self, index: usize) -> Result<&'a [u8], ChainError> {
        let start = index * 32;
        self.data
            .get(start..start + 32)
            .ok_or_else(|| ChainError::Abi(format!("word {index} out of range")))
    }

    /// The `index`-th word as a uint256.
    pub fn u256(&self, index: usize) -> Result<U256, ChainError> {
        Ok(U256::from_be_slice(self.word(index)?))
    }

    /// The `index`-th word as a u64; fails on overflow.
    pub fn u64(&self, index: usize) -> Result<u64, ChainError> {
        u64::try_from(self.u256(index)?)
            .map_err(|_| ChainError::Abi(format!("word {index} does not fit in u64")))
    }

    /// The `index`-th word as a u32; fails on overflow.
    pub fn u32(&self, index: usize) -> Result<u32, ChainError> {
        u32::try_from(self.u256(index)?)
            .map_err(|_| ChainError::Abi(format!("word {index} does not fit in u32")))
    }

    /// The `index`-th word as a u16; fails on overflow.
    pub fn u16(&self, index: usize) -> Result<u16, ChainError> {
        u16::try_from(self.u256(index)?)
            .map_err(|_| ChainError::Abi(format!("word {index} does not fit in u16")))
    }

    /// The `index`-th word as a right-aligned address.
    pub fn address(&self, index: usize) -> Result<Address, ChainError> {
        Ok(Address::from_slice(&self.word(index)?[12..]))
    }

    /// Byte offset of the dynamic tail referenced by the `index`-th word.
    fn tail_offset(&self, index: usize) -> Result<usize, ChainError> {
        usize::try_from(self.u256(index)?)
            .map_err(|_| ChainError::Abi(format!("offset word {index} out of range")))
    }

    /// `bytes` tail referenced by the `index`-th head word.
    pub fn dyn_bytes(&self, index: usize) -> Result<&'a [u8], ChainError> {
        let offset = self.tail_offset(index)?;
        let len_word = self
            .data
            .get(offset..offset + 32)
            .ok_or_else(|| ChainError::Abi("bytes length out of range".to_string()))?;
        let len = usize::try_from(U256::from_be_slice(len_word))
            .map_err(|_| ChainError::Abi("bytes length overflow".to_string()))?;
        self.data
            .get(offset + 32..offset + 32 + len)
            .ok_or_else(|| ChainError::Abi("bytes payload out of range".to_string()))
    }

    /// `address[]` tail referenced by the `index`-th head word.
    pub fn dyn_address_array(&self, index: usize) -> Result<Vec<Address>, ChainError> {
        self.dyn_words(index, |word| Address::from_slice(&word[12..]))
    }

    /// `uint16[]` tail referenced by the `index`-th head word.
    pub fn dyn_u16_array(&self, index: usize) -> Result<Vec<u16>, ChainError> {
        let words = self.dyn_words(index, U256::from_be_slice)?;
        words
            .into_iter()
            .map(|w| u16::try_from(w).map_err(|_| ChainError::Abi("u16 overflow".to_string())))
            .collect()
    }

    fn dyn_words<T>(
        &self,
        index: usize,
        convert: impl Fn(&[u8]) -> T,
    ) -> Result<Vec<T>, ChainError> {
        let offset = self.tail_offset(index)?;
        let len_word = self
            .data
            .get(offset..offset + 32)
            .ok_or_else(|| ChainError::Abi("array length out of range".to_string()))?;
        let len = usize::try_from(U256::from_be_slice(len_word))
            .map_err(|_| ChainError::Abi("array length overflow".to_string()))?;
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            let start = offset + 32 + i * 32;
            let word = self
                .data
                .get(start..start + 32)
                .ok_or_else(|| ChainError::Abi("array element out of range".to_string()))?;
            out.push(convert(word));
        }
        Ok(out)
    }
}
