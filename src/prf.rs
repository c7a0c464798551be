//! Keyed PRF and pseudorandom set expansion.

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes128;
use rand::rngs::OsRng;
use rand::RngCore;

/// 128-bit master key.
pub type PrfKey128 = [u8; 16];

/// AES-128 PRF over (set tag, chunk id) pairs.
///
/// The cipher's precomputed round-key schedule is the expanded long key:
/// rebuilding a `Prf` from the same master key yields identical outputs.
#[derive(Clone)]
pub struct Prf {
    key: PrfKey128,
    cipher: Aes128,
}

impl Prf {
    /// Fresh PRF under a master key drawn from the OS entropy source.
    pub fn random() -> Self {
        let mut key = [0u8; 16];
        OsRng.fill_bytes(&mut key);
        Self::new(key)
    }

    pub fn new(key: PrfKey128) -> Self {
        let cipher = Aes128::new(&GenericArray::from(key));
        Self { key, cipher }
    }

    pub fn key(&self) -> PrfKey128 {
        self.key
    }

    /// 64-bit PRF output for a (tag, chunk) pair.
    pub fn eval(&self, tag: u32, chunk_id: u64) -> u64 {
        let mut input = [0u8; 16];
        input[0..4].copy_from_slice(&tag.to_le_bytes());
        input[8..16].copy_from_slice(&chunk_id.to_le_bytes());

        let mut block = GenericArray::from(input);
        self.cipher.encrypt_block(&mut block);

        u64::from_le_bytes(block[0..8].try_into().unwrap())
    }

    /// Offset of the set with the given tag inside one chunk.
    ///
    /// `chunk_size` must be a power of two.
    pub fn offset(&self, tag: u32, chunk_id: u64, chunk_size: u64) -> u64 {
        debug_assert!(chunk_size.is_power_of_two());
        self.eval(tag, chunk_id) & (chunk_size - 1)
    }

    /// Expand a tag into its full set: element `i` is the absolute index
    /// `offset(tag, i) + i * chunk_size`.
    pub fn expand(&self, tag: u32, set_size: u64, chunk_size: u64) -> Vec<u64> {
        (0..set_size)
            .map(|i| self.offset(tag, i, chunk_size) + i * chunk_size)
            .collect()
    }

    /// True iff the tagged set's element in `chunk_id` sits at `query_offset`.
    pub fn member_test(&self, tag: u32, chunk_id: u64, query_offset: u64, chunk_size: u64) -> bool {
        self.offset(tag, chunk_id, chunk_size) == query_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_eval_is_deterministic() {
        let prf = Prf::new([7u8; 16]);
        let again = Prf::new([7u8; 16]);
        for tag in 0..8u32 {
            for chunk in 0..8u64 {
                assert_eq!(prf.eval(tag, chunk), again.eval(tag, chunk));
            }
        }
    }

    #[test]
    fn test_eval_separates_tags_and_chunks() {
        let prf = Prf::new([1u8; 16]);
        assert_ne!(prf.eval(0, 0), prf.eval(1, 0));
        assert_ne!(prf.eval(0, 0), prf.eval(0, 1));
    }

    #[test]
    fn test_expand_layout() {
        let prf = Prf::random();
        let set = prf.expand(3, 32, 32);
        assert_eq!(set.len(), 32);
        for (i, &idx) in set.iter().enumerate() {
            let base = i as u64 * 32;
            assert!(idx >= base && idx < base + 32);
        }
    }

    proptest! {
        #[test]
        fn expand_agrees_with_member_test(
            key in any::<[u8; 16]>(),
            tag in any::<u32>(),
            log_chunk in 0u32..10,
        ) {
            let chunk_size = 1u64 << log_chunk;
            let set_size = chunk_size;
            let prf = Prf::new(key);
            let set = prf.expand(tag, set_size, chunk_size);
            for (i, &idx) in set.iter().enumerate() {
                let chunk = i as u64;
                let offset = idx - chunk * chunk_size;
                prop_assert!(offset < chunk_size);
                prop_assert!(prf.member_test(tag, chunk, offset, chunk_size));
                if chunk_size > 1 {
                    let other = (offset + 1) & (chunk_size - 1);
                    prop_assert!(!prf.member_test(tag, chunk, other, chunk_size));
                }
            }
        }
    }
}
