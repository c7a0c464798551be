//! Fixed-width database entries with in-place XOR.

/// One database entry: an owned byte buffer of the session's entry size.
///
/// Used as the accumulator for hint parities and as the value type of the
/// local cache. All arithmetic is XOR, so entries form their own inverses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DbEntry {
    data: Vec<u8>,
}

impl DbEntry {
    /// New all-zero entry of the given width.
    pub fn zero(entry_size: usize) -> Self {
        Self { data: vec![0u8; entry_size] }
    }

    /// Copy an entry out of a raw buffer.
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self { data: bytes.to_vec() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// In-place XOR with raw bytes of the same width.
    ///
    /// Processes 8-byte words with a byte-wise tail; the result is the same
    /// as a byte-wise XOR.
    pub fn xor_raw(&mut self, other: &[u8]) {
        debug_assert_eq!(self.data.len(), other.len());
        let mut lanes = self.data.chunks_exact_mut(8);
        let mut other_lanes = other.chunks_exact(8);
        for (a, b) in (&mut lanes).zip(&mut other_lanes) {
            let word = u64::from_ne_bytes(a.try_into().unwrap())
                ^ u64::from_ne_bytes(b.try_into().unwrap());
            a.copy_from_slice(&word.to_ne_bytes());
        }
        for (a, b) in lanes.into_remainder().iter_mut().zip(other_lanes.remainder()) {
            *a ^= *b;
        }
    }

    /// In-place XOR with another entry of the same width.
    pub fn xor(&mut self, other: &DbEntry) {
        self.xor_raw(&other.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zero_entry() {
        let e = DbEntry::zero(8);
        assert_eq!(e.len(), 8);
        assert!(e.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_xor_raw() {
        let mut e = DbEntry::from_slice(&[0xFF, 0x00, 0xAA]);
        e.xor_raw(&[0x0F, 0xF0, 0x55]);
        assert_eq!(e.as_bytes(), &[0xF0, 0xF0, 0xFF]);
    }

    #[test]
    fn test_xor_multi_word() {
        // 13 bytes exercises both the word loop and the tail.
        let a: Vec<u8> = (0..13).collect();
        let b: Vec<u8> = (100..113).collect();
        let mut e = DbEntry::from_slice(&a);
        e.xor_raw(&b);
        for i in 0..13 {
            assert_eq!(e.as_bytes()[i], a[i] ^ b[i]);
        }
    }

    proptest! {
        #[test]
        fn xor_is_involutive(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            let other = DbEntry::from_slice(&bytes);
            let mut e = DbEntry::zero(bytes.len());
            e.xor(&other);
            prop_assert_eq!(e.as_bytes(), &bytes[..]);
            e.xor(&other);
            prop_assert!(e.as_bytes().iter().all(|&b| b == 0));
        }
    }
}
