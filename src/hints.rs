//! Hint storage for the Piano client.

use crate::entry::DbEntry;
use crate::params::Params;
use std::collections::HashMap;

/// An active hint: a tagged pseudorandom set with its precomputed parity.
///
/// When `is_programmed` is set, the element for chunk
/// `programmed_point / chunk_size` is overridden to `programmed_point`
/// instead of the PRF expansion.
#[derive(Clone, Debug)]
pub struct PrimarySet {
    pub tag: u32,
    pub parity: DbEntry,
    pub programmed_point: u64,
    pub is_programmed: bool,
}

/// A reserve hint, preprocessed over every chunk except its group's own.
#[derive(Clone, Debug)]
pub struct BackupSet {
    pub tag: u32,
    pub parity_after_puncture: DbEntry,
}

/// Consumption cursor for one chunk's backup sets. The sets themselves live
/// in the flat arena; group `g` owns the contiguous slice
/// `[g * m2, (g + 1) * m2)`.
#[derive(Clone, Debug)]
struct BackupSetGroup {
    consumed: usize,
}

/// Replacement entries sampled from one chunk during preprocessing:
/// parallel index/value arrays plus a consumption cursor.
#[derive(Clone, Debug)]
struct ReplacementGroup {
    indices: Vec<u64>,
    values: Vec<DbEntry>,
    consumed: usize,
}

/// All client-side hint state for one session.
///
/// Created empty, filled once by preprocessing, then consumed by the online
/// query path. Consumption counters only move forward; exceeding the
/// per-chunk budget is a bug and panics.
pub struct HintStore {
    primary_sets: Vec<PrimarySet>,
    backup_sets: Vec<BackupSet>,
    backup_groups: Vec<BackupSetGroup>,
    replacement_groups: Vec<ReplacementGroup>,
    local_cache: HashMap<u64, DbEntry>,
    local_miss_elements: HashMap<u64, DbEntry>,
    backup_per_chunk: usize,
}

impl HintStore {
    /// Allocate zeroed hint state. Tags are drawn from one monotonically
    /// increasing counter, so every primary and backup tag is unique.
    pub fn new(params: &Params) -> Self {
        let m1 = params.primary_set_num as usize;
        let m2 = params.backup_set_num_per_chunk as usize;
        let groups = params.set_size as usize;
        let entry_size = params.entry_size;

        let mut tag_counter = 0u32;
        let mut primary_sets = Vec::with_capacity(m1);
        for _ in 0..m1 {
            primary_sets.push(PrimarySet {
                tag: tag_counter,
                parity: DbEntry::zero(entry_size),
                programmed_point: 0,
                is_programmed: false,
            });
            tag_counter += 1;
        }

        let mut backup_sets = Vec::with_capacity(m2 * groups);
        for _ in 0..m2 * groups {
            backup_sets.push(BackupSet {
                tag: tag_counter,
                parity_after_puncture: DbEntry::zero(entry_size),
            });
            tag_counter += 1;
        }

        let backup_groups = vec![BackupSetGroup { consumed: 0 }; groups];
        let replacement_groups = (0..groups)
            .map(|_| ReplacementGroup {
                indices: vec![0u64; m2],
                values: vec![DbEntry::zero(entry_size); m2],
                consumed: 0,
            })
            .collect();

        Self {
            primary_sets,
            backup_sets,
            backup_groups,
            replacement_groups,
            local_cache: HashMap::new(),
            local_miss_elements: HashMap::new(),
            backup_per_chunk: m2,
        }
    }

    pub fn primary_sets(&self) -> &[PrimarySet] {
        &self.primary_sets
    }

    pub fn backup_sets(&self) -> &[BackupSet] {
        &self.backup_sets
    }

    /// Mutable access to both set arenas for preprocessing. Split borrow so
    /// primary and backup parities can be updated in the same parallel pass.
    pub(crate) fn sets_mut(&mut self) -> (&mut [PrimarySet], &mut [BackupSet]) {
        (&mut self.primary_sets, &mut self.backup_sets)
    }

    /// Consume the next replacement for `chunk`, or None when the group is
    /// exhausted.
    pub fn take_replacement(&mut self, chunk: u64) -> Option<(u64, DbEntry)> {
        let group = &mut self.replacement_groups[chunk as usize];
        assert!(group.consumed <= self.backup_per_chunk);
        if group.consumed == self.backup_per_chunk {
            return None;
        }
        let next = group.consumed;
        group.consumed += 1;
        Some((group.indices[next], group.values[next].clone()))
    }

    /// Consume the next backup set for `chunk`, returning its tag and
    /// punctured parity, or None when the group is exhausted.
    pub fn take_backup(&mut self, chunk: u64) -> Option<(u32, DbEntry)> {
        let group = &mut self.backup_groups[chunk as usize];
        assert!(group.consumed <= self.backup_per_chunk);
        if group.consumed == self.backup_per_chunk {
            return None;
        }
        let slot = chunk as usize * self.backup_per_chunk + group.consumed;
        group.consumed += 1;
        let set = &self.backup_sets[slot];
        Some((set.tag, set.parity_after_puncture.clone()))
    }

    /// Rotate a consumed primary onto a fresh backup identity, programmed at
    /// `point`.
    pub(crate) fn refresh_primary(&mut self, hit: usize, tag: u32, parity: DbEntry, point: u64) {
        let set = &mut self.primary_sets[hit];
        set.tag = tag;
        set.parity = parity;
        set.is_programmed = true;
        set.programmed_point = point;
    }

    /// Record one replacement slot during preprocessing.
    pub(crate) fn set_replacement(&mut self, chunk: u64, slot: usize, index: u64, value: DbEntry) {
        let group = &mut self.replacement_groups[chunk as usize];
        group.indices[slot] = index;
        group.values[slot] = value;
    }

    pub fn cached(&self, index: u64) -> Option<&DbEntry> {
        self.local_cache.get(&index)
    }

    /// Insert a recovered answer. A previously cached value is never
    /// overwritten.
    pub(crate) fn insert_cache(&mut self, index: u64, value: DbEntry) {
        self.local_cache.entry(index).or_insert(value);
    }

    pub fn local_miss(&self, index: u64) -> Option<&DbEntry> {
        self.local_miss_elements.get(&index)
    }

    /// All entries that no primary set selected during preprocessing.
    pub fn local_misses(&self) -> &HashMap<u64, DbEntry> {
        &self.local_miss_elements
    }

    pub(crate) fn record_local_miss(&mut self, index: u64, value: DbEntry) {
        self.local_miss_elements.insert(index, value);
    }

    pub fn replacement_consumed(&self, chunk: u64) -> usize {
        self.replacement_groups[chunk as usize].consumed
    }

    pub fn backup_consumed(&self, chunk: u64) -> usize {
        self.backup_groups[chunk as usize].consumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_params() -> Params {
        Params::new(1024, 8, 1)
    }

    #[test]
    fn test_tags_are_unique() {
        let store = HintStore::new(&small_params());
        let mut seen = std::collections::HashSet::new();
        for set in store.primary_sets() {
            assert!(seen.insert(set.tag));
        }
        for set in store.backup_sets() {
            assert!(seen.insert(set.tag));
        }
    }

    #[test]
    fn test_replacements_consume_in_order() {
        let params = small_params();
        let mut store = HintStore::new(&params);
        let m2 = params.backup_set_num_per_chunk as usize;
        for slot in 0..m2 {
            store.set_replacement(0, slot, slot as u64, DbEntry::zero(8));
        }
        for slot in 0..m2 {
            let (index, _) = store.take_replacement(0).unwrap();
            assert_eq!(index, slot as u64);
            assert_eq!(store.replacement_consumed(0), slot + 1);
        }
        assert!(store.take_replacement(0).is_none());
        assert_eq!(store.replacement_consumed(0), m2);
    }

    #[test]
    fn test_backups_consume_in_group_order() {
        let params = small_params();
        let mut store = HintStore::new(&params);
        let m1 = params.primary_set_num as u32;
        let m2 = params.backup_set_num_per_chunk as u32;

        // Group 1's first backup carries the tag just past group 0's slice.
        let (tag, _) = store.take_backup(1).unwrap();
        assert_eq!(tag, m1 + m2);
        let (tag, _) = store.take_backup(1).unwrap();
        assert_eq!(tag, m1 + m2 + 1);
        assert_eq!(store.backup_consumed(1), 2);
        assert_eq!(store.backup_consumed(0), 0);
    }

    #[test]
    fn test_backup_exhaustion() {
        let params = small_params();
        let mut store = HintStore::new(&params);
        let m2 = params.backup_set_num_per_chunk as usize;
        for _ in 0..m2 {
            assert!(store.take_backup(3).is_some());
        }
        assert!(store.take_backup(3).is_none());
        assert_eq!(store.backup_consumed(3), m2);
    }

    #[test]
    fn test_cache_is_insert_once() {
        let mut store = HintStore::new(&small_params());
        store.insert_cache(42, DbEntry::from_slice(&[1; 8]));
        store.insert_cache(42, DbEntry::from_slice(&[2; 8]));
        assert_eq!(store.cached(42).unwrap().as_bytes(), &[1; 8]);
    }

    #[test]
    fn test_refresh_primary_rotates_identity() {
        let mut store = HintStore::new(&small_params());
        let old_tag = store.primary_sets()[0].tag;
        store.refresh_primary(0, 999, DbEntry::from_slice(&[7; 8]), 123);
        let set = &store.primary_sets()[0];
        assert_ne!(set.tag, old_tag);
        assert_eq!(set.tag, 999);
        assert!(set.is_programmed);
        assert_eq!(set.programmed_point, 123);
        assert_eq!(set.parity.as_bytes(), &[7; 8]);
    }
}
