//! Offline hint accumulation.

use crate::entry::DbEntry;
use crate::hints::HintStore;
use crate::messages::ClientError;
use crate::params::Params;
use crate::prf::Prf;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;

/// Per-chunk hint builder backed by a pool of exactly `thread_num` workers.
///
/// Primary and backup sets are partitioned into contiguous per-worker
/// ranges, so each parity accumulator has a single writer per chunk. Workers
/// record chunk-offset hits in local masks that the driver merges after the
/// join, then the driver records local misses and samples replacements.
/// The resulting hint state is identical for any worker count.
pub struct Preprocessor {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl Preprocessor {
    pub fn new(thread_num: u64) -> Result<Self, ClientError> {
        let workers = thread_num as usize;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| ClientError::ThreadPool(e.to_string()))?;
        Ok(Self { pool, workers })
    }

    /// Fold one received chunk into every hint. Chunks must be processed in
    /// receive order, `0..set_size`.
    pub fn process_chunk(
        &self,
        params: &Params,
        prf: &Prf,
        hints: &mut HintStore,
        chunk_id: u64,
        db_chunk: &[u8],
    ) {
        debug_assert_eq!(db_chunk.len(), params.chunk_bytes());
        let entry_size = params.entry_size;
        let chunk_size = params.chunk_size;
        let m2 = params.backup_set_num_per_chunk as usize;

        let (primary_sets, backup_sets) = hints.sets_mut();
        let primary_per_worker = primary_sets.len().div_ceil(self.workers);
        let backup_per_worker = backup_sets.len().div_ceil(self.workers).max(1);

        let hit_masks: Vec<Vec<bool>> = self.pool.install(|| {
            primary_sets
                .par_chunks_mut(primary_per_worker)
                .map(|sets| {
                    let mut hits = vec![false; chunk_size as usize];
                    for set in sets {
                        let offset = prf.offset(set.tag, chunk_id, chunk_size) as usize;
                        hits[offset] = true;
                        set.parity
                            .xor_raw(&db_chunk[offset * entry_size..(offset + 1) * entry_size]);
                    }
                    hits
                })
                .collect()
        });

        if !backup_sets.is_empty() {
            self.pool.install(|| {
                backup_sets
                    .par_chunks_mut(backup_per_worker)
                    .enumerate()
                    .for_each(|(worker, sets)| {
                        let base = worker * backup_per_worker;
                        for (k, set) in sets.iter_mut().enumerate() {
                            // A backup set never accumulates its own group's chunk.
                            if ((base + k) / m2) as u64 == chunk_id {
                                continue;
                            }
                            let offset = prf.offset(set.tag, chunk_id, chunk_size) as usize;
                            set.parity_after_puncture
                                .xor_raw(&db_chunk[offset * entry_size..(offset + 1) * entry_size]);
                        }
                    });
            });
        }

        // Entries no primary set selected must be kept locally; a query for
        // them cannot be answered from any hint.
        for offset in 0..chunk_size as usize {
            if hit_masks.iter().any(|mask| mask[offset]) {
                continue;
            }
            let index = chunk_id * chunk_size + offset as u64;
            if index >= params.entry_num {
                continue;
            }
            let entry =
                DbEntry::from_slice(&db_chunk[offset * entry_size..(offset + 1) * entry_size]);
            hints.record_local_miss(index, entry);
        }

        let mut prg = ChaCha20Rng::from_entropy();
        for slot in 0..m2 {
            let offset = (prg.next_u64() & (chunk_size - 1)) as usize;
            let index = chunk_id * chunk_size + offset as u64;
            let value =
                DbEntry::from_slice(&db_chunk[offset * entry_size..(offset + 1) * entry_size]);
            hints.set_replacement(chunk_id, slot, index, value);
        }
    }
}
