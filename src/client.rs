//! Piano query client: preprocessing driver and online query engine.

use crate::entry::DbEntry;
use crate::hints::HintStore;
use crate::messages::{ClientError, SetParityQuery, FETCH_FULL_DB};
use crate::params::Params;
use crate::preprocess::Preprocessor;
use crate::prf::Prf;
use crate::transport::Transport;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// One client session over a transport.
///
/// Lifecycle: construct, call [`fetch_full_db`](Self::fetch_full_db) exactly
/// once, then issue queries. Hints are session-scoped; a new session starts
/// from a fresh client.
///
/// Every call to [`query`](Self::query) performs exactly one parity exchange
/// with the server, regardless of whether the answer came from the cache,
/// the local-miss table, a hint, or a failure path.
pub struct QueryClient<T: Transport> {
    params: Params,
    prf: Prf,
    hints: HintStore,
    transport: T,
}

impl<T: Transport> QueryClient<T> {
    /// New session under a fresh random master key.
    pub fn new(params: Params, transport: T) -> Self {
        Self::with_prf(params, Prf::random(), transport)
    }

    pub fn with_prf(params: Params, prf: Prf, transport: T) -> Self {
        let hints = HintStore::new(&params);
        Self { params, prf, hints, transport }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn hints(&self) -> &HintStore {
        &self.hints
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Stream the full database and build every hint.
    ///
    /// Sends one fetch request and consumes `set_size` chunk frames in
    /// order. Any transport failure leaves the hint state unusable; the
    /// session must be discarded.
    pub fn fetch_full_db(&mut self) -> Result<(), ClientError> {
        self.transport.send_raw(&[FETCH_FULL_DB])?;
        let preprocessor = Preprocessor::new(self.params.thread_num)?;
        for chunk_id in 0..self.params.set_size {
            let db_chunk = self.transport.recv_raw()?;
            if db_chunk.len() != self.params.chunk_bytes() {
                return Err(ClientError::ChunkSizeMismatch);
            }
            preprocessor.process_chunk(
                &self.params,
                &self.prf,
                &mut self.hints,
                chunk_id,
                &db_chunk,
            );
        }
        Ok(())
    }

    /// Retrieve the entry at `x` without revealing `x` to the server.
    ///
    /// Soft failures (no covering hint, exhausted replacements) return a
    /// zero entry after a dummy exchange and are logged; only transport
    /// faults and an out-of-range index are `Err`.
    pub fn query(&mut self, x: u64) -> Result<DbEntry, ClientError> {
        if x >= self.params.entry_num {
            return Err(ClientError::InvalidIndex);
        }

        if let Some(value) = self.hints.cached(x) {
            let value = value.clone();
            self.send_dummy_set()?;
            return Ok(value);
        }

        let chunk_id = self.params.chunk_of(x);
        let query_offset = self.params.offset_of(x);

        let Some(hit) = self.find_hit_set(chunk_id, query_offset) else {
            let value = match self.hints.local_miss(x) {
                Some(entry) => {
                    let value = entry.clone();
                    self.hints.insert_cache(x, value.clone());
                    value
                }
                None => {
                    log::error!("no hit set found for {}", x);
                    DbEntry::zero(self.params.entry_size)
                }
            };
            self.send_dummy_set()?;
            return Ok(value);
        };

        let set = &self.hints.primary_sets()[hit];
        let mut expanded = self
            .prf
            .expand(set.tag, self.params.set_size, self.params.chunk_size);
        // A programmed set differs from its expansion at exactly one chunk.
        if set.is_programmed {
            let programmed_chunk = set.programmed_point / self.params.chunk_size;
            expanded[programmed_chunk as usize] = set.programmed_point;
        }
        let hit_parity = set.parity.clone();

        // Puncture: the server must not see the element the hint holds at
        // the queried chunk.
        let Some((replace_index, replace_value)) = self.hints.take_replacement(chunk_id) else {
            log::error!("no replacement available for {}", x);
            self.send_dummy_set()?;
            return Ok(DbEntry::zero(self.params.entry_size));
        };
        expanded[chunk_id as usize] = replace_index;

        self.transport.send(&SetParityQuery { indices: expanded })?;
        let server_parity = self.transport.recv_raw()?;
        if server_parity.len() != self.params.entry_size {
            return Err(ClientError::ParityLengthMismatch);
        }

        let mut value = hit_parity;
        value.xor_raw(&server_parity);
        value.xor(&replace_value);
        self.hints.insert_cache(x, value.clone());

        // Refresh: rotate the consumed primary onto a backup from this
        // chunk's group. The backup's parity omits its own chunk, which is
        // exactly the recovered value once programmed at x.
        match self.hints.take_backup(chunk_id) {
            Some((backup_tag, backup_parity)) => {
                let mut new_parity = value.clone();
                new_parity.xor(&backup_parity);
                self.hints.refresh_primary(hit, backup_tag, new_parity, x);
            }
            None => log::warn!("no backup set available for {}", x),
        }

        Ok(value)
    }

    /// Run queries sequentially in the given order. No batching on the wire.
    pub fn queries(&mut self, indices: &[u64]) -> Result<Vec<DbEntry>, ClientError> {
        indices.iter().map(|&x| self.query(x)).collect()
    }

    /// First primary set covering (chunk, offset) that is not programmed at
    /// that chunk.
    fn find_hit_set(&self, chunk_id: u64, query_offset: u64) -> Option<usize> {
        self.hints.primary_sets().iter().position(|set| {
            let programmed_match =
                set.is_programmed && set.programmed_point / self.params.chunk_size == chunk_id;
            !programmed_match
                && self
                    .prf
                    .member_test(set.tag, chunk_id, query_offset, self.params.chunk_size)
        })
    }

    /// Cover traffic: one exchange carrying an independently sampled uniform
    /// set, freshly seeded per call. The response is discarded.
    fn send_dummy_set(&mut self) -> Result<(), ClientError> {
        let mut prg = ChaCha20Rng::from_entropy();
        let indices: Vec<u64> = (0..self.params.set_size)
            .map(|i| (prg.next_u64() & (self.params.chunk_size - 1)) + i * self.params.chunk_size)
            .collect();
        self.transport.send(&SetParityQuery { indices })?;
        let _ = self.transport.recv_raw()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{InMemoryDb, LocalSession, Server};

    fn test_db(entry_num: u64, entry_size: usize) -> Vec<u8> {
        let mut db = vec![0u8; entry_num as usize * entry_size];
        for i in 0..entry_num {
            let start = i as usize * entry_size;
            db[start..start + 8.min(entry_size)]
                .copy_from_slice(&i.to_le_bytes()[..8.min(entry_size)]);
        }
        db
    }

    fn ready_client(
        entry_num: u64,
        entry_size: usize,
    ) -> QueryClient<LocalSession<InMemoryDb>> {
        let params = Params::new(entry_num, entry_size, 1);
        let db = InMemoryDb::new(test_db(entry_num, entry_size), entry_size).unwrap();
        let server = Server::new(db, params.chunk_size).unwrap();
        let mut client = QueryClient::new(params, LocalSession::new(server));
        client.fetch_full_db().unwrap();
        client
    }

    #[test]
    fn test_fetch_streams_all_chunks() {
        let client = ready_client(256, 8);
        assert_eq!(client.transport().fetch_requests, 1);
        assert_eq!(client.transport().chunks_sent, client.params().set_size);
        assert_eq!(client.transport().parity_queries, 0);
    }

    #[test]
    fn test_query_returns_db_entry() {
        let mut client = ready_client(256, 8);
        for x in [0u64, 17, 255] {
            let got = client.query(x).unwrap();
            assert_eq!(got.as_bytes(), &x.to_le_bytes());
        }
    }

    #[test]
    fn test_query_rejects_out_of_range() {
        let mut client = ready_client(256, 8);
        assert!(matches!(client.query(256), Err(ClientError::InvalidIndex)));
    }

    #[test]
    fn test_cache_hit_sends_dummy() {
        let mut client = ready_client(256, 8);
        let first = client.query(9).unwrap();
        let before = client.transport().parity_queries;
        let consumed: usize = (0..client.params().set_size)
            .map(|g| client.hints().replacement_consumed(g))
            .sum();
        let again = client.query(9).unwrap();
        assert_eq!(first, again);
        assert_eq!(client.transport().parity_queries, before + 1);
        let consumed_after: usize = (0..client.params().set_size)
            .map(|g| client.hints().replacement_consumed(g))
            .sum();
        assert_eq!(consumed, consumed_after);
    }

    #[test]
    fn test_successful_query_programs_a_primary() {
        let mut client = ready_client(256, 8);
        // Pick an index served by a hint rather than the local-miss table.
        let x = (0..256u64)
            .find(|x| client.hints().local_miss(*x).is_none())
            .unwrap();
        assert!(client.query(x).is_ok());
        let chunk = client.params().chunk_of(x);
        assert_eq!(client.hints().replacement_consumed(chunk), 1);
        assert_eq!(client.hints().backup_consumed(chunk), 1);
        let programmed = client
            .hints()
            .primary_sets()
            .iter()
            .find(|set| set.is_programmed)
            .unwrap();
        assert_eq!(programmed.programmed_point, x);
    }
}
