//! Piano parameters.

/// Natural log of the statistical security parameter (kappa = 64).
pub const STATISTICAL_SECURITY_LN: f64 = 4.1588830833596715;

/// Base-2 log of the statistical security parameter (kappa = 64).
pub const STATISTICAL_SECURITY_LOG2: f64 = 6.0;

/// Parameters for one Piano session, fixed at construction.
#[derive(Clone, Debug)]
pub struct Params {
    /// Total number of database entries.
    pub entry_num: u64,
    /// Size of each entry in bytes.
    pub entry_size: usize,
    /// Worker threads used during preprocessing.
    pub thread_num: u64,
    /// Entries per chunk. Always a power of two, so `x % chunk_size` is a mask.
    pub chunk_size: u64,
    /// Number of chunks; also the number of elements in every set.
    pub set_size: u64,
    /// Maximum online queries supported by one preprocessing pass.
    pub query_num: u64,
    /// Number of primary hint sets (query_num rounded up to thread_num).
    pub primary_set_num: u64,
    /// Backup hint sets reserved per chunk.
    pub backup_set_num_per_chunk: u64,
    /// Backup hint sets across all chunks.
    pub total_backup_set_num: u64,
}

impl Params {
    /// Derive session parameters from database shape and worker count.
    ///
    /// `chunk_size` is the smallest power of two at least sqrt(entry_num) and
    /// `set_size = ceil(entry_num / chunk_size)`, so `chunk_size * set_size`
    /// is the smallest chunk-aligned domain covering the database. Hint
    /// counts come from the statistical security constants:
    /// `query_num = ceil(sqrt(n) * ln k * ln ln k)` and
    /// `backup_set_num_per_chunk = ceil(log2 k * ln k * ln ln k)`, each
    /// rounded up to a multiple of `thread_num` so preprocessing ranges
    /// partition evenly.
    pub fn new(entry_num: u64, entry_size: usize, thread_num: u64) -> Self {
        assert!(entry_num > 0, "entry_num must be positive");
        assert!(entry_size > 0, "entry_size must be positive");
        assert!(thread_num > 0, "thread_num must be positive");

        let sqrt_n = (entry_num as f64).sqrt();
        let chunk_size = (sqrt_n.ceil() as u64).next_power_of_two();
        let set_size = entry_num.div_ceil(chunk_size);

        let ln_ln = STATISTICAL_SECURITY_LN.ln();
        let query_num = (sqrt_n * STATISTICAL_SECURITY_LN * ln_ln).ceil() as u64;
        let primary_set_num = query_num.div_ceil(thread_num) * thread_num;

        let backup_set_num_per_chunk =
            (STATISTICAL_SECURITY_LOG2 * STATISTICAL_SECURITY_LN * ln_ln).ceil() as u64;
        let backup_set_num_per_chunk =
            backup_set_num_per_chunk.div_ceil(thread_num) * thread_num;
        let total_backup_set_num = backup_set_num_per_chunk * set_size;

        Self {
            entry_num,
            entry_size,
            thread_num,
            chunk_size,
            set_size,
            query_num,
            primary_set_num,
            backup_set_num_per_chunk,
            total_backup_set_num,
        }
    }

    /// Chunk containing the given entry index.
    pub fn chunk_of(&self, index: u64) -> u64 {
        index / self.chunk_size
    }

    /// Offset of the entry within its chunk.
    pub fn offset_of(&self, index: u64) -> u64 {
        index & (self.chunk_size - 1)
    }

    /// Size of the chunk-aligned index domain, `chunk_size * set_size`.
    /// Indices in `[entry_num, padded_entry_num)` read as zero on the server.
    pub fn padded_entry_num(&self) -> u64 {
        self.chunk_size * self.set_size
    }

    /// Bytes in one streamed chunk.
    pub fn chunk_bytes(&self) -> usize {
        self.chunk_size as usize * self.entry_size
    }
}
