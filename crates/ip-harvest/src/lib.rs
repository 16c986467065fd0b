//! Chunked, parallel IPv4 extraction and classification.
//!
//! `ip-harvest` finds every dotted-quad IPv4 literal in an arbitrarily large byte
//! stream, sorts each one into a private or public set, and returns both sets
//! deduplicated and sorted. The stream is read in bounded chunks which are
//! processed on a worker pool:
//!
//! - **Bounded memory**: at most `workers` chunks are in flight at once.
//! - **Boundary safe**: windows overlap by [`OVERLAP`] bytes and matches touching
//!   an inner window edge are deferred, so the result does not depend on the
//!   chunk size.
//! - **All or nothing**: a read error or worker failure discards the whole
//!   extraction.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ip_harvest::HarvesterBuilder;
//!
//! # fn main() -> Result<(), ip_harvest::Error> {
//! let harvester = HarvesterBuilder::new().chunk_size(64 * 1024).build()?;
//!
//! let harvest = harvester.harvest_path("/var/log/nginx/access.log")?;
//! for ip in harvest.private() {
//!     println!("private: {}", ip);
//! }
//! for ip in harvest.public() {
//!     println!("public: {}", ip);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Classification
//!
//! An address is private when it falls inside 10.0.0.0/8, 172.16.0.0/12 or
//! 192.168.0.0/16, and public otherwise. Unspecified (`0.0.0.0`), reserved
//! (`240.0.0.0/4`) and multicast (`224.0.0.0/4`) addresses are dropped, as are
//! octets with leading zeros.

use std::fs::File;
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::debug;

mod chunk;
mod classify;
mod error;
mod matcher;
mod process;

pub use chunk::{Chunk, ChunkReader, MIN_CHUNK_SIZE, OVERLAP};
pub use classify::{
    parse_dotted_quad, AddressClass, AddressClassifier, CidrParseError, Ipv4Cidr, RFC1918,
};
pub use error::{Error, Result};
pub use matcher::{Edges, PatternMatcher, MAX_TOKEN_LEN};
pub use process::{ChunkProcessor, Harvest, Partition, SortOrder};

/// Default chunk size: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Extracts and classifies the IPv4 addresses of a whole stream.
///
/// A `Harvester` owns its worker pool and is meant to be built once and reused
/// for every run.
#[derive(Clone)]
pub struct Harvester {
    processor: Arc<ChunkProcessor>,
    pool: Arc<ThreadPool>,
    chunk_size: usize,
    sort_order: SortOrder,
}

impl Harvester {
    /// Chunk body size in bytes.
    #[inline]
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of worker threads, which is also the in-flight chunk cap.
    #[inline]
    #[must_use]
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// The classifier applied to every candidate.
    #[inline]
    #[must_use]
    pub fn classifier(&self) -> &AddressClassifier {
        self.processor.classifier()
    }

    /// Harvest a file.
    ///
    /// # Errors
    ///
    /// [`Error::InputUnavailable`] if the path is missing, not a regular file,
    /// or empty; otherwise the errors of [`Harvester::harvest`].
    pub fn harvest_path<P: AsRef<Path>>(&self, path: P) -> Result<Harvest> {
        let path = path.as_ref();
        let unavailable = |reason: String| Error::InputUnavailable {
            path: path.to_path_buf(),
            reason,
        };

        let meta = std::fs::metadata(path).map_err(|e| unavailable(e.to_string()))?;
        if !meta.is_file() {
            return Err(unavailable("not a regular file".to_string()));
        }
        if meta.len() == 0 {
            return Err(unavailable("file is empty".to_string()));
        }
        let file = File::open(path).map_err(|e| unavailable(e.to_string()))?;
        self.harvest(file)
    }

    /// Harvest an in-memory buffer.
    ///
    /// An empty buffer yields an empty harvest rather than an error.
    #[must_use]
    pub fn harvest_bytes(&self, data: &[u8]) -> Harvest {
        match self.harvest(data) {
            Ok(harvest) => harvest,
            // slices never fail to read; only emptiness and panics remain
            Err(_) => Harvest::default(),
        }
    }

    /// Harvest a stream, reading it sequentially in chunks.
    ///
    /// Chunks are dispatched in batches of at most [`Harvester::workers`] and
    /// each batch is joined before the next is read.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyInput`] if the stream yields no bytes.
    /// - [`Error::Read`] if reading fails part way; nothing is returned.
    /// - [`Error::WorkerPanicked`] if a chunk worker panics.
    pub fn harvest<R: Read>(&self, reader: R) -> Result<Harvest> {
        let mut chunks = ChunkReader::new(reader, self.chunk_size)?;
        let in_flight = self.workers().max(1);
        let mut merged = Partition::default();
        let mut chunk_count = 0usize;

        loop {
            let mut batch = Vec::with_capacity(in_flight);
            while batch.len() < in_flight {
                match chunks.next_chunk()? {
                    Some(chunk) => batch.push(chunk),
                    None => break,
                }
            }
            if batch.is_empty() {
                break;
            }
            chunk_count += batch.len();

            for partial in self.process_batch(batch)? {
                merged.merge(partial);
            }
        }

        if chunks.bytes_read() == 0 {
            return Err(Error::EmptyInput);
        }

        let harvest = merged.finish(self.sort_order);
        debug!(
            bytes = chunks.bytes_read(),
            chunks = chunk_count,
            private = harvest.private().len(),
            public = harvest.public().len(),
            "harvest complete"
        );
        Ok(harvest)
    }

    fn process_batch(&self, batch: Vec<Chunk>) -> Result<Vec<Partition>> {
        let processor = &self.processor;
        panic::catch_unwind(AssertUnwindSafe(|| {
            self.pool.install(|| {
                batch
                    .par_iter()
                    .map(|chunk| processor.process(chunk))
                    .collect()
            })
        }))
        .map_err(|_| Error::WorkerPanicked)
    }
}

impl std::fmt::Debug for Harvester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harvester")
            .field("chunk_size", &self.chunk_size)
            .field("workers", &self.workers())
            .field("sort_order", &self.sort_order)
            .field("private_ranges", &self.classifier().private_ranges())
            .finish()
    }
}

/// A builder for configuring a [`Harvester`].
///
/// # Example
///
/// ```no_run
/// use ip_harvest::{HarvesterBuilder, SortOrder};
///
/// # fn main() -> Result<(), ip_harvest::Error> {
/// let harvester = HarvesterBuilder::new()
///     .chunk_size(256 * 1024)
///     .workers(4)
///     .sort_order(SortOrder::Numeric)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct HarvesterBuilder {
    chunk_size: usize,
    workers: usize,
    sort_order: SortOrder,
    private_ranges: Vec<Ipv4Cidr>,
}

impl Default for HarvesterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HarvesterBuilder {
    /// Create a new builder with default settings.
    ///
    /// Defaults:
    /// - chunk size: 1 MiB
    /// - workers: one per available CPU
    /// - sort order: lexicographic
    /// - private ranges: [`RFC1918`]
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: 0,
            sort_order: SortOrder::default(),
            private_ranges: RFC1918.to_vec(),
        }
    }

    /// Chunk body size in bytes. Must be at least [`MIN_CHUNK_SIZE`].
    pub fn chunk_size(&mut self, bytes: usize) -> &mut Self {
        self.chunk_size = bytes;
        self
    }

    /// Worker thread count. `0` picks one per available CPU.
    pub fn workers(&mut self, workers: usize) -> &mut Self {
        self.workers = workers;
        self
    }

    /// Ordering of the final address lists.
    pub fn sort_order(&mut self, order: SortOrder) -> &mut Self {
        self.sort_order = order;
        self
    }

    /// Replace the private address space.
    pub fn private_ranges(&mut self, ranges: Vec<Ipv4Cidr>) -> &mut Self {
        self.private_ranges = ranges;
        self
    }

    /// Build the harvester, compiling the pattern and starting the worker pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChunkTooSmall`] for a chunk size below
    /// [`MIN_CHUNK_SIZE`], or an error if the pool cannot be started.
    pub fn build(&self) -> Result<Harvester> {
        if self.chunk_size < MIN_CHUNK_SIZE {
            return Err(Error::ChunkTooSmall {
                chunk_size: self.chunk_size,
                minimum: MIN_CHUNK_SIZE,
            });
        }

        let workers = if self.workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.workers
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("ip-harvest-{i}"))
            .build()?;

        let processor = ChunkProcessor::new(
            PatternMatcher::new()?,
            AddressClassifier::new(self.private_ranges.clone()),
        );

        Ok(Harvester {
            processor: Arc::new(processor),
            pool: Arc::new(pool),
            chunk_size: self.chunk_size,
            sort_order: self.sort_order,
        })
    }
}
