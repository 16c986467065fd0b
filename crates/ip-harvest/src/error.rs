use std::io;
use std::path::PathBuf;

/// Error types for chunked extraction.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configured chunk size cannot hold a full dotted-quad token.
    #[error("chunk size {chunk_size} is smaller than the minimum of {minimum} bytes")]
    ChunkTooSmall { chunk_size: usize, minimum: usize },

    /// The input path is missing, is not a regular file, or is empty.
    #[error("input unavailable: {path}: {reason}")]
    InputUnavailable { path: PathBuf, reason: String },

    /// The input stream produced no bytes at all.
    #[error("input stream is empty")]
    EmptyInput,

    /// Reading the stream failed part way through.
    #[error("read failed at byte offset {offset}")]
    Read {
        offset: u64,
        #[source]
        source: io::Error,
    },

    /// A chunk worker panicked; the whole extraction is discarded.
    #[error("chunk worker panicked")]
    WorkerPanicked,

    /// The dotted-quad pattern failed to parse.
    #[error("pattern error: {0}")]
    Syntax(#[from] Box<regex_syntax::Error>),

    /// The dotted-quad pattern failed to compile.
    #[error("regex error: {0}")]
    Regex(#[from] regex_automata::meta::BuildError),

    /// The worker pool could not be started.
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Convenience type alias for Results using the extraction error.
pub type Result<T> = std::result::Result<T, Error>;
