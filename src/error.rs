use thiserror::Error;

/// Error kinds at the core boundary. See SPEC_FULL.md §7.
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("transient send failure: {0}")]
    TransientSend(String),

    #[error("no route to destination")]
    NoRoute,

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("cache miss for unknown file id")]
    CacheMiss,

    /// Never constructed as an `Err` — a duplicate chunk is silently ignored,
    /// this variant exists so callers and logs can name the condition.
    #[error("duplicate chunk ignored")]
    DuplicateChunk,

    #[error("invalid chunk index {index} (total {total})")]
    InvalidChunkIndex { index: u32, total: u32 },

    #[error("filesystem error: {0}")]
    Fs(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
