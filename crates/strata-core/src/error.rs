use thiserror::Error;

/// Unified error type for the Strata memory engine.
///
/// "Not found" is never an error: lookups return `Option`, fan-out
/// operations report `bool`. Variants here are either caller errors
/// (`MissingEmbedding`, `DimensionMismatch`, `InvalidRecord`) or genuine
/// failures that must propagate (`Backend`, `Io`, ...).
#[derive(Error, Debug)]
pub enum StrataError {
    // ── Record / vector errors ─────────────────────────────────
    #[error("record {id} has no embedding")]
    MissingEmbedding { id: String },

    #[error("embedding dimension mismatch for {id}: expected {expected}, got {actual}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    // ── Collaborator errors ────────────────────────────────────
    #[error("embedding provider error: {0}")]
    Embedding(String),

    // ── Index errors ───────────────────────────────────────────
    #[error("index backend error: {0}")]
    Backend(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl StrataError {
    /// Whether this error means the record was not prepared properly by the caller.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            StrataError::MissingEmbedding { .. }
                | StrataError::DimensionMismatch { .. }
                | StrataError::InvalidRecord(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StrataError>;
