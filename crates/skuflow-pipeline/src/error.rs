//! Stage error taxonomy.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal failures a pipeline stage can surface. Field-level coercion damage
/// is not an error (it degrades to null in the cleaned record); everything
/// here aborts the stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// The upstream artifact is missing. User-actionable: run the named
    /// subcommand first.
    #[error("no {expected} artifact found in {}; run `skuflow {remedy}` first", dir.display())]
    InputNotFound {
        expected: &'static str,
        dir: PathBuf,
        remedy: &'static str,
    },

    /// The fetch request failed or returned a non-success status.
    #[error("network fetch failed: {0}")]
    Network(#[from] skuflow_storage::FetchError),

    /// A required environment variable is unset.
    #[error("missing required environment variable {var}")]
    Configuration { var: &'static str },

    /// Malformed JSON input.
    #[error("malformed JSON input: {0}")]
    Parse(#[from] serde_json::Error),

    /// The cleaned artifact holds a record without a primary key. The loader
    /// rejects the batch up front instead of letting the database reject a
    /// NULL id mid-transaction.
    #[error("record {row} has no product_id; refusing to load a batch with a null primary key")]
    MissingProductId { row: usize },

    #[error("database operation failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StageError {
    /// Whether the orchestrator may retry the step. Missing inputs, missing
    /// credentials, and malformed data need operator action, not a rerun.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StageError::Network(_) | StageError::Database(_))
    }
}

pub type Result<T, E = StageError> = std::result::Result<T, E>;
