/// Errors produced by the storage layer.
///
/// The store traits return `anyhow::Result` at their boundaries; this enum
/// is the concrete error the SQLite engine produces underneath, so callers
/// that care can downcast.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A required record was not found.
    #[error("storage: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    /// An underlying SQLite error.
    #[error("storage: sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failure for a JSON column.
    #[error("storage: json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored column held a value outside the expected domain.
    #[error("storage: invalid value in column '{column}': {detail}")]
    InvalidColumn {
        column: &'static str,
        detail: String,
    },
}

pub type Result<T> = std::result::Result<T, StorageError>;
