/// Errors internal to the storage layer.
///
/// The public [`crate::store::AlertStore`] surface deliberately does not
/// expose these: query methods log the error and return empty results, and
/// mutation methods return `false`. The enum exists so the internal
/// implementation can use `?` over heterogeneous failure sources.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// An underlying SQLite error.
    #[error("Storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Metadata column serialization failure.
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;
