use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("query exceeded its deadline")]
    DeadlineExceeded,

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// Normalise SQLite's interrupt into [`StoreError::DeadlineExceeded`].
    ///
    /// The progress handler installed by [`crate::analytics`] aborts a
    /// statement with `SQLITE_INTERRUPT` once its deadline passes.
    pub(crate) fn from_query(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::OperationInterrupted) => StoreError::DeadlineExceeded,
            _ => StoreError::Sqlite(err),
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, StoreError::Open { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, StoreError::DeadlineExceeded)
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
