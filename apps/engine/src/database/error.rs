use thiserror::Error;

/// Failure talking to the check store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database query failed: {0}")]
    QueryFailure(#[from] libsql::Error),

    #[error("Could not get a database connection: {0}")]
    Pool(#[from] deadpool::managed::PoolError<libsql::Error>),

    #[error("Record not found")]
    NotFound,

    #[error("Malformed row in {table}: {reason}")]
    Malformed { table: &'static str, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn malformed(table: &'static str, reason: impl std::fmt::Display) -> Self {
        StoreError::Malformed { table, reason: reason.to_string() }
    }
}
