use thiserror::Error;

/// Errors produced by the schema engine.
#[derive(Debug, Error)]
pub enum PgError {
    /// The database could not be reached at all.
    #[error("failed to connect to database: {0}")]
    Connection(#[source] sqlx::Error),

    /// An introspection query failed. The whole extraction is abandoned;
    /// no partial snapshot is ever returned.
    #[error("schema extraction failed while reading {category}: {source}")]
    Extraction {
        category: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// A single migration's SQL (or its ledger insert) failed. The
    /// migration's transaction has already been rolled back.
    #[error("migration \"{name}\" failed: {source}")]
    Apply {
        name: String,
        #[source]
        source: sqlx::Error,
    },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}
