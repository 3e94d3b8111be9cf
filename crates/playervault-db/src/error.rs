//! Error types for the store layer.
//!
//! [`PoolError`] covers connection acquisition; [`StoreError`] covers
//! everything a store operation can fail with, wrapping the underlying
//! [`sqlx`] error with the context the persistence engine acts on. The
//! one variant with behavior attached is [`StoreError::TooWide`], which
//! drives the self-healing column widening path.

/// Errors from connection pool acquisition.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The hard acquisition deadline passed with no connection available.
    #[error("timed out acquiring a store connection")]
    Timeout,

    /// The pool has been shut down.
    #[error("the connection pool is closed")]
    Closed,
}

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Could not get a connection from the pool.
    #[error("connection pool error: {0}")]
    Pool(#[from] PoolError),

    /// The backing store rejected or dropped the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A value exceeded its column's width limit.
    ///
    /// The engine reacts by widening the named column once and letting
    /// the caller's next attempt succeed.
    #[error("value too wide for column `{column}`")]
    TooWide {
        /// Name of the offending column.
        column: String,
    },

    /// An unrecognized column name was passed to a schema operation.
    #[error("unknown column `{column}`")]
    UnknownColumn {
        /// The rejected column name.
        column: String,
    },

    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Sql(#[from] sqlx::Error),
}
