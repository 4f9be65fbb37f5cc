//! Error taxonomy for the server
//!
//! Components below the session engine surface typed failures upward and
//! never write to the transport themselves; only the engine turns failures
//! into user-visible frames.

use thiserror::Error;

/// Failures raised by the graph store and the components built on it.
///
/// A [`GraphError::Database`] during submission validation or endpoint
/// selection is transient infrastructure trouble: the engine logs it and
/// treats the offending operation as a no-op. [`GraphError::SnapshotUnavailable`]
/// signals a lost adjacency cache, which is fatal for the session.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("connection graph snapshot is unavailable")]
    SnapshotUnavailable,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Handshake authentication failures. Rejected connections never reach
/// the matchmaker or the session engine.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid bearer token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

/// Top-level server failures (startup and accept loop).
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
