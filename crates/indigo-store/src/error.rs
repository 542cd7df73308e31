//! Error types for the indigo-store crate.
//!
//! All storage operations return [`StoreError`] via [`StoreResult`].
//! Callers branch on the variant (or on [`StoreError::is_not_found`] /
//! [`StoreError::is_cancelled`]) rather than on message text, and the
//! variant is the same whichever backend produced it.

use std::path::PathBuf;

use thiserror::Error;

use crate::context::ContextError;
use crate::query::QueryError;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the storage engine.
#[derive(Debug, Error)]
pub enum StoreError {
    // -- Expected outcomes --------------------------------------------------
    /// Zero documents matched the id or query.
    #[error("nothing in `{collection}` matches {what}")]
    NotFound { collection: String, what: String },

    /// A caller-supplied `_id` is already taken in the collection.
    #[error("document `{id}` already exists in `{collection}`")]
    AlreadyExists { collection: String, id: String },

    /// The backend matched documents but reported that none changed.
    #[error("{op}: nothing changed in `{collection}`")]
    NothingModified {
        op: &'static str,
        collection: String,
    },

    // -- Input errors -------------------------------------------------------
    /// An invalid argument was provided to a store operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A query could not be evaluated or compiled.
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    // -- Cancellation -------------------------------------------------------
    /// The operation's context was cancelled or ran past its deadline.
    #[error("{op}: {source}")]
    Context {
        op: &'static str,
        #[source]
        source: ContextError,
    },

    // -- Backend errors -----------------------------------------------------
    /// A filesystem operation failed.
    #[error("{op}: io error on {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored document could not be encoded or decoded.
    #[error("{op}: json error on {}: {source}", .path.display())]
    Json {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The MongoDB driver reported an error.
    #[cfg(feature = "mongo")]
    #[error("{op}: mongo error: {source}")]
    Mongo {
        op: &'static str,
        #[source]
        source: mongodb::error::Error,
    },

    /// A value could not be converted to or from BSON.
    #[error("bson conversion failed: {0}")]
    Bson(String),

    /// A spawned I/O task panicked.
    #[error("background task failed: {0}")]
    TaskJoin(String),

    /// The storage configuration is missing or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Build a [`StoreError::NotFound`] for `collection`.
    pub fn not_found(collection: impl Into<String>, what: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.into(),
            what: what.into(),
        }
    }

    /// Build a [`StoreError::Io`] tagged with the failing operation.
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Build a [`StoreError::Json`] tagged with the failing operation.
    pub fn json(op: &'static str, path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            op,
            path: path.into(),
            source,
        }
    }

    /// Build a [`StoreError::Mongo`] tagged with the failing operation.
    #[cfg(feature = "mongo")]
    pub fn mongo(op: &'static str, source: mongodb::error::Error) -> Self {
        Self::Mongo { op, source }
    }

    /// `true` when zero documents matched.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// `true` when the operation stopped because its context expired.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Context { .. })
    }

    /// The context failure behind this error, if any.
    pub fn context_error(&self) -> Option<ContextError> {
        match self {
            Self::Context { source, .. } => Some(*source),
            _ => None,
        }
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}
