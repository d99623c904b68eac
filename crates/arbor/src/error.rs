//! Error types for store operations.
//!
//! Mutation paths (`dispatch`, `update_path`, `transaction`) never return
//! these to the caller; they are routed to the store's error handler. Selector
//! evaluation and async thunks surface them directly.

use crate::Path;
use thiserror::Error;

/// Error type produced by user code (thunks, middleware, mutators, combiners).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Malformed initial state.
#[derive(Debug, Error)]
pub enum StateError {
    /// The root of a store must be an object.
    #[error("initial state must be an object, found {found}")]
    RootNotObject {
        /// Type of the value that was supplied.
        found: &'static str,
    },

    /// The tree nests deeper than the configured limit.
    #[error("initial state nests {depth} levels deep, limit is {limit}")]
    DepthExceeded {
        /// Depth of the supplied tree.
        depth: usize,
        /// Configured limit.
        limit: usize,
    },
}

/// Failure while walking or writing a path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// Path-scoped operations need at least one segment.
    #[error("path must not be empty")]
    EmptyPath,

    /// An intermediate value cannot hold children.
    #[error("cannot traverse {found} at {path}")]
    NotTraversable {
        /// Path of the offending intermediate value.
        path: Path,
        /// Type of the value found there.
        found: &'static str,
    },

    /// The container exists but has the wrong kind for the operation.
    #[error("type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Path where the mismatch occurred.
        path: Path,
        /// The expected type.
        expected: &'static str,
        /// The actual type found.
        found: &'static str,
    },

    /// Array index is out of bounds.
    #[error("index {index} out of bounds (len: {len}) at path {path}")]
    IndexOutOfBounds {
        /// The path to the array.
        path: Path,
        /// The index that was accessed.
        index: usize,
        /// The actual length of the array.
        len: usize,
    },

    /// Numeric operation on a missing or non-numeric value.
    #[error("numeric operation requires number at {path}")]
    NotANumber {
        /// Path of the value.
        path: Path,
    },
}

impl PathError {
    #[inline]
    pub(crate) fn not_traversable(path: Path, found: &'static str) -> Self {
        PathError::NotTraversable { path, found }
    }

    #[inline]
    pub(crate) fn type_mismatch(path: Path, expected: &'static str, found: &'static str) -> Self {
        PathError::TypeMismatch {
            path,
            expected,
            found,
        }
    }

    #[inline]
    pub(crate) fn index_out_of_bounds(path: Path, index: usize, len: usize) -> Self {
        PathError::IndexOutOfBounds { path, index, len }
    }
}

/// Failure while evaluating a selector.
#[derive(Debug, Error)]
pub enum SelectorError {
    /// The combiner (or an input function) returned an error.
    #[error("selector {id} failed: {source}")]
    Compute {
        /// Identifier of the failing selector.
        id: u64,
        /// The error produced by user code.
        #[source]
        source: BoxError,
    },

    /// A selector was used with a store other than the one that created it.
    #[error("selector {id} belongs to a different store")]
    ForeignStore {
        /// Identifier of the selector.
        id: u64,
    },

    /// The owning store has been destroyed or dropped.
    #[error("store backing selector {id} is gone")]
    StoreDestroyed {
        /// Identifier of the selector.
        id: u64,
    },
}

/// A transaction mutator failed; its draft was discarded.
#[derive(Debug, Error)]
#[error("transaction aborted: {source}")]
pub struct TransactionError {
    /// The error returned by the mutator.
    #[source]
    pub source: BoxError,
}

/// Errors reported by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A middleware returned an error.
    #[error("middleware failed: {source}")]
    Middleware {
        /// The middleware's error.
        #[source]
        source: BoxError,
    },

    /// A thunk body returned an error.
    #[error("thunk failed: {source}")]
    Thunk {
        /// The thunk's error.
        #[source]
        source: BoxError,
    },

    /// A dispatched partial state was not an object.
    #[error("dispatched patch must be an object, found {found}")]
    InvalidPatch {
        /// Type of the dispatched value.
        found: &'static str,
    },

    /// Path traversal failure.
    #[error(transparent)]
    Path(#[from] PathError),

    /// Transaction mutator failure.
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Selector failure observed by the store (e.g. during notification).
    #[error(transparent)]
    Selector(#[from] SelectorError),

    /// The store has been destroyed.
    #[error("store {name} has been destroyed")]
    Destroyed {
        /// Name of the store.
        name: String,
    },
}
