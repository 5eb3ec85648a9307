use std::{fmt, io};
use thiserror::Error;

/// Unified error type for every colbridge operation.
///
/// The read path distinguishes a small set of failure classes. Callers match on
/// the variant to decide whether a failure is fatal for the query, fatal for a
/// single split, or a programming error that indicates planner/storage desync.
///
/// # Error Handling Strategy
///
/// Errors propagate upward with the `?` operator. The only place a failure is
/// intentionally absorbed is predicate translation: a constraint that cannot be
/// represented exactly in the storage type system is dropped from the pushed
/// predicate and the engine re-applies it. Everything else surfaces.
///
/// # Thread Safety
///
/// `Error` is `Send + Sync`, so split failures can be reported from worker
/// threads to whoever schedules retries.
#[derive(Error, Debug)]
pub enum Error {
    /// The opaque table descriptor carried by a table handle could not be
    /// decoded or does not name a table the resolver knows about.
    ///
    /// Fatal and never retried: the handle itself is unusable.
    #[error("table descriptor is corrupt: {0}")]
    DescriptorCorrupt(String),

    /// A type or value cannot be represented in the target type system.
    ///
    /// Raised by the type mapper. Predicate translation treats it as "drop this
    /// column's constraint"; row decoding treats it as fatal for the batch.
    #[error("type mapping error: {0}")]
    TypeMapping(String),

    /// A requested column does not exist in the table schema.
    ///
    /// This is a programming error class. It means the planner and the storage
    /// schema disagree, and silently skipping the column would produce wrong
    /// results.
    #[error("Cannot find field {column} in schema {available:?}")]
    UnknownColumn {
        column: String,
        available: Vec<String>,
    },

    /// Opening or advancing a split's record reader failed.
    ///
    /// Surfaced to the calling worker as a split failure. Retry policy belongs to
    /// the scheduler; the page source guarantees the reader was released first.
    #[error("split read failed: {0}")]
    ReadIo(String),

    /// I/O error reported by a storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Arrow error while assembling output pages.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Invalid user input or API parameter, e.g. a malformed session property.
    #[error("Invalid argument: {0}")]
    InvalidArgumentError(String),

    /// An operation was attempted in a state that does not allow it, such as
    /// pulling from a page source that already failed.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Internal error indicating a bug or an unexpected state.
    #[error("An internal operation failed: {0}")]
    Internal(String),
}

impl Error {
    /// Create a type mapping error from any displayable error.
    ///
    /// # Examples
    ///
    /// ```
    /// use colbridge_result::Error;
    ///
    /// fn narrow(value: i64) -> Result<i8, Error> {
    ///     i8::try_from(value).map_err(Error::type_mapping)
    /// }
    ///
    /// assert_eq!(narrow(7).unwrap(), 7);
    /// assert!(matches!(narrow(300), Err(Error::TypeMapping(_))));
    /// ```
    #[inline]
    pub fn type_mapping<E: fmt::Display>(err: E) -> Self {
        Error::TypeMapping(err.to_string())
    }

    /// Create a descriptor corruption error from any displayable error.
    #[inline]
    pub fn descriptor_corrupt<E: fmt::Display>(err: E) -> Self {
        Error::DescriptorCorrupt(err.to_string())
    }

    /// Wrap a reader failure as a split read error.
    ///
    /// An error that is already a [`Error::ReadIo`] is returned unchanged so
    /// repeated wrapping does not nest messages.
    #[inline]
    pub fn read_io(err: Error) -> Self {
        match err {
            Error::ReadIo(_) => err,
            other => Error::ReadIo(other.to_string()),
        }
    }

    /// Build an [`Error::UnknownColumn`] listing the columns that do exist.
    pub fn unknown_column<S, I>(column: S, available: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Error::UnknownColumn {
            column: column.into(),
            available: available.into_iter().map(Into::into).collect(),
        }
    }

    /// Return `true` for errors that should be reported as split failures.
    pub fn is_split_failure(&self) -> bool {
        matches!(self, Error::ReadIo(_) | Error::Io(_))
    }
}
