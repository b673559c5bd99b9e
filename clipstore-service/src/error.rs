//! Error types for the storage service.

use thiserror::Error;

/// Errors that can occur in the storage service.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested record, object or chunk does not exist.
    #[error("not found")]
    NotFound,

    /// Malformed identifiers, missing required fields or unparsable structured values.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A chunk was written with a sequence number other than the next expected one.
    #[error("out of order chunk: expected sequence {expected}, got {actual}")]
    OutOfOrderChunk {
        /// The sequence number the store expected next.
        expected: u64,
        /// The sequence number that was written.
        actual: u64,
    },

    /// The upload was never started, or has already been completed or aborted.
    #[error("unknown upload")]
    UnknownObject,

    /// The upload finished without writing a single byte.
    #[error("empty upload")]
    EmptyUpload,

    /// The upload exceeded the configured maximum object size.
    #[error("upload exceeds the limit of {limit} bytes")]
    UploadTooLarge {
        /// The configured limit in bytes.
        limit: u64,
    },

    /// A byte range lies outside of the stored object.
    #[error("range not satisfiable for object of {total_length} bytes")]
    RangeNotSatisfiable {
        /// The total length of the object the range was resolved against.
        total_length: u64,
    },

    /// Concurrent writers kept invalidating an optimistic update.
    ///
    /// This is a transient condition and the operation can be retried.
    #[error("too much contention updating {0}")]
    Contention(String),

    /// The underlying storage engine failed or could not be reached.
    #[error("storage unavailable: {context}")]
    StorageUnavailable {
        /// What the service was doing when the failure happened.
        context: String,
        /// The underlying failure.
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },

    /// I/O errors from payload streams supplied by the caller.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors related to de/serialization of stored documents.
    #[error("serde error: {context}")]
    Serde {
        /// The document that failed to (de)serialize.
        context: String,
        /// The underlying serde error.
        #[source]
        cause: serde_json::Error,
    },
}

impl Error {
    /// Wraps a storage engine failure together with a description of the failed operation.
    pub fn storage<E>(context: impl Into<String>, cause: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::StorageUnavailable {
            context: context.into(),
            cause: cause.into(),
        }
    }

    /// Returns `true` if the operation may succeed when retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable { .. } | Self::Contention(_) | Self::Io(_)
        )
    }
}

/// Result type for service operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
