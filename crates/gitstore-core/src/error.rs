use gitstore_types::{ObjectHash, TypeError};

/// Boxed driver error carried by [`StorageError::Unavailable`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors from storage operations.
///
/// The engine never retries internally. Every failure surfaces with a kind
/// precise enough for the caller to decide between retry and abort.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No object with this hash exists for the tenant (under the requested type).
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectHash),

    /// No reference with this name exists for the tenant.
    #[error("reference not found: {0}")]
    ReferenceNotFound(String),

    /// A compare-and-swap observed a different hash than the caller expected.
    #[error("reference has changed: {0}")]
    ReferenceHasChanged(String),

    /// Stored data could not be decoded into a known shape.
    #[error("corrupt entry {key}: {reason}")]
    Corruption { key: String, reason: String },

    /// The backend could not be reached or the transport failed.
    #[error("{backend} backend unavailable: {source}")]
    Unavailable {
        backend: &'static str,
        #[source]
        source: BoxError,
    },

    /// The operation is declared by the storer contract but not implemented.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    /// The caller passed a value the operation cannot accept.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl StorageError {
    pub fn unavailable(backend: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Unavailable {
            backend,
            source: source.into(),
        }
    }

    pub fn corruption(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::Corruption {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// `true` for the "does not exist yet" kinds.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ObjectNotFound(_) | Self::ReferenceNotFound(_))
    }

    /// `true` when retrying (with fresh state, or after backoff) can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ReferenceHasChanged(_) | Self::Unavailable { .. })
    }
}

impl From<TypeError> for StorageError {
    fn from(err: TypeError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(StorageError::ObjectNotFound(ObjectHash::ZERO).is_not_found());
        assert!(StorageError::ReferenceNotFound("refs/heads/main".into()).is_not_found());
        assert!(StorageError::ReferenceHasChanged("refs/heads/main".into()).is_retryable());
        assert!(StorageError::unavailable("redis", "connection refused").is_retryable());
        assert!(!StorageError::Unsupported("add_alternate").is_retryable());
        assert!(!StorageError::corruption("k", "bad json").is_not_found());
    }

    #[test]
    fn unavailable_keeps_source() {
        let err = StorageError::unavailable("postgres", "timed out");
        assert_eq!(err.to_string(), "postgres backend unavailable: timed out");
        assert!(std::error::Error::source(&err).is_some());
    }
}
