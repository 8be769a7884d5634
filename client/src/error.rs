//! Unified error handling for the sync client.

use shelfsync_engine::TargetCollection;
use thiserror::Error;

/// Client error type.
///
/// Validation and tree-invariant failures arrive through the engine error
/// and are surfaced to the caller unchanged. Transport failures are the
/// retryable class: a write that hits one falls back to the offline queue
/// instead of failing the call.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("engine error: {0}")]
    Engine(#[from] shelfsync_engine::Error),

    #[error("remote store unreachable: {0}")]
    Transport(String),

    #[error("{collection} record not found in remote store: {id}")]
    RemoteMissing {
        collection: TargetCollection,
        id: String,
    },

    #[error("local storage failure: {0}")]
    Storage(String),

    #[error("metadata request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no metadata found for isbn {0}")]
    MetadataNotFound(String),
}

impl ClientError {
    /// True for failures caused by the remote store being unreachable,
    /// as opposed to the request itself being invalid. Transport failures
    /// route writes into the offline queue and trigger the retry path.
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::Http(_))
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_classification() {
        assert!(ClientError::Transport("connection refused".into()).is_transport());
        assert!(!ClientError::Storage("disk full".into()).is_transport());
        assert!(!ClientError::RemoteMissing {
            collection: TargetCollection::Books,
            id: "b-1".into(),
        }
        .is_transport());
    }

    #[test]
    fn engine_errors_convert() {
        let err: ClientError = shelfsync_engine::Error::CategoryNotFound("ghost".into()).into();
        assert!(matches!(err, ClientError::Engine(_)));
        assert!(!err.is_transport());
    }

    #[test]
    fn error_messages() {
        let err = ClientError::RemoteMissing {
            collection: TargetCollection::Categories,
            id: "c-9".into(),
        };
        assert_eq!(
            err.to_string(),
            "categories record not found in remote store: c-9"
        );
    }
}
