use std::error::Error as StdError;

use crate::client::ZkError;

/// Failures surfaced by [`ZooMap`](crate::ZooMap) construction and operations.
///
/// The set is closed on purpose: callers distinguish configuration mistakes
/// (fix before retrying) from transient backend trouble (possibly retryable)
/// by matching variants, never by inspecting message strings.
#[derive(Debug, thiserror::Error)]
pub enum ZooMapError {
    /// Malformed root path or connection target, or a builder missing its
    /// connector. Raised at construction, before any backend traffic.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Structurally illegal key handed to an operation. Raised before any
    /// backend traffic.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The session could not be established within the connect timeout, or
    /// the backend reported a startup failure. Fatal to that instance.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// A backend call failed after the session was up. The original cause is
    /// preserved as `source()` and is wrapped exactly once.
    #[error("backend operation failed: {0}")]
    Backend(#[source] Box<dyn StdError + Send + Sync + 'static>),
    /// The operation is not offered by this adapter.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl ZooMapError {
    /// Wraps a failure observed during a backend exchange that is not itself
    /// a backend protocol error, e.g. a payload that does not decode.
    pub(crate) fn backend(cause: impl StdError + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(cause))
    }
}

impl From<ZkError> for ZooMapError {
    fn from(cause: ZkError) -> Self {
        Self::Backend(Box::new(cause))
    }
}

pub type ZooMapResult<T> = Result<T, ZooMapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_display_expected_cause_in_message() {
        let error = ZooMapError::from(ZkError::NoNode("/some/root/key".to_string()));
        assert_eq!(
            error.to_string(),
            "backend operation failed: no node: /some/root/key"
        );
    }

    #[test]
    fn backend_error_source_expected_original_zk_error() {
        let error = ZooMapError::from(ZkError::ConnectionLoss("127.0.0.1:2181".to_string()));
        let source = error.source().expect("cause should be preserved");
        let zk = source
            .downcast_ref::<ZkError>()
            .expect("source should be the backend error, not another wrapper");
        assert_eq!(
            *zk,
            ZkError::ConnectionLoss("127.0.0.1:2181".to_string())
        );
    }

    #[test]
    fn backend_error_source_chain_expected_single_layer() {
        let error = ZooMapError::from(ZkError::Closed);
        let source = error.source().expect("cause should be preserved");
        assert!(source.source().is_none());
    }

    #[test]
    fn configuration_error_expected_no_source() {
        let error = ZooMapError::InvalidConfiguration("root path must be absolute".to_string());
        assert!(error.source().is_none());
        assert_eq!(
            error.to_string(),
            "invalid configuration: root path must be absolute"
        );
    }

    #[test]
    fn unsupported_error_display_expected_operation_name() {
        let error = ZooMapError::Unsupported("replace_all");
        assert_eq!(error.to_string(), "unsupported operation: replace_all");
    }
}
