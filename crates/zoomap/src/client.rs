//! The backend RPC surface the map adapter is written against.
//!
//! The coordination service is consumed as an opaque, synchronous collaborator
//! behind [`ZkClient`]; handles are produced by a [`ZkConnector`] dialing
//! factory. The in-process backend in [`crate::testing`] implements both; a
//! binding to a live ZooKeeper ensemble would be another implementation.

use std::sync::Arc;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Failure codes a coordination backend reports to its clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ZkError {
    /// The addressed node does not exist.
    #[error("no node: {0}")]
    NoNode(String),
    /// The node to create already exists.
    #[error("node already exists: {0}")]
    NodeExists(String),
    /// The node still has children and cannot be deleted non-recursively.
    #[error("node not empty: {0}")]
    NotEmpty(String),
    /// The request is invalid as stated, e.g. deleting the top-level root.
    #[error("bad arguments: {0}")]
    BadArguments(String),
    /// The connection dropped while the call was in flight.
    #[error("connection loss: {0}")]
    ConnectionLoss(String),
    /// The server failed internally.
    #[error("server error: {0}")]
    Server(String),
    /// The client handle was closed; no further calls are possible.
    #[error("session closed")]
    Closed,
}

impl ZkError {
    /// Connection-loss failures may be retried under a policy; node-state
    /// failures never are.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionLoss(_))
    }
}

pub type ZkResult<T> = Result<T, ZkError>;

/// One session-oriented client handle onto the backend's node tree.
///
/// Handles are produced unstarted. `start` begins session establishment
/// without blocking; `block_until_connected` bounds the wait for it. All path
/// arguments are absolute (`/`-rooted) and are interpreted under the chroot
/// embedded in the connection string, if any.
pub trait ZkClient: Send + Sync {
    /// Begins session establishment. Does not block.
    fn start(&self);
    /// Waits up to `timeout` for the session to come up. `Ok(false)` means
    /// the wait elapsed without connectivity.
    fn block_until_connected(&self, timeout: Duration) -> ZkResult<bool>;
    /// Whether a node exists at `path`. Absence is not an error.
    fn exists(&self, path: &str) -> ZkResult<bool>;
    /// Reads the payload at `path`. `None` is a present node with a null
    /// payload, which is distinct from an empty one.
    fn get_data(&self, path: &str) -> ZkResult<Option<Vec<u8>>>;
    /// Overwrites the payload at `path`.
    fn set_data(&self, path: &str, payload: Option<&[u8]>) -> ZkResult<()>;
    /// Creates the node at `path` with a null payload. Fails with
    /// [`ZkError::NodeExists`] if present and [`ZkError::NoNode`] if the
    /// parent is missing.
    fn create(&self, path: &str) -> ZkResult<()>;
    /// Creates `path` and any missing ancestors as container nodes.
    /// Idempotent; existing nodes are left untouched.
    fn create_containers(&self, path: &str) -> ZkResult<()>;
    /// Deletes the leaf node at `path`. Fails with [`ZkError::NotEmpty`] if
    /// it has children.
    fn delete(&self, path: &str) -> ZkResult<()>;
    /// Deletes the node at `path` and its whole subtree.
    fn delete_recursive(&self, path: &str) -> ZkResult<()>;
    /// Names (not paths) of the direct children of `path`.
    fn get_children(&self, path: &str) -> ZkResult<Vec<String>>;
    /// Tears the session down. Further calls fail with [`ZkError::Closed`].
    fn close(&self);
}

impl<T> ZkClient for Arc<T>
where
    T: ZkClient + ?Sized,
{
    fn start(&self) {
        (**self).start()
    }

    fn block_until_connected(&self, timeout: Duration) -> ZkResult<bool> {
        (**self).block_until_connected(timeout)
    }

    fn exists(&self, path: &str) -> ZkResult<bool> {
        (**self).exists(path)
    }

    fn get_data(&self, path: &str) -> ZkResult<Option<Vec<u8>>> {
        (**self).get_data(path)
    }

    fn set_data(&self, path: &str, payload: Option<&[u8]>) -> ZkResult<()> {
        (**self).set_data(path, payload)
    }

    fn create(&self, path: &str) -> ZkResult<()> {
        (**self).create(path)
    }

    fn create_containers(&self, path: &str) -> ZkResult<()> {
        (**self).create_containers(path)
    }

    fn delete(&self, path: &str) -> ZkResult<()> {
        (**self).delete(path)
    }

    fn delete_recursive(&self, path: &str) -> ZkResult<()> {
        (**self).delete_recursive(path)
    }

    fn get_children(&self, path: &str) -> ZkResult<Vec<String>> {
        (**self).get_children(path)
    }

    fn close(&self) {
        (**self).close()
    }
}

/// Dialing factory producing backend client handles.
pub trait ZkConnector: Send + Sync {
    /// Produces an unstarted client bound to `connect_string` (endpoints plus
    /// optional chroot suffix). The client applies `retry` per backend call
    /// once started; dialing itself performs no I/O beyond address
    /// resolution.
    fn dial(&self, connect_string: &str, retry: Arc<dyn RetryPolicy>)
        -> ZkResult<Box<dyn ZkClient>>;
}

impl<T> ZkConnector for Arc<T>
where
    T: ZkConnector + ?Sized,
{
    fn dial(
        &self,
        connect_string: &str,
        retry: Arc<dyn RetryPolicy>,
    ) -> ZkResult<Box<dyn ZkClient>> {
        (**self).dial(connect_string, retry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_loss_expected_retryable() {
        assert!(ZkError::ConnectionLoss("lost".to_string()).is_retryable());
    }

    #[test]
    fn node_state_errors_expected_not_retryable() {
        assert!(!ZkError::NoNode("/a".to_string()).is_retryable());
        assert!(!ZkError::NodeExists("/a".to_string()).is_retryable());
        assert!(!ZkError::NotEmpty("/a".to_string()).is_retryable());
        assert!(!ZkError::BadArguments("/".to_string()).is_retryable());
        assert!(!ZkError::Closed.is_retryable());
    }
}
