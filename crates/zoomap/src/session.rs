//! Session ownership: dialing, the bounded connectivity wait, chroot and root
//! materialization, and close-exactly-once teardown.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::client::{ZkClient, ZkConnector};
use crate::error::{ZooMapError, ZooMapResult};
use crate::path;
use crate::retry::RetryPolicy;

/// Default bounded wait for initial session establishment.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// One live backend session, exclusively owned by one adapter instance.
///
/// The handle is closed exactly once, whether through [`Session::close`] or
/// through `Drop`, and closing never fails.
pub(crate) struct Session {
    client: Box<dyn ZkClient>,
    closed: AtomicBool,
}

impl Session {
    /// Dials and establishes the session.
    ///
    /// A chroot suffix in `connect_string` is materialized first through a
    /// transient session against the bare endpoints, so that the durable,
    /// chroot-scoped session below finds its namespace in place. The
    /// transient session is closed on success and failure alike.
    pub(crate) fn open(
        connector: &dyn ZkConnector,
        connect_string: &str,
        retry: Arc<dyn RetryPolicy>,
        connect_timeout: Duration,
    ) -> ZooMapResult<Self> {
        let (ensemble, chroot) = path::split_chroot(connect_string)?;
        if let Some(chroot) = chroot.as_deref() {
            prepare_chroot(connector, &ensemble, chroot, retry.clone(), connect_timeout)?;
        }
        let client = dial_connected(connector, connect_string, retry, connect_timeout)?;
        Ok(Self {
            client,
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn client(&self) -> &dyn ZkClient {
        self.client.as_ref()
    }

    /// Materializes a non-empty root as container nodes. Pre-existing nodes
    /// are left untouched, so reconnecting to a populated root keeps its
    /// entries.
    pub(crate) fn ensure_root(&self, root: &str) -> ZooMapResult<()> {
        if root.is_empty() {
            return Ok(());
        }
        self.client.create_containers(root)?;
        Ok(())
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.client.close();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn dial_connected(
    connector: &dyn ZkConnector,
    connect_string: &str,
    retry: Arc<dyn RetryPolicy>,
    connect_timeout: Duration,
) -> ZooMapResult<Box<dyn ZkClient>> {
    let client = connector.dial(connect_string, retry).map_err(|err| {
        ZooMapError::ConnectionFailed(format!("dialing {connect_string} failed: {err}"))
    })?;
    client.start();
    match client.block_until_connected(connect_timeout) {
        Ok(true) => Ok(client),
        Ok(false) => {
            client.close();
            Err(ZooMapError::ConnectionFailed(format!(
                "no connection to {connect_string} within {connect_timeout:?}"
            )))
        }
        Err(err) => {
            client.close();
            Err(ZooMapError::ConnectionFailed(format!(
                "session startup against {connect_string} failed: {err}"
            )))
        }
    }
}

fn prepare_chroot(
    connector: &dyn ZkConnector,
    ensemble: &str,
    chroot: &str,
    retry: Arc<dyn RetryPolicy>,
    connect_timeout: Duration,
) -> ZooMapResult<()> {
    let bootstrap = dial_connected(connector, ensemble, retry, connect_timeout)?;
    let outcome = bootstrap.create_containers(chroot);
    bootstrap.close();
    outcome.map_err(|err| {
        ZooMapError::ConnectionFailed(format!(
            "chroot {chroot} could not be prepared on {ensemble}: {err}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryOneTime;
    use crate::testing::{MemoryConnector, TestingServer};

    fn short_retry() -> Arc<dyn RetryPolicy> {
        Arc::new(RetryOneTime::new(Duration::from_millis(5)))
    }

    #[test]
    fn open_against_unknown_address_expected_connection_failed() {
        let error = Session::open(
            &MemoryConnector::new(),
            "lalalala:12345",
            short_retry(),
            Duration::from_millis(50),
        )
        .expect_err("an unknown address should not connect");
        assert!(matches!(error, ZooMapError::ConnectionFailed(_)));
    }

    #[test]
    fn open_with_chroot_expected_transient_bootstrap_session_closed() {
        let server = TestingServer::start();
        let target = format!("{}/apps/maps", server.connect_string());
        let session = Session::open(
            &server.connector(),
            &target,
            short_retry(),
            DEFAULT_CONNECT_TIMEOUT,
        )
        .expect("chrooted open should succeed against a live server");

        assert_eq!(server.total_sessions(), 2);
        assert_eq!(server.active_sessions(), 1);
        let raw = server.client();
        assert!(raw
            .exists("/apps/maps")
            .expect("raw existence check should succeed"));
        session.close();
    }

    #[test]
    fn open_with_chroot_against_unknown_address_expected_connection_failed() {
        let error = Session::open(
            &MemoryConnector::new(),
            "lalalala:12345/test/map",
            short_retry(),
            Duration::from_millis(50),
        )
        .expect_err("bootstrap against an unknown address should fail");
        assert!(matches!(error, ZooMapError::ConnectionFailed(_)));
    }

    #[test]
    fn ensure_root_expected_containers_created_once() {
        let server = TestingServer::start();
        let session = Session::open(
            &server.connector(),
            server.connect_string(),
            short_retry(),
            DEFAULT_CONNECT_TIMEOUT,
        )
        .expect("open should succeed against a live server");

        session
            .ensure_root("/some/root")
            .expect("root creation should succeed");
        session
            .ensure_root("/some/root")
            .expect("repeated root creation should be idempotent");
        session.ensure_root("").expect("empty root needs no nodes");

        let raw = server.client();
        assert!(raw
            .exists("/some/root")
            .expect("raw existence check should succeed"));
        session.close();
    }

    #[test]
    fn debug_expected_closed_state_only() {
        let server = TestingServer::start();
        let session = Session::open(
            &server.connector(),
            server.connect_string(),
            short_retry(),
            DEFAULT_CONNECT_TIMEOUT,
        )
        .expect("open should succeed against a live server");

        assert_eq!(format!("{session:?}"), "Session { closed: false }");
        session.close();
        assert_eq!(format!("{session:?}"), "Session { closed: true }");
    }

    #[test]
    fn close_twice_expected_single_release() {
        let server = TestingServer::start();
        let session = Session::open(
            &server.connector(),
            server.connect_string(),
            short_retry(),
            DEFAULT_CONNECT_TIMEOUT,
        )
        .expect("open should succeed against a live server");

        assert_eq!(server.active_sessions(), 1);
        session.close();
        session.close();
        assert!(session.is_closed());
        assert_eq!(server.active_sessions(), 0);
    }

    #[test]
    fn drop_expected_session_released() {
        let server = TestingServer::start();
        {
            let _session = Session::open(
                &server.connector(),
                server.connect_string(),
                short_retry(),
                DEFAULT_CONNECT_TIMEOUT,
            )
            .expect("open should succeed against a live server");
            assert_eq!(server.active_sessions(), 1);
        }
        assert_eq!(server.active_sessions(), 0);
    }
}
