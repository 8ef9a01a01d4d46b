//! In-process coordination backend for tests and examples.
//!
//! [`TestingServer`] keeps a node tree in memory and hands out sessions
//! through [`MemoryConnector`], so the whole adapter surface can be exercised
//! without a live ensemble.
//!
//! # Design
//!
//! - **Registry dialing**: every server registers a unique `host:port`
//!   address in a process-wide registry. The connector resolves addresses
//!   there, and an unknown address behaves like an unreachable endpoint: the
//!   connect wait runs its full timeout.
//! - **Chroot scoping**: a client dialed with a chroot suffix prefixes every
//!   path it sends, mirroring how the real service scopes a session.
//! - **Retry application**: clients consult their retry policy after each
//!   connection-loss failure, and
//!   [`TestingServer::inject_connection_loss`] makes the next N calls fail
//!   that way.
//! - **Session accounting**: [`TestingServer::active_sessions`] and
//!   [`TestingServer::total_sessions`] observe lifecycle behavior, e.g. that
//!   dropping a map releases its session.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use once_cell::sync::Lazy;

use crate::client::{ZkClient, ZkConnector, ZkError, ZkResult};
use crate::path;
use crate::retry::{RetryOneTime, RetryPolicy};

static REGISTRY: Lazy<Mutex<HashMap<String, Weak<ServerCore>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

static NEXT_PORT: AtomicUsize = AtomicUsize::new(42181);

/// An in-memory stand-in for one backend ensemble.
///
/// Starting a server claims a unique loopback address; dropping it releases
/// the address. Sessions already dialed keep their handle to the tree.
pub struct TestingServer {
    core: Arc<ServerCore>,
}

impl TestingServer {
    /// Starts a fresh server with an empty tree (only the top-level `/`
    /// node) under a unique address.
    pub fn start() -> Self {
        let port = NEXT_PORT.fetch_add(1, Ordering::SeqCst);
        let addr = format!("127.0.0.1:{port}");
        let core = Arc::new(ServerCore {
            addr: addr.clone(),
            state: Mutex::new(TreeState::new()),
        });
        REGISTRY
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(addr, Arc::downgrade(&core));
        Self { core }
    }

    /// The bare endpoint address; append `/some/path` for a chrooted target.
    pub fn connect_string(&self) -> &str {
        &self.core.addr
    }

    /// A connector that resolves this server (and any other running one).
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector::new()
    }

    /// An already-connected raw client handle, bypassing the dial handshake.
    /// Useful for out-of-band reads and writes around an adapter under test.
    /// The handle is not a counted session:
    /// [`active_sessions`](TestingServer::active_sessions) and
    /// [`total_sessions`](TestingServer::total_sessions) ignore it.
    pub fn client(&self) -> Box<dyn ZkClient> {
        Box::new(MemoryClient::attached(self.core.clone()))
    }

    /// Number of sessions currently open against this server.
    pub fn active_sessions(&self) -> usize {
        self.core.snapshot(|state| state.active_sessions)
    }

    /// Number of sessions ever opened against this server.
    pub fn total_sessions(&self) -> usize {
        self.core.snapshot(|state| state.total_sessions)
    }

    /// Makes the next `failures` backend calls fail with a connection loss,
    /// counting retries as calls.
    pub fn inject_connection_loss(&self, failures: usize) {
        self.core
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .connection_faults = failures;
    }
}

impl Drop for TestingServer {
    fn drop(&mut self) {
        REGISTRY
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.core.addr);
    }
}

/// Dials servers by looking their address up in the process-wide registry.
#[derive(Clone, Copy, Debug, Default)]
pub struct MemoryConnector;

impl MemoryConnector {
    pub fn new() -> Self {
        Self
    }
}

impl ZkConnector for MemoryConnector {
    fn dial(
        &self,
        connect_string: &str,
        retry: Arc<dyn RetryPolicy>,
    ) -> ZkResult<Box<dyn ZkClient>> {
        let (ensemble, chroot) = path::split_chroot(connect_string)
            .map_err(|error| ZkError::BadArguments(error.to_string()))?;
        let server = lookup(&ensemble);
        Ok(Box::new(MemoryClient::dialed(server, chroot, retry)))
    }
}

fn lookup(addr: &str) -> Option<Arc<ServerCore>> {
    REGISTRY
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(addr)
        .and_then(Weak::upgrade)
}

struct ServerCore {
    addr: String,
    state: Mutex<TreeState>,
}

struct TreeState {
    nodes: BTreeMap<String, Option<Vec<u8>>>,
    active_sessions: usize,
    total_sessions: usize,
    connection_faults: usize,
}

impl TreeState {
    fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), None);
        Self {
            nodes,
            active_sessions: 0,
            total_sessions: 0,
            connection_faults: 0,
        }
    }
}

impl ServerCore {
    fn with_state<T>(&self, op: impl FnOnce(&mut TreeState) -> ZkResult<T>) -> ZkResult<T> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ZkError::Server("testing server state poisoned".to_string()))?;
        op(&mut state)
    }

    fn snapshot<T>(&self, read: impl FnOnce(&TreeState) -> T) -> T {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        read(&state)
    }

    fn register_session(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.active_sessions += 1;
        state.total_sessions += 1;
    }

    fn release_session(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.active_sessions = state.active_sessions.saturating_sub(1);
    }

    fn take_fault(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.connection_faults > 0 {
            state.connection_faults -= 1;
            true
        } else {
            false
        }
    }

    fn exists(&self, node: &str) -> ZkResult<bool> {
        require_absolute(node)?;
        self.with_state(|state| Ok(state.nodes.contains_key(node)))
    }

    fn get_data(&self, node: &str) -> ZkResult<Option<Vec<u8>>> {
        require_absolute(node)?;
        self.with_state(|state| {
            state
                .nodes
                .get(node)
                .cloned()
                .ok_or_else(|| ZkError::NoNode(node.to_string()))
        })
    }

    fn set_data(&self, node: &str, payload: Option<&[u8]>) -> ZkResult<()> {
        require_absolute(node)?;
        let payload = payload.map(<[u8]>::to_vec);
        self.with_state(|state| match state.nodes.get_mut(node) {
            Some(slot) => {
                *slot = payload;
                Ok(())
            }
            None => Err(ZkError::NoNode(node.to_string())),
        })
    }

    fn create(&self, node: &str) -> ZkResult<()> {
        require_absolute(node)?;
        self.with_state(|state| {
            if node == "/" || state.nodes.contains_key(node) {
                return Err(ZkError::NodeExists(node.to_string()));
            }
            let parent = parent_path(node);
            if !state.nodes.contains_key(parent) {
                return Err(ZkError::NoNode(parent.to_string()));
            }
            state.nodes.insert(node.to_string(), None);
            Ok(())
        })
    }

    fn create_containers(&self, node: &str) -> ZkResult<()> {
        require_absolute(node)?;
        self.with_state(|state| {
            if node == "/" {
                return Ok(());
            }
            let mut ancestor = String::new();
            for segment in node[1..].split('/') {
                ancestor.push('/');
                ancestor.push_str(segment);
                state.nodes.entry(ancestor.clone()).or_insert(None);
            }
            Ok(())
        })
    }

    fn delete(&self, node: &str) -> ZkResult<()> {
        require_absolute(node)?;
        self.with_state(|state| {
            if node == "/" {
                return Err(ZkError::BadArguments(
                    "the top-level root cannot be deleted".to_string(),
                ));
            }
            if !state.nodes.contains_key(node) {
                return Err(ZkError::NoNode(node.to_string()));
            }
            let prefix = format!("{node}/");
            if state.nodes.keys().any(|other| other.starts_with(&prefix)) {
                return Err(ZkError::NotEmpty(node.to_string()));
            }
            state.nodes.remove(node);
            Ok(())
        })
    }

    fn delete_recursive(&self, node: &str) -> ZkResult<()> {
        require_absolute(node)?;
        self.with_state(|state| {
            if node == "/" {
                return Err(ZkError::BadArguments(
                    "the top-level root cannot be deleted".to_string(),
                ));
            }
            if !state.nodes.contains_key(node) {
                return Err(ZkError::NoNode(node.to_string()));
            }
            let prefix = format!("{node}/");
            state
                .nodes
                .retain(|other, _| other != node && !other.starts_with(&prefix));
            Ok(())
        })
    }

    fn get_children(&self, node: &str) -> ZkResult<Vec<String>> {
        require_absolute(node)?;
        self.with_state(|state| {
            if !state.nodes.contains_key(node) {
                return Err(ZkError::NoNode(node.to_string()));
            }
            let prefix = if node == "/" {
                "/".to_string()
            } else {
                format!("{node}/")
            };
            let mut names = Vec::new();
            for other in state.nodes.keys() {
                if let Some(name) = other.strip_prefix(&prefix) {
                    if !name.is_empty() && !name.contains('/') {
                        names.push(name.to_string());
                    }
                }
            }
            Ok(names)
        })
    }
}

fn require_absolute(node: &str) -> ZkResult<()> {
    if !node.starts_with('/') {
        return Err(ZkError::BadArguments(format!(
            "path must start with '/', got {node:?}"
        )));
    }
    if node.len() > 1 && node[1..].split('/').any(str::is_empty) {
        return Err(ZkError::BadArguments(format!(
            "path must not contain empty segments, got {node:?}"
        )));
    }
    Ok(())
}

fn parent_path(node: &str) -> &str {
    match node.rfind('/') {
        Some(0) | None => "/",
        Some(index) => &node[..index],
    }
}

struct MemoryClient {
    inner: Arc<ClientCore>,
}

struct ClientCore {
    server: Option<Arc<ServerCore>>,
    chroot: Option<String>,
    retry: Arc<dyn RetryPolicy>,
    started: AtomicBool,
    connected: AtomicBool,
    closed: AtomicBool,
    registered: AtomicBool,
    handshake_tx: Sender<()>,
    handshake_rx: Receiver<()>,
}

impl MemoryClient {
    fn dialed(
        server: Option<Arc<ServerCore>>,
        chroot: Option<String>,
        retry: Arc<dyn RetryPolicy>,
    ) -> Self {
        let (handshake_tx, handshake_rx) = bounded(1);
        Self {
            inner: Arc::new(ClientCore {
                server,
                chroot,
                retry,
                started: AtomicBool::new(false),
                connected: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                registered: AtomicBool::new(false),
                handshake_tx,
                handshake_rx,
            }),
        }
    }

    fn attached(server: Arc<ServerCore>) -> Self {
        // Observer handles skip the dial handshake and the session counters.
        let client = Self::dialed(Some(server), None, Arc::new(RetryOneTime::default()));
        client.inner.started.store(true, Ordering::SeqCst);
        client.inner.connected.store(true, Ordering::SeqCst);
        client
    }

    fn resolve(&self, node: &str) -> String {
        // Only absolute paths are scoped; anything else passes through
        // unchanged so the server refuses it.
        match self.inner.chroot.as_deref() {
            None => node.to_string(),
            Some(chroot) if node == "/" => chroot.to_string(),
            Some(chroot) if node.starts_with('/') => format!("{chroot}{node}"),
            Some(_) => node.to_string(),
        }
    }

    fn call<T>(&self, op: impl Fn(&ServerCore) -> ZkResult<T>) -> ZkResult<T> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ZkError::Closed);
        }
        let Some(server) = self.inner.server.as_deref() else {
            return Err(ZkError::ConnectionLoss("endpoint is unreachable".to_string()));
        };
        let mut attempt = 0;
        loop {
            let outcome = if server.take_fault() {
                Err(ZkError::ConnectionLoss(format!(
                    "injected fault against {}",
                    server.addr
                )))
            } else {
                op(server)
            };
            match outcome {
                Err(error) if error.is_retryable() => {
                    attempt += 1;
                    let Some(delay) = self.inner.retry.delay_before(attempt) else {
                        return Err(error);
                    };
                    thread::sleep(delay);
                }
                other => return other,
            }
        }
    }
}

impl ClientCore {
    fn connect_in_place(&self) {
        let Some(server) = self.server.as_deref() else {
            return;
        };
        server.register_session();
        self.registered.store(true, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        let _ = self.handshake_tx.send(());
        // A close racing the handshake thread may have missed the session.
        if self.closed.load(Ordering::SeqCst) {
            self.release_if_registered();
        }
    }

    fn release_if_registered(&self) {
        if self.registered.swap(false, Ordering::SeqCst) {
            if let Some(server) = self.server.as_deref() {
                server.release_session();
            }
            self.connected.store(false, Ordering::SeqCst);
        }
    }
}

impl ZkClient for MemoryClient {
    fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.inner.server.is_none() {
            return;
        }
        let inner = self.inner.clone();
        let spawned = thread::Builder::new()
            .name("zoomap-testing-dial".to_string())
            .spawn(move || inner.connect_in_place());
        if spawned.is_err() {
            self.inner.connect_in_place();
        }
    }

    fn block_until_connected(&self, timeout: Duration) -> ZkResult<bool> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ZkError::Closed);
        }
        if self.inner.connected.load(Ordering::SeqCst) {
            return Ok(true);
        }
        match self.inner.handshake_rx.recv_timeout(timeout) {
            Ok(()) => Ok(true),
            Err(_) => Ok(self.inner.connected.load(Ordering::SeqCst)),
        }
    }

    fn exists(&self, node: &str) -> ZkResult<bool> {
        let node = self.resolve(node);
        self.call(|server| server.exists(&node))
    }

    fn get_data(&self, node: &str) -> ZkResult<Option<Vec<u8>>> {
        let node = self.resolve(node);
        self.call(|server| server.get_data(&node))
    }

    fn set_data(&self, node: &str, payload: Option<&[u8]>) -> ZkResult<()> {
        let node = self.resolve(node);
        self.call(|server| server.set_data(&node, payload))
    }

    fn create(&self, node: &str) -> ZkResult<()> {
        let node = self.resolve(node);
        self.call(|server| server.create(&node))
    }

    fn create_containers(&self, node: &str) -> ZkResult<()> {
        let node = self.resolve(node);
        self.call(|server| server.create_containers(&node))
    }

    fn delete(&self, node: &str) -> ZkResult<()> {
        let node = self.resolve(node);
        self.call(|server| server.delete(&node))
    }

    fn delete_recursive(&self, node: &str) -> ZkResult<()> {
        let node = self.resolve(node);
        self.call(|server| server.delete_recursive(&node))
    }

    fn get_children(&self, node: &str) -> ZkResult<Vec<String>> {
        let node = self.resolve(node);
        self.call(|server| server.get_children(&node))
    }

    fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.release_if_registered();
    }
}
