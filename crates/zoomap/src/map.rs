//! The flat-map façade over the backend's node tree.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use crate::client::{ZkClient, ZkConnector, ZkError};
use crate::error::{ZooMapError, ZooMapResult};
use crate::path;
use crate::retry::{RetryOneTime, RetryPolicy};
use crate::session::{Session, DEFAULT_CONNECT_TIMEOUT};

/// A mutable string-to-string map stored as one level of a hierarchical
/// coordination service.
///
/// Every entry is a node at `root + "/" + key`; the value is the node's
/// payload, UTF-8 encoded. A value of `None` is a present node with a null
/// payload, which [`get`](ZooMap::get) cannot tell apart from an absent key;
/// [`contains_key`](ZooMap::contains_key) is the discriminator.
///
/// The adapter performs no client-side locking: composite operations such as
/// [`insert`](ZooMap::insert) (read previous, then write) and the snapshot
/// reads ([`keys`](ZooMap::keys), [`values`](ZooMap::values),
/// [`entries`](ZooMap::entries)) are not atomic with respect to other clients
/// of the same root. The backend is the single serialization point; the last
/// writer wins per node.
///
/// The session is released when the map is dropped; [`close`](ZooMap::close)
/// releases it earlier and is idempotent. Two maps are equal when their
/// connection target and normalized root are equal, regardless of session
/// state.
pub struct ZooMap {
    connect_string: String,
    root: String,
    session: Session,
}

/// Configures and connects a [`ZooMap`].
///
/// All validation happens in [`build`](ZooMapBuilder::build), in order: root
/// normalization, connection-string parsing, then dialing.
pub struct ZooMapBuilder {
    connect_string: String,
    root: Option<String>,
    retry: Arc<dyn RetryPolicy>,
    connect_timeout: Duration,
    connector: Option<Arc<dyn ZkConnector>>,
}

impl ZooMapBuilder {
    fn new(connect_string: impl Into<String>) -> Self {
        Self {
            connect_string: connect_string.into(),
            root: None,
            retry: Arc::new(RetryOneTime::default()),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            connector: None,
        }
    }

    /// Root path under which all entries live. Defaults to the backend's
    /// top-level root; `""` and `"/"` mean the same.
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Retry policy handed to the dialed client, applied per backend call.
    /// Defaults to one retry after [`crate::retry::DEFAULT_RETRY_DELAY`].
    pub fn with_retry_policy(mut self, retry: impl RetryPolicy + 'static) -> Self {
        self.retry = Arc::new(retry);
        self
    }

    /// Bounded wait for initial connectivity. Defaults to
    /// [`DEFAULT_CONNECT_TIMEOUT`].
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// The dialing factory producing the backend client.
    pub fn with_connector(mut self, connector: impl ZkConnector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Validates the configuration, establishes the session, and materializes
    /// the root.
    pub fn build(self) -> ZooMapResult<ZooMap> {
        let root = path::normalize_root(self.root.as_deref())?;
        let connector = self.connector.ok_or_else(|| {
            ZooMapError::InvalidConfiguration(
                "a connector is required to dial the backend".to_string(),
            )
        })?;
        let session = Session::open(
            connector.as_ref(),
            &self.connect_string,
            self.retry,
            self.connect_timeout,
        )?;
        session.ensure_root(&root)?;
        Ok(ZooMap {
            connect_string: self.connect_string,
            root,
            session,
        })
    }
}

impl fmt::Debug for ZooMapBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZooMapBuilder")
            .field("connect_string", &self.connect_string)
            .field("root", &self.root)
            .field("connect_timeout", &self.connect_timeout)
            .field("connector", &self.connector.is_some())
            .finish()
    }
}

impl ZooMap {
    /// Starts configuring a map for `connect_string` (endpoints plus optional
    /// chroot suffix).
    pub fn builder(connect_string: impl Into<String>) -> ZooMapBuilder {
        ZooMapBuilder::new(connect_string)
    }

    /// Connects with defaults and the backend's top-level root.
    pub fn connect(
        connector: impl ZkConnector + 'static,
        connect_string: impl Into<String>,
    ) -> ZooMapResult<Self> {
        Self::builder(connect_string).with_connector(connector).build()
    }

    /// Connects with defaults under the given root.
    pub fn connect_with_root(
        connector: impl ZkConnector + 'static,
        connect_string: impl Into<String>,
        root: impl Into<String>,
    ) -> ZooMapResult<Self> {
        Self::builder(connect_string)
            .with_connector(connector)
            .with_root(root)
            .build()
    }

    /// The connection target this map was built with, chroot suffix included.
    pub fn connect_string(&self) -> &str {
        &self.connect_string
    }

    /// The normalized root path; empty means the backend's top-level root.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Whether the session has been released. Operations on a closed map
    /// fail with [`ZooMapError::Backend`].
    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    fn client(&self) -> &dyn ZkClient {
        self.session.client()
    }

    fn read_value(&self, node: &str) -> ZooMapResult<Option<String>> {
        match self.client().get_data(node)? {
            None => Ok(None),
            Some(bytes) => String::from_utf8(bytes).map(Some).map_err(ZooMapError::backend),
        }
    }

    /// Number of entries, counted as direct children of the root.
    pub fn len(&self) -> ZooMapResult<usize> {
        Ok(self
            .client()
            .get_children(path::list_path(&self.root))?
            .len())
    }

    pub fn is_empty(&self) -> ZooMapResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Whether a node exists for `key`, payload or not.
    pub fn contains_key(&self, key: &str) -> ZooMapResult<bool> {
        path::validate_key(key)?;
        Ok(self.client().exists(&path::key_path(&self.root, key))?)
    }

    /// Whether any entry's decoded value equals `value`. Linear scan, one
    /// read per key; entries with a null payload never match.
    pub fn contains_value(&self, value: &str) -> ZooMapResult<bool> {
        for key in self.keys()? {
            let node = path::key_path(&self.root, &key);
            if self.read_value(&node)?.as_deref() == Some(value) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The value stored under `key`, or `None` if the key is absent or its
    /// payload is null.
    pub fn get(&self, key: &str) -> ZooMapResult<Option<String>> {
        path::validate_key(key)?;
        let node = path::key_path(&self.root, key);
        if !self.client().exists(&node)? {
            return Ok(None);
        }
        self.read_value(&node)
    }

    /// Stores `value` under `key`, creating the node if absent, and returns
    /// the previous value.
    ///
    /// The previous value is read first and the payload written second; a
    /// concurrent writer can slip between the two. If the write fails after
    /// the node was created, the empty node remains.
    pub fn insert<'v>(
        &self,
        key: &str,
        value: impl Into<Option<&'v str>>,
    ) -> ZooMapResult<Option<String>> {
        path::validate_key(key)?;
        let value = value.into();
        let node = path::key_path(&self.root, key);
        let previous = if self.client().exists(&node)? {
            self.read_value(&node)?
        } else {
            None
        };
        self.client().create_containers(&node)?;
        self.client().set_data(&node, value.map(str::as_bytes))?;
        Ok(previous)
    }

    /// Deletes the entry for `key` and returns its previous value. Absent
    /// keys leave the map unchanged and return `None`. A key is a leaf, so
    /// the delete is never recursive.
    pub fn remove(&self, key: &str) -> ZooMapResult<Option<String>> {
        path::validate_key(key)?;
        let node = path::key_path(&self.root, key);
        if !self.client().exists(&node)? {
            return Ok(None);
        }
        let previous = self.read_value(&node)?;
        self.client().delete(&node)?;
        Ok(previous)
    }

    /// Inserts every entry in iteration order. Not atomic: a failure leaves
    /// the entries inserted so far in place.
    pub fn insert_all<K, V>(&self, entries: impl IntoIterator<Item = (K, V)>) -> ZooMapResult<()>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in entries {
            self.insert(key.as_ref(), Some(value.as_ref()))?;
        }
        Ok(())
    }

    /// Deletes every entry by removing the root's subtree, then recreates the
    /// empty root container.
    ///
    /// An empty root is refused before any delete goes out: the top-level
    /// node is never deleted, chrooted connections included. Fails with
    /// [`ZooMapError::Backend`] when the root was deleted out-of-band. If
    /// the recreate fails after the delete succeeded, the root stays
    /// missing and the failure propagates.
    pub fn clear(&self) -> ZooMapResult<()> {
        // A chroot-scoped session resolves `/` to its chroot node, where
        // the backend would accept the delete.
        if self.root.is_empty() {
            return Err(ZooMapError::from(ZkError::BadArguments(
                "the top-level root cannot be deleted".to_string(),
            )));
        }
        self.client().delete_recursive(&self.root)?;
        self.client().create(&self.root)?;
        Ok(())
    }

    /// Snapshot of the key set at call time; not a live view.
    pub fn keys(&self) -> ZooMapResult<BTreeSet<String>> {
        Ok(self
            .client()
            .get_children(path::list_path(&self.root))?
            .into_iter()
            .collect())
    }

    /// Snapshot of all values: one children listing, then one read per key.
    /// Concurrent mutation between those calls can yield a combination that
    /// never existed atomically; a key vanishing mid-read surfaces as
    /// [`ZooMapError::Backend`].
    pub fn values(&self) -> ZooMapResult<Vec<Option<String>>> {
        let mut values = Vec::new();
        for key in self.keys()? {
            values.push(self.read_value(&path::key_path(&self.root, &key))?);
        }
        Ok(values)
    }

    /// Snapshot of all entries, materialized like [`values`](ZooMap::values).
    pub fn entries(&self) -> ZooMapResult<BTreeMap<String, Option<String>>> {
        let mut entries = BTreeMap::new();
        for key in self.keys()? {
            let value = self.read_value(&path::key_path(&self.root, &key))?;
            entries.insert(key, value);
        }
        Ok(entries)
    }

    /// Always fails with [`ZooMapError::Unsupported`]: a bulk functional
    /// replace would need a consistent multi-key snapshot plus apply, which
    /// the backend does not cheaply provide.
    pub fn replace_all<F>(&self, _apply: F) -> ZooMapResult<()>
    where
        F: FnMut(&str, Option<&str>) -> Option<String>,
    {
        Err(ZooMapError::Unsupported("replace_all"))
    }

    /// Releases the session. Idempotent and infallible; the map also closes
    /// itself when dropped. A close racing an in-flight operation may surface
    /// there as [`ZooMapError::Backend`].
    pub fn close(&self) {
        self.session.close();
    }
}

impl PartialEq for ZooMap {
    fn eq(&self, other: &Self) -> bool {
        self.connect_string == other.connect_string && self.root == other.root
    }
}

impl Eq for ZooMap {}

impl Hash for ZooMap {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.connect_string.hash(state);
        self.root.hash(state);
    }
}

impl fmt::Debug for ZooMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZooMap")
            .field("connect_string", &self.connect_string)
            .field("root", &self.root)
            .field("closed", &self.is_closed())
            .finish()
    }
}
