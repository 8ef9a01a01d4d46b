//! A flat string map backed by a hierarchical coordination service.
//!
//! [`ZooMap`] exposes one level of the service's node tree as a mutable
//! key-value map: each entry is a child node of a configurable root, the
//! value is the node's UTF-8 payload. Sessions, chroot namespaces, and root
//! materialization are managed by the adapter; the backend wire client stays
//! behind the [`client::ZkClient`] trait.
//!
//! # Design
//!
//! - **One session per map**: each instance owns its session and releases it
//!   exactly once, on [`ZooMap::close`] or drop.
//! - **Chroot bootstrap**: a chroot suffix in the connection target is
//!   created up front through a transient session, so connecting to a fresh
//!   namespace just works.
//! - **No client-side locking**: composite operations read then write; the
//!   backend is the single serialization point.
//! - **Categorized failures**: [`ZooMapError`] separates configuration
//!   mistakes from argument mistakes from backend trouble, and keeps the
//!   backend cause as `source()`.
//! - **In-process backend**: [`testing`] provides a registry-dialed in-memory
//!   server so the whole surface runs without a live ensemble.
//!
//! # Example
//!
//! ```
//! use zoomap::testing::TestingServer;
//! use zoomap::ZooMap;
//!
//! let server = TestingServer::start();
//! let map = ZooMap::builder(format!("{}/apps", server.connect_string()))
//!     .with_connector(server.connector())
//!     .with_root("/settings")
//!     .build()?;
//!
//! assert_eq!(map.insert("mode", "fast")?, None);
//! assert_eq!(map.get("mode")?.as_deref(), Some("fast"));
//! assert_eq!(map.remove("mode")?.as_deref(), Some("fast"));
//! assert!(map.is_empty()?);
//! # Ok::<(), zoomap::ZooMapError>(())
//! ```

pub mod client;
pub mod error;
pub mod map;
pub mod retry;
pub mod testing;

mod path;
mod session;

pub use crate::client::{ZkClient, ZkConnector, ZkError, ZkResult};
pub use crate::error::{ZooMapError, ZooMapResult};
pub use crate::map::{ZooMap, ZooMapBuilder};
pub use crate::retry::{
    ExponentialBackoff, RetryNTimes, RetryOneTime, RetryPolicy, DEFAULT_RETRY_DELAY,
};
pub use crate::session::DEFAULT_CONNECT_TIMEOUT;
