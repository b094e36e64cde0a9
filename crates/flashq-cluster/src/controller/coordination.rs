//! The coordination-service abstraction (spec §4.1 "ZkWatchLayer" / §6).
//!
//! This generalizes [`crate::metadata_store::MetadataStore`]'s direct CRUD
//! operations into the ZK-like tree model a real controller needs: versioned
//! paths, ephemeral nodes, watches, and an atomic multi-op election
//! transaction. Production wire transport to a real coordination service
//! (ZooKeeper or equivalent) is an external collaborator and out of scope;
//! [`InMemoryCoordinationClient`] is the reference implementation used by
//! tests and the demo binary.
//!
//! Simplification versus real ZooKeeper: watches here persist across firings
//! (they keep notifying on every subsequent change) rather than the
//! one-shot-then-rearm semantics of real ZK watches. `ZkWatchLayer` does not
//! depend on the distinction, since it treats every notification as "go
//! re-read state", which is safe either way.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::ClusterError;
use crate::types::BrokerId;

/// Semantic names for the coordination-service paths from spec §6. Real
/// deployments would template these with topic/partition/broker ids; kept
/// here as plain path builders rather than a literal tree structure since
/// the in-memory backend only needs string keys.
pub struct CoordinationPath;

impl CoordinationPath {
    pub const CONTROLLER: &'static str = "/controller";
    pub const CONTROLLER_EPOCH: &'static str = "/controller_epoch";
    pub const REASSIGN_PARTITIONS: &'static str = "/admin/reassign_partitions";
    pub const PREFERRED_REPLICA_ELECTION: &'static str = "/admin/preferred_replica_election";

    pub fn broker(id: BrokerId) -> String {
        format!("/brokers/ids/{}", id.0)
    }

    pub fn topic(name: &str) -> String {
        format!("/brokers/topics/{name}")
    }

    pub fn partition_state(topic: &str, partition: u32) -> String {
        format!("/brokers/topics/{topic}/partitions/{partition}/state")
    }

    pub fn delete_topic(topic: &str) -> String {
        format!("/admin/delete_topics/{topic}")
    }
}

/// Events produced by watches, forwarded into [`super::event::ControllerEvent`]s
/// by [`super::watch_layer::ZkWatchLayer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    ChildrenChanged { path: String, children: Vec<String> },
    DataChanged { path: String },
    SessionExpired,
}

/// The controller's view of the coordination service: a versioned tree with
/// ephemeral nodes, watches, and one atomic multi-op transaction (election).
///
/// All methods are synchronous and may block on network I/O in a real
/// implementation — this is intentional per spec §5 ("suspension points").
pub trait CoordinationClient: Send + Sync {
    /// Create an ephemeral node. Fails with `ControllerMoved` if it already exists.
    fn create_ephemeral(&self, path: &str, data: Vec<u8>) -> Result<i32, ClusterError>;

    /// Read a node's data and version, if present.
    fn get(&self, path: &str) -> Result<Option<(Vec<u8>, i32)>, ClusterError>;

    /// Create a persistent node if it does not already exist; no-op otherwise.
    fn create_persistent_if_absent(&self, path: &str, data: Vec<u8>) -> Result<(), ClusterError>;

    /// Conditional write: succeeds only if `expected_version` matches the
    /// node's current version, returning the new version. Fails with
    /// `EpochMismatch` on a version conflict.
    fn set_cas(&self, path: &str, data: Vec<u8>, expected_version: i32) -> Result<i32, ClusterError>;

    /// Delete a node, optionally requiring a specific version.
    fn delete(&self, path: &str, expected_version: Option<i32>) -> Result<(), ClusterError>;

    fn list_children(&self, path: &str) -> Result<Vec<String>, ClusterError>;

    /// Arm a children watch on `path` and return the current children.
    fn watch_children(&self, path: &str) -> Result<Vec<String>, ClusterError>;

    /// Arm a data watch on `path` and return the current data/version, if present.
    fn watch_data(&self, path: &str) -> Result<Option<(Vec<u8>, i32)>, ClusterError>;

    /// Atomically: create the ephemeral `/controller` node for `broker_id` and
    /// bump `/controller_epoch`, returning the new `(epoch, epoch_zk_version)`.
    /// Fails with `ControllerMoved` if another broker already holds `/controller`.
    fn elect_controller(&self, broker_id: BrokerId) -> Result<(u64, i32), ClusterError>;

    /// Delete `/controller` conditional on the given epoch version, forcing a
    /// new election (spec §4.12 `triggerControllerMove`).
    fn resign_controller(&self, expected_epoch_zk_version: i32) -> Result<(), ClusterError>;
}

/// Fences a leadership write against a superseded controller (spec §5
/// invariant 3): every conditional write to partition/ISR state must also be
/// conditioned on `/controller_epoch` still matching the version this
/// controller captured at election time, not just the target path's own
/// version. A mismatch means another controller has already been elected and
/// this one must stop mutating shared state.
pub(crate) fn fence_on_epoch_zk_version(
    coordination: &dyn CoordinationClient,
    epoch_zk_version: i32,
    context: &str,
) -> Result<(), ClusterError> {
    if let Some((_, observed)) = coordination.get(CoordinationPath::CONTROLLER_EPOCH)? {
        if observed != epoch_zk_version {
            return Err(ClusterError::EpochMismatch {
                context: context.to_string(),
                expected: epoch_zk_version.max(0) as u64,
                observed: observed.max(0) as u64,
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct Node {
    data: Vec<u8>,
    version: i32,
}

#[derive(Default)]
struct Tree {
    nodes: HashMap<String, Node>,
}

/// In-memory reference implementation of [`CoordinationClient`], backed by a
/// `parking_lot::RwLock`-protected map — the same locking primitive
/// `metadata_store::memory::InMemoryMetadataStore` already uses for its
/// cluster state.
pub struct InMemoryCoordinationClient {
    tree: Arc<RwLock<Tree>>,
    watch_tx: mpsc::UnboundedSender<WatchEvent>,
    watched_children: Arc<RwLock<Vec<String>>>,
    watched_data: Arc<RwLock<Vec<String>>>,
}

impl InMemoryCoordinationClient {
    /// Construct a client paired with the receiver end of its watch-event
    /// channel, which `ZkWatchLayer` owns and drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WatchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tree: Arc::new(RwLock::new(Tree::default())),
                watch_tx: tx,
                watched_children: Arc::new(RwLock::new(Vec::new())),
                watched_data: Arc::new(RwLock::new(Vec::new())),
            },
            rx,
        )
    }

    fn children_of(tree: &Tree, prefix: &str) -> Vec<String> {
        let prefix_with_slash = format!("{prefix}/");
        tree.nodes
            .keys()
            .filter_map(|path| {
                path.strip_prefix(&prefix_with_slash)
                    .filter(|rest| !rest.contains('/'))
                    .map(|rest| rest.to_string())
            })
            .collect()
    }

    fn notify_children_changed(&self, path: &str) {
        if self.watched_children.read().iter().any(|p| p == path) {
            let children = Self::children_of(&self.tree.read(), path);
            let _ = self.watch_tx.send(WatchEvent::ChildrenChanged {
                path: path.to_string(),
                children,
            });
        }
    }

    fn notify_data_changed(&self, path: &str) {
        if self.watched_data.read().iter().any(|p| p == path) {
            let _ = self.watch_tx.send(WatchEvent::DataChanged {
                path: path.to_string(),
            });
        }
    }

    fn parent_of(path: &str) -> Option<String> {
        let idx = path.rfind('/')?;
        if idx == 0 {
            Some(String::new())
        } else {
            Some(path[..idx].to_string())
        }
    }
}

impl CoordinationClient for InMemoryCoordinationClient {
    fn create_ephemeral(&self, path: &str, data: Vec<u8>) -> Result<i32, ClusterError> {
        let mut tree = self.tree.write();
        if tree.nodes.contains_key(path) {
            return Err(ClusterError::ControllerMoved {
                context: format!("create_ephemeral({path})"),
            });
        }
        tree.nodes.insert(path.to_string(), Node { data, version: 0 });
        drop(tree);
        if let Some(parent) = Self::parent_of(path) {
            self.notify_children_changed(&parent);
        }
        Ok(0)
    }

    fn get(&self, path: &str) -> Result<Option<(Vec<u8>, i32)>, ClusterError> {
        Ok(self
            .tree
            .read()
            .nodes
            .get(path)
            .map(|n| (n.data.clone(), n.version)))
    }

    fn create_persistent_if_absent(&self, path: &str, data: Vec<u8>) -> Result<(), ClusterError> {
        let mut tree = self.tree.write();
        tree.nodes
            .entry(path.to_string())
            .or_insert(Node { data, version: 0 });
        Ok(())
    }

    fn set_cas(&self, path: &str, data: Vec<u8>, expected_version: i32) -> Result<i32, ClusterError> {
        let new_version = {
            let mut tree = self.tree.write();
            let node = tree
                .nodes
                .entry(path.to_string())
                .or_insert(Node { data: Vec::new(), version: -1 });
            if node.version != expected_version {
                return Err(ClusterError::EpochMismatch {
                    context: path.to_string(),
                    expected: expected_version.max(0) as u64,
                    observed: node.version.max(0) as u64,
                });
            }
            node.data = data;
            node.version += 1;
            node.version
        };
        self.notify_data_changed(path);
        Ok(new_version)
    }

    fn delete(&self, path: &str, expected_version: Option<i32>) -> Result<(), ClusterError> {
        {
            let mut tree = self.tree.write();
            if let Some(expected) = expected_version {
                match tree.nodes.get(path) {
                    Some(node) if node.version == expected => {}
                    Some(node) => {
                        return Err(ClusterError::EpochMismatch {
                            context: path.to_string(),
                            expected: expected.max(0) as u64,
                            observed: node.version.max(0) as u64,
                        });
                    }
                    None => return Ok(()),
                }
            }
            tree.nodes.remove(path);
        }
        if let Some(parent) = Self::parent_of(path) {
            self.notify_children_changed(&parent);
        }
        Ok(())
    }

    fn list_children(&self, path: &str) -> Result<Vec<String>, ClusterError> {
        Ok(Self::children_of(&self.tree.read(), path))
    }

    fn watch_children(&self, path: &str) -> Result<Vec<String>, ClusterError> {
        self.watched_children.write().push(path.to_string());
        self.list_children(path)
    }

    fn watch_data(&self, path: &str) -> Result<Option<(Vec<u8>, i32)>, ClusterError> {
        self.watched_data.write().push(path.to_string());
        self.get(path)
    }

    fn elect_controller(&self, broker_id: BrokerId) -> Result<(u64, i32), ClusterError> {
        let mut tree = self.tree.write();
        if tree.nodes.contains_key(CoordinationPath::CONTROLLER) {
            return Err(ClusterError::ControllerMoved {
                context: "elect_controller".to_string(),
            });
        }
        let data = format!("{{\"brokerid\":{}}}", broker_id.0).into_bytes();
        tree.nodes.insert(
            CoordinationPath::CONTROLLER.to_string(),
            Node { data, version: 0 },
        );

        let epoch_node = tree
            .nodes
            .entry(CoordinationPath::CONTROLLER_EPOCH.to_string())
            .or_insert(Node {
                data: b"0".to_vec(),
                version: -1,
            });
        let current_epoch: u64 = std::str::from_utf8(&epoch_node.data)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let new_epoch = current_epoch + 1;
        epoch_node.data = new_epoch.to_string().into_bytes();
        epoch_node.version += 1;
        let epoch_zk_version = epoch_node.version;

        Ok((new_epoch, epoch_zk_version))
    }

    fn resign_controller(&self, expected_epoch_zk_version: i32) -> Result<(), ClusterError> {
        let mut tree = self.tree.write();
        if let Some(epoch_node) = tree.nodes.get(CoordinationPath::CONTROLLER_EPOCH) {
            if epoch_node.version != expected_epoch_zk_version {
                return Err(ClusterError::EpochMismatch {
                    context: "resign_controller".to_string(),
                    expected: expected_epoch_zk_version.max(0) as u64,
                    observed: epoch_node.version.max(0) as u64,
                });
            }
        }
        tree.nodes.remove(CoordinationPath::CONTROLLER);
        Ok(())
    }
}
