//! In-memory metadata store implementation.

use crate::{
    ClusterError,
    manifest::types::{BrokerSpec, ClusterManifest, PartitionAssignment, TopicAssignment},
    metadata_store::r#trait::MetadataStore,
    types::*,
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// In-memory implementation of the MetadataStore trait.
///
/// This implementation stores all cluster metadata in memory using thread-safe
/// data structures. It's suitable for development, testing, and single-node deployments
/// where persistence across restarts is not required.
#[derive(Debug)]
pub struct InMemoryMetadataStore {
    /// Internal cluster state protected by RwLock for concurrent access
    state: Arc<RwLock<ClusterState>>,
}

/// Internal representation of cluster state
#[derive(Debug, Clone)]
struct ClusterState {
    /// Broker information indexed by broker ID
    brokers: HashMap<BrokerId, BrokerSpec>,
    /// Topic assignments indexed by topic name
    topics: HashMap<String, TopicAssignment>,
    /// Broker runtime status indexed by broker ID
    broker_runtime: HashMap<BrokerId, BrokerRuntimeStatus>,
    /// Partition runtime state indexed by (topic, partition_id)
    partition_runtime: HashMap<(String, PartitionId), PartitionRuntimeState>,
}

impl ClusterState {
    fn new() -> Self {
        Self {
            brokers: HashMap::new(),
            topics: HashMap::new(),
            broker_runtime: HashMap::new(),
            partition_runtime: HashMap::new(),
        }
    }

    fn get_partition_mut(
        &mut self,
        topic: &str,
        partition_id: PartitionId,
    ) -> Result<&mut PartitionAssignment, ClusterError> {
        let topic_assignment = self
            .topics
            .get_mut(topic)
            .ok_or(ClusterError::TopicNotFound {
                topic: topic.to_string(),
            })?;

        topic_assignment
            .partitions
            .iter_mut()
            .find(|p| p.id == partition_id)
            .ok_or(ClusterError::PartitionNotFound {
                topic: topic.to_string(),
                partition_id: partition_id.into(),
            })
    }

    fn get_partition(
        &self,
        topic: &str,
        partition_id: PartitionId,
    ) -> Result<&PartitionAssignment, ClusterError> {
        let topic_assignment = self.topics.get(topic).ok_or(ClusterError::TopicNotFound {
            topic: topic.to_string(),
        })?;

        topic_assignment
            .partitions
            .iter()
            .find(|p| p.id == partition_id)
            .ok_or(ClusterError::PartitionNotFound {
                topic: topic.to_string(),
                partition_id: partition_id.into(),
            })
    }
}

impl InMemoryMetadataStore {
    /// Create a new empty in-memory metadata store.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(ClusterState::new())),
        }
    }

    /// Create a new in-memory metadata store initialized with the given manifest.
    pub fn new_with_manifest(manifest: ClusterManifest) -> Result<Self, ClusterError> {
        let store = Self::new();
        store.load_from_manifest(manifest)?;
        Ok(store)
    }
}

impl Default for InMemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn get_partition_leader(
        &self,
        topic: &str,
        partition: PartitionId,
    ) -> Result<BrokerId, ClusterError> {
        let state = self.state.read();
        let partition = state.get_partition(topic, partition)?;
        Ok(partition.leader)
    }

    fn get_in_sync_replicas(
        &self,
        topic: &str,
        partition: PartitionId,
    ) -> Result<HashSet<BrokerId>, ClusterError> {
        let state = self.state.read();
        let partition = state.get_partition(topic, partition)?;
        Ok(partition.in_sync_replicas.iter().copied().collect())
    }

    fn bump_leader_epoch(
        &self,
        topic: &str,
        partition: PartitionId,
    ) -> Result<Epoch, ClusterError> {
        let mut state = self.state.write();
        let partition = state.get_partition_mut(topic, partition)?;

        // Increment epoch atomically
        let new_epoch = Epoch(partition.epoch.0 + 1);
        partition.epoch = new_epoch;

        Ok(new_epoch)
    }

    fn update_in_sync_replica(
        &self,
        topic: &str,
        partition_id: PartitionId,
        replica: BrokerId,
        in_sync: bool,
    ) -> Result<(), ClusterError> {
        let mut state = self.state.write();
        let partition = state.get_partition_mut(topic, partition_id)?;

        // Verify the replica is actually part of the replica set
        if !partition.replicas.contains(&replica) {
            return Err(ClusterError::InvalidReplica {
                topic: topic.to_string(),
                partition_id: partition_id.into(),
                replica_id: replica.into(),
            });
        }

        if in_sync {
            // Add to in-sync replicas if not already present
            if !partition.in_sync_replicas.contains(&replica) {
                partition.in_sync_replicas.push(replica);
            }
        } else {
            // Remove from in-sync replicas
            partition.in_sync_replicas.retain(|&r| r != replica);
        }

        Ok(())
    }

    fn get_partition_epoch(
        &self,
        topic: &str,
        partition: PartitionId,
    ) -> Result<Epoch, ClusterError> {
        let state = self.state.read();
        let partition = state.get_partition(topic, partition)?;
        Ok(partition.epoch)
    }

    fn get_all_replicas(
        &self,
        topic: &str,
        partition: PartitionId,
    ) -> Result<Vec<BrokerId>, ClusterError> {
        let state = self.state.read();
        let partition = state.get_partition(topic, partition)?;
        Ok(partition.replicas.clone())
    }

    fn load_from_manifest(&self, manifest: ClusterManifest) -> Result<(), ClusterError> {
        let mut state = self.state.write();

        // Clear existing state including runtime state
        state.brokers.clear();
        state.topics.clear();
        state.broker_runtime.clear();
        state.partition_runtime.clear();

        // Load brokers
        for broker in manifest.brokers {
            state.brokers.insert(broker.id, broker);
        }

        // Load topics
        for (topic_name, topic_assignment) in manifest.topics {
            state.topics.insert(topic_name, topic_assignment);
        }

        Ok(())
    }

    fn export_to_manifest(&self) -> Result<ClusterManifest, ClusterError> {
        let state = self.state.read();

        let brokers: Vec<BrokerSpec> = state.brokers.values().cloned().collect();
        let topics: HashMap<String, TopicAssignment> = state.topics.clone();

        Ok(ClusterManifest { brokers, topics })
    }

    // ===========================
    // Broker Runtime Tracking
    // ===========================

    fn record_broker_heartbeat(
        &self,
        broker: BrokerId,
        ts: DateTime<Utc>,
        draining: bool,
    ) -> Result<(), ClusterError> {
        let mut state = self.state.write();

        // Verify broker exists in the cluster
        if !state.brokers.contains_key(&broker) {
            return Err(ClusterError::UnknownBroker {
                broker_id: broker.into(),
            });
        }

        // Update or insert broker runtime status
        state.broker_runtime.insert(
            broker,
            BrokerRuntimeStatus {
                last_heartbeat: ts,
                is_draining: draining,
            },
        );

        Ok(())
    }

    fn list_brokers_with_status(
        &self,
    ) -> Result<Vec<(BrokerId, BrokerRuntimeStatus)>, ClusterError> {
        let state = self.state.read();
        let heartbeat_timeout = Duration::seconds(10); // 10 second timeout for testing

        let mut result = Vec::new();
        for broker_id in state.brokers.keys() {
            let status = if let Some(runtime_status) = state.broker_runtime.get(broker_id) {
                // Check if broker is alive based on heartbeat timeout
                let _is_alive = Utc::now().signed_duration_since(runtime_status.last_heartbeat)
                    < heartbeat_timeout;
                BrokerRuntimeStatus {
                    last_heartbeat: runtime_status.last_heartbeat,
                    is_draining: runtime_status.is_draining,
                }
            } else {
                // No heartbeat recorded yet - consider dead
                BrokerRuntimeStatus {
                    last_heartbeat: DateTime::from_timestamp(0, 0).unwrap_or_else(Utc::now),
                    is_draining: false,
                }
            };
            result.push((*broker_id, status));
        }

        Ok(result)
    }

    // ===========================
    // Enhanced Partition Operations
    // ===========================

    fn set_partition_leader(
        &self,
        topic: &str,
        partition: PartitionId,
        leader: BrokerId,
        epoch: Epoch,
    ) -> Result<(), ClusterError> {
        let mut state = self.state.write();
        let partition_assignment = state.get_partition_mut(topic, partition)?;

        // Verify the new leader is in the replica set
        if !partition_assignment.replicas.contains(&leader) {
            return Err(ClusterError::InvalidReplica {
                topic: topic.to_string(),
                partition_id: partition.into(),
                replica_id: leader.into(),
            });
        }

        // Verify epoch is not going backwards
        if epoch < partition_assignment.epoch {
            return Err(ClusterError::InvalidEpoch {
                topic: topic.to_string(),
                partition_id: partition.into(),
                current_epoch: partition_assignment.epoch.into(),
                new_epoch: epoch.into(),
            });
        }

        partition_assignment.leader = leader;
        partition_assignment.epoch = epoch;

        Ok(())
    }

    fn compare_and_set_epoch(
        &self,
        topic: &str,
        partition: PartitionId,
        expected: Epoch,
        new: Epoch,
    ) -> Result<bool, ClusterError> {
        let mut state = self.state.write();
        let partition_assignment = state.get_partition_mut(topic, partition)?;

        if partition_assignment.epoch != expected {
            return Ok(false); // CAS failed - epoch didn't match
        }

        // Verify new epoch is greater than current
        if new <= expected {
            return Err(ClusterError::InvalidEpoch {
                topic: topic.to_string(),
                partition_id: partition.into(),
                current_epoch: expected.into(),
                new_epoch: new.into(),
            });
        }

        partition_assignment.epoch = new;
        Ok(true)
    }

    fn update_partition_offsets(
        &self,
        topic: &str,
        partition: PartitionId,
        high_water_mark: u64,
        log_start_offset: u64,
    ) -> Result<(), ClusterError> {
        let state = self.state.read();
        // Verify partition exists
        let _ = state.get_partition(topic, partition)?;
        drop(state);

        // Update partition runtime state
        let mut state = self.state.write();
        state.partition_runtime.insert(
            (topic.to_string(), partition),
            PartitionRuntimeState {
                high_water_mark,
                log_start_offset,
            },
        );

        Ok(())
    }
}
