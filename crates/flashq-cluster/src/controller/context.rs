//! `ControllerContext`: the controller's in-memory source-of-truth cache.
//!
//! Mutated only from the event loop (see [`super::event::EventManager`]); readers
//! outside the loop may only consult [`super::metrics::ControllerMetrics`], never
//! this struct directly.

use crate::manifest::types::{BrokerSpec, ClusterManifest, PartitionAssignment};
use crate::types::{BrokerId, PartitionId, TopicPartition};
use std::collections::{HashMap, HashSet};

use super::partition_state_machine::PartitionState;
use super::replica_state_machine::ReplicaState;

/// A replica is identified jointly by the partition it belongs to and the
/// broker hosting it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionReplica {
    pub topic_partition: TopicPartition,
    pub broker_id: BrokerId,
}

impl PartitionReplica {
    pub fn new(topic_partition: TopicPartition, broker_id: BrokerId) -> Self {
        Self {
            topic_partition,
            broker_id,
        }
    }
}

/// Leadership and in-sync-replica state for one partition, plus the
/// coordination-service version used for the next conditional write.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderAndIsr {
    /// `None` represents "no leader" (the `-1` sentinel in the original design).
    pub leader: Option<BrokerId>,
    pub leader_epoch: u64,
    pub isr: Vec<BrokerId>,
    pub zk_version: i32,
}

impl LeaderAndIsr {
    pub fn new(leader: Option<BrokerId>, leader_epoch: u64, isr: Vec<BrokerId>) -> Self {
        Self {
            leader,
            leader_epoch,
            isr,
            zk_version: 0,
        }
    }
}

/// The leadership state last written, tagged with the controller epoch that wrote it.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderIsrAndControllerEpoch {
    pub leader_and_isr: LeaderAndIsr,
    pub controller_epoch: u64,
}

/// Bookkeeping for a partition reassignment in flight: the replica set being
/// moved to. The original design's `isrChangeWatchHandle` is not stored here —
/// the watch registration lives in `ZkWatchLayer`, keyed by topic-partition.
#[derive(Debug, Clone, PartialEq)]
pub struct ReassignmentContext {
    pub new_replicas: Vec<BrokerId>,
}

/// The controller's aggregate in-memory cache of cluster state (spec §3/§4.2).
#[derive(Debug, Default)]
pub struct ControllerContext {
    pub all_topics: HashSet<String>,
    /// topic -> partition -> ordered assigned replicas (first = preferred leader)
    pub partition_assignments: HashMap<String, HashMap<PartitionId, Vec<BrokerId>>>,
    pub partition_leadership: HashMap<TopicPartition, LeaderIsrAndControllerEpoch>,
    pub partition_states: HashMap<TopicPartition, PartitionState>,
    pub replica_states: HashMap<PartitionReplica, ReplicaState>,
    pub partitions_being_reassigned: HashMap<TopicPartition, ReassignmentContext>,
    pub replicas_on_offline_dirs: HashMap<BrokerId, HashSet<TopicPartition>>,
    pub live_brokers: HashMap<BrokerId, BrokerSpec>,
    pub shutting_down_broker_ids: HashSet<BrokerId>,
    pub epoch: u64,
    pub epoch_zk_version: i32,
}

impl ControllerContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tear down controller context at resignation: clear every map, reset the epoch.
    /// Channel manager / scheduler shutdown happen in the owning `KafkaController`.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn live_broker_ids(&self) -> HashSet<BrokerId> {
        self.live_brokers.keys().copied().collect()
    }

    pub fn live_or_shutting_down_broker_ids(&self) -> HashSet<BrokerId> {
        self.live_broker_ids()
            .union(&self.shutting_down_broker_ids)
            .copied()
            .collect()
    }

    pub fn is_broker_live(&self, broker_id: BrokerId) -> bool {
        self.live_brokers.contains_key(&broker_id)
    }

    pub fn assigned_replicas(&self, tp: &TopicPartition) -> Vec<BrokerId> {
        self.partition_assignments
            .get(&tp.topic)
            .and_then(|partitions| partitions.get(&tp.partition))
            .cloned()
            .unwrap_or_default()
    }

    pub fn preferred_leader(&self, tp: &TopicPartition) -> Option<BrokerId> {
        self.assigned_replicas(tp).first().copied()
    }

    /// Overwrites `tp`'s assigned-replica list, creating the topic/partition
    /// entry if absent (used by `super::reassignment` to persist AR in memory).
    pub fn set_assigned_replicas(&mut self, tp: &TopicPartition, replicas: Vec<BrokerId>) {
        self.all_topics.insert(tp.topic.clone());
        self.partition_assignments
            .entry(tp.topic.clone())
            .or_default()
            .insert(tp.partition, replicas);
    }

    pub fn all_partitions(&self) -> Vec<TopicPartition> {
        self.partition_assignments
            .iter()
            .flat_map(|(topic, partitions)| {
                partitions
                    .keys()
                    .map(move |&partition| TopicPartition::new(topic.clone(), partition))
            })
            .collect()
    }

    pub fn partitions_for_topic(&self, topic: &str) -> Vec<TopicPartition> {
        self.partition_assignments
            .get(topic)
            .map(|partitions| {
                partitions
                    .keys()
                    .map(|&partition| TopicPartition::new(topic.to_string(), partition))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All replicas hosted on any of the given brokers, across all partitions.
    pub fn replicas_on_brokers(&self, broker_ids: &HashSet<BrokerId>) -> Vec<PartitionReplica> {
        self.all_partitions()
            .into_iter()
            .flat_map(|tp| {
                let replicas = self.assigned_replicas(&tp);
                replicas
                    .into_iter()
                    .filter(|broker_id| broker_ids.contains(broker_id))
                    .map(move |broker_id| PartitionReplica::new(tp.clone(), broker_id))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn partitions_on_broker(&self, broker_id: BrokerId) -> Vec<TopicPartition> {
        self.all_partitions()
            .into_iter()
            .filter(|tp| self.assigned_replicas(tp).contains(&broker_id))
            .collect()
    }

    pub fn all_live_replicas(&self) -> Vec<PartitionReplica> {
        self.replicas_on_brokers(&self.live_broker_ids())
    }

    /// A replica is online iff its broker is live and the partition is not
    /// parked on a known-offline log directory for that broker (spec invariant 5).
    pub fn is_replica_online(&self, broker_id: BrokerId, tp: &TopicPartition) -> bool {
        if !self.is_broker_live(broker_id) {
            return false;
        }
        !self
            .replicas_on_offline_dirs
            .get(&broker_id)
            .is_some_and(|offline| offline.contains(tp))
    }

    pub fn leader_of(&self, tp: &TopicPartition) -> Option<BrokerId> {
        self.partition_leadership
            .get(tp)
            .and_then(|l| l.leader_and_isr.leader)
    }

    pub fn partition_state(&self, tp: &TopicPartition) -> PartitionState {
        self.partition_states
            .get(tp)
            .copied()
            .unwrap_or(PartitionState::NonExistent)
    }

    pub fn replica_state(&self, replica: &PartitionReplica) -> ReplicaState {
        self.replica_states
            .get(replica)
            .copied()
            .unwrap_or(ReplicaState::NonExistentReplica)
    }

    /// Load (topics, assignments, leadership) from a manifest, as done during
    /// controller failover bootstrap (spec §4.12).
    pub fn load_from_manifest(&mut self, manifest: &ClusterManifest) {
        self.live_brokers = manifest
            .brokers
            .iter()
            .map(|b| (b.id, b.clone()))
            .collect();

        for (topic, assignment) in &manifest.topics {
            self.all_topics.insert(topic.clone());
            let mut partitions = HashMap::new();
            for partition in &assignment.partitions {
                partitions.insert(partition.id, partition.replicas.clone());
                let tp = TopicPartition::new(topic.clone(), partition.id);
                self.partition_leadership.insert(
                    tp.clone(),
                    LeaderIsrAndControllerEpoch {
                        leader_and_isr: LeaderAndIsr {
                            leader: Some(partition.leader),
                            leader_epoch: partition.epoch.0,
                            isr: partition.in_sync_replicas.clone(),
                            zk_version: 0,
                        },
                        controller_epoch: self.epoch,
                    },
                );
                self.partition_states.insert(tp.clone(), PartitionState::Online);
                for &replica_broker in &partition.replicas {
                    self.replica_states.insert(
                        PartitionReplica::new(tp.clone(), replica_broker),
                        ReplicaState::OnlineReplica,
                    );
                }
            }
            self.partition_assignments.insert(topic.clone(), partitions);
        }
    }

    /// Export current topic/partition/leadership state back into manifest shape,
    /// e.g. for `describe_cluster`-style reads.
    pub fn export_manifest(&self) -> ClusterManifest {
        let mut manifest = ClusterManifest::new();
        manifest.brokers = self.live_brokers.values().cloned().collect();

        for (topic, partitions) in &self.partition_assignments {
            let mut partition_assignments = Vec::new();
            for (&partition_id, replicas) in partitions {
                let tp = TopicPartition::new(topic.clone(), partition_id);
                let leadership = self.partition_leadership.get(&tp);
                partition_assignments.push(PartitionAssignment {
                    id: partition_id,
                    leader: leadership
                        .and_then(|l| l.leader_and_isr.leader)
                        .unwrap_or(BrokerId(0)),
                    replicas: replicas.clone(),
                    in_sync_replicas: leadership
                        .map(|l| l.leader_and_isr.isr.clone())
                        .unwrap_or_default(),
                    epoch: crate::types::Epoch(
                        leadership.map(|l| l.leader_and_isr.leader_epoch).unwrap_or(0),
                    ),
                });
            }
            manifest.topics.insert(
                topic.clone(),
                crate::manifest::types::TopicAssignment {
                    partitions: partition_assignments,
                    replication_factor: partitions
                        .values()
                        .map(|r| r.len() as u8)
                        .max()
                        .unwrap_or(0),
                },
            );
        }

        manifest
    }
}
