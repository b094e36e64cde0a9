//! `BrokerRequestBatch` (spec §4.6): coalesces the controller-to-broker
//! requests produced while handling one event into one payload per broker,
//! so a single event never sends the same broker two separate RPCs.
//!
//! No teacher module does this directly — the existing heartbeat/gossip
//! machinery sends one RPC per call site. The staging map itself follows
//! `metadata_store::memory::InMemoryMetadataStore`'s internal
//! `HashMap`-keyed bookkeeping; draining into per-broker queues is handed
//! off to [`super::channel_manager::ControllerChannelManager`].

use std::collections::{HashMap, HashSet};

use crate::types::{BrokerId, TopicPartition};

use super::context::LeaderAndIsr;

/// One staged `LeaderAndIsr` entry for a single partition on a single broker.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderAndIsrEntry {
    pub tp: TopicPartition,
    pub leader_and_isr: LeaderAndIsr,
    /// The partition's full assigned-replica set, so the receiving broker
    /// knows who else to expect as a follower.
    pub replicas: Vec<BrokerId>,
}

/// One staged `StopReplica` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReplicaEntry {
    pub tp: TopicPartition,
    pub delete_partition: bool,
}

/// Everything staged for one broker, ready to flush as up to three RPCs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrokerRequests {
    pub leader_and_isr: Vec<LeaderAndIsrEntry>,
    pub stop_replica: Vec<StopReplicaEntry>,
    pub update_metadata: bool,
}

/// Accumulates per-broker requests across the handling of one controller
/// event; call [`BrokerRequestBatch::drain`] once at the end of the handler
/// to get the final coalesced set.
#[derive(Debug, Default)]
pub struct BrokerRequestBatch {
    staged: HashMap<BrokerId, BrokerRequests>,
}

impl BrokerRequestBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_leader_and_isr(
        &mut self,
        broker_id: BrokerId,
        tp: TopicPartition,
        leader_and_isr: LeaderAndIsr,
        replicas: Vec<BrokerId>,
    ) {
        self.staged
            .entry(broker_id)
            .or_default()
            .leader_and_isr
            .push(LeaderAndIsrEntry {
                tp,
                leader_and_isr,
                replicas,
            });
    }

    /// Convenience for staging an election result across all its recipients
    /// in one call (see `partition_state_machine::PartitionLeaderElection`).
    pub fn add_leader_and_isr_for_recipients(
        &mut self,
        recipients: &[BrokerId],
        tp: &TopicPartition,
        leader_and_isr: &LeaderAndIsr,
    ) {
        for &broker_id in recipients {
            self.add_leader_and_isr(broker_id, tp.clone(), leader_and_isr.clone(), recipients.to_vec());
        }
    }

    pub fn add_stop_replica(&mut self, broker_id: BrokerId, tp: TopicPartition, delete_partition: bool) {
        self.staged
            .entry(broker_id)
            .or_default()
            .stop_replica
            .push(StopReplicaEntry {
                tp,
                delete_partition,
            });
    }

    pub fn add_update_metadata(&mut self, broker_ids: impl IntoIterator<Item = BrokerId>) {
        for broker_id in broker_ids {
            self.staged.entry(broker_id).or_default().update_metadata = true;
        }
    }

    pub fn add_update_metadata_to_all(&mut self, live_broker_ids: &HashSet<BrokerId>) {
        self.add_update_metadata(live_broker_ids.iter().copied());
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Drains every staged request, leaving the batch empty for reuse.
    pub fn drain(&mut self) -> HashMap<BrokerId, BrokerRequests> {
        std::mem::take(&mut self.staged)
    }
}
