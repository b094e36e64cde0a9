//! `TopicDeletionManager` (spec §4.11): orchestrates topic-deletion lifecycle
//! across a topic's replicas.
//!
//! A topic queued for deletion is **eligible** unless one of its partitions is
//! mid-reassignment or has a replica on a dead broker, in which case it is
//! parked as **ineligible** rather than failed outright — `resume_eligible`
//! re-checks every parked topic whenever a condition that might have cleared
//! it fires (a reassignment completing, a broker rejoining). This mirrors the
//! same "no RPC confirmation event, so drive the state machine straight
//! through" simplification already used by `reassignment::maybe_complete_reassignment`.

use std::collections::HashSet;

use crate::ClusterError;

use super::batch::BrokerRequestBatch;
use super::context::{ControllerContext, PartitionReplica};
use super::coordination::{CoordinationClient, CoordinationPath};
use super::partition_state_machine::{PartitionState, PartitionStateMachine};
use super::replica_state_machine::{ReplicaRequestHint, ReplicaState, ReplicaStateMachine};

#[derive(Debug, Default)]
pub struct TopicDeletionManager {
    topics_to_be_deleted: HashSet<String>,
    topics_ineligible_for_deletion: HashSet<String>,
}

impl TopicDeletionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue_topic_for_deletion(&mut self, topic: &str) {
        self.topics_to_be_deleted.insert(topic.to_string());
    }

    pub fn is_topic_queued_for_deletion(&self, topic: &str) -> bool {
        self.topics_to_be_deleted.contains(topic)
    }

    pub fn is_topic_ineligible(&self, topic: &str) -> bool {
        self.topics_ineligible_for_deletion.contains(topic)
    }

    fn mark_topic_ineligible(&mut self, topic: &str) {
        if self.topics_to_be_deleted.contains(topic) {
            self.topics_ineligible_for_deletion.insert(topic.to_string());
        }
    }

    fn is_topic_eligible(&self, topic: &str) -> bool {
        self.topics_to_be_deleted.contains(topic) && !self.topics_ineligible_for_deletion.contains(topic)
    }

    pub fn topics_to_be_deleted(&self) -> Vec<String> {
        self.topics_to_be_deleted.iter().cloned().collect()
    }

    /// Clears ineligibility for any parked topic whose blocking condition no
    /// longer holds, returning the topics that became eligible again so the
    /// caller can re-enqueue a `TopicDeletion` event for them.
    pub fn resume_eligible(&mut self, ctx: &ControllerContext) -> Vec<String> {
        let ineligible: Vec<String> = self.topics_ineligible_for_deletion.iter().cloned().collect();
        let mut resumed = Vec::new();
        for topic in ineligible {
            if !Self::topic_blocked(ctx, &topic) {
                self.topics_ineligible_for_deletion.remove(&topic);
                resumed.push(topic);
            }
        }
        resumed
    }

    fn topic_blocked(ctx: &ControllerContext, topic: &str) -> bool {
        let partitions = ctx.partitions_for_topic(topic);
        let reassigning = partitions
            .iter()
            .any(|tp| ctx.partitions_being_reassigned.contains_key(tp));
        let has_dead_replica = partitions.iter().any(|tp| {
            ctx.assigned_replicas(tp)
                .into_iter()
                .any(|b| !ctx.is_broker_live(b))
        });
        reassigning || has_dead_replica
    }

    /// Drives every partition of `topic` through the replica lifecycle toward
    /// deletion (spec §4.11), then drops the topic once every replica is gone.
    /// Marks the topic ineligible instead of erroring if a partition is
    /// mid-reassignment or has a replica on a dead broker.
    pub fn start_deletion(
        &mut self,
        ctx: &mut ControllerContext,
        coordination: &dyn CoordinationClient,
        batch: &mut BrokerRequestBatch,
        topic: &str,
    ) -> Result<(), ClusterError> {
        if !self.is_topic_eligible(topic) {
            return Ok(());
        }

        if Self::topic_blocked(ctx, topic) {
            self.mark_topic_ineligible(topic);
            return Ok(());
        }

        for tp in ctx.partitions_for_topic(topic) {
            let replicas: Vec<PartitionReplica> = ctx
                .assigned_replicas(&tp)
                .into_iter()
                .map(|b| PartitionReplica::new(tp.clone(), b))
                .collect();

            for (replica, hint) in
                ReplicaStateMachine::handle_state_changes(ctx, &replicas, ReplicaState::OfflineReplica)
            {
                if hint == ReplicaRequestHint::SendStopReplicaWithoutDeletion {
                    batch.add_stop_replica(replica.broker_id, tp.clone(), false);
                }
            }

            let deletion_hints = ReplicaStateMachine::handle_state_changes(
                ctx,
                &replicas,
                ReplicaState::ReplicaDeletionStarted,
            );
            for (replica, hint) in deletion_hints {
                if hint == ReplicaRequestHint::SendStopReplicaWithDeletion {
                    batch.add_stop_replica(replica.broker_id, tp.clone(), true);
                }
            }

            ReplicaStateMachine::handle_state_changes(ctx, &replicas, ReplicaState::ReplicaDeletionSuccessful);
            ReplicaStateMachine::handle_state_changes(ctx, &replicas, ReplicaState::NonExistentReplica);
        }

        self.complete_deletion(ctx, coordination, topic)
    }

    /// Once every replica of `topic` has reached `NonExistentReplica`, drops
    /// the topic from context and its coordination-service paths.
    fn complete_deletion(
        &mut self,
        ctx: &mut ControllerContext,
        coordination: &dyn CoordinationClient,
        topic: &str,
    ) -> Result<(), ClusterError> {
        let partitions = ctx.partitions_for_topic(topic);
        let all_deleted = partitions.iter().all(|tp| {
            ctx.assigned_replicas(tp).is_empty()
                && ctx.replica_states.keys().all(|r| r.topic_partition != *tp)
        });
        if !all_deleted {
            return Ok(());
        }

        let fsm = PartitionStateMachine::new(coordination);
        for tp in &partitions {
            fsm.handle_state_change(ctx, tp, PartitionState::NonExistent, None, &HashSet::new())?;
            ctx.partition_leadership.remove(tp);
        }
        ctx.partition_assignments.remove(topic);
        ctx.all_topics.remove(topic);

        self.topics_to_be_deleted.remove(topic);
        self.topics_ineligible_for_deletion.remove(topic);

        coordination.delete(&CoordinationPath::delete_topic(topic), None)?;
        coordination.delete(&CoordinationPath::topic(topic), None)?;

        Ok(())
    }
}
