//! Replica state machine (spec §4.5).
//!
//! ```text
//! NonExistentReplica    -> NewReplica
//! NewReplica            -> OnlineReplica
//! OnlineReplica         -> OnlineReplica, OfflineReplica
//! OfflineReplica        -> OnlineReplica, ReplicaDeletionStarted, ReplicaDeletionIneligible
//! ReplicaDeletionStarted    -> ReplicaDeletionSuccessful, ReplicaDeletionIneligible
//! ReplicaDeletionSuccessful -> NonExistentReplica
//! ReplicaDeletionIneligible -> OfflineReplica, OnlineReplica
//! ```
//!
//! ISR membership is not this module's concern: shrinking the ISR when a
//! replica goes offline is the caller's job (`super::isr`), run *before*
//! requesting the `OfflineReplica` transition, mirroring how the original
//! design separates `removeReplicasFromIsr` from `handleStateChanges`.

use crate::types::BrokerId;

use super::context::{ControllerContext, PartitionReplica};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplicaState {
    NewReplica,
    OnlineReplica,
    OfflineReplica,
    ReplicaDeletionStarted,
    ReplicaDeletionSuccessful,
    ReplicaDeletionIneligible,
    NonExistentReplica,
}

fn valid_transition(from: ReplicaState, to: ReplicaState) -> bool {
    use ReplicaState::*;
    matches!(
        (from, to),
        (NonExistentReplica, NewReplica)
            | (NewReplica, OnlineReplica)
            | (OnlineReplica, OnlineReplica)
            | (OnlineReplica, OfflineReplica)
            | (OfflineReplica, OnlineReplica)
            | (OfflineReplica, ReplicaDeletionStarted)
            | (OfflineReplica, ReplicaDeletionIneligible)
            | (ReplicaDeletionStarted, ReplicaDeletionSuccessful)
            | (ReplicaDeletionStarted, ReplicaDeletionIneligible)
            | (ReplicaDeletionSuccessful, NonExistentReplica)
            | (ReplicaDeletionIneligible, OfflineReplica)
            | (ReplicaDeletionIneligible, OnlineReplica)
    )
}

/// What the caller must do as a side effect of a transition, handed back so
/// `super::batch` can stage the right broker request (spec §4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicaRequestHint {
    /// Send a `LeaderAndIsr` request so the replica starts/continues fetching.
    SendLeaderAndIsr,
    /// Send `StopReplica { delete_partition: false }`.
    SendStopReplicaWithoutDeletion,
    /// Send `StopReplica { delete_partition: true }`.
    SendStopReplicaWithDeletion,
}

pub struct ReplicaStateMachine;

impl ReplicaStateMachine {
    /// Drives one replica toward `target_state`. Returns `Ok(None)` for an
    /// invalid transition (a no-op, not an error — see
    /// `partition_state_machine` for the same convention).
    pub fn handle_state_change(
        ctx: &mut ControllerContext,
        replica: &PartitionReplica,
        target_state: ReplicaState,
    ) -> Option<ReplicaRequestHint> {
        let current = ctx.replica_state(replica);
        if !valid_transition(current, target_state) {
            tracing::trace!(
                ?replica,
                ?current,
                ?target_state,
                "skipping invalid replica state transition"
            );
            return None;
        }

        let hint = match target_state {
            ReplicaState::NewReplica => {
                Self::add_to_assignment(ctx, replica);
                Some(ReplicaRequestHint::SendLeaderAndIsr)
            }
            ReplicaState::OnlineReplica => {
                Self::add_to_assignment(ctx, replica);
                Some(ReplicaRequestHint::SendLeaderAndIsr)
            }
            ReplicaState::OfflineReplica => Some(ReplicaRequestHint::SendStopReplicaWithoutDeletion),
            ReplicaState::ReplicaDeletionStarted => Some(ReplicaRequestHint::SendStopReplicaWithDeletion),
            ReplicaState::ReplicaDeletionSuccessful => {
                Self::remove_from_assignment(ctx, replica);
                None
            }
            ReplicaState::ReplicaDeletionIneligible | ReplicaState::NonExistentReplica => None,
        };

        if target_state == ReplicaState::NonExistentReplica {
            ctx.replica_states.remove(replica);
        } else {
            ctx.replica_states.insert(replica.clone(), target_state);
        }

        hint
    }

    /// Bulk variant: runs every replica through the same target transition,
    /// mirroring the original's `handleStateChanges` signature that always
    /// takes a batch rather than one replica at a time.
    pub fn handle_state_changes(
        ctx: &mut ControllerContext,
        replicas: &[PartitionReplica],
        target_state: ReplicaState,
    ) -> Vec<(PartitionReplica, ReplicaRequestHint)> {
        replicas
            .iter()
            .filter_map(|replica| {
                Self::handle_state_change(ctx, replica, target_state)
                    .map(|hint| (replica.clone(), hint))
            })
            .collect()
    }

    fn add_to_assignment(ctx: &mut ControllerContext, replica: &PartitionReplica) {
        let tp = &replica.topic_partition;
        let partitions = ctx
            .partition_assignments
            .entry(tp.topic.clone())
            .or_default();
        let assigned = partitions.entry(tp.partition).or_default();
        if !assigned.contains(&replica.broker_id) {
            assigned.push(replica.broker_id);
        }
        ctx.all_topics.insert(tp.topic.clone());
    }

    fn remove_from_assignment(ctx: &mut ControllerContext, replica: &PartitionReplica) {
        let tp = &replica.topic_partition;
        if let Some(partitions) = ctx.partition_assignments.get_mut(&tp.topic) {
            if let Some(assigned) = partitions.get_mut(&tp.partition) {
                assigned.retain(|&b: &BrokerId| b != replica.broker_id);
            }
        }
    }
}
