//! Partition reassignment, the twelve-step protocol from spec §4.8.
//!
//! Re-entrant by construction: every step only reads and writes
//! [`ControllerContext`]/coordination-service state, never local variables
//! that would be lost between event-loop turns, so a crash or controller
//! failover between any two steps resumes cleanly from whichever step's
//! precondition is no longer met. `AR` (the persisted union `OAR ∪ RAR`) is
//! the recovery anchor: steps 1-10 never shrink persisted `AR` below that
//! union until step 10 commits the final `RAR`.

use std::collections::HashSet;

use crate::ClusterError;
use crate::types::{BrokerId, TopicPartition};

use super::batch::BrokerRequestBatch;
use super::context::{ControllerContext, PartitionReplica, ReassignmentContext};
use super::coordination::CoordinationClient;
use super::partition_state_machine::{LeaderElectionStrategy, PartitionState, PartitionStateMachine};
use super::replica_state_machine::{ReplicaRequestHint, ReplicaState, ReplicaStateMachine};

/// Begins reassigning `tp` to `new_replicas` (spec §4.8 steps 1-3). Idempotent:
/// calling it again for a partition already under reassignment just
/// re-applies the same union/NewReplica bookkeeping harmlessly.
pub fn start_reassignment(
    ctx: &mut ControllerContext,
    coordination: &dyn CoordinationClient,
    batch: &mut BrokerRequestBatch,
    tp: &TopicPartition,
    new_replicas: Vec<BrokerId>,
    isr_cas_max_retries: u32,
) -> Result<(), ClusterError> {
    let oar = ctx.assigned_replicas(tp);
    let oar_set: HashSet<BrokerId> = oar.iter().copied().collect();
    let rar_set: HashSet<BrokerId> = new_replicas.iter().copied().collect();

    // Step 1: persist AR = OAR ∪ RAR.
    let union: Vec<BrokerId> = oar
        .iter()
        .copied()
        .chain(new_replicas.iter().copied().filter(|b| !oar_set.contains(b)))
        .collect();
    ctx.set_assigned_replicas(tp, union.clone());

    ctx.partitions_being_reassigned.insert(
        tp.clone(),
        ReassignmentContext {
            new_replicas: new_replicas.clone(),
        },
    );

    // Step 2: bump epoch, keep the current leader, send LeaderAndIsr(AR=union)
    // to every replica in the union. Leader re-election is deferred entirely
    // to step 7: electing here would fail outright whenever OAR and RAR are
    // disjoint, since no RAR member is in ISR yet and every selector requires
    // a live, in-sync candidate.
    if let Some(refreshed) = super::isr::update_leader_epoch(coordination, ctx, tp, isr_cas_max_retries)? {
        batch.add_leader_and_isr_for_recipients(&union, tp, &refreshed);
    }

    // Step 3: replicas in RAR - OAR start as NewReplica.
    let joining: Vec<PartitionReplica> = new_replicas
        .iter()
        .copied()
        .filter(|b| !oar_set.contains(b))
        .map(|b| PartitionReplica::new(tp.clone(), b))
        .collect();
    ReplicaStateMachine::handle_state_changes(ctx, &joining, ReplicaState::NewReplica);

    let _ = rar_set;
    Ok(())
}

/// Step 4's wait condition, re-checked on every ISR-change watch firing for
/// `tp`. Returns `true` and advances through steps 5-12 once every replica in
/// RAR has caught up to the ISR; returns `false` (no-op) otherwise.
pub fn maybe_complete_reassignment(
    ctx: &mut ControllerContext,
    coordination: &dyn CoordinationClient,
    batch: &mut BrokerRequestBatch,
    tp: &TopicPartition,
    unclean_election_enabled: bool,
    isr_cas_max_retries: u32,
) -> Result<bool, ClusterError> {
    let Some(reassignment) = ctx.partitions_being_reassigned.get(tp).cloned() else {
        return Ok(false);
    };
    let rar = reassignment.new_replicas;

    let current_isr: HashSet<BrokerId> = ctx
        .partition_leadership
        .get(tp)
        .map(|l| l.leader_and_isr.isr.iter().copied().collect())
        .unwrap_or_default();
    if !rar.iter().all(|b| current_isr.contains(b)) {
        return Ok(false);
    }

    let oar: Vec<BrokerId> = ctx.assigned_replicas(tp);
    let oar_set: HashSet<BrokerId> = oar.iter().copied().collect();
    let rar_set: HashSet<BrokerId> = rar.iter().copied().collect();
    let departing: Vec<BrokerId> = oar.iter().copied().filter(|b| !rar_set.contains(b)).collect();

    // Step 5: RAR -> OnlineReplica.
    let rar_replicas: Vec<PartitionReplica> = rar
        .iter()
        .copied()
        .map(|b| PartitionReplica::new(tp.clone(), b))
        .collect();
    ReplicaStateMachine::handle_state_changes(ctx, &rar_replicas, ReplicaState::OnlineReplica);

    // Step 6: in memory, AR = RAR (finalized on the coordination service at step 10).
    ctx.set_assigned_replicas(tp, rar.clone());

    // Step 7: leadership follow-up.
    let fsm = PartitionStateMachine::new(coordination);
    let current_leader = ctx.leader_of(tp);
    let leader_still_eligible = current_leader.is_some_and(|l| rar_set.contains(&l));
    if !leader_still_eligible {
        if let Some(election) = fsm.handle_state_change(
            ctx,
            tp,
            PartitionState::Online,
            Some(LeaderElectionStrategy::ReassignedPartition),
            &ctx.shutting_down_broker_ids.clone(),
        )? {
            batch.add_leader_and_isr_for_recipients(&rar, tp, &election.leader_and_isr);
        }
    } else if let Some(refreshed) = super::isr::update_leader_epoch(coordination, ctx, tp, isr_cas_max_retries)? {
        batch.add_leader_and_isr_for_recipients(&rar, tp, &refreshed);
    }

    // Step 8: OAR - RAR -> OfflineReplica (shrinks ISR, StopReplica delete=false).
    let departing_replicas: Vec<PartitionReplica> = departing
        .iter()
        .copied()
        .map(|b| PartitionReplica::new(tp.clone(), b))
        .collect();
    for replica in &departing_replicas {
        super::isr::remove_replica_from_isr(
            coordination,
            ctx,
            tp,
            replica.broker_id,
            unclean_election_enabled,
            isr_cas_max_retries,
        )?;
    }
    for (replica, hint) in
        ReplicaStateMachine::handle_state_changes(ctx, &departing_replicas, ReplicaState::OfflineReplica)
    {
        if hint == ReplicaRequestHint::SendStopReplicaWithoutDeletion {
            batch.add_stop_replica(replica.broker_id, tp.clone(), false);
        }
    }

    // Step 9: OAR - RAR -> NonExistentReplica (StopReplica delete=true).
    let deletion_hints = ReplicaStateMachine::handle_state_changes(
        ctx,
        &departing_replicas,
        ReplicaState::ReplicaDeletionStarted,
    );
    for (replica, hint) in deletion_hints {
        if hint == ReplicaRequestHint::SendStopReplicaWithDeletion {
            batch.add_stop_replica(replica.broker_id, tp.clone(), true);
        }
    }
    ReplicaStateMachine::handle_state_changes(
        ctx,
        &departing_replicas,
        ReplicaState::ReplicaDeletionSuccessful,
    );

    // Step 10: persist the final AR = RAR.
    ctx.set_assigned_replicas(tp, rar.clone());

    // Step 11: reassignment complete, drop bookkeeping (the coordination-service
    // side is the caller's responsibility via `CoordinationPath::REASSIGN_PARTITIONS`
    // child removal, driven from `controller.rs` once this returns `true`).
    ctx.partitions_being_reassigned.remove(tp);

    // Step 12: UpdateMetadata to all live/shutting-down brokers.
    batch.add_update_metadata(ctx.live_or_shutting_down_broker_ids());

    let _ = oar_set;
    Ok(true)
}
