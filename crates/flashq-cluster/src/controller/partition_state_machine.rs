//! Partition state machine (spec §4.4).
//!
//! Valid transitions:
//!
//! ```text
//! NonExistent -> New         (topic/partition created)
//! New         -> Online      (first leader election)
//! Online      -> Online      (re-election: preferred-leader, reassignment)
//! Offline     -> Online      (re-election after the old leader died)
//! New/Online/Offline -> Offline  (leader/ISR unreachable)
//! Offline     -> NonExistent (topic deletion)
//! ```
//!
//! Every transition into `Online` writes the new `LeaderAndIsr` to the
//! coordination service via a CAS before the in-memory state is updated, so a
//! lost race against another controller is caught as `EpochMismatch` rather
//! than silently diverging (spec invariant "epoch fencing").

use std::collections::HashSet;

use crate::ClusterError;
use crate::types::{BrokerId, TopicPartition};

use super::context::{ControllerContext, LeaderAndIsr, LeaderIsrAndControllerEpoch};
use super::coordination::{CoordinationClient, CoordinationPath};
use super::selectors;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionState {
    NonExistent,
    New,
    Online,
    Offline,
}

fn valid_transition(from: PartitionState, to: PartitionState) -> bool {
    use PartitionState::*;
    matches!(
        (from, to),
        (NonExistent, New)
            | (New, Online)
            | (Online, Online)
            | (Offline, Online)
            | (New, Offline)
            | (Online, Offline)
            | (Offline, Offline)
            | (Offline, NonExistent)
            | (New, NonExistent)
            | (Online, NonExistent)
    )
}

/// Which selector to run when transitioning a partition into `Online`.
#[derive(Debug, Clone, Copy)]
pub enum LeaderElectionStrategy {
    OfflinePartition { unclean_election_enabled: bool },
    ReassignedPartition,
    PreferredReplica,
    ControlledShutdown,
}

/// The result of successfully electing a leader for one partition: who must
/// receive a `LeaderAndIsr` request for it (spec §4.6 staging input).
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionLeaderElection {
    pub tp: TopicPartition,
    pub leader_and_isr: LeaderAndIsr,
    pub recipients: Vec<BrokerId>,
}

pub struct PartitionStateMachine<'a> {
    coordination: &'a dyn CoordinationClient,
}

impl<'a> PartitionStateMachine<'a> {
    pub fn new(coordination: &'a dyn CoordinationClient) -> Self {
        Self { coordination }
    }

    /// Drives one partition toward `target_state`. Invalid transitions are a
    /// no-op (logged, not an error) — concurrent event handling can racily
    /// request the same transition twice.
    pub fn handle_state_change(
        &self,
        ctx: &mut ControllerContext,
        tp: &TopicPartition,
        target_state: PartitionState,
        strategy: Option<LeaderElectionStrategy>,
        shutting_down_broker_ids: &HashSet<BrokerId>,
    ) -> Result<Option<PartitionLeaderElection>, ClusterError> {
        let current = ctx.partition_state(tp);
        if !valid_transition(current, target_state) {
            tracing::trace!(
                ?tp,
                ?current,
                ?target_state,
                "skipping invalid partition state transition"
            );
            return Ok(None);
        }

        let result = match target_state {
            PartitionState::Online => Some(self.elect_leader(ctx, tp, strategy, shutting_down_broker_ids)?),
            _ => None,
        };

        if target_state == PartitionState::NonExistent {
            ctx.partition_states.remove(tp);
        } else {
            ctx.partition_states.insert(tp.clone(), target_state);
        }
        Ok(result)
    }

    fn elect_leader(
        &self,
        ctx: &mut ControllerContext,
        tp: &TopicPartition,
        strategy: Option<LeaderElectionStrategy>,
        shutting_down_broker_ids: &HashSet<BrokerId>,
    ) -> Result<PartitionLeaderElection, ClusterError> {
        let assigned = ctx.assigned_replicas(tp);
        let is_live = |b: BrokerId| ctx.is_replica_online(b, tp);

        let existing = ctx.partition_leadership.get(tp);

        let (new_state, recipients) = match existing {
            None => {
                // NonExistent/New -> Online: bootstrap leadership from scratch.
                let leader = assigned
                    .iter()
                    .copied()
                    .find(|&b| is_live(b))
                    .ok_or_else(|| ClusterError::NoReplicaOnline {
                        topic: tp.topic.clone(),
                        partition_id: tp.partition.0,
                    })?;
                let state = LeaderAndIsr::new(Some(leader), 0, vec![leader]);
                (state, assigned.clone())
            }
            Some(current) => {
                let current = &current.leader_and_isr;
                match strategy.unwrap_or(LeaderElectionStrategy::OfflinePartition {
                    unclean_election_enabled: false,
                }) {
                    LeaderElectionStrategy::OfflinePartition {
                        unclean_election_enabled,
                    } => selectors::offline_partition_leader_selector(
                        &tp.topic,
                        tp.partition.0,
                        &assigned,
                        current,
                        is_live,
                        unclean_election_enabled,
                    )?,
                    LeaderElectionStrategy::ReassignedPartition => {
                        let new_replicas = ctx
                            .partitions_being_reassigned
                            .get(tp)
                            .map(|r| r.new_replicas.clone())
                            .unwrap_or_else(|| assigned.clone());
                        selectors::reassigned_partition_leader_selector(
                            &tp.topic,
                            tp.partition.0,
                            &new_replicas,
                            current,
                            is_live,
                        )?
                    }
                    LeaderElectionStrategy::PreferredReplica => {
                        selectors::preferred_replica_partition_leader_selector(
                            &tp.topic,
                            tp.partition.0,
                            &assigned,
                            current,
                            is_live,
                        )?
                    }
                    LeaderElectionStrategy::ControlledShutdown => {
                        selectors::controlled_shutdown_leader_selector(
                            &tp.topic,
                            tp.partition.0,
                            &assigned,
                            current,
                            is_live,
                            shutting_down_broker_ids,
                        )?
                    }
                }
            }
        };

        super::coordination::fence_on_epoch_zk_version(
            self.coordination,
            ctx.epoch_zk_version,
            "partition_state_machine::elect_leader",
        )?;

        let path = CoordinationPath::partition_state(&tp.topic, tp.partition.0);
        let expected_version = self
            .coordination
            .get(&path)
            .ok()
            .flatten()
            .map(|(_, version)| version)
            .unwrap_or(-1);
        let encoded = encode_leader_and_isr(&new_state);
        let new_version = self
            .coordination
            .set_cas(&path, encoded, expected_version)?;

        let mut persisted = new_state.clone();
        persisted.zk_version = new_version;

        ctx.partition_leadership.insert(
            tp.clone(),
            LeaderIsrAndControllerEpoch {
                leader_and_isr: persisted.clone(),
                controller_epoch: ctx.epoch,
            },
        );

        Ok(PartitionLeaderElection {
            tp: tp.clone(),
            leader_and_isr: persisted,
            recipients,
        })
    }
}

fn encode_leader_and_isr(state: &LeaderAndIsr) -> Vec<u8> {
    format!(
        "{{\"leader\":{},\"leader_epoch\":{},\"isr\":{:?}}}",
        state.leader.map(|b| b.0 as i64).unwrap_or(-1),
        state.leader_epoch,
        state.isr.iter().map(|b| b.0).collect::<Vec<_>>()
    )
    .into_bytes()
}
