//! ISR maintenance (spec §4.7): shrink the in-sync-replica set when a
//! replica goes offline, and bump the leader epoch without changing leaders.
//!
//! Both operations follow the same refresh-then-CAS-with-retry shape already
//! used by `ClusterServiceImpl::report_partition_status`: read the current
//! value and its version, compute the new value, `set_cas` it, and on a
//! version conflict (another controller or a racing event) re-read and retry
//! a bounded number of times rather than failing outright.

use serde::{Deserialize, Serialize};

use crate::ClusterError;
use crate::types::{BrokerId, TopicPartition};

use super::context::{ControllerContext, LeaderAndIsr, LeaderIsrAndControllerEpoch};
use super::coordination::{CoordinationClient, CoordinationPath};

/// Removes `broker_id` from `tp`'s ISR, if present, persisting the shrunk ISR
/// via CAS and bumping the leader epoch. If the removal would empty the ISR
/// and `unclean_election_enabled` is false, the ISR is left unchanged rather
/// than emptied (spec §4.7). If `broker_id` was the leader, leadership is
/// cleared to `NoLeader` — re-election is the caller's job
/// (`partition_state_machine`), not this function's. `max_retries` bounds the
/// refresh-and-CAS loop (`ControllerConfig::isr_cas_max_retries`).
pub fn remove_replica_from_isr(
    coordination: &dyn CoordinationClient,
    ctx: &mut ControllerContext,
    tp: &TopicPartition,
    broker_id: BrokerId,
    unclean_election_enabled: bool,
    max_retries: u32,
) -> Result<Option<LeaderAndIsr>, ClusterError> {
    update_leader_and_isr(coordination, ctx, tp, max_retries, |current| {
        if !current.isr.contains(&broker_id) {
            return None;
        }
        let mut next = current.clone();
        next.isr.retain(|&b| b != broker_id);
        if next.isr.is_empty() && !unclean_election_enabled {
            return None;
        }
        next.leader_epoch += 1;
        if next.leader == Some(broker_id) {
            next.leader = None;
        }
        Some(next)
    })
}

/// Bumps `tp`'s leader epoch by one without changing the leader or ISR.
/// Used when a partition's replica set changes shape (e.g. a reassignment
/// step) but the current leader is still eligible to keep leading.
pub fn update_leader_epoch(
    coordination: &dyn CoordinationClient,
    ctx: &mut ControllerContext,
    tp: &TopicPartition,
    max_retries: u32,
) -> Result<Option<LeaderAndIsr>, ClusterError> {
    update_leader_and_isr(coordination, ctx, tp, max_retries, |current| {
        let mut next = current.clone();
        next.leader_epoch += 1;
        Some(next)
    })
}

/// Shared refresh-then-CAS-with-retry loop. `transform` returns `None` to
/// signal "no change needed", short-circuiting the write entirely.
fn update_leader_and_isr(
    coordination: &dyn CoordinationClient,
    ctx: &mut ControllerContext,
    tp: &TopicPartition,
    max_retries: u32,
    transform: impl Fn(&LeaderAndIsr) -> Option<LeaderAndIsr>,
) -> Result<Option<LeaderAndIsr>, ClusterError> {
    let path = CoordinationPath::partition_state(&tp.topic, tp.partition.0);

    let current = match ctx.partition_leadership.get(tp) {
        Some(entry) => entry.leader_and_isr.clone(),
        None => return Ok(None),
    };
    let Some(next) = transform(&current) else {
        return Ok(None);
    };

    super::coordination::fence_on_epoch_zk_version(
        coordination,
        ctx.epoch_zk_version,
        "isr::update_leader_and_isr",
    )?;

    let encoded = encode_leader_and_isr(&next);

    let mut expected_version = current.zk_version;
    let mut attempt = 0;
    loop {
        match coordination.set_cas(&path, encoded.clone(), expected_version) {
            Ok(new_version) => {
                let mut persisted = next;
                persisted.zk_version = new_version;
                ctx.partition_leadership.insert(
                    tp.clone(),
                    LeaderIsrAndControllerEpoch {
                        leader_and_isr: persisted.clone(),
                        controller_epoch: ctx.epoch,
                    },
                );
                return Ok(Some(persisted));
            }
            Err(ClusterError::EpochMismatch { .. }) if attempt < max_retries => {
                attempt += 1;
                if let Some((_, version)) = coordination.get(&path)? {
                    expected_version = version;
                }
                continue;
            }
            Err(err) => return Err(err),
        }
    }
}

/// The partition-state znode payload: leader, leader epoch, and ISR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LeaderAndIsrWire {
    leader: Option<BrokerId>,
    leader_epoch: u64,
    isr: Vec<BrokerId>,
}

fn encode_leader_and_isr(state: &LeaderAndIsr) -> Vec<u8> {
    let wire = LeaderAndIsrWire {
        leader: state.leader,
        leader_epoch: state.leader_epoch,
        isr: state.isr.clone(),
    };
    serde_json::to_vec(&wire).expect("LeaderAndIsrWire serializes infallibly")
}

#[allow(dead_code)]
fn decode_leader_and_isr(data: &[u8]) -> Option<LeaderAndIsr> {
    let wire: LeaderAndIsrWire = serde_json::from_slice(data).ok()?;
    Some(LeaderAndIsr {
        leader: wire.leader,
        leader_epoch: wire.leader_epoch,
        isr: wire.isr,
        zk_version: 0,
    })
}
