//! Leader selectors (spec §4.3).
//!
//! Each selector is a pure function: given a partition's assigned replicas,
//! its current `LeaderAndIsr`, and a liveness predicate, it picks a new leader
//! and ISR. Tie-breaking is strictly by assigned-replica (AR) order. On
//! success every selector bumps `leader_epoch` by one and returns the set of
//! brokers that must receive the resulting `LeaderAndIsr` request.
//!
//! Modeled as free functions rather than a trait object hierarchy: no call
//! site needs runtime polymorphism over "which selector", each event handler
//! already knows statically which one it wants (mirrors
//! `manifest::types::ClusterManifest`'s plain inherent-method style elsewhere
//! in this crate).

use std::collections::HashSet;

use crate::ClusterError;
use crate::types::BrokerId;

use super::context::LeaderAndIsr;

type SelectorResult = Result<(LeaderAndIsr, Vec<BrokerId>), ClusterError>;

fn bumped(leader: BrokerId, isr: Vec<BrokerId>, current: &LeaderAndIsr) -> LeaderAndIsr {
    LeaderAndIsr {
        leader: Some(leader),
        leader_epoch: current.leader_epoch + 1,
        isr,
        zk_version: current.zk_version,
    }
}

/// Prefers the first replica in AR that is both in ISR and live. If none
/// qualifies and unclean election is enabled for the topic, falls back to the
/// first live replica outside the ISR (and resets the ISR to just that
/// broker). Fails with `NoReplicaOnline` if no replica can be chosen.
pub fn offline_partition_leader_selector(
    topic: &str,
    partition_id: u32,
    assigned_replicas: &[BrokerId],
    current: &LeaderAndIsr,
    is_live: impl Fn(BrokerId) -> bool,
    unclean_election_enabled: bool,
) -> SelectorResult {
    let isr: HashSet<BrokerId> = current.isr.iter().copied().collect();

    if let Some(&leader) = assigned_replicas
        .iter()
        .find(|&&b| isr.contains(&b) && is_live(b))
    {
        let new_isr = current.isr.clone();
        let new_state = bumped(leader, new_isr, current);
        let recipients = assigned_replicas.to_vec();
        return Ok((new_state, recipients));
    }

    if unclean_election_enabled {
        if let Some(&leader) = assigned_replicas.iter().find(|&&b| is_live(b)) {
            let new_state = bumped(leader, vec![leader], current);
            let recipients = assigned_replicas.to_vec();
            return Ok((new_state, recipients));
        }
    }

    Err(ClusterError::NoReplicaOnline {
        topic: topic.to_string(),
        partition_id,
    })
}

/// Picks the first broker in the new-replicas list that is live and in the
/// current ISR. Fails if none qualifies.
pub fn reassigned_partition_leader_selector(
    topic: &str,
    partition_id: u32,
    new_replicas: &[BrokerId],
    current: &LeaderAndIsr,
    is_live: impl Fn(BrokerId) -> bool,
) -> SelectorResult {
    let isr: HashSet<BrokerId> = current.isr.iter().copied().collect();

    let leader = new_replicas
        .iter()
        .copied()
        .find(|&b| isr.contains(&b) && is_live(b))
        .ok_or_else(|| ClusterError::NoReplicaOnline {
            topic: topic.to_string(),
            partition_id,
        })?;

    let new_state = bumped(leader, current.isr.clone(), current);
    Ok((new_state, new_replicas.to_vec()))
}

/// Forces leadership back to `assigned_replicas[0]`. Fails if that replica is
/// not currently in the ISR or not live.
pub fn preferred_replica_partition_leader_selector(
    topic: &str,
    partition_id: u32,
    assigned_replicas: &[BrokerId],
    current: &LeaderAndIsr,
    is_live: impl Fn(BrokerId) -> bool,
) -> SelectorResult {
    let preferred = *assigned_replicas
        .first()
        .ok_or_else(|| ClusterError::NoReplicaOnline {
            topic: topic.to_string(),
            partition_id,
        })?;

    let isr: HashSet<BrokerId> = current.isr.iter().copied().collect();
    if !isr.contains(&preferred) || !is_live(preferred) {
        return Err(ClusterError::NoReplicaOnline {
            topic: topic.to_string(),
            partition_id,
        });
    }

    let new_state = bumped(preferred, current.isr.clone(), current);
    Ok((new_state, assigned_replicas.to_vec()))
}

/// Picks the first broker in AR that is live, in ISR, and not currently
/// shutting down; shrinks the ISR to exclude the shutting-down broker.
pub fn controlled_shutdown_leader_selector(
    topic: &str,
    partition_id: u32,
    assigned_replicas: &[BrokerId],
    current: &LeaderAndIsr,
    is_live: impl Fn(BrokerId) -> bool,
    shutting_down_broker_ids: &HashSet<BrokerId>,
) -> SelectorResult {
    let isr: HashSet<BrokerId> = current.isr.iter().copied().collect();

    let leader = assigned_replicas
        .iter()
        .copied()
        .find(|&b| isr.contains(&b) && is_live(b) && !shutting_down_broker_ids.contains(&b))
        .ok_or_else(|| ClusterError::NoReplicaOnline {
            topic: topic.to_string(),
            partition_id,
        })?;

    let shrunk_isr: Vec<BrokerId> = current
        .isr
        .iter()
        .copied()
        .filter(|b| !shutting_down_broker_ids.contains(b))
        .collect();

    let new_state = bumped(leader, shrunk_isr, current);
    Ok((new_state, assigned_replicas.to_vec()))
}
