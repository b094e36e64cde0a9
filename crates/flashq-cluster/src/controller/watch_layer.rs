//! `ZkWatchLayer`: converts coordination-service watch firings into
//! [`ControllerEvent`]s (spec §4.1, §9 "Watches as events, not callbacks").
//!
//! Watch callbacks must never invoke controller logic directly — they only
//! ever translate into an event and push it onto the [`EventManager`] queue,
//! preserving total ordering and keeping epoch fencing simple. This mirrors
//! the channel-forwarding shape of
//! `ClusterServiceImpl::run_streaming_heartbeat_task`'s response loop, just
//! driving the `EventManager` queue instead of a metadata-store update.

use tokio::sync::mpsc;

use crate::types::{PartitionId, TopicPartition};

use super::coordination::{CoordinationPath, WatchEvent};
use super::event::{ControllerEvent, EventHandle};

/// Spawns the task that drains coordination-client watch notifications and
/// turns each one into the matching `ControllerEvent`, enqueued on `events`.
pub fn spawn(
    mut watch_events: mpsc::UnboundedReceiver<WatchEvent>,
    events: EventHandle,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(watch_event) = watch_events.recv().await {
            if let Some(controller_event) = translate(watch_event) {
                events.enqueue(controller_event);
            }
        }
    })
}

fn translate(watch_event: WatchEvent) -> Option<ControllerEvent> {
    match watch_event {
        WatchEvent::SessionExpired => Some(ControllerEvent::Reelect),
        WatchEvent::ChildrenChanged { path, .. } => translate_children_changed(&path),
        WatchEvent::DataChanged { path } => translate_data_changed(&path),
    }
}

fn translate_children_changed(path: &str) -> Option<ControllerEvent> {
    match path {
        "/brokers/ids" => Some(ControllerEvent::BrokerChange),
        "/brokers/topics" => Some(ControllerEvent::TopicChange),
        CoordinationPath::REASSIGN_PARTITIONS => Some(ControllerEvent::PartitionReassignment),
        CoordinationPath::PREFERRED_REPLICA_ELECTION => {
            Some(ControllerEvent::PreferredReplicaLeaderElection)
        }
        "/admin/delete_topics" => Some(ControllerEvent::TopicDeletion),
        "/isr_change_notification" => Some(ControllerEvent::IsrChangeNotification),
        "/log_dir_event_notification" => Some(ControllerEvent::LogDirEventNotification),
        _ => None,
    }
}

fn translate_data_changed(path: &str) -> Option<ControllerEvent> {
    if let Some((topic, partition)) = parse_partition_state_path(path) {
        return Some(ControllerEvent::PartitionReassignmentIsrChange {
            tp: TopicPartition::new(topic, PartitionId::new(partition)),
        });
    }

    if let Some(topic) = path.strip_prefix("/brokers/topics/") {
        if !topic.is_empty() && !topic.contains('/') {
            return Some(ControllerEvent::PartitionModifications {
                topic: topic.to_string(),
            });
        }
    }

    None
}

/// Parses `/brokers/topics/<topic>/partitions/<p>/state` back into its parts.
fn parse_partition_state_path(path: &str) -> Option<(String, u32)> {
    let rest = path.strip_prefix("/brokers/topics/")?;
    let (topic, rest) = rest.split_once("/partitions/")?;
    let (partition, rest) = rest.split_once("/state")?;
    if !rest.is_empty() {
        return None;
    }
    let partition: u32 = partition.parse().ok()?;
    Some((topic.to_string(), partition))
}
