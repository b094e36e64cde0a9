//! `KafkaController` (spec §4.2/§4.12): the event-loop owner that ties every
//! other `controller` submodule together into one active controller.
//!
//! Exactly one broker process runs an active `KafkaController` at a time,
//! enforced by [`CoordinationClient::elect_controller`]'s ephemeral-node CAS.
//! Every other broker's `KafkaController` sits idle until a `Reelect` event
//! (coordination-session expiry) gives it another shot. All state mutation
//! happens inside [`EventProcessor::process`], called strictly one event at a
//! time by the owning [`super::event::EventManager`] — nothing in this file
//! may be called concurrently with itself.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::ClusterError;
use crate::manifest::types::{BrokerSpec, ClusterManifest};
use crate::types::{BrokerId, PartitionId, TopicPartition};

use super::batch::BrokerRequestBatch;
use super::channel_manager::{BrokerRpcClient, ControllerChannelManager};
use super::config::ControllerConfig;
use super::context::{ControllerContext, PartitionReplica};
use super::coordination::{CoordinationClient, CoordinationPath, WatchEvent};
use super::event::{ControllerEvent, EventHandle, EventManager, EventProcessor};
use super::metrics::ControllerMetrics;
use super::partition_state_machine::{LeaderElectionStrategy, PartitionState, PartitionStateMachine};
use super::reassignment;
use super::replica_state_machine::{ReplicaRequestHint, ReplicaState, ReplicaStateMachine};
use super::topic_deletion::TopicDeletionManager;
use super::watch_layer;

/// Owns the controller's in-memory state and every collaborator needed to
/// act on a dequeued [`ControllerEvent`]. Only ever mutated from
/// `EventProcessor::process`, one event at a time.
pub struct KafkaController {
    self_broker_id: BrokerId,
    coordination: Arc<dyn CoordinationClient>,
    config: ControllerConfig,
    context: ControllerContext,
    channel_manager: Option<ControllerChannelManager>,
    rpc_client: Arc<dyn BrokerRpcClient>,
    topic_deletion: TopicDeletionManager,
    metrics: Arc<ControllerMetrics>,
    events: EventHandle,
    is_active: bool,
    rebalance_timer: Option<tokio::task::JoinHandle<()>>,
}

impl KafkaController {
    pub fn new(
        self_broker_id: BrokerId,
        coordination: Arc<dyn CoordinationClient>,
        rpc_client: Arc<dyn BrokerRpcClient>,
        config: ControllerConfig,
        metrics: Arc<ControllerMetrics>,
        events: EventHandle,
        initial_manifest: Option<&ClusterManifest>,
    ) -> Self {
        let mut context = ControllerContext::new();
        if let Some(manifest) = initial_manifest {
            context.load_from_manifest(manifest);
        }
        Self {
            self_broker_id,
            coordination,
            config,
            context,
            channel_manager: None,
            rpc_client,
            topic_deletion: TopicDeletionManager::new(),
            metrics,
            events,
            is_active: false,
            rebalance_timer: None,
        }
    }

    /// Wires a fresh event loop: creates the event channel, hands a clone of
    /// its handle to both the new controller (so its auto-rebalance timer can
    /// self-enqueue) and the watch-forwarding task, enqueues `Startup`, then
    /// spawns the worker. Returns the running `EventManager` and the watch
    /// task's join handle.
    pub fn spawn(
        self_broker_id: BrokerId,
        coordination: Arc<dyn CoordinationClient>,
        watch_events: mpsc::UnboundedReceiver<WatchEvent>,
        rpc_client: Arc<dyn BrokerRpcClient>,
        config: ControllerConfig,
        metrics: Arc<ControllerMetrics>,
        initial_manifest: Option<&ClusterManifest>,
    ) -> (EventManager, tokio::task::JoinHandle<()>) {
        let (handle, receiver) = EventManager::channel();
        let watcher = watch_layer::spawn(watch_events, handle.clone());
        let controller = Self::new(
            self_broker_id,
            coordination,
            rpc_client,
            config,
            metrics,
            handle.clone(),
            initial_manifest,
        );
        handle.enqueue(ControllerEvent::Startup);
        let manager = EventManager::start_with_handle(handle, receiver, controller);
        (manager, watcher)
    }

    /// Attempts to become the active controller (spec §4.12 `elect`). A lost
    /// race (`ControllerMoved`) is routine, not an error: this broker simply
    /// stays idle until the next `Reelect`.
    fn elect(&mut self) {
        match self.coordination.elect_controller(self.self_broker_id) {
            Ok((epoch, epoch_zk_version)) => {
                self.context.epoch = epoch;
                self.context.epoch_zk_version = epoch_zk_version;
                self.is_active = true;
                self.metrics.set_active_controller(true);
                tracing::info!(broker_id = ?self.self_broker_id, epoch, "elected active controller");
                if let Err(err) = self.on_controller_failover() {
                    tracing::error!(error = %err, "controller failover failed, resigning");
                    self.on_controller_resignation();
                }
            }
            Err(ClusterError::ControllerMoved { .. }) => {
                tracing::debug!(broker_id = ?self.self_broker_id, "controller already held elsewhere");
            }
            Err(err) => {
                tracing::warn!(error = %err, "controller election attempt failed");
            }
        }
    }

    /// Registers watches and hydrates everything the event handlers need
    /// before the controller starts reacting to events (spec §4.12 steps
    /// 1-5). Assumes `ControllerContext` already knows the cluster's static
    /// topic layout, either from the `initial_manifest` passed to
    /// [`Self::new`] or from `TopicChange`/`PartitionModifications` events
    /// handled in an earlier reign — this coordination service does not
    /// itself persist structured topic assignments, only raw per-partition
    /// leadership bytes for CAS, so a from-scratch replica-set read-back has
    /// no source of truth to read from here.
    fn on_controller_failover(&mut self) -> Result<(), ClusterError> {
        let coordination = Arc::clone(&self.coordination);

        let broker_ids_raw = coordination.watch_children("/brokers/ids")?;
        coordination.watch_children("/brokers/topics")?;
        coordination.watch_children(CoordinationPath::REASSIGN_PARTITIONS)?;
        coordination.watch_children(CoordinationPath::PREFERRED_REPLICA_ELECTION)?;
        coordination.watch_children("/admin/delete_topics")?;
        coordination.watch_children("/isr_change_notification")?;
        coordination.watch_children("/log_dir_event_notification")?;

        self.context.live_brokers.clear();
        for raw in &broker_ids_raw {
            if let Ok(id) = raw.parse::<u32>() {
                let broker_id = BrokerId(id);
                let spec = coordination
                    .get(&CoordinationPath::broker(broker_id))?
                    .map(|(data, _)| decode_broker_spec(broker_id, &data))
                    .unwrap_or(BrokerSpec {
                        id: broker_id,
                        host: "127.0.0.1".to_string(),
                        port: 0,
                    });
                self.context.live_brokers.insert(broker_id, spec);
            }
        }

        let mut channel_manager = ControllerChannelManager::new(self.rpc_client.clone());
        for &broker_id in &self.context.live_broker_ids() {
            channel_manager.add_broker(broker_id);
        }
        self.channel_manager = Some(channel_manager);

        let mut initial_update = BrokerRequestBatch::new();
        initial_update.add_update_metadata_to_all(&self.context.live_or_shutting_down_broker_ids());
        self.flush(initial_update);

        for topic in coordination.list_children("/admin/delete_topics")? {
            self.topic_deletion.enqueue_topic_for_deletion(&topic);
        }

        let mut batch = BrokerRequestBatch::new();
        self.trigger_online_partition_state_change(&mut batch)?;
        self.flush(batch);

        self.on_partition_reassignment()?;
        self.on_preferred_replica_election()?;
        self.on_topic_deletion_event()?;

        self.start_scheduler();
        self.refresh_metrics();
        Ok(())
    }

    /// Tears down controllership: stops the rebalance timer and channel
    /// manager, resigns from the coordination service, and clears
    /// `ControllerContext` so a later re-election starts from a clean slate
    /// (spec §4.12 `onControllerResignation`).
    fn on_controller_resignation(&mut self) {
        if let Some(timer) = self.rebalance_timer.take() {
            timer.abort();
        }
        self.channel_manager = None;
        self.is_active = false;
        self.metrics.set_active_controller(false);

        let epoch_zk_version = self.context.epoch_zk_version;
        if self.coordination.resign_controller(epoch_zk_version).is_err() {
            tracing::debug!("resign_controller failed; controllership likely already moved");
        }
        self.context.reset();
    }

    fn start_scheduler(&mut self) {
        if !self.config.auto_rebalance_enabled {
            return;
        }
        let events = self.events.clone();
        let interval = self.config.auto_rebalance_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                events.enqueue(ControllerEvent::AutoPreferredReplicaLeaderElection);
            }
        });
        self.rebalance_timer = Some(handle);
    }

    fn on_broker_change(&mut self) -> Result<(), ClusterError> {
        if !self.is_active {
            return Ok(());
        }
        let coordination = Arc::clone(&self.coordination);
        let children = coordination.watch_children("/brokers/ids")?;
        let current_ids: HashSet<BrokerId> = children
            .iter()
            .filter_map(|s| s.parse::<u32>().ok())
            .map(BrokerId)
            .collect();
        let previous_ids = self.context.live_broker_ids();

        let newly_live: Vec<BrokerId> = current_ids.difference(&previous_ids).copied().collect();
        let newly_dead: Vec<BrokerId> = previous_ids.difference(&current_ids).copied().collect();

        for &broker_id in &newly_live {
            let spec = coordination
                .get(&CoordinationPath::broker(broker_id))?
                .map(|(data, _)| decode_broker_spec(broker_id, &data))
                .unwrap_or(BrokerSpec {
                    id: broker_id,
                    host: "127.0.0.1".to_string(),
                    port: 0,
                });
            self.context.live_brokers.insert(broker_id, spec);
            if let Some(channel_manager) = &mut self.channel_manager {
                channel_manager.add_broker(broker_id);
            }
        }

        let mut batch = BrokerRequestBatch::new();
        for &broker_id in &newly_dead {
            self.context.live_brokers.remove(&broker_id);
            if let Some(channel_manager) = &mut self.channel_manager {
                channel_manager.remove_broker(broker_id);
            }
            self.handle_broker_failure(broker_id, &mut batch)?;
        }

        if !newly_live.is_empty() || !newly_dead.is_empty() {
            batch.add_update_metadata_to_all(&self.context.live_or_shutting_down_broker_ids());
        }

        self.flush(batch);
        self.refresh_metrics();
        Ok(())
    }

    /// Marks every partition `broker_id` led as `Offline` (no coordination
    /// write, just in-memory bookkeeping) then immediately tries to
    /// re-elect, mirroring `onBrokerFailure` folding straight into
    /// `triggerOnlinePartitionStateChange` rather than waiting for a
    /// separate event.
    fn handle_broker_failure(
        &mut self,
        broker_id: BrokerId,
        batch: &mut BrokerRequestBatch,
    ) -> Result<(), ClusterError> {
        let coordination = Arc::clone(&self.coordination);
        let affected: Vec<TopicPartition> = self
            .context
            .all_partitions()
            .into_iter()
            .filter(|tp| self.context.leader_of(tp) == Some(broker_id))
            .collect();

        let fsm = PartitionStateMachine::new(coordination.as_ref());
        let shutting_down = self.context.shutting_down_broker_ids.clone();
        for tp in affected {
            fsm.handle_state_change(&mut self.context, &tp, PartitionState::Offline, None, &shutting_down)?;
        }
        self.trigger_online_partition_state_change(batch)
    }

    /// Drives every `New`/`Offline` partition (skipping topics queued for
    /// deletion) toward `Online`, staging a `LeaderAndIsr` for whoever won
    /// and counting the ones still stuck for the offline-partitions gauge
    /// (spec §4.4 `triggerOnlinePartitionStateChange`).
    fn trigger_online_partition_state_change(
        &mut self,
        batch: &mut BrokerRequestBatch,
    ) -> Result<(), ClusterError> {
        let coordination = Arc::clone(&self.coordination);
        let fsm = PartitionStateMachine::new(coordination.as_ref());
        let shutting_down = self.context.shutting_down_broker_ids.clone();
        let unclean_election_enabled = self.config.unclean_leader_election_enabled;

        let targets: Vec<TopicPartition> = self
            .context
            .all_partitions()
            .into_iter()
            .filter(|tp| {
                matches!(
                    self.context.partition_state(tp),
                    PartitionState::New | PartitionState::Offline
                )
            })
            .filter(|tp| !self.topic_deletion.is_topic_queued_for_deletion(&tp.topic))
            .collect();

        let mut offline_count = 0u64;
        for tp in targets {
            let strategy = LeaderElectionStrategy::OfflinePartition {
                unclean_election_enabled,
            };
            match fsm.handle_state_change(&mut self.context, &tp, PartitionState::Online, Some(strategy), &shutting_down) {
                Ok(Some(election)) => {
                    batch.add_leader_and_isr_for_recipients(&election.recipients, &tp, &election.leader_and_isr);
                }
                Ok(None) => {}
                Err(ClusterError::NoReplicaOnline { .. }) => {
                    offline_count += 1;
                }
                Err(err) => return Err(err),
            }
        }
        self.metrics.set_offline_partitions_count(offline_count);
        Ok(())
    }

    /// A topic newly visible under `/brokers/topics` (spec §4.4 "topic
    /// created"): hydrates its partitions as `New`, stages each assigned
    /// replica through `NewReplica` -> `OnlineReplica`, then elects leaders.
    fn on_topic_change(&mut self) -> Result<(), ClusterError> {
        if !self.is_active {
            return Ok(());
        }
        let coordination = Arc::clone(&self.coordination);
        let topics = coordination.watch_children("/brokers/topics")?;
        let mut batch = BrokerRequestBatch::new();
        for topic in topics {
            if self.context.all_topics.contains(&topic) {
                continue;
            }
            self.bootstrap_topic(&topic, &mut batch)?;
        }
        self.flush(batch);
        self.refresh_metrics();
        Ok(())
    }

    fn bootstrap_topic(&mut self, topic: &str, batch: &mut BrokerRequestBatch) -> Result<(), ClusterError> {
        let coordination = Arc::clone(&self.coordination);
        let Some((data, _)) = coordination.get(&CoordinationPath::topic(topic))? else {
            return Ok(());
        };
        let assignments = decode_topic_assignment(&data);
        if assignments.is_empty() {
            return Ok(());
        }

        self.context.all_topics.insert(topic.to_string());
        for (partition_id, replicas) in assignments {
            let tp = TopicPartition::new(topic.to_string(), PartitionId::new(partition_id));
            self.context.set_assigned_replicas(&tp, replicas.clone());
            self.context.partition_states.insert(tp.clone(), PartitionState::New);

            let new_replicas: Vec<PartitionReplica> = replicas
                .iter()
                .map(|&b| PartitionReplica::new(tp.clone(), b))
                .collect();
            ReplicaStateMachine::handle_state_changes(&mut self.context, &new_replicas, ReplicaState::NewReplica);
            ReplicaStateMachine::handle_state_changes(&mut self.context, &new_replicas, ReplicaState::OnlineReplica);
        }
        self.trigger_online_partition_state_change(batch)
    }

    /// A topic's assignment data changed: any newly-visible partition
    /// (partition count grew) is bootstrapped the same way `on_topic_change`
    /// bootstraps a brand new topic. Replica-set edits to an existing
    /// partition outside the dedicated reassignment flow are not supported —
    /// use `/admin/reassign_partitions` for that.
    fn on_partition_modifications(&mut self, topic: &str) -> Result<(), ClusterError> {
        if !self.is_active {
            return Ok(());
        }
        let coordination = Arc::clone(&self.coordination);
        coordination.watch_data(&CoordinationPath::topic(topic))?;
        let Some((data, _)) = coordination.get(&CoordinationPath::topic(topic))? else {
            return Ok(());
        };
        let assignments = decode_topic_assignment(&data);
        let existing_ids: HashSet<PartitionId> = self
            .context
            .partitions_for_topic(topic)
            .into_iter()
            .map(|tp| tp.partition)
            .collect();

        let mut batch = BrokerRequestBatch::new();
        for (partition_id, replicas) in assignments {
            let pid = PartitionId::new(partition_id);
            if existing_ids.contains(&pid) {
                continue;
            }
            let tp = TopicPartition::new(topic.to_string(), pid);
            self.context.all_topics.insert(topic.to_string());
            self.context.set_assigned_replicas(&tp, replicas.clone());
            self.context.partition_states.insert(tp.clone(), PartitionState::New);

            let new_replicas: Vec<PartitionReplica> = replicas
                .iter()
                .map(|&b| PartitionReplica::new(tp.clone(), b))
                .collect();
            ReplicaStateMachine::handle_state_changes(&mut self.context, &new_replicas, ReplicaState::NewReplica);
            ReplicaStateMachine::handle_state_changes(&mut self.context, &new_replicas, ReplicaState::OnlineReplica);
        }
        self.trigger_online_partition_state_change(&mut batch)?;
        self.flush(batch);
        self.refresh_metrics();
        Ok(())
    }

    /// Picks up reassignment requests newly written under
    /// `/admin/reassign_partitions` and kicks off steps 1-3 for each
    /// (spec §4.8). Already-tracked partitions are skipped — this just
    /// discovers new requests, `maybe_complete_reassignment` carries them
    /// the rest of the way once the target replicas catch up.
    fn on_partition_reassignment(&mut self) -> Result<(), ClusterError> {
        if !self.is_active {
            return Ok(());
        }
        let coordination = Arc::clone(&self.coordination);
        let children = coordination.watch_children(CoordinationPath::REASSIGN_PARTITIONS)?;
        let mut batch = BrokerRequestBatch::new();
        let unclean_election_enabled = self.config.unclean_leader_election_enabled;
        let max_retries = self.config.isr_cas_max_retries;

        for child in children {
            let Some(tp) = parse_tp_child(&child) else {
                continue;
            };
            if self.context.partitions_being_reassigned.contains_key(&tp) {
                continue;
            }
            let path = format!("{}/{child}", CoordinationPath::REASSIGN_PARTITIONS);
            let Some((data, _)) = coordination.get(&path)? else {
                continue;
            };
            let new_replicas = decode_broker_id_list(&data);
            if new_replicas.is_empty() {
                continue;
            }
            reassignment::start_reassignment(
                &mut self.context,
                coordination.as_ref(),
                &mut batch,
                &tp,
                new_replicas,
                max_retries,
            )?;
            coordination.watch_data(&CoordinationPath::partition_state(&tp.topic, tp.partition.0))?;

            // RAR may already be fully caught up in ISR at request time (e.g.
            // RAR == AR), in which case no further ISR write ever happens and
            // the watch armed above never fires: the epoch bump inside
            // `start_reassignment` already landed before that watch existed.
            // Check for completion inline rather than waiting on a watch that
            // may never come, mirroring Kafka's `onPartitionReassignment`
            // step-4 check running once synchronously before relying on
            // `ReassignedPartitionsIsrChangeListener`.
            let completed = reassignment::maybe_complete_reassignment(
                &mut self.context,
                coordination.as_ref(),
                &mut batch,
                &tp,
                unclean_election_enabled,
                max_retries,
            )?;
            if completed {
                self.finish_reassignment(&tp, coordination.as_ref());
            }
        }

        self.flush(batch);
        self.refresh_metrics();
        Ok(())
    }

    /// An ISR watch armed during reassignment step 4 fired: re-check whether
    /// `tp`'s reassignment can now complete (spec §4.8 steps 5-12).
    fn on_reassignment_isr_change(&mut self, tp: &TopicPartition) -> Result<(), ClusterError> {
        if !self.is_active {
            return Ok(());
        }
        let coordination = Arc::clone(&self.coordination);
        let mut batch = BrokerRequestBatch::new();
        let unclean_election_enabled = self.config.unclean_leader_election_enabled;

        let completed = reassignment::maybe_complete_reassignment(
            &mut self.context,
            coordination.as_ref(),
            &mut batch,
            tp,
            unclean_election_enabled,
            self.config.isr_cas_max_retries,
        )?;

        if completed {
            self.finish_reassignment(tp, coordination.as_ref());
        }

        self.flush(batch);
        self.refresh_metrics();
        Ok(())
    }

    /// Clears the `/admin/reassign_partitions/<tp>` request node and unparks
    /// any topic deletion that was waiting on this reassignment, shared by
    /// both the inline short-circuit check and the watch-driven completion
    /// path.
    fn finish_reassignment(&mut self, tp: &TopicPartition, coordination: &dyn CoordinationClient) {
        let child = format!("{}-{}", tp.topic, tp.partition.0);
        let path = format!("{}/{child}", CoordinationPath::REASSIGN_PARTITIONS);
        coordination.delete(&path, None).ok();

        for topic in self.topic_deletion.resume_eligible(&self.context) {
            tracing::debug!(%topic, "topic deletion unparked after reassignment completed");
            self.events.enqueue(ControllerEvent::TopicDeletion);
        }
    }

    /// `/isr_change_notification` fired: some ISR changed out-of-band (e.g. a
    /// broker reporting caught-up replicas). There is nothing partition-level
    /// to recompute here beyond refreshing every broker's metadata view, so
    /// this just drains the notification queue and broadcasts.
    fn on_isr_change_notification(&mut self) -> Result<(), ClusterError> {
        if !self.is_active {
            return Ok(());
        }
        let coordination = Arc::clone(&self.coordination);
        let children = coordination.list_children("/isr_change_notification")?;
        for child in &children {
            coordination.delete(&format!("/isr_change_notification/{child}"), None).ok();
        }
        if !children.is_empty() {
            let mut batch = BrokerRequestBatch::new();
            batch.add_update_metadata_to_all(&self.context.live_or_shutting_down_broker_ids());
            self.flush(batch);
        }
        Ok(())
    }

    /// `/log_dir_event_notification` fired. No wire format for per-directory
    /// status is defined at this layer, so this only drains the queue; a
    /// broker reporting an offline log directory does so through
    /// `ReportPartitionStatus` instead, which populates
    /// `replicas_on_offline_dirs` directly.
    fn on_log_dir_event_notification(&mut self) -> Result<(), ClusterError> {
        if !self.is_active {
            return Ok(());
        }
        let coordination = Arc::clone(&self.coordination);
        for child in coordination.list_children("/log_dir_event_notification")? {
            coordination.delete(&format!("/log_dir_event_notification/{child}"), None).ok();
        }
        Ok(())
    }

    /// Manual preferred-replica election requests queued under
    /// `/admin/preferred_replica_election` (spec §4.4 `PreferredReplica`
    /// strategy). Only partitions currently `Online` are eligible — the
    /// transition table has no `New -> Online` path via this strategy.
    fn on_preferred_replica_election(&mut self) -> Result<(), ClusterError> {
        if !self.is_active {
            return Ok(());
        }
        let coordination = Arc::clone(&self.coordination);
        let children = coordination.watch_children(CoordinationPath::PREFERRED_REPLICA_ELECTION)?;
        let fsm = PartitionStateMachine::new(coordination.as_ref());
        let shutting_down = self.context.shutting_down_broker_ids.clone();
        let mut batch = BrokerRequestBatch::new();

        for child in &children {
            let Some(tp) = parse_tp_child(child) else {
                continue;
            };
            if self.context.partition_state(&tp) == PartitionState::Online {
                match fsm.handle_state_change(
                    &mut self.context,
                    &tp,
                    PartitionState::Online,
                    Some(LeaderElectionStrategy::PreferredReplica),
                    &shutting_down,
                ) {
                    Ok(Some(election)) => {
                        batch.add_leader_and_isr_for_recipients(&election.recipients, &tp, &election.leader_and_isr);
                    }
                    Ok(None) => {}
                    Err(ClusterError::NoReplicaOnline { .. }) => {}
                    Err(err) => return Err(err),
                }
            }
            let path = format!("{}/{child}", CoordinationPath::PREFERRED_REPLICA_ELECTION);
            coordination.delete(&path, None).ok();
        }

        if !batch.is_empty() {
            batch.add_update_metadata_to_all(&self.context.live_or_shutting_down_broker_ids());
        }
        self.flush(batch);
        Ok(())
    }

    /// Periodic auto-rebalance tick (spec §4.10). Skipped entirely while any
    /// reassignment is in flight — running a preferred-leader election
    /// against a partition whose AR is mid-transition would race the
    /// reassignment's own leadership bookkeeping.
    fn on_auto_rebalance(&mut self) -> Result<(), ClusterError> {
        if !self.is_active || !self.config.auto_rebalance_enabled {
            return Ok(());
        }
        if !self.context.partitions_being_reassigned.is_empty() {
            tracing::debug!("skipping auto rebalance: reassignment in progress");
            return Ok(());
        }

        let coordination = Arc::clone(&self.coordination);
        let fsm = PartitionStateMachine::new(coordination.as_ref());
        let shutting_down = self.context.shutting_down_broker_ids.clone();
        let threshold = self.config.leader_imbalance_threshold_percent as usize;

        let mut imbalanced: Vec<TopicPartition> = Vec::new();
        for broker_id in self.context.live_broker_ids() {
            let preferred: Vec<TopicPartition> = self
                .context
                .partitions_on_broker(broker_id)
                .into_iter()
                .filter(|tp| self.context.preferred_leader(tp) == Some(broker_id))
                .collect();
            if preferred.is_empty() {
                continue;
            }
            let not_led: Vec<TopicPartition> = preferred
                .iter()
                .filter(|tp| self.context.leader_of(tp) != Some(broker_id))
                .cloned()
                .collect();
            let ratio = not_led.len() * 100 / preferred.len();
            if ratio > threshold {
                imbalanced.extend(not_led);
            }
        }

        let mut batch = BrokerRequestBatch::new();
        for tp in imbalanced {
            match fsm.handle_state_change(
                &mut self.context,
                &tp,
                PartitionState::Online,
                Some(LeaderElectionStrategy::PreferredReplica),
                &shutting_down,
            ) {
                Ok(Some(election)) => {
                    batch.add_leader_and_isr_for_recipients(&election.recipients, &tp, &election.leader_and_isr);
                }
                Ok(None) => {}
                Err(ClusterError::NoReplicaOnline { .. }) => {}
                Err(err) => return Err(err),
            }
        }

        if !batch.is_empty() {
            batch.add_update_metadata_to_all(&self.context.live_or_shutting_down_broker_ids());
        }
        self.flush(batch);
        Ok(())
    }

    /// `/admin/delete_topics` changed, or a previously-ineligible topic
    /// became eligible again: (re)drives every queued topic through
    /// [`TopicDeletionManager::start_deletion`] (spec §4.11).
    fn on_topic_deletion_event(&mut self) -> Result<(), ClusterError> {
        if !self.is_active {
            return Ok(());
        }
        let coordination = Arc::clone(&self.coordination);
        for topic in coordination.watch_children("/admin/delete_topics")? {
            self.topic_deletion.enqueue_topic_for_deletion(&topic);
        }

        let mut batch = BrokerRequestBatch::new();
        for topic in self.topic_deletion.topics_to_be_deleted() {
            self.topic_deletion
                .start_deletion(&mut self.context, coordination.as_ref(), &mut batch, &topic)?;
        }
        self.flush(batch);
        self.refresh_metrics();
        Ok(())
    }

    /// Controlled shutdown (spec §4.9): splits `broker_id`'s replicas (where
    /// replication factor > 1) into leaders-on-broker and followers-on-broker,
    /// batched `controlled_shutdown_partition_batch_size` at a time. Leader
    /// batches move leadership elsewhere via `ControlledShutdownLeaderSelector`;
    /// follower batches are stopped and shrunk out of the ISR. Returns the
    /// partitions where the broker remains a replica (in practice, the
    /// singleton-replication-factor partitions it could not hand off).
    fn on_controlled_shutdown(&mut self, broker_id: BrokerId) -> Result<HashSet<TopicPartition>, ClusterError> {
        if !self.is_active {
            return Err(ClusterError::NotController);
        }
        self.context.shutting_down_broker_ids.insert(broker_id);

        let coordination = Arc::clone(&self.coordination);
        let fsm = PartitionStateMachine::new(coordination.as_ref());
        let shutting_down = self.context.shutting_down_broker_ids.clone();
        let unclean = self.config.unclean_leader_election_enabled;
        let batch_size = self.config.controlled_shutdown_partition_batch_size.max(1);

        let replicated: Vec<TopicPartition> = self
            .context
            .partitions_on_broker(broker_id)
            .into_iter()
            .filter(|tp| self.context.assigned_replicas(tp).len() > 1)
            .collect();
        let (led, followed): (Vec<TopicPartition>, Vec<TopicPartition>) = replicated
            .into_iter()
            .partition(|tp| self.context.leader_of(tp) == Some(broker_id));

        let mut leader_batch = BrokerRequestBatch::new();
        for chunk in led.chunks(batch_size) {
            for tp in chunk {
                match fsm.handle_state_change(
                    &mut self.context,
                    tp,
                    PartitionState::Online,
                    Some(LeaderElectionStrategy::ControlledShutdown),
                    &shutting_down,
                ) {
                    Ok(Some(election)) => {
                        leader_batch.add_leader_and_isr_for_recipients(&election.recipients, tp, &election.leader_and_isr);
                    }
                    Ok(None) => {}
                    Err(ClusterError::NoReplicaOnline { .. }) => {}
                    Err(err) => return Err(err),
                }
            }
        }
        if !leader_batch.is_empty() {
            leader_batch.add_update_metadata_to_all(&self.context.live_or_shutting_down_broker_ids());
        }
        self.flush(leader_batch);

        for chunk in followed.chunks(batch_size) {
            for tp in chunk {
                super::isr::remove_replica_from_isr(
                    coordination.as_ref(),
                    &mut self.context,
                    tp,
                    broker_id,
                    unclean,
                    self.config.isr_cas_max_retries,
                )?;
            }
            let replicas: Vec<PartitionReplica> = chunk
                .iter()
                .map(|tp| PartitionReplica::new(tp.clone(), broker_id))
                .collect();
            let mut follower_batch = BrokerRequestBatch::new();
            for (replica, hint) in
                ReplicaStateMachine::handle_state_changes(&mut self.context, &replicas, ReplicaState::OfflineReplica)
            {
                if hint == ReplicaRequestHint::SendStopReplicaWithoutDeletion {
                    follower_batch.add_stop_replica(broker_id, replica.topic_partition, false);
                }
            }
            self.flush(follower_batch);
        }

        let stranded: HashSet<TopicPartition> = self
            .context
            .partitions_on_broker(broker_id)
            .into_iter()
            .filter(|tp| self.context.assigned_replicas(tp).len() <= 1)
            .collect();
        Ok(stranded)
    }

    fn flush(&mut self, mut batch: BrokerRequestBatch) {
        if batch.is_empty() {
            return;
        }
        if let Some(channel_manager) = &self.channel_manager {
            channel_manager.dispatch(batch.drain());
        }
    }

    fn refresh_metrics(&self) {
        self.metrics.set_global_topic_count(self.context.all_topics.len() as u64);
        self.metrics
            .set_global_partition_count(self.context.all_partitions().len() as u64);
    }

    fn dispatch(&mut self, event: ControllerEvent) -> Result<(), ClusterError> {
        match event {
            ControllerEvent::Startup => {
                self.elect();
                Ok(())
            }
            ControllerEvent::Reelect => {
                if self.is_active {
                    self.on_controller_resignation();
                }
                self.elect();
                Ok(())
            }
            ControllerEvent::BrokerChange => self.on_broker_change(),
            ControllerEvent::TopicChange => self.on_topic_change(),
            ControllerEvent::PartitionModifications { topic } => self.on_partition_modifications(&topic),
            ControllerEvent::PartitionReassignment => self.on_partition_reassignment(),
            ControllerEvent::PartitionReassignmentIsrChange { tp } => self.on_reassignment_isr_change(&tp),
            ControllerEvent::IsrChangeNotification => self.on_isr_change_notification(),
            ControllerEvent::LogDirEventNotification => self.on_log_dir_event_notification(),
            ControllerEvent::PreferredReplicaLeaderElection => self.on_preferred_replica_election(),
            ControllerEvent::AutoPreferredReplicaLeaderElection => self.on_auto_rebalance(),
            ControllerEvent::TopicDeletion => self.on_topic_deletion_event(),
            ControllerEvent::ControlledShutdown { broker_id, reply } => {
                let result = self.on_controlled_shutdown(broker_id);
                let _ = reply.send(result);
                Ok(())
            }
            ControllerEvent::AwaitLatch { reply } => {
                let _ = reply.send(());
                Ok(())
            }
            ControllerEvent::Shutdown => {
                if self.is_active {
                    self.on_controller_resignation();
                }
                Ok(())
            }
        }
    }
}

#[async_trait]
impl EventProcessor for KafkaController {
    async fn process(&mut self, event: ControllerEvent) {
        self.metrics.record_event_processed();
        let tag = event.state_tag();
        if let Err(err) = self.dispatch(event) {
            tracing::warn!(event = tag, error = %err, "controller event handling failed");
            if err.is_fatal_for_controllership() && self.is_active {
                self.on_controller_resignation();
            }
        }
    }
}

fn parse_tp_child(child: &str) -> Option<TopicPartition> {
    let (topic, partition) = child.rsplit_once('-')?;
    let partition: u32 = partition.parse().ok()?;
    Some(TopicPartition::new(topic.to_string(), PartitionId::new(partition)))
}

fn decode_broker_id_list(data: &[u8]) -> Vec<BrokerId> {
    serde_json::from_slice::<Vec<BrokerId>>(data).unwrap_or_default()
}

fn decode_broker_spec(id: BrokerId, data: &[u8]) -> BrokerSpec {
    serde_json::from_slice::<BrokerSpec>(data)
        .map(|mut spec| {
            spec.id = id;
            spec
        })
        .unwrap_or(BrokerSpec {
            id,
            host: "127.0.0.1".to_string(),
            port: 0,
        })
}

/// One entry per partition of a topic's replica assignment, the znode
/// payload format under `/brokers/topics/<topic>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PartitionReplicasWire {
    partition: u32,
    replicas: Vec<BrokerId>,
}

fn decode_topic_assignment(data: &[u8]) -> Vec<(u32, Vec<BrokerId>)> {
    serde_json::from_slice::<Vec<PartitionReplicasWire>>(data)
        .map(|entries| entries.into_iter().map(|e| (e.partition, e.replicas)).collect())
        .unwrap_or_default()
}

#[allow(dead_code)]
fn encode_topic_assignment(partitions: &[(u32, Vec<BrokerId>)]) -> Vec<u8> {
    let wire: Vec<PartitionReplicasWire> = partitions
        .iter()
        .map(|(partition, replicas)| PartitionReplicasWire {
            partition: *partition,
            replicas: replicas.clone(),
        })
        .collect();
    serde_json::to_vec(&wire).expect("PartitionReplicasWire serializes infallibly")
}
