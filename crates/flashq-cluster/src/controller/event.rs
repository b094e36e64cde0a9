//! `ControllerEvent` and `EventManager` (spec §4.1).
//!
//! A single-consumer FIFO queue serializes every controller state mutation.
//! External producers (watch firings, RPC callbacks, timers, API calls) only
//! ever enqueue; all processing happens on the one worker task. Modeled as a
//! spawned `tokio::task` consuming an `mpsc` channel, the same shape already
//! used by `ClusterServiceImpl::run_streaming_heartbeat_task`
//! (`tokio::select!` over a channel and a timer) generalized to a strict FIFO
//! with no `select!` racing — ordering must stay total, unlike the heartbeat
//! loop's best-effort send/receive interleaving.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::ClusterError;
use crate::types::{BrokerId, TopicPartition};

/// Every external signal the controller reacts to, tagged so the event loop
/// can log/time each kind independently (spec §4.1 "state-tag").
#[derive(Debug)]
pub enum ControllerEvent {
    /// Enqueued once automatically when the event loop starts.
    Startup,
    /// Coordination-service session expired; forces a fresh election attempt.
    Reelect,
    /// `/brokers/ids` children changed: a broker joined or left.
    BrokerChange,
    /// `/brokers/topics` children changed: a topic was created.
    TopicChange,
    /// A topic's partition assignment data changed.
    PartitionModifications { topic: String },
    /// `/admin/reassign_partitions` children changed.
    PartitionReassignment,
    /// An ISR watch armed during reassignment step 4 fired for `tp`.
    PartitionReassignmentIsrChange { tp: TopicPartition },
    /// `/isr_change_notification` sequence children changed.
    IsrChangeNotification,
    /// `/log_dir_event_notification` sequence children changed.
    LogDirEventNotification,
    /// `/admin/preferred_replica_election` children changed (manual request).
    PreferredReplicaLeaderElection,
    /// Periodic timer tick for the auto preferred-leader rebalance.
    AutoPreferredReplicaLeaderElection,
    /// `/admin/delete_topics` children changed.
    TopicDeletion,
    /// A broker requested controlled shutdown; the result is delivered on `reply`.
    ControlledShutdown {
        broker_id: BrokerId,
        reply: oneshot::Sender<Result<HashSet<TopicPartition>, ClusterError>>,
    },
    /// Test-only fence: resolves `reply` once every event enqueued before it
    /// has been processed.
    AwaitLatch { reply: oneshot::Sender<()> },
    /// Stops the event loop after processing; no further events are consumed.
    Shutdown,
}

impl ControllerEvent {
    /// A stable label for metrics/logging, independent of any event payload.
    pub fn state_tag(&self) -> &'static str {
        match self {
            ControllerEvent::Startup => "Startup",
            ControllerEvent::Reelect => "Reelect",
            ControllerEvent::BrokerChange => "BrokerChange",
            ControllerEvent::TopicChange => "TopicChange",
            ControllerEvent::PartitionModifications { .. } => "PartitionModifications",
            ControllerEvent::PartitionReassignment => "PartitionReassignment",
            ControllerEvent::PartitionReassignmentIsrChange { .. } => {
                "PartitionReassignmentIsrChange"
            }
            ControllerEvent::IsrChangeNotification => "IsrChangeNotification",
            ControllerEvent::LogDirEventNotification => "LogDirEventNotification",
            ControllerEvent::PreferredReplicaLeaderElection => "PreferredReplicaLeaderElection",
            ControllerEvent::AutoPreferredReplicaLeaderElection => {
                "AutoPreferredReplicaLeaderElection"
            }
            ControllerEvent::TopicDeletion => "TopicDeletion",
            ControllerEvent::ControlledShutdown { .. } => "ControlledShutdown",
            ControllerEvent::AwaitLatch { .. } => "AwaitLatch",
            ControllerEvent::Shutdown => "Shutdown",
        }
    }
}

/// Implemented by whatever owns `ControllerContext` (the `KafkaController`)
/// to react to one dequeued event. `&mut self` enforces the "mutation only
/// from the event loop" invariant at the type level.
#[async_trait]
pub trait EventProcessor: Send {
    async fn process(&mut self, event: ControllerEvent);
}

/// Cloneable handle onto an [`EventManager`]'s queue. Lets anything that needs
/// to self-enqueue (the auto-rebalance timer, the watch layer) hold a sender
/// without owning the manager itself, and without waiting for
/// [`EventManager::start`] to hand one back — [`EventManager::channel`]
/// produces a handle before the worker even exists.
#[derive(Clone)]
pub struct EventHandle {
    sender: mpsc::UnboundedSender<ControllerEvent>,
}

impl EventHandle {
    /// Enqueue an event. Silently dropped if the worker has already shut down.
    pub fn enqueue(&self, event: ControllerEvent) {
        if self.sender.send(event).is_err() {
            tracing::debug!("dropping event: event loop already shut down");
        }
    }

    /// Block until every event enqueued before this call has been processed.
    /// For tests only — production code has no reason to fence the queue.
    pub async fn await_latch(&self) {
        let (reply, rx) = oneshot::channel();
        self.enqueue(ControllerEvent::AwaitLatch { reply });
        let _ = rx.await;
    }
}

/// Single-consumer FIFO queue of [`ControllerEvent`]s (spec §4.1).
pub struct EventManager {
    handle: EventHandle,
    worker: Option<tokio::task::JoinHandle<()>>,
}

impl EventManager {
    /// Creates the channel backing an `EventManager` without spawning its
    /// worker, so callers can hand out an [`EventHandle`] to a processor
    /// that isn't constructed yet.
    pub fn channel() -> (EventHandle, mpsc::UnboundedReceiver<ControllerEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (EventHandle { sender }, receiver)
    }

    /// Enqueue the initial `Startup` event, then spawn the single worker task
    /// that drains `processor` strictly in FIFO order.
    pub fn start<P: EventProcessor + 'static>(processor: P) -> Self {
        let (handle, receiver) = Self::channel();
        handle.enqueue(ControllerEvent::Startup);
        Self::start_with_handle(handle, receiver, processor)
    }

    /// Lower-level constructor: spawns the worker over an already-created
    /// channel. Use when the handle must exist before the processor does
    /// (e.g. so the processor can hand its own handle to a timer task).
    pub fn start_with_handle<P: EventProcessor + 'static>(
        handle: EventHandle,
        mut receiver: mpsc::UnboundedReceiver<ControllerEvent>,
        mut processor: P,
    ) -> Self {
        let worker = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let tag = event.state_tag();
                let is_shutdown = matches!(event, ControllerEvent::Shutdown);
                tracing::trace!(event = tag, "processing controller event");
                processor.process(event).await;
                if is_shutdown {
                    break;
                }
            }
        });

        Self {
            handle,
            worker: Some(worker),
        }
    }

    /// A cloneable handle onto this manager's queue.
    pub fn handle(&self) -> EventHandle {
        self.handle.clone()
    }

    /// Enqueue an event. Silently dropped if the worker has already shut down.
    pub fn enqueue(&self, event: ControllerEvent) {
        self.handle.enqueue(event);
    }

    /// Block until every event enqueued before this call has been processed.
    /// For tests only — production code has no reason to fence the queue.
    pub async fn await_latch(&self) {
        self.handle.await_latch().await;
    }

    /// Enqueue `Shutdown` and wait for the worker to drain and exit.
    pub async fn shutdown(mut self) {
        self.enqueue(ControllerEvent::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }
}
