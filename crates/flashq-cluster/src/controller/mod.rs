//! Cluster controller core (spec-ref §2/§4): single-elected-controller event
//! loop, in-memory context cache, partition/replica state machines, the
//! twelve-step reassignment protocol, topic deletion, and broker-request
//! batching. See `KafkaController` in `controller.rs` for the orchestrator
//! that ties these submodules together.

pub mod batch;
pub mod channel_manager;
pub mod config;
pub mod context;
pub mod controller;
pub mod coordination;
pub mod event;
pub mod isr;
pub mod metrics;
pub mod partition_state_machine;
pub mod reassignment;
pub mod replica_state_machine;
pub mod selectors;
pub mod topic_deletion;
pub mod watch_layer;

pub use batch::{BrokerRequestBatch, BrokerRequests, LeaderAndIsrEntry, StopReplicaEntry};
pub use channel_manager::{BrokerRpcClient, ControllerChannelManager};
pub use config::ControllerConfig;
pub use context::{
    ControllerContext, LeaderAndIsr, LeaderIsrAndControllerEpoch, PartitionReplica,
    ReassignmentContext,
};
pub use controller::KafkaController;
pub use coordination::{CoordinationClient, CoordinationPath, InMemoryCoordinationClient, WatchEvent};
pub use event::{ControllerEvent, EventHandle, EventManager, EventProcessor};
pub use metrics::{ControllerMetrics, ControllerMetricsSnapshot};
pub use partition_state_machine::{LeaderElectionStrategy, PartitionState, PartitionStateMachine};
pub use replica_state_machine::{ReplicaRequestHint, ReplicaState, ReplicaStateMachine};
pub use topic_deletion::TopicDeletionManager;
