//! Error types for cluster metadata operations.

use std::fmt;

/// Main error type for cluster metadata operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterError {
    BrokerNotFound {
        broker_id: u32,
    },
    TopicNotFound {
        topic: String,
    },
    PartitionNotFound {
        topic: String,
        partition_id: u32,
    },
    /// Invalid manifest structure or data.
    InvalidManifest {
        context: String,
        reason: String,
    },
    /// Manifest file I/O error.
    ManifestIo {
        context: String,
        reason: String,
    },
    /// gRPC transport error.
    Transport {
        context: String,
        reason: String,
    },
    /// Invalid leader epoch (must be monotonically increasing).
    InvalidEpoch {
        topic: String,
        partition_id: u32,
        current_epoch: u64,
        new_epoch: u64,
    },
    /// A replica id that is not part of the partition's assigned replicas.
    InvalidReplica {
        topic: String,
        partition_id: u32,
        broker_id: u32,
    },
    /// A coordination-service write observed a controller epoch or znode
    /// version different from the one the caller expected. Always fatal
    /// for the current controller's reign.
    EpochMismatch {
        context: String,
        expected: u64,
        observed: u64,
    },
    /// The calling broker is no longer (or never was) the active controller.
    ControllerMoved { context: String },
    /// No live, eligible replica could be selected as leader for a partition.
    NoReplicaOnline { topic: String, partition_id: u32 },
    /// An invariant internal to the request-batch layer was violated; fatal,
    /// the current batch is discarded and the controller resigns.
    IllegalState { context: String },
    /// An operation that requires active controllership was attempted by a
    /// broker that does not currently hold it.
    NotController,
}

impl fmt::Display for ClusterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterError::BrokerNotFound { broker_id } => {
                write!(f, "Broker with ID {broker_id} not found")
            }
            ClusterError::TopicNotFound { topic } => {
                write!(f, "Topic '{topic}' not found")
            }
            ClusterError::PartitionNotFound { topic, partition_id } => {
                write!(f, "Partition {partition_id} not found for topic '{topic}'")
            }
            ClusterError::InvalidManifest { context, reason } => {
                write!(f, "Invalid manifest in {context}: {reason}")
            }
            ClusterError::ManifestIo { context, reason } => {
                write!(f, "Manifest I/O error in {context}: {reason}")
            }
            ClusterError::Transport { context, reason } => {
                write!(f, "Transport error in {context}: {reason}")
            }
            ClusterError::InvalidEpoch {
                topic,
                partition_id,
                current_epoch,
                new_epoch,
            } => {
                write!(
                    f,
                    "Invalid epoch for topic '{topic}' partition {partition_id}: \
                     attempted {new_epoch}, current {current_epoch} (epochs must increase)"
                )
            }
            ClusterError::InvalidReplica {
                topic,
                partition_id,
                broker_id,
            } => write!(
                f,
                "Broker {broker_id} is not a replica of topic '{topic}' partition {partition_id}"
            ),
            ClusterError::EpochMismatch {
                context,
                expected,
                observed,
            } => write!(
                f,
                "Epoch mismatch in {context}: expected {expected}, observed {observed}"
            ),
            ClusterError::ControllerMoved { context } => {
                write!(f, "Controller moved: {context}")
            }
            ClusterError::NoReplicaOnline {
                topic,
                partition_id,
            } => write!(
                f,
                "No eligible replica online for topic '{topic}' partition {partition_id}"
            ),
            ClusterError::IllegalState { context } => {
                write!(f, "Illegal state in {context}")
            }
            ClusterError::NotController => {
                write!(f, "This broker is not the active controller")
            }
        }
    }
}

impl std::error::Error for ClusterError {}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ClusterError::BrokerNotFound { .. }
                | ClusterError::TopicNotFound { .. }
                | ClusterError::PartitionNotFound { .. }
        )
    }

    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ClusterError::BrokerNotFound { .. }
                | ClusterError::TopicNotFound { .. }
                | ClusterError::PartitionNotFound { .. }
                | ClusterError::InvalidManifest { .. }
                | ClusterError::InvalidEpoch { .. }
                | ClusterError::InvalidReplica { .. }
        )
    }

    /// Whether this error means the current controller has lost (or never
    /// held) its reign and must resign / stop the current election attempt.
    pub fn is_fatal_for_controllership(&self) -> bool {
        matches!(
            self,
            ClusterError::EpochMismatch { .. }
                | ClusterError::ControllerMoved { .. }
                | ClusterError::IllegalState { .. }
                | ClusterError::NotController
        )
    }

    pub fn from_io_error(e: std::io::Error, context: &str) -> Self {
        ClusterError::ManifestIo {
            context: context.to_string(),
            reason: e.to_string(),
        }
    }

    pub fn from_parse_error(e: impl std::fmt::Display, context: &str) -> Self {
        ClusterError::InvalidManifest {
            context: context.to_string(),
            reason: e.to_string(),
        }
    }

    pub fn from_transport_error(e: impl std::fmt::Display, context: &str) -> Self {
        ClusterError::Transport {
            context: context.to_string(),
            reason: e.to_string(),
        }
    }
}
