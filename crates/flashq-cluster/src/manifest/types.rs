//! Cluster manifest data structures.

use crate::{ClusterError, types::*};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerSpec {
    pub id: BrokerId,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionAssignment {
    pub id: PartitionId,
    pub leader: BrokerId,
    pub replicas: Vec<BrokerId>,
    pub in_sync_replicas: Vec<BrokerId>,
    pub epoch: Epoch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicAssignment {
    pub partitions: Vec<PartitionAssignment>,
    pub replication_factor: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterManifest {
    pub brokers: Vec<BrokerSpec>,
    pub topics: HashMap<String, TopicAssignment>,
}

impl ClusterManifest {
    pub fn new() -> Self {
        Self {
            brokers: Vec::new(),
            topics: HashMap::new(),
        }
    }

    pub fn get_broker(&self, broker_id: BrokerId) -> Result<&BrokerSpec, ClusterError> {
        self.brokers
            .iter()
            .find(|broker| broker.id == broker_id)
            .ok_or(ClusterError::BrokerNotFound {
                broker_id: broker_id.into(),
            })
    }

    pub fn get_topic(&self, topic: &str) -> Result<&TopicAssignment, ClusterError> {
        self.topics.get(topic).ok_or(ClusterError::TopicNotFound {
            topic: topic.to_string(),
        })
    }

    pub fn get_partition(
        &self,
        topic: &str,
        partition_id: PartitionId,
    ) -> Result<&PartitionAssignment, ClusterError> {
        let topic_assignment = self.get_topic(topic)?;
        topic_assignment
            .partitions
            .iter()
            .find(|partition| partition.id == partition_id)
            .ok_or(ClusterError::PartitionNotFound {
                topic: topic.to_string(),
                partition_id: partition_id.into(),
            })
    }
}

impl Default for ClusterManifest {
    fn default() -> Self {
        Self::new()
    }
}
