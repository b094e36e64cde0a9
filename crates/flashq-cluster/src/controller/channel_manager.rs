//! `ControllerChannelManager` (spec §4.1/§4.6): one outbound queue per live
//! broker, each drained by its own worker task so a slow or disconnected
//! broker never blocks requests addressed to the others.
//!
//! Grounded on `ClusterClient::start_heartbeat_stream`'s
//! `mpsc::channel` + spawned-consumer shape in `client.rs`, generalized from
//! "one heartbeat stream" to "one queue per broker, fed by the batch drain".

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::ClusterError;
use crate::types::BrokerId;

use super::batch::BrokerRequests;

/// The wire-level send operations a broker-facing RPC client must support.
/// `flashq-broker` implements this over its tonic client stack; tests use an
/// in-memory recorder.
#[async_trait]
pub trait BrokerRpcClient: Send + Sync {
    async fn send(&self, broker_id: BrokerId, requests: BrokerRequests) -> Result<(), ClusterError>;
}

struct BrokerQueue {
    sender: mpsc::UnboundedSender<BrokerRequests>,
    worker: tokio::task::JoinHandle<()>,
}

/// Owns one outbound queue per broker the controller currently knows about.
pub struct ControllerChannelManager {
    rpc_client: Arc<dyn BrokerRpcClient>,
    queues: HashMap<BrokerId, BrokerQueue>,
}

impl ControllerChannelManager {
    pub fn new(rpc_client: Arc<dyn BrokerRpcClient>) -> Self {
        Self {
            rpc_client,
            queues: HashMap::new(),
        }
    }

    /// Starts a queue and worker for a newly live broker. A no-op if one is
    /// already running for `broker_id` (spec §4.12 failover idempotence).
    pub fn add_broker(&mut self, broker_id: BrokerId) {
        if self.queues.contains_key(&broker_id) {
            return;
        }

        let (sender, mut receiver) = mpsc::unbounded_channel::<BrokerRequests>();
        let rpc_client = self.rpc_client.clone();
        let worker = tokio::spawn(async move {
            while let Some(requests) = receiver.recv().await {
                if let Err(err) = rpc_client.send(broker_id, requests).await {
                    tracing::warn!(?broker_id, error = %err, "broker request failed");
                }
            }
        });

        self.queues.insert(broker_id, BrokerQueue { sender, worker });
    }

    /// Stops and drops a broker's queue, e.g. once it leaves the cluster.
    pub fn remove_broker(&mut self, broker_id: BrokerId) {
        if let Some(queue) = self.queues.remove(&broker_id) {
            queue.worker.abort();
        }
    }

    /// Enqueues every drained batch entry onto its broker's queue. Entries
    /// for brokers with no running queue (already removed) are dropped.
    pub fn dispatch(&self, drained: HashMap<BrokerId, BrokerRequests>) {
        for (broker_id, requests) in drained {
            match self.queues.get(&broker_id) {
                Some(queue) => {
                    if queue.sender.send(requests).is_err() {
                        tracing::debug!(?broker_id, "broker worker already gone");
                    }
                }
                None => {
                    tracing::debug!(?broker_id, "dropping request for unknown broker");
                }
            }
        }
    }

    pub fn known_broker_ids(&self) -> Vec<BrokerId> {
        self.queues.keys().copied().collect()
    }
}

impl Drop for ControllerChannelManager {
    fn drop(&mut self) {
        for (_, queue) in self.queues.drain() {
            queue.worker.abort();
        }
    }
}
