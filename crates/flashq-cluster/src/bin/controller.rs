//! Demo entry point for the cluster controller (SPEC_FULL.md "supplementary
//! ambient features" #3): wires a `ControllerConfig` from the CLI, builds an
//! `InMemoryCoordinationClient`, optionally seeds it from a manifest file, and
//! runs a `KafkaController` through election -> failover -> event loop so the
//! whole flow is observable end to end without a real network.
//!
//! This is a reference/demo binary, not a production broker process: the
//! coordination client and RPC client are both in-memory. A real deployment
//! would wire `flashq-broker`'s tonic client stack as the `BrokerRpcClient`
//! and a real ZooKeeper-equivalent client as the `CoordinationClient`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use flashq_cluster::controller::{
    ControllerConfig, ControllerMetrics, CoordinationClient, InMemoryCoordinationClient,
    KafkaController,
};
use flashq_cluster::manifest::{ClusterManifest, ManifestLoader};
use flashq_cluster::types::BrokerId;

#[derive(Parser, Debug)]
#[command(name = "flashq-cluster-controller", version, author, about = "FlashQ cluster controller demo")]
struct Cli {
    /// This broker's id; the demo always wins its own election since it is
    /// the only broker registered against the in-memory coordination tree.
    #[arg(long, default_value_t = 1)]
    broker_id: u32,

    /// Optional cluster manifest (YAML/JSON) to seed initial topic layout.
    /// Without one the controller starts with an empty topic set and waits
    /// for `TopicChange` events.
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Enables the auto preferred-leader rebalance timer.
    #[arg(long, default_value_t = false)]
    auto_rebalance: bool,

    /// Auto-rebalance interval in seconds, if enabled.
    #[arg(long, default_value_t = 300)]
    auto_rebalance_interval_secs: u64,

    /// Cluster-wide default for whether a topic may elect a leader from
    /// outside the ISR when no in-sync replica survives.
    #[arg(long, default_value_t = false)]
    unclean_leader_election: bool,

    /// How long to let the event loop run before shutting down, in seconds.
    #[arg(long, default_value_t = 2)]
    run_for_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let self_broker_id = BrokerId(cli.broker_id);

    let manifest = match &cli.manifest {
        Some(path) => ManifestLoader::from_path(path)?,
        None => ClusterManifest::new(),
    };

    let (coordination, watch_rx) = InMemoryCoordinationClient::new();
    for broker in &manifest.brokers {
        coordination.create_ephemeral(
            &flashq_cluster::controller::CoordinationPath::broker(broker.id),
            format!(
                "{{\"id\":{},\"host\":\"{}\",\"port\":{}}}",
                broker.id.0, broker.host, broker.port
            )
            .into_bytes(),
        )?;
    }
    if !manifest
        .brokers
        .iter()
        .any(|b| b.id == self_broker_id)
    {
        coordination.create_ephemeral(
            &flashq_cluster::controller::CoordinationPath::broker(self_broker_id),
            format!("{{\"id\":{},\"host\":\"127.0.0.1\",\"port\":9092}}", self_broker_id.0)
                .into_bytes(),
        )?;
    }
    let coordination: Arc<dyn CoordinationClient> = Arc::new(coordination);

    let config = ControllerConfig {
        unclean_leader_election_enabled: cli.unclean_leader_election,
        auto_rebalance_enabled: cli.auto_rebalance,
        auto_rebalance_interval: std::time::Duration::from_secs(cli.auto_rebalance_interval_secs),
        ..ControllerConfig::default()
    };
    let metrics = Arc::new(ControllerMetrics::new());
    let rpc_client = Arc::new(NoopRpcClient);

    tracing::info!(broker_id = cli.broker_id, "starting controller demo");
    let (manager, watcher) = KafkaController::spawn(
        self_broker_id,
        coordination,
        watch_rx,
        rpc_client,
        config,
        metrics.clone(),
        Some(&manifest),
    );

    manager.await_latch().await;
    tokio::time::sleep(std::time::Duration::from_secs(cli.run_for_secs)).await;

    let snapshot = metrics.snapshot();
    println!(
        "active_controller={} offline_partitions={} topics={} partitions={} events_processed={}",
        snapshot.active_controller_count,
        snapshot.offline_partitions_count,
        snapshot.global_topic_count,
        snapshot.global_partition_count,
        snapshot.events_processed,
    );

    manager.shutdown().await;
    drop(watcher);
    Ok(())
}

/// Logs every staged broker request rather than sending it anywhere real;
/// stands in for `flashq-broker`'s tonic client in this demo binary.
struct NoopRpcClient;

#[async_trait::async_trait]
impl flashq_cluster::controller::BrokerRpcClient for NoopRpcClient {
    async fn send(
        &self,
        broker_id: BrokerId,
        requests: flashq_cluster::controller::BrokerRequests,
    ) -> Result<(), flashq_cluster::ClusterError> {
        tracing::info!(?broker_id, ?requests, "would send broker request");
        Ok(())
    }
}
