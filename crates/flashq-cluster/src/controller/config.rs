//! Controller tuning parameters.

use std::time::Duration;

/// Runtime configuration for a [`KafkaController`](super::controller::KafkaController).
///
/// Mirrors the `clap`-derived config structs used by `flashq-broker`/`flashq-client`
/// binaries: a plain struct with a sensible [`Default`], constructed directly in tests
/// and overridable from a CLI in production entry points.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Whether a topic may elect a leader from outside the ISR when no in-sync
    /// replica is available. Per-topic override is out of scope here; this is
    /// the cluster-wide default used unless stated otherwise by a call site.
    pub unclean_leader_election_enabled: bool,
    /// Number of partitions handled per RPC batch during controlled shutdown.
    pub controlled_shutdown_partition_batch_size: usize,
    /// How often the auto preferred-leader rebalance timer fires.
    pub auto_rebalance_interval: Duration,
    /// Whether the auto preferred-leader rebalance timer is enabled at all.
    pub auto_rebalance_enabled: bool,
    /// Imbalance ratio (0-100) above which a broker's non-preferred partitions
    /// trigger an automatic preferred-replica election.
    pub leader_imbalance_threshold_percent: u8,
    /// Maximum retries for the refresh-and-CAS loops in `isr.rs` before giving up.
    pub isr_cas_max_retries: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            unclean_leader_election_enabled: false,
            controlled_shutdown_partition_batch_size: 10,
            auto_rebalance_interval: Duration::from_secs(300),
            auto_rebalance_enabled: false,
            leader_imbalance_threshold_percent: 10,
            isr_cas_max_retries: 5,
        }
    }
}
