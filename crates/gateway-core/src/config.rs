//! Centralized configuration for the gateway and the sample-exchange roles.
//!
//! Constants for loop cadences, discovery retry, queue depths and the local
//! runtime, plus the [`CycleBudget`] shared by every loop.

use std::time::Duration;

/// Gateway poll loop configuration.
pub struct GatewayConfig;

impl GatewayConfig {
    pub const DEFAULT_CYCLE_TIME: Duration = Duration::from_millis(10);
    /// 0 means "poll until stopped".
    pub const DEFAULT_NUM_CYCLES: usize = 0;
    pub const DEFAULT_NETWORK_INTERFACE: &'static str = "lo";
    pub const DEFAULT_IP_ADDRESS: &'static str = "127.0.0.1";
}

/// Service discovery configuration.
pub struct DiscoveryConfig;

impl DiscoveryConfig {
    /// Wait between two discovery queries that found no provider.
    pub const FIND_SERVICE_RETRY_INTERVAL: Duration = Duration::from_millis(10);
}

/// Proxy-side (receiver) configuration.
pub struct ReceiverConfig;

impl ReceiverConfig {
    /// Subscription queue depth, also the drain limit per cycle.
    pub const SAMPLES_PER_CYCLE: usize = 2;
}

/// Skeleton-side (sender) configuration.
pub struct SenderConfig;

impl SenderConfig {
    pub const DEFAULT_CYCLE_TIME: Duration = Duration::from_millis(10);
    pub const DEFAULT_PAYLOAD_PREFIX: &'static str = "sample";
}

/// In-process runtime configuration.
pub struct RuntimeConfig;

impl RuntimeConfig {
    /// Recent samples a provider keeps for late subscribers.
    pub const SAMPLE_HISTORY_DEPTH: usize = 4;
}

/// Default instance specifier used by the test client.
pub const DEFAULT_INSTANCE_SPECIFIER: &str = "gateway/ipc_bridge/map_api_lanes_stamped";

/// Cadence and length of a loop.
///
/// A `cadence` of `None` means the loop is event driven. A `cycles` value of 0
/// means the loop runs until it is stopped or fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleBudget {
    pub cadence: Option<Duration>,
    pub cycles: usize,
}

impl CycleBudget {
    /// Fixed-cadence budget.
    pub fn every(cadence: Duration, cycles: usize) -> Self {
        Self {
            cadence: Some(cadence),
            cycles,
        }
    }

    /// Event-driven budget.
    pub fn event_driven(cycles: usize) -> Self {
        Self {
            cadence: None,
            cycles,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.cycles == 0
    }

    /// Whether a loop that has completed `completed` cycles may run another.
    pub fn allows(&self, completed: usize) -> bool {
        self.is_unbounded() || completed < self.cycles
    }
}
