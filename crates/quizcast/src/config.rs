//! Gateway configuration.

use std::time::Duration;

use quizcast_delivery::DeliveryConfig;
use quizcast_room::RetryPolicy;
use quizcast_store::CacheConfig;

/// Everything tunable about a running gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,

    /// How long a fresh connection has to authenticate before it is
    /// dropped.
    pub handshake_timeout: Duration,

    /// Idle cutoff for authenticated connections. Generous, since lobby
    /// members legitimately sit quiet between rounds.
    pub idle_timeout: Duration,

    /// Room cache tuning.
    pub cache: CacheConfig,

    /// Delivery-buffer expiry tuning.
    pub delivery: DeliveryConfig,

    /// Room-code allocation retry policy.
    pub retry: RetryPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            handshake_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(300),
            cache: CacheConfig::default(),
            delivery: DeliveryConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}
