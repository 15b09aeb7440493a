use std::{default::Default, time::Duration};

use replicant_shared::RateLimitConfig;

/// Contains Config properties which will be used by a ReplicantClient
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Throttles connect attempts of connectors the application cannot run
    /// without
    pub required_rate_limit: RateLimitConfig,
    /// Throttles connect attempts of optional connectors. Regenerates a fifth as
    /// fast as the required limit so optional sources back off harder.
    pub optional_rate_limit: RateLimitConfig,
    /// Time one tick may spend applying received messages before yielding
    pub message_budget: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            required_rate_limit: RateLimitConfig::new(0.5, 1.0, 1.0),
            optional_rate_limit: RateLimitConfig::new(0.1, 1.0, 1.0),
            message_budget: Duration::from_millis(10),
        }
    }
}
