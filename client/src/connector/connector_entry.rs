use replicant_shared::{RateLimitConfig, RateLimiter};

use crate::connector::Connector;

/// A connector together with the rate limiter gating its connect and
/// disconnect attempts
pub struct ConnectorEntry {
    connector: Connector,
    required: bool,
    rate_limiter: RateLimiter,
    cost: f64,
}

impl ConnectorEntry {
    pub fn new(connector: Connector, required: bool, config: &RateLimitConfig, now_millis: u64) -> Self {
        Self {
            connector,
            required,
            rate_limiter: config.build(now_millis),
            cost: config.cost,
        }
    }

    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    pub fn connector_mut(&mut self) -> &mut Connector {
        &mut self.connector
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Run `action` against the connector if the rate limiter allows it
    pub fn attempt_action<F: FnOnce(&mut Connector)>(&mut self, now_millis: u64, action: F) -> bool {
        let connector = &mut self.connector;
        self.rate_limiter
            .attempt(now_millis, self.cost, || action(connector))
    }
}
