//! Token-bucket limiter guarding repeated connect/disconnect attempts.
//!
//! Time is expressed in milliseconds supplied by the caller, so the bucket can
//! be driven by a real clock or by a test.

/// Parameters of a token bucket
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Tokens regenerated per second of elapsed time
    pub tokens_per_second: f64,
    /// Capacity of the bucket; a fresh bucket starts full
    pub max_tokens: f64,
    /// Tokens consumed by one attempt
    pub cost: f64,
}

impl RateLimitConfig {
    pub fn new(tokens_per_second: f64, max_tokens: f64, cost: f64) -> Self {
        Self {
            tokens_per_second,
            max_tokens,
            cost,
        }
    }

    pub fn build(&self, now_millis: u64) -> RateLimiter {
        RateLimiter::new(self.tokens_per_second, self.max_tokens, now_millis)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            tokens_per_second: 0.5,
            max_tokens: 1.0,
            cost: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    tokens_per_second: f64,
    max_tokens: f64,
    token_count: f64,
    last_regen_time: u64,
}

impl RateLimiter {
    pub fn new(tokens_per_second: f64, max_tokens: f64, now_millis: u64) -> Self {
        let max_tokens = max_tokens.max(0.0);
        Self {
            tokens_per_second: tokens_per_second.max(0.0),
            max_tokens,
            token_count: max_tokens,
            last_regen_time: now_millis,
        }
    }

    pub fn tokens_per_second(&self) -> f64 {
        self.tokens_per_second
    }

    pub fn max_tokens(&self) -> f64 {
        self.max_tokens
    }

    pub fn token_count(&self) -> f64 {
        self.token_count
    }

    pub fn is_full(&self) -> bool {
        self.token_count >= self.max_tokens
    }

    /// Add the tokens accrued since the last regeneration, capped at the bucket
    /// size. A clock that moves backwards regenerates nothing.
    pub fn regenerate(&mut self, now_millis: u64) {
        let elapsed = now_millis.saturating_sub(self.last_regen_time) as f64;
        let accrued = elapsed * self.tokens_per_second / 1000.0;
        self.token_count = (self.token_count + accrued).min(self.max_tokens);
        self.last_regen_time = self.last_regen_time.max(now_millis);
    }

    /// Regenerate, then spend `cost` tokens and run `action` if enough tokens
    /// are available. Returns whether the action ran.
    pub fn attempt<F: FnOnce()>(&mut self, now_millis: u64, cost: f64, action: F) -> bool {
        self.regenerate(now_millis);
        if self.token_count >= cost {
            self.token_count = (self.token_count - cost).max(0.0);
            action();
            true
        } else {
            false
        }
    }

    /// Refill the bucket to capacity
    pub fn fill(&mut self) {
        self.token_count = self.max_tokens;
    }
}
