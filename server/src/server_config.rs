use std::{default::Default, time::Duration};

/// Contains Config properties which will be used by the ReplicantSessionManager
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Sessions with no traffic for this long are removed by
    /// `remove_idle_sessions`
    pub session_idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            session_idle_timeout: Duration::from_secs(30 * 60),
        }
    }
}
