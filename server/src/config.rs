//! Runtime tunables for the room server.

use shared::TURN_TIME_LIMIT_SECS;
use std::time::Duration;

/// Period of the per-room turn countdown.
pub const TURN_TICK: Duration = Duration::from_secs(1);

/// How often idle sessions are swept.
pub const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Seconds each turn gets before it is forcibly passed.
    pub turn_time_limit: u32,
    /// Pause between the second player joining and the game starting.
    pub auto_start_delay: Duration,
    /// Pause between the second flip of a turn and revealing the outcome.
    pub match_resolve_delay: Duration,
    /// Sessions silent for longer than this are dropped. `None` disables.
    pub idle_timeout: Option<Duration>,
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            turn_time_limit: TURN_TIME_LIMIT_SECS,
            auto_start_delay: Duration::from_millis(500),
            match_resolve_delay: Duration::from_millis(1000),
            idle_timeout: Some(Duration::from_secs(90)),
            max_connections: 1000,
        }
    }
}
