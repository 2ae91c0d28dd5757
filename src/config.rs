//! Server configuration, loaded from environment variables.

use anyhow::Result;
use std::env;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Path the WebSocket rendezvous endpoint is mounted on.
    pub ws_path: String,

    /// Application-layer ping period, in seconds.
    pub ping_interval_secs: u64,

    /// Idle read/write timeout, in seconds. A connection with no traffic
    /// (including a pong) for this long is torn down.
    pub idle_timeout_secs: u64,

    /// Grace period, in seconds, before an emptied room is garbage collected.
    pub room_gc_grace_secs: u64,

    /// Maximum number of simultaneous rooms. `None` means unlimited.
    pub max_rooms: Option<usize>,

    /// Maximum number of collision retries when generating a fresh room code.
    pub code_gen_max_attempts: usize,

    /// Capacity of each peer's bounded outbound message queue.
    pub outbox_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables, falling back to the
    /// reference defaults from the spec where a variable is unset.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            ws_path: env::var("WS_PATH").unwrap_or_else(|_| "/rtc".into()),
            ping_interval_secs: env_parse("PING_INTERVAL_SECS", 15),
            idle_timeout_secs: env_parse("IDLE_TIMEOUT_SECS", 15),
            room_gc_grace_secs: env_parse("ROOM_GC_GRACE_SECS", 60),
            max_rooms: env::var("MAX_ROOMS").ok().and_then(|v| v.parse().ok()),
            code_gen_max_attempts: env_parse("CODE_GEN_MAX_ATTEMPTS", 8),
            outbox_capacity: env_parse("OUTBOX_CAPACITY", 32),
        })
    }

    /// Configuration for use in tests: no env vars read, defaults only.
    #[must_use]
    pub fn default_for_test() -> Self {
        Self {
            bind_address: "127.0.0.1:0".into(),
            ws_path: "/rtc".into(),
            ping_interval_secs: 15,
            idle_timeout_secs: 15,
            room_gc_grace_secs: 60,
            max_rooms: None,
            code_gen_max_attempts: 8,
            outbox_capacity: 32,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_for_test_matches_spec_defaults() {
        let cfg = Config::default_for_test();
        assert_eq!(cfg.ping_interval_secs, 15);
        assert_eq!(cfg.idle_timeout_secs, 15);
        assert_eq!(cfg.room_gc_grace_secs, 60);
        assert_eq!(cfg.code_gen_max_attempts, 8);
        assert!(cfg.max_rooms.is_none());
    }
}
