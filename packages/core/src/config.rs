//! Hub configuration.

use std::str::FromStr;
use std::time::Duration;

use crate::{ConfigError, TerminalPolicy};

/// Event types treated as terminal unless configured otherwise.
pub const DEFAULT_TERMINAL_EVENTS: &[&str] = &["completed", "failed", "cancelled", "error"];

/// Configuration for the event hub.
#[derive(Debug, Clone, PartialEq)]
pub struct HubConfig {
    /// Idle time after which a stream emits a heartbeat record.
    pub heartbeat_interval: Duration,
    /// Inactivity after which the expiry sweep removes a connection.
    pub connection_timeout: Duration,
    /// Maximum history entries kept per task.
    pub max_history_entries: usize,
    /// Maximum age of a history entry.
    pub max_history_age: Duration,
    /// How long a task's history survives after a terminal event.
    pub terminal_retention: Duration,
    /// Period of the expiry and history sweeps.
    pub sweep_interval: Duration,
    /// Capacity of each connection's delivery queue.
    pub queue_capacity: usize,
    /// Upper bound on a request/reply round trip to the hub.
    pub call_timeout: Duration,
    /// Event types that close the streams watching a task.
    pub terminal_events: Vec<String>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(300),
            max_history_entries: 50,
            max_history_age: Duration::from_secs(300),
            terminal_retention: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(60),
            queue_capacity: 1000,
            call_timeout: Duration::from_secs(5),
            terminal_events: DEFAULT_TERMINAL_EVENTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl HubConfig {
    /// Load configuration from `HUB_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(secs) = parse::<u64, _>(&lookup, "HUB_HEARTBEAT_SECS")? {
            config.heartbeat_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "HUB_CONNECTION_TIMEOUT_SECS")? {
            config.connection_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parse::<usize, _>(&lookup, "HUB_HISTORY_MAX_ENTRIES")? {
            config.max_history_entries = n;
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "HUB_HISTORY_MAX_AGE_SECS")? {
            config.max_history_age = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "HUB_TERMINAL_RETENTION_SECS")? {
            config.terminal_retention = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "HUB_SWEEP_INTERVAL_SECS")? {
            config.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(n) = parse::<usize, _>(&lookup, "HUB_QUEUE_CAPACITY")? {
            config.queue_capacity = n;
        }
        if let Some(list) = lookup("HUB_TERMINAL_EVENTS") {
            config.terminal_events = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the hub cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("heartbeat_interval", self.heartbeat_interval.is_zero()),
            ("sweep_interval", self.sweep_interval.is_zero()),
            ("max_history_entries", self.max_history_entries == 0),
            ("queue_capacity", self.queue_capacity == 0),
        ];
        for (key, is_zero) in checks {
            if is_zero {
                return Err(ConfigError::Zero {
                    key: key.to_string(),
                });
            }
        }
        if self.queue_capacity < self.max_history_entries {
            return Err(ConfigError::QueueBelowHistory {
                queue_capacity: self.queue_capacity,
                max_history_entries: self.max_history_entries,
            });
        }
        if self.heartbeat_interval >= self.connection_timeout {
            return Err(ConfigError::HeartbeatTooSlow {
                heartbeat_interval: self.heartbeat_interval,
                connection_timeout: self.connection_timeout,
            });
        }
        Ok(())
    }

    /// The terminal policy described by `terminal_events`.
    pub fn terminal_policy(&self) -> TerminalPolicy {
        TerminalPolicy::types(self.terminal_events.iter().cloned())
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_max_history_entries(mut self, max: usize) -> Self {
        self.max_history_entries = max;
        self
    }

    pub fn with_max_history_age(mut self, age: Duration) -> Self {
        self.max_history_age = age;
        self
    }

    pub fn with_terminal_retention(mut self, retention: Duration) -> Self {
        self.terminal_retention = retention;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_terminal_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.terminal_events = events.into_iter().map(Into::into).collect();
        self
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
    }
}
