//! Scheduler configuration.
//!
//! Defaults mirror the classic plugin behaviour: a 300 ms tick, three
//! attempts per probe with 100 ms in between, and four echoes within a
//! two second deadline per attempt.

use std::time::Duration;

use crate::error::MonitorError;
use crate::prober::{MAX_ECHO_COUNT, PingSettings};

/// Finest poll interval a target can have; the tick must not be coarser
const FINEST_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration options for a monitor
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Period of the scheduler loop
    pub tick_period: Duration,

    /// Attempts per probe before a target counts as down
    pub probe_attempts: u32,

    /// Pause between two attempts of the same probe
    pub retry_delay: Duration,

    /// Upper bound of probes running at the same time
    pub max_concurrent_probes: usize,

    /// Echo parameters for the built-in probers
    pub ping: PingSettings,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(300),
            probe_attempts: 3,
            retry_delay: Duration::from_millis(100),
            max_concurrent_probes: 16,
            ping: PingSettings::default(),
        }
    }
}

impl MonitorConfig {
    /// Create a new configuration builder
    pub fn builder() -> MonitorConfigBuilder {
        MonitorConfigBuilder::default()
    }

    /// Check the values against the scheduler's timing assumptions
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.tick_period.is_zero() || self.tick_period > FINEST_POLL_INTERVAL {
            return Err(MonitorError::InvalidConfig(format!(
                "tick period must be between 1ms and {}ms, got {}ms",
                FINEST_POLL_INTERVAL.as_millis(),
                self.tick_period.as_millis()
            )));
        }
        if self.probe_attempts == 0 {
            return Err(MonitorError::InvalidConfig("probe attempts must be at least 1".into()));
        }
        if self.max_concurrent_probes == 0 {
            return Err(MonitorError::InvalidConfig(
                "max concurrent probes must be at least 1".into(),
            ));
        }
        if self.ping.echo_count == 0 || self.ping.echo_count > MAX_ECHO_COUNT {
            return Err(MonitorError::InvalidConfig(format!(
                "echo count must be between 1 and {MAX_ECHO_COUNT}, got {}",
                self.ping.echo_count
            )));
        }
        if self.ping.deadline < Duration::from_secs(1) {
            return Err(MonitorError::InvalidConfig("ping deadline must be at least 1s".into()));
        }
        Ok(())
    }

    /// Longest a single target's probe can take with these settings
    pub fn probe_budget(&self) -> Duration {
        (self.ping.deadline + self.retry_delay) * self.probe_attempts
    }
}

/// Builder for MonitorConfig
#[derive(Debug, Default)]
pub struct MonitorConfigBuilder {
    config: MonitorConfig,
}

impl MonitorConfigBuilder {
    /// Build the configuration
    pub fn build(self) -> MonitorConfig {
        self.config
    }

    pub fn tick_period(mut self, period: Duration) -> Self {
        self.config.tick_period = period;
        self
    }

    pub fn probe_attempts(mut self, attempts: u32) -> Self {
        self.config.probe_attempts = attempts;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    pub fn max_concurrent_probes(mut self, limit: usize) -> Self {
        self.config.max_concurrent_probes = limit;
        self
    }

    pub fn echo_count(mut self, count: u32) -> Self {
        self.config.ping.echo_count = count;
        self
    }

    pub fn ping_deadline(mut self, deadline: Duration) -> Self {
        self.config.ping.deadline = deadline;
        self
    }
}
