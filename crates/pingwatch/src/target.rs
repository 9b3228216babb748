//! Monitored endpoint records.

use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::ValidationError;

/// How far in the past a target is backdated when it must be probed on the
/// next tick
const DUE_NOW_BACKDATE: Duration = Duration::from_secs(10);

/// Opaque, stable endpoint key chosen by the host
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TargetId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Poll interval in whole seconds, never below one
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PollInterval(u64);

impl PollInterval {
    pub fn from_secs(seconds: u64) -> Result<Self, ValidationError> {
        if seconds < 1 {
            return Err(ValidationError::IntervalTooSmall { value: seconds as i64 });
        }
        Ok(Self(seconds))
    }

    pub fn as_secs(self) -> u64 {
        self.0
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_secs(self.0)
    }
}

impl fmt::Display for PollInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// Last known reachability of a target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    /// No probe has completed yet
    #[default]
    Unknown,
    Up,
    Down,
}

impl LinkState {
    pub fn from_reachable(reachable: bool) -> Self {
        if reachable { LinkState::Up } else { LinkState::Down }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Unknown => write!(f, "unknown"),
            LinkState::Up => write!(f, "up"),
            LinkState::Down => write!(f, "down"),
        }
    }
}

/// Registry-owned endpoint state. Never handed out by reference; callers
/// only ever see a [`TargetSnapshot`].
#[derive(Debug)]
pub(crate) struct Target {
    pub(crate) id: TargetId,
    pub(crate) address: Ipv4Addr,
    pub(crate) interval: PollInterval,
    pub(crate) next_due_at: Instant,
    pub(crate) state: LinkState,
    /// Generation of the claim whose probe has not reported back yet. Kept
    /// across configuration changes until that probe settles.
    pub(crate) in_flight: Option<u64>,
    /// Registry-wide unique stamp of the current configuration. Results of
    /// probes claimed under any other stamp are dropped.
    pub(crate) generation: u64,
}

impl Target {
    pub(crate) fn new(
        id: TargetId,
        address: Ipv4Addr,
        interval: PollInterval,
        generation: u64,
    ) -> Self {
        Self {
            id,
            address,
            interval,
            next_due_at: due_now(Instant::now()),
            state: LinkState::Unknown,
            in_flight: None,
            generation,
        }
    }

    pub(crate) fn is_due(&self, now: Instant) -> bool {
        self.next_due_at <= now
    }

    /// Push the next probe one interval past `now`
    pub(crate) fn rearm(&mut self, now: Instant) {
        self.next_due_at = now + self.interval.as_duration();
    }

    /// Make the target due on the next tick without touching its interval
    pub(crate) fn mark_due(&mut self) {
        self.next_due_at = due_now(Instant::now());
    }

    /// Clear the in-flight mark if it belongs to the claim made under
    /// `generation`. Marks of other claims are left alone.
    pub(crate) fn settle(&mut self, generation: u64) {
        if self.in_flight == Some(generation) {
            self.in_flight = None;
        }
    }

    pub(crate) fn snapshot(&self) -> TargetSnapshot {
        TargetSnapshot {
            id: self.id.clone(),
            address: self.address,
            interval: self.interval,
            next_due_at: self.next_due_at,
            state: self.state,
            in_flight: self.in_flight.is_some(),
        }
    }
}

/// A timestamp guaranteed to compare `<=` to any later tick
fn due_now(now: Instant) -> Instant {
    now.checked_sub(DUE_NOW_BACKDATE).unwrap_or(now)
}

/// Read-only copy of a target taken under the registry lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSnapshot {
    pub id: TargetId,
    pub address: Ipv4Addr,
    pub interval: PollInterval,
    pub next_due_at: Instant,
    pub state: LinkState,
    pub in_flight: bool,
}
