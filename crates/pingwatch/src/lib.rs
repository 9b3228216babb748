//! pingwatch - periodic ICMP reachability monitoring
//!
//! This library tracks a set of IPv4 endpoints, polls each one on its own
//! interval and reports up/down transitions to an [`EventSink`].
//!
//! The moving parts, leaf first:
//! - [`validation`]: IPv4 literal and poll interval validation
//! - [`prober`]: single reachability probes (system `ping` or raw ICMP)
//! - [`target`]: the per-endpoint record
//! - [`registry`]: synchronized ownership of all targets
//! - [`scheduler`]: the tick loop dispatching probes
//! - [`events`]: state-change events and sinks
//! - [`monitor`]: lifecycle facade a host application drives

pub mod error;
pub mod events;
pub mod monitor;
pub mod prober;
pub mod registry;
pub mod scheduler;
pub mod target;
pub mod validation;

// Re-export main types
pub use error::{MonitorError, ProbeError, RegistryError, ValidationError};
pub use events::{ChannelSink, EventSink, LogSink, StateChange};
pub use monitor::Monitor;
pub use prober::{IcmpProber, PingSettings, ProbeOutcome, Prober, SystemPingProber};
pub use registry::Registry;
pub use scheduler::{MonitorConfig, Scheduler};
pub use target::{LinkState, PollInterval, TargetId, TargetSnapshot};
pub use validation::validate;

/// Poll interval applied when a host registers an endpoint without one
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
