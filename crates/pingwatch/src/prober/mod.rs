//! Reachability probes.
//!
//! A [`Prober`] runs one attempt against an address and reports one of
//! three outcomes. Callers almost always want a plain boolean, so the trait
//! collapses outcomes and execution errors in exactly one place,
//! [`Prober::probe`]: only [`ProbeOutcome::Reachable`] counts as up, and a
//! probe that could not even be executed counts as down. Errors are logged
//! at debug level and never propagated.

mod icmp;
mod system;

pub use icmp::IcmpProber;
pub use system::SystemPingProber;

use std::net::Ipv4Addr;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::ProbeError;

/// Terminal result of a single probe attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// At least one echo reply came back
    Reachable,
    /// The network reported the host unreachable
    Unreachable,
    /// No reply within the deadline
    TimedOut,
}

impl ProbeOutcome {
    pub fn is_reachable(self) -> bool {
        matches!(self, ProbeOutcome::Reachable)
    }
}

/// Most echo requests a single attempt may send
pub(crate) const MAX_ECHO_COUNT: u32 = 100;

/// Per-attempt echo parameters shared by all prober implementations
#[derive(Debug, Clone)]
pub struct PingSettings {
    /// Echo requests sent per attempt; one reply is enough
    pub echo_count: u32,
    /// Upper bound for a whole attempt
    pub deadline: Duration,
}

impl Default for PingSettings {
    fn default() -> Self {
        Self { echo_count: 4, deadline: Duration::from_secs(2) }
    }
}

#[async_trait]
pub trait Prober: Send + Sync {
    /// Run one attempt against `address`
    async fn attempt(&self, address: Ipv4Addr) -> Result<ProbeOutcome, ProbeError>;

    /// One attempt, collapsed to a boolean
    async fn probe(&self, address: Ipv4Addr) -> bool {
        match self.attempt(address).await {
            Ok(ProbeOutcome::Reachable) => {
                debug!(%address, "Address is reachable");
                true
            }
            Ok(ProbeOutcome::Unreachable) => {
                debug!(%address, "Host not found");
                false
            }
            Ok(ProbeOutcome::TimedOut) => {
                debug!(%address, "Ping timed out");
                false
            }
            Err(e) => {
                debug!(%address, error = %e, "Probe could not be executed, treating as unreachable");
                false
            }
        }
    }

    /// Up to `attempts` probes with `delay` between them; true on the first
    /// success, false once every attempt failed
    async fn probe_with_retry(&self, address: Ipv4Addr, attempts: u32, delay: Duration) -> bool {
        for attempt in 1..=attempts {
            if self.probe(address).await {
                return true;
            }
            if attempt < attempts {
                tokio::time::sleep(delay).await;
            }
        }
        debug!(%address, attempts, "Ping result: Failure");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    /// Plays back scripted outcomes, then repeats the last one
    struct ScriptedProber {
        script: Mutex<Vec<Result<ProbeOutcome, ProbeError>>>,
        calls: AtomicU32,
    }

    impl ScriptedProber {
        fn new(script: Vec<Result<ProbeOutcome, ProbeError>>) -> Self {
            Self { script: Mutex::new(script), calls: AtomicU32::new(0) }
        }
    }

    #[async_trait]
    impl Prober for ScriptedProber {
        async fn attempt(&self, _address: Ipv4Addr) -> Result<ProbeOutcome, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 { script.remove(0) } else { clone_result(&script[0]) }
        }
    }

    fn clone_result(result: &Result<ProbeOutcome, ProbeError>) -> Result<ProbeOutcome, ProbeError> {
        match result {
            Ok(outcome) => Ok(*outcome),
            Err(e) => Err(ProbeError::Exit(e.to_string())),
        }
    }

    const ADDR: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 10);

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_on_third_attempt() {
        let prober = ScriptedProber::new(vec![
            Ok(ProbeOutcome::TimedOut),
            Ok(ProbeOutcome::Unreachable),
            Ok(ProbeOutcome::Reachable),
        ]);

        let start = Instant::now();
        assert!(prober.probe_with_retry(ADDR, 3, Duration::from_millis(100)).await);
        assert_eq!(prober.calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_all_attempts() {
        let prober = ScriptedProber::new(vec![Ok(ProbeOutcome::TimedOut)]);

        assert!(!prober.probe_with_retry(ADDR, 3, Duration::from_millis(100)).await);
        assert_eq!(prober.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_stops_at_first_success() {
        let prober = ScriptedProber::new(vec![Ok(ProbeOutcome::Reachable)]);

        assert!(prober.probe_with_retry(ADDR, 3, Duration::from_millis(100)).await);
        assert_eq!(prober.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execution_error_counts_as_unreachable() {
        let prober = ScriptedProber::new(vec![Err(ProbeError::Spawn(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "operation not permitted",
        )))]);

        assert!(!prober.probe(ADDR).await);
        assert!(!prober.probe_with_retry(ADDR, 2, Duration::ZERO).await);
        assert_eq!(prober.calls.load(Ordering::SeqCst), 3);
    }
}
