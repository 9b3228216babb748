//! Scheduler - the polling loop
//!
//! Every tick the scheduler claims all due targets from the registry. A
//! claim re-arms the target to `now + interval` and marks it in flight in
//! the same critical section, so a slow probe can never cause the target to
//! be selected twice. Each claim is then probed on its own task, bounded by
//! a semaphore, and the result is written back through the registry, which
//! decides whether a state-change event fires.
//!
//! The loop itself never awaits a probe. Stopping it leaves outstanding
//! probes to finish or time out on their own; their results still go
//! through the registry and are dropped if the target is gone.

mod config;

pub use config::{MonitorConfig, MonitorConfigBuilder};

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Semaphore, watch};
use tokio::task::{self, JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, error, info};

use crate::events::EventSink;
use crate::prober::Prober;
use crate::registry::{ProbeClaim, Registry};
use crate::target::TargetId;

pub struct Scheduler {
    registry: Arc<Registry>,
    prober: Arc<dyn Prober>,
    sink: Arc<dyn EventSink>,
    config: MonitorConfig,
    permits: Arc<Semaphore>,
    probes: JoinSet<()>,
    /// Which endpoint each running probe task belongs to, for error reports
    probe_targets: HashMap<task::Id, TargetId>,
    verbose: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(
        registry: Arc<Registry>,
        prober: Arc<dyn Prober>,
        sink: Arc<dyn EventSink>,
        config: MonitorConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_probes));
        Self {
            registry,
            prober,
            sink,
            config,
            permits,
            probes: JoinSet::new(),
            probe_targets: HashMap::new(),
            verbose: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a verbosity flag with the host; it only changes log levels
    pub fn with_verbose(mut self, verbose: Arc<AtomicBool>) -> Self {
        self.verbose = verbose;
        self
    }

    /// Run ticks until `stop` fires or its sender is dropped
    pub async fn run(mut self, mut stop: watch::Receiver<()>) {
        info!(tick_ms = self.config.tick_period.as_millis() as u64, "Starting scheduler loop");

        let mut ticker = interval(self.config.tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = stop.changed() => {
                    info!("Stop requested, leaving scheduler loop");
                    break;
                }

                _ = ticker.tick() => {
                    self.reap();
                    self.tick(Instant::now());
                }
            }
        }

        let outstanding = self.probes.len();
        if outstanding > 0 {
            debug!(outstanding, "Leaving in-flight probes to finish on their own");
        }
        self.probes.detach_all();
        info!("Scheduler loop stopped");
    }

    /// Claim every due target and dispatch a probe for it. Returns the
    /// number of probes dispatched.
    pub fn tick(&mut self, now: Instant) -> usize {
        let claims = self.registry.claim_due(now);
        let dispatched = claims.len();
        for claim in claims {
            self.dispatch(claim);
        }
        dispatched
    }

    /// Wait for every dispatched probe to report back
    pub async fn drain(&mut self) {
        while let Some(result) = self.probes.join_next_with_id().await {
            self.settle(result);
        }
    }

    /// Number of probe tasks not yet reaped
    pub fn outstanding(&self) -> usize {
        self.probes.len()
    }

    fn dispatch(&mut self, claim: ProbeClaim) {
        let id = claim.id.clone();
        let guard = ClaimGuard { registry: self.registry.clone(), claim, settled: false };
        let prober = self.prober.clone();
        let sink = self.sink.clone();
        let permits = self.permits.clone();
        let verbose = self.verbose.clone();
        let attempts = self.config.probe_attempts;
        let delay = self.config.retry_delay;

        let handle = self.probes.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                error!(target_id = %guard.claim.id, "Probe limiter closed, skipping probe");
                return;
            };

            let address = guard.claim.address;
            if verbose.load(Ordering::Relaxed) {
                info!(target_id = %guard.claim.id, %address, "Pinging address ...");
            } else {
                debug!(target_id = %guard.claim.id, %address, "Pinging address ...");
            }

            let reachable = prober.probe_with_retry(address, attempts, delay).await;
            guard.finish(reachable, sink.as_ref());
        });
        self.probe_targets.insert(handle.id(), id);
    }

    /// Collect finished probe tasks without waiting
    fn reap(&mut self) {
        while let Some(result) = self.probes.try_join_next_with_id() {
            self.settle(result);
        }
    }

    fn settle(&mut self, result: Result<(task::Id, ()), JoinError>) {
        match result {
            Ok((id, ())) => {
                self.probe_targets.remove(&id);
            }
            Err(e) => {
                let target = self.probe_targets.remove(&e.id());
                let target_id = target.as_ref().map(TargetId::as_str).unwrap_or("<unknown>");
                if e.is_panic() {
                    error!(target_id, "Probe task panicked; endpoint stays scheduled");
                } else {
                    debug!(target_id, "Probe task cancelled");
                }
            }
        }
    }
}

/// Hands the claim back to the registry if the probe task ends without a
/// result (panic or cancellation), so the target does not stay in flight
/// forever.
struct ClaimGuard {
    registry: Arc<Registry>,
    claim: ProbeClaim,
    settled: bool,
}

impl ClaimGuard {
    fn finish(mut self, reachable: bool, sink: &dyn EventSink) {
        self.settled = true;
        self.registry.record_result(&self.claim, reachable, |change| sink.on_state_change(change));
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if !self.settled {
            self.registry.release(&self.claim);
        }
    }
}
