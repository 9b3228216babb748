//! Host-facing facade.
//!
//! A [`Monitor`] owns the registry and, while started, the scheduler task.
//! Hosts drive it with configuration calls (`add`, `update`, `remove`,
//! `force_check`) and lifecycle calls (`start`, `stop`), and observe it
//! through the [`EventSink`] they supplied.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::{MonitorError, RegistryError};
use crate::events::EventSink;
use crate::prober::{Prober, SystemPingProber};
use crate::registry::Registry;
use crate::scheduler::{MonitorConfig, Scheduler};
use crate::target::{TargetId, TargetSnapshot};

struct RunningLoop {
    stop_tx: watch::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct Monitor {
    config: MonitorConfig,
    registry: Arc<Registry>,
    prober: Arc<dyn Prober>,
    sink: Arc<dyn EventSink>,
    verbose: Arc<AtomicBool>,
    running: Mutex<Option<RunningLoop>>,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        prober: Arc<dyn Prober>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, MonitorError> {
        config.validate()?;
        Ok(Self {
            config,
            registry: Arc::new(Registry::new()),
            prober,
            sink,
            verbose: Arc::new(AtomicBool::new(false)),
            running: Mutex::new(None),
        })
    }

    /// Monitor probing through the system `ping` utility
    pub fn with_system_ping(
        config: MonitorConfig,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, MonitorError> {
        let prober = Arc::new(SystemPingProber::new(config.ping.clone()));
        Self::new(config, prober, sink)
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Shared handle to the target registry
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn add(
        &self,
        id: impl Into<TargetId>,
        address: &str,
        interval_secs: u64,
    ) -> Result<(), RegistryError> {
        self.registry.add(id, address, interval_secs)
    }

    pub fn update(
        &self,
        id: &TargetId,
        address: Option<&str>,
        interval_secs: Option<u64>,
    ) -> Result<(), RegistryError> {
        self.registry.update(id, address, interval_secs)
    }

    pub fn remove(&self, id: &TargetId) {
        self.registry.remove(id)
    }

    pub fn force_check(&self, id: &TargetId) {
        self.registry.force_check(id)
    }

    pub fn force_check_all(&self) {
        self.registry.force_check_all()
    }

    pub fn target(&self, id: &TargetId) -> Option<TargetSnapshot> {
        self.registry.get(id)
    }

    /// Toggle per-probe logging between debug and info level
    pub fn set_verbose(&self, verbose: bool) {
        self.verbose.store(verbose, Ordering::Relaxed);
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Spawn the scheduler loop on the current tokio runtime. Calling it
    /// while the loop is already running does nothing.
    pub fn start(&self) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            warn!("Monitor already running");
            return;
        }

        let (stop_tx, stop_rx) = watch::channel(());
        let scheduler = Scheduler::new(
            self.registry.clone(),
            self.prober.clone(),
            self.sink.clone(),
            self.config.clone(),
        )
        .with_verbose(self.verbose.clone());

        let handle = tokio::spawn(scheduler.run(stop_rx));
        *running = Some(RunningLoop { stop_tx, handle });
        info!(endpoints = self.registry.len(), "Monitor started");
    }

    /// Ask the loop to stop and wait until it has exited. Idempotent.
    pub async fn stop(&self) {
        let running = self.running.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(RunningLoop { stop_tx, handle }) = running else {
            return;
        };

        // The loop may already be gone, in which case there is no receiver.
        let _ = stop_tx.send(());
        if let Err(e) = handle.await {
            error!(error = %e, "Scheduler task ended abnormally");
        }
        info!("Monitor stopped");
    }
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("verbose", &self.is_verbose())
            .finish_non_exhaustive()
    }
}
