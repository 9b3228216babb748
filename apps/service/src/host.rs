//! Host process around the monitor library.
//!
//! Endpoints come from the config file. At runtime the process reacts to
//! signals:
//! - SIGHUP re-reads the config file and reconciles the endpoint set
//! - SIGUSR1 toggles debug logging
//! - SIGUSR2 requests an immediate status check of every endpoint
//! - SIGINT / SIGTERM stop the monitor

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use logger::LogHandle;
use pingwatch::{IcmpProber, LogSink, Monitor, Prober, SystemPingProber, TargetId};
use tracing::{info, warn};

use crate::config::{Config, Endpoint, ProberKind};

/// What a reconciliation pass changed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub rejected: usize,
}

pub struct Host {
    monitor: Monitor,
    config: Config,
    config_path: PathBuf,
    log: LogHandle,
}

impl Host {
    pub fn new(config: Config, config_path: PathBuf, log: LogHandle) -> Result<Self> {
        let prober = build_prober(&config)?;
        let monitor = Monitor::new(config.monitor_config(), prober, Arc::new(LogSink))
            .context("Invalid [monitor] or [ping] settings")?;
        monitor.set_verbose(config.logging.debug);

        let summary = reconcile(&monitor, &config.endpoints);
        info!(
            endpoints = summary.added,
            rejected = summary.rejected,
            "Registered endpoints from {}",
            config_path.display()
        );

        Ok(Self { monitor, config, config_path, log })
    }

    /// Start the monitor and serve signals until asked to stop
    pub async fn run(mut self) -> Result<()> {
        self.monitor.start();
        self.wait_for_signals().await?;
        self.monitor.stop().await;
        Ok(())
    }

    #[cfg(unix)]
    async fn wait_for_signals(&mut self) -> Result<()> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        let mut toggle =
            signal(SignalKind::user_defined1()).context("Failed to install SIGUSR1 handler")?;
        let mut refresh =
            signal(SignalKind::user_defined2()).context("Failed to install SIGUSR2 handler")?;

        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.context("Failed to listen for ctrl-c")?;
                    info!("Interrupted, shutting down");
                    return Ok(());
                }
                _ = terminate.recv() => {
                    info!("Terminated, shutting down");
                    return Ok(());
                }
                _ = hangup.recv() => self.reload(),
                _ = toggle.recv() => self.toggle_debug(),
                _ = refresh.recv() => {
                    info!("Status request for all endpoints");
                    self.monitor.force_check_all();
                }
            }
        }
    }

    #[cfg(not(unix))]
    async fn wait_for_signals(&mut self) -> Result<()> {
        tokio::signal::ctrl_c().await.context("Failed to listen for ctrl-c")?;
        info!("Interrupted, shutting down");
        Ok(())
    }

    /// Re-read the config file and apply endpoint and logging changes
    fn reload(&mut self) {
        let config = match Config::from_path(&self.config_path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Preferences reload failed, keeping current configuration");
                return;
            }
        };
        info!("Preferences were updated, reloading Preferences...");

        if config.monitor != self.config.monitor || config.ping != self.config.ping {
            warn!("[monitor] and [ping] changes take effect after a restart");
        }
        if config.logging.debug != self.config.logging.debug {
            self.set_debug(config.logging.debug);
        }

        let summary = reconcile(&self.monitor, &config.endpoints);
        info!(
            added = summary.added,
            updated = summary.updated,
            removed = summary.removed,
            rejected = summary.rejected,
            "Endpoints reconciled"
        );

        self.config = config;
    }

    fn toggle_debug(&mut self) {
        let debug = !self.config.logging.debug;
        if debug {
            info!("Turning on debug logging");
        } else {
            info!("Turning off debug logging");
        }
        self.set_debug(debug);
    }

    fn set_debug(&mut self, debug: bool) {
        self.config.logging.debug = debug;
        self.log.set_debug(debug);
        self.monitor.set_verbose(debug);
    }
}

fn build_prober(config: &Config) -> Result<Arc<dyn Prober>> {
    let settings = config.monitor_config().ping;
    let prober: Arc<dyn Prober> = match config.ping.prober {
        ProberKind::System => {
            let mut prober = SystemPingProber::new(settings);
            if let Some(program) = &config.ping.program {
                prober = prober.with_program(program);
            }
            Arc::new(prober)
        }
        ProberKind::Icmp => Arc::new(
            IcmpProber::new(settings)
                .context("Cannot open ICMP socket, try prober = \"system\"")?,
        ),
    };
    Ok(prober)
}

/// Make the monitor's endpoint set match `endpoints`.
///
/// Unknown ids are added, ids no longer listed are removed and changed
/// entries are updated. Invalid entries are logged with the offending field
/// and skipped; an invalid edit leaves the previous configuration running.
pub fn reconcile(monitor: &Monitor, endpoints: &[Endpoint]) -> ReconcileSummary {
    let mut summary = ReconcileSummary::default();
    let desired: HashSet<TargetId> =
        endpoints.iter().map(|e| TargetId::from(e.id.as_str())).collect();

    for id in monitor.registry().ids() {
        if !desired.contains(&id) {
            info!(target_id = %id, "Removing endpoint no longer configured");
            monitor.remove(&id);
            summary.removed += 1;
        }
    }

    for endpoint in endpoints {
        let id = TargetId::from(endpoint.id.as_str());
        let result = match monitor.target(&id) {
            None => monitor.add(id.clone(), &endpoint.address, endpoint.interval_secs).map(|()| {
                summary.added += 1;
            }),
            Some(current) => {
                let unchanged = current.address.to_string() == endpoint.address
                    && current.interval.as_secs() == endpoint.interval_secs;
                if unchanged {
                    continue;
                }
                monitor
                    .update(&id, Some(endpoint.address.as_str()), Some(endpoint.interval_secs))
                    .map(|()| summary.updated += 1)
            }
        };

        if let Err(e) = result {
            warn!(target_id = %id, error = %e, "Rejected endpoint configuration");
            summary.rejected += 1;
        }
    }

    summary
}
