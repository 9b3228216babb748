use std::{env, fmt, fs, io, path, time::Duration};

use pingwatch::{DEFAULT_POLL_INTERVAL_SECS, MonitorConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to read config file: {0}")]
    ReadFailed(#[source] io::Error),
    #[error("Failed to write config file: {0}")]
    WriteFailed(#[source] io::Error),
    #[error("Failed to parse config file: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("No config directory available, set XDG_CONFIG_HOME or HOME")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub monitor: Monitor,
    pub ping: Ping,
    pub logging: Logging,
    pub endpoints: Vec<Endpoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Monitor {
    pub tick_ms: u64,
    pub probe_attempts: u32,
    pub retry_delay_ms: u64,
    pub max_concurrent_probes: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProberKind {
    /// Shell out to the platform ping utility
    #[default]
    System,
    /// Raw ICMP socket, needs CAP_NET_RAW or ping_group_range
    Icmp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ping {
    pub prober: ProberKind,
    pub echo_count: u32,
    pub deadline_secs: u64,
    /// Path of the ping binary; looked up on PATH when unset
    pub program: Option<path::PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub debug: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    pub address: String,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

fn default_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

impl Default for Monitor {
    fn default() -> Self {
        let defaults = MonitorConfig::default();
        Self {
            tick_ms: defaults.tick_period.as_millis() as u64,
            probe_attempts: defaults.probe_attempts,
            retry_delay_ms: defaults.retry_delay.as_millis() as u64,
            max_concurrent_probes: defaults.max_concurrent_probes,
        }
    }
}

impl Default for Ping {
    fn default() -> Self {
        let defaults = MonitorConfig::default().ping;
        Self {
            prober: ProberKind::default(),
            echo_count: defaults.echo_count,
            deadline_secs: defaults.deadline.as_secs(),
            program: None,
        }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/pingwatch/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("pingwatch/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);
        let write_2 = write_indented(2);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Monitor")?;
        write_1(f, "Tick (ms)", &self.monitor.tick_ms)?;
        write_1(f, "Probe Attempts", &self.monitor.probe_attempts)?;
        write_1(f, "Retry Delay (ms)", &self.monitor.retry_delay_ms)?;
        write_1(f, "Max Concurrent Probes", &self.monitor.max_concurrent_probes)?;
        write_title_1(f, "Ping")?;
        write_1(f, "Prober", &format!("{:?}", self.ping.prober).to_lowercase())?;
        write_1(f, "Echo Count", &self.ping.echo_count)?;
        write_1(f, "Deadline (s)", &self.ping.deadline_secs)?;
        if let Some(program) = &self.ping.program {
            write_1(f, "Program", &program.display())?;
        }
        write_title_1(f, "Logging")?;
        write_1(f, "Debug", &self.logging.debug)?;
        write_title_1(f, "Endpoints")?;
        for endpoint in &self.endpoints {
            write_1(f, endpoint.id.as_str(), &endpoint.address)?;
            write_2(f, "Interval (s)", &endpoint.interval_secs)?;
        }

        Ok(())
    }
}

impl Config {
    /// Resolve the config file location from an optional override
    pub fn resolve_path(
        optional_path: Option<impl AsRef<path::Path>>,
    ) -> Result<path::PathBuf, Error> {
        match optional_path {
            Some(path) => Ok(normalize_toml_path(path.as_ref())),
            None => default_config_path(),
        }
    }

    /// Read the config at `config_path`, creating it with the defaults
    /// if one does not exist
    ///
    /// ```rust,ignore
    /// let path = config::Config::resolve_path(None::<&path::Path>)?;
    /// let cfg = config::Config::from_path(&path)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_path(config_path: &path::Path) -> Result<Self, Error> {
        if config_path.exists() {
            let raw_string = fs::read_to_string(config_path).map_err(Error::ReadFailed)?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Error::WriteFailed)?;
        }

        fs::write(path, config_str).map_err(Error::WriteFailed)
    }

    /// Scheduler settings for the monitor library
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig::builder()
            .tick_period(Duration::from_millis(self.monitor.tick_ms))
            .probe_attempts(self.monitor.probe_attempts)
            .retry_delay(Duration::from_millis(self.monitor.retry_delay_ms))
            .max_concurrent_probes(self.monitor.max_concurrent_probes)
            .echo_count(self.ping.echo_count)
            .ping_deadline(Duration::from_secs(self.ping.deadline_secs))
            .build()
    }
}
