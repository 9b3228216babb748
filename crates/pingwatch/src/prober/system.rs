use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::trace;

use super::{PingSettings, ProbeOutcome, Prober};
use crate::error::ProbeError;

/// Extra time granted to the ping utility beyond its own deadline before
/// the child is killed
const EXIT_GRACE: Duration = Duration::from_millis(500);

#[cfg(target_os = "macos")]
const DEFAULT_PING_PATH: &str = "/sbin/ping";
#[cfg(not(target_os = "macos"))]
const DEFAULT_PING_PATH: &str = "ping";

/// Prober that shells out to the platform `ping` utility
#[derive(Debug, Clone)]
pub struct SystemPingProber {
    program: PathBuf,
    settings: PingSettings,
}

impl SystemPingProber {
    pub fn new(settings: PingSettings) -> Self {
        Self { program: PathBuf::from(DEFAULT_PING_PATH), settings }
    }

    /// Use a specific ping binary instead of the one found on `PATH`
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    fn command(&self, address: Ipv4Addr) -> Command {
        let deadline_secs = self.settings.deadline.as_secs().max(1).to_string();

        let mut command = Command::new(&self.program);
        command
            .arg("-c")
            .arg(self.settings.echo_count.to_string())
            .arg(DEADLINE_FLAG)
            .arg(deadline_secs)
            .arg(address.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

impl Default for SystemPingProber {
    fn default() -> Self {
        Self::new(PingSettings::default())
    }
}

#[async_trait]
impl Prober for SystemPingProber {
    async fn attempt(&self, address: Ipv4Addr) -> Result<ProbeOutcome, ProbeError> {
        let mut child = self.command(address).spawn().map_err(ProbeError::Spawn)?;
        trace!(%address, program = %self.program.display(), "Spawned ping");

        match timeout(self.settings.deadline + EXIT_GRACE, child.wait()).await {
            Ok(Ok(status)) => classify_exit(status),
            Ok(Err(e)) => Err(ProbeError::Spawn(e)),
            // kill_on_drop reaps the child once `child` goes out of scope
            Err(_) => Ok(ProbeOutcome::TimedOut),
        }
    }
}

// BSD ping uses -t for the overall timeout, iputils and busybox use -w.
#[cfg(any(target_os = "macos", target_os = "freebsd"))]
const DEADLINE_FLAG: &str = "-t";
#[cfg(not(any(target_os = "macos", target_os = "freebsd")))]
const DEADLINE_FLAG: &str = "-w";

fn classify_exit(status: ExitStatus) -> Result<ProbeOutcome, ProbeError> {
    match status.code() {
        Some(0) => Ok(ProbeOutcome::Reachable),
        Some(code) => Ok(classify_failure_code(code)),
        None => Err(ProbeError::Exit(format!("terminated by signal ({status})"))),
    }
}

/// BSD ping exits 2 when no reply arrived and 68 (EX_NOHOST) for unknown
/// hosts; iputils exits 1 for no reply and 2 for other errors.
#[cfg(any(target_os = "macos", target_os = "freebsd"))]
fn classify_failure_code(code: i32) -> ProbeOutcome {
    match code {
        2 => ProbeOutcome::TimedOut,
        _ => ProbeOutcome::Unreachable,
    }
}

#[cfg(not(any(target_os = "macos", target_os = "freebsd")))]
fn classify_failure_code(code: i32) -> ProbeOutcome {
    match code {
        1 => ProbeOutcome::TimedOut,
        _ => ProbeOutcome::Unreachable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_arguments() {
        let prober = SystemPingProber::default().with_program("/usr/bin/ping");
        let command = prober.command(Ipv4Addr::new(10, 0, 0, 1));
        let std = command.as_std();

        assert_eq!(std.get_program(), "/usr/bin/ping");
        let args: Vec<_> = std.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["-c", "4", DEADLINE_FLAG, "2", "10.0.0.1"]);
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let prober = SystemPingProber::default().with_program("/nonexistent/ping-binary");
        let result = prober.attempt(Ipv4Addr::new(127, 0, 0, 1)).await;

        assert!(matches!(result, Err(ProbeError::Spawn(_))));
        assert!(!prober.probe(Ipv4Addr::new(127, 0, 0, 1)).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_codes_are_classified() {
        // `true` and `false` ignore their arguments, which makes them handy
        // stand-ins for a ping that answers and one that does not.
        let up = SystemPingProber::default().with_program("true");
        assert_eq!(up.attempt(Ipv4Addr::new(10, 0, 0, 1)).await.unwrap(), ProbeOutcome::Reachable);

        let down = SystemPingProber::default().with_program("false");
        assert!(!down.attempt(Ipv4Addr::new(10, 0, 0, 1)).await.unwrap().is_reachable());
    }
}
