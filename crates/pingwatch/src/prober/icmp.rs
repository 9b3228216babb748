use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;
use rand::random;
use surge_ping::{Client, Config, PingIdentifier, PingSequence, SurgeError};
use tokio::time::{Instant, timeout};
use tracing::trace;

use super::{PingSettings, ProbeOutcome, Prober};
use crate::error::ProbeError;

const PAYLOAD: [u8; 56] = [0; 56];

/// Prober that speaks ICMP directly through a raw or datagram socket.
///
/// Opening the socket needs `CAP_NET_RAW` (or a permissive
/// `net.ipv4.ping_group_range` on Linux), so construction can fail.
pub struct IcmpProber {
    client: Client,
    settings: PingSettings,
}

impl IcmpProber {
    pub fn new(settings: PingSettings) -> Result<Self, ProbeError> {
        let client = Client::new(&Config::default()).map_err(ProbeError::Socket)?;
        Ok(Self { client, settings })
    }
}

impl std::fmt::Debug for IcmpProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IcmpProber").field("settings", &self.settings).finish_non_exhaustive()
    }
}

#[async_trait]
impl Prober for IcmpProber {
    async fn attempt(&self, address: Ipv4Addr) -> Result<ProbeOutcome, ProbeError> {
        let started = Instant::now();
        let mut pinger = self.client.pinger(IpAddr::V4(address), PingIdentifier(random())).await;
        let mut outcome = ProbeOutcome::TimedOut;

        for seq in 0..self.settings.echo_count {
            let Ok(seq) = u16::try_from(seq) else {
                break;
            };
            let Some(remaining) = self.settings.deadline.checked_sub(started.elapsed()) else {
                break;
            };
            pinger.timeout(remaining);

            match timeout(remaining, pinger.ping(PingSequence(seq), &PAYLOAD)).await {
                Ok(Ok((_reply, rtt))) => {
                    trace!(%address, seq, ?rtt, "Echo reply");
                    return Ok(ProbeOutcome::Reachable);
                }
                Ok(Err(SurgeError::Timeout { .. })) | Err(_) => {}
                Ok(Err(SurgeError::IOError(e))) => return Err(ProbeError::Socket(e)),
                Ok(Err(e)) => {
                    trace!(%address, seq, error = %e, "Echo failed");
                    outcome = ProbeOutcome::Unreachable;
                }
            }
        }

        Ok(outcome)
    }
}
