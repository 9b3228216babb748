//! State-change events and the sinks that consume them.
//!
//! Sinks are invoked while the registry lock is held, which is what makes
//! `Registry::remove` a hard barrier for further events of that endpoint.
//! A sink must therefore return quickly and must not call back into the
//! registry.

use std::net::Ipv4Addr;
use std::time::SystemTime;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::target::{LinkState, TargetId};

/// Emitted once per up/down transition of an endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateChange {
    pub id: TargetId,
    pub address: Ipv4Addr,
    pub up: bool,
    /// State before this transition; `Unknown` for the first probe
    pub previous: LinkState,
    pub observed_at: SystemTime,
}

impl StateChange {
    pub fn state(&self) -> LinkState {
        LinkState::from_reachable(self.up)
    }
}

/// Consumer of state-change events
pub trait EventSink: Send + Sync {
    fn on_state_change(&self, change: &StateChange);
}

impl<F> EventSink for F
where
    F: Fn(&StateChange) + Send + Sync,
{
    fn on_state_change(&self, change: &StateChange) {
        self(change)
    }
}

/// Writes one log line per transition
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn on_state_change(&self, change: &StateChange) {
        info!(
            target_id = %change.id,
            address = %change.address,
            previous = %change.previous,
            "{} now is {}!",
            change.id,
            change.state()
        );
    }
}

/// Forwards events into an unbounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<StateChange>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<StateChange>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiving end of its channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StateChange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn on_state_change(&self, change: &StateChange) {
        if let Err(e) = self.tx.send(change.clone()) {
            warn!(target_id = %e.0.id, "State change dropped, receiver is gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn change(up: bool) -> StateChange {
        StateChange {
            id: "router".into(),
            address: Ipv4Addr::new(192, 168, 1, 1),
            up,
            previous: LinkState::Unknown,
            observed_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (sink, mut rx) = ChannelSink::channel();
        sink.on_state_change(&change(true));

        let received = rx.recv().await.expect("Channel closed");
        assert!(received.up);
        assert_eq!(received.state(), LinkState::Up);
    }

    #[test]
    fn test_channel_sink_survives_closed_receiver() {
        let (sink, rx) = ChannelSink::channel();
        drop(rx);
        sink.on_state_change(&change(false));
    }

    #[test]
    fn test_closure_sink() {
        let seen = Mutex::new(Vec::new());
        let sink = |c: &StateChange| seen.lock().unwrap().push(c.up);

        sink.on_state_change(&change(true));
        sink.on_state_change(&change(false));
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }
}
