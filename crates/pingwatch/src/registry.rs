//! Synchronized ownership of all monitored targets.
//!
//! Every read and write goes through one mutex. Nothing outside this module
//! can hold a reference into the map; callers get owned
//! [`TargetSnapshot`]s or [`ProbeClaim`]s instead.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::RegistryError;
use crate::events::StateChange;
use crate::target::{LinkState, PollInterval, Target, TargetId, TargetSnapshot};
use crate::validation::parse_address;

/// Permission to probe one target, handed out by [`Registry::claim_due`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeClaim {
    pub id: TargetId,
    pub address: Ipv4Addr,
    pub(crate) generation: u64,
}

#[derive(Debug, Default)]
struct Targets {
    by_id: HashMap<TargetId, Target>,
    /// Last generation handed out. Never reused, not even after a target
    /// is removed and added again under the same id.
    last_generation: u64,
}

impl Targets {
    fn next_generation(&mut self) -> u64 {
        self.last_generation += 1;
        self.last_generation
    }
}

/// Thread-safe map from endpoint id to target
#[derive(Debug, Default)]
pub struct Registry {
    targets: Mutex<Targets>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A panic while holding the lock cannot leave a target half-written
    /// (every mutation is a plain field store), so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, Targets> {
        self.targets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new endpoint. It is due immediately.
    pub fn add(
        &self,
        id: impl Into<TargetId>,
        address: &str,
        interval_secs: u64,
    ) -> Result<(), RegistryError> {
        let id = id.into();
        let address = parse_address(address)?;
        let interval = PollInterval::from_secs(interval_secs)?;

        let mut targets = self.lock();
        if targets.by_id.contains_key(&id) {
            return Err(RegistryError::DuplicateTarget(id));
        }

        info!(target_id = %id, %address, %interval, "Endpoint added");
        let generation = targets.next_generation();
        targets.by_id.insert(id.clone(), Target::new(id, address, interval, generation));
        Ok(())
    }

    /// Unregister an endpoint; unknown ids are ignored.
    ///
    /// Once this returns no event for `id` is emitted anymore, even if a
    /// probe for it is still running.
    pub fn remove(&self, id: &TargetId) {
        if self.lock().by_id.remove(id).is_some() {
            info!(target_id = %id, "Endpoint removed");
        }
    }

    /// Change address and/or interval of an endpoint.
    ///
    /// Both values are validated before anything is written. Any actual
    /// change makes the target due immediately, since the new configuration
    /// has not been verified yet. A probe already running for the old
    /// configuration keeps the target in flight until it settles; its result
    /// is dropped.
    pub fn update(
        &self,
        id: &TargetId,
        address: Option<&str>,
        interval_secs: Option<u64>,
    ) -> Result<(), RegistryError> {
        let address = address.map(parse_address).transpose()?;
        let interval = interval_secs.map(PollInterval::from_secs).transpose()?;

        let mut targets = self.lock();
        let generation = targets.last_generation + 1;
        let target = targets
            .by_id
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownTarget(id.clone()))?;

        let address_changed = address.is_some_and(|a| a != target.address);
        let interval_changed = interval.is_some_and(|i| i != target.interval);
        if !address_changed && !interval_changed {
            return Ok(());
        }

        if let Some(address) = address {
            target.address = address;
        }
        if let Some(interval) = interval {
            target.interval = interval;
        }
        target.generation = generation;
        target.mark_due();

        info!(
            target_id = %id,
            address = %target.address,
            interval = %target.interval,
            "Endpoint updated"
        );
        targets.last_generation = generation;
        Ok(())
    }

    /// Probe the endpoint on the next tick; its interval is kept
    pub fn force_check(&self, id: &TargetId) {
        if let Some(target) = self.lock().by_id.get_mut(id) {
            target.mark_due();
            debug!(target_id = %id, "Status request queued");
        }
    }

    /// [`Registry::force_check`] for every endpoint
    pub fn force_check_all(&self) {
        for target in self.lock().by_id.values_mut() {
            target.mark_due();
        }
    }

    pub fn get(&self, id: &TargetId) -> Option<TargetSnapshot> {
        self.lock().by_id.get(id).map(Target::snapshot)
    }

    pub fn ids(&self) -> Vec<TargetId> {
        let mut ids: Vec<_> = self.lock().by_id.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().by_id.is_empty()
    }

    /// Targets due at `now`, earliest first
    pub fn snapshot_due(&self, now: Instant) -> Vec<TargetSnapshot> {
        let mut due: Vec<_> =
            self.lock().by_id.values().filter(|t| t.is_due(now)).map(Target::snapshot).collect();
        due.sort_by(|a, b| a.next_due_at.cmp(&b.next_due_at).then_with(|| a.id.cmp(&b.id)));
        due
    }

    /// Select every due target without a probe in flight, re-arm it to
    /// `now + interval` and mark it in flight, all in one critical section.
    pub(crate) fn claim_due(&self, now: Instant) -> Vec<ProbeClaim> {
        let mut targets = self.lock();
        let mut due: Vec<&mut Target> = targets
            .by_id
            .values_mut()
            .filter(|t| t.in_flight.is_none() && t.is_due(now))
            .collect();
        due.sort_by(|a, b| a.next_due_at.cmp(&b.next_due_at).then_with(|| a.id.cmp(&b.id)));

        due.into_iter()
            .map(|target| {
                target.rearm(now);
                target.in_flight = Some(target.generation);
                ProbeClaim {
                    id: target.id.clone(),
                    address: target.address,
                    generation: target.generation,
                }
            })
            .collect()
    }

    /// Give a claim back without a result, e.g. when its probe task died
    pub(crate) fn release(&self, claim: &ProbeClaim) {
        if let Some(target) = self.lock().by_id.get_mut(&claim.id) {
            target.settle(claim.generation);
        }
    }

    /// Store a probe result. When it flips the target's state, `emit` is
    /// called with the change while the lock is still held.
    ///
    /// Results for removed targets, or for targets whose configuration
    /// changed after the claim was made, are dropped and return `None`.
    pub(crate) fn record_result(
        &self,
        claim: &ProbeClaim,
        reachable: bool,
        emit: impl FnOnce(&StateChange),
    ) -> Option<StateChange> {
        let mut targets = self.lock();
        let Some(target) = targets.by_id.get_mut(&claim.id) else {
            debug!(target_id = %claim.id, "Discarding result for removed endpoint");
            return None;
        };
        target.settle(claim.generation);
        if target.generation != claim.generation {
            debug!(target_id = %claim.id, "Discarding result for outdated configuration");
            return None;
        }

        let state = LinkState::from_reachable(reachable);
        if target.state == state {
            return None;
        }

        let change = StateChange {
            id: target.id.clone(),
            address: target.address,
            up: reachable,
            previous: target.state,
            observed_at: SystemTime::now(),
        };
        target.state = state;
        emit(&change);
        Some(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use std::sync::Arc;
    use std::time::Duration;

    fn registry_with(id: &str, address: &str, interval: u64) -> (Registry, TargetId) {
        let registry = Registry::new();
        registry.add(id, address, interval).unwrap();
        (registry, TargetId::from(id))
    }

    #[test]
    fn test_add_validates() {
        let registry = Registry::new();

        let err = registry.add("bad", "192.168.1", 300).unwrap_err();
        assert!(matches!(err, RegistryError::Validation(ValidationError::InvalidAddress { .. })));

        let err = registry.add("bad", "192.168.1.1", 0).unwrap_err();
        assert!(matches!(err, RegistryError::Validation(ValidationError::IntervalTooSmall { .. })));

        assert!(registry.is_empty());
    }

    #[test]
    fn test_add_rejects_duplicates() {
        let (registry, id) = registry_with("router", "192.168.1.1", 300);

        let err = registry.add("router", "10.0.0.1", 60).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateTarget(id.clone()));
        assert_eq!(registry.get(&id).unwrap().address, Ipv4Addr::new(192, 168, 1, 1));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (registry, id) = registry_with("router", "192.168.1.1", 300);

        registry.remove(&id);
        registry.remove(&id);
        registry.remove(&TargetId::from("never-added"));
        assert!(registry.get(&id).is_none());
    }

    #[test]
    fn test_claim_rearms_and_blocks_reclaim() {
        let (registry, id) = registry_with("router", "192.168.1.1", 300);
        let now = Instant::now();

        let claims = registry.claim_due(now);
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].id, id);

        let snapshot = registry.get(&id).unwrap();
        assert_eq!(snapshot.next_due_at, now + Duration::from_secs(300));
        assert!(snapshot.in_flight);

        // Still in flight, so even a forced check does not produce a second claim
        registry.force_check(&id);
        assert!(registry.claim_due(Instant::now()).is_empty());

        registry.record_result(&claims[0], true, |_| {});
        assert_eq!(registry.claim_due(Instant::now()).len(), 1);
    }

    #[test]
    fn test_record_result_emits_on_transition_only() {
        let (registry, _) = registry_with("router", "192.168.1.1", 1);
        let mut emitted = Vec::new();
        let mut now = Instant::now();

        for reachable in [true, true, false, false, false] {
            let claim = registry.claim_due(now).remove(0);
            now += Duration::from_secs(1);
            if let Some(change) = registry.record_result(&claim, reachable, |_| {}) {
                emitted.push((change.previous, change.up));
            }
        }

        assert_eq!(emitted, vec![(LinkState::Unknown, true), (LinkState::Up, false)]);
    }

    #[test]
    fn test_result_for_removed_target_is_discarded() {
        let (registry, id) = registry_with("router", "192.168.1.1", 300);
        let claim = registry.claim_due(Instant::now()).remove(0);

        registry.remove(&id);
        let mut called = false;
        assert!(registry.record_result(&claim, true, |_| called = true).is_none());
        assert!(!called);
    }

    #[test]
    fn test_update_resets_schedule_and_discards_stale_result() {
        let (registry, id) = registry_with("router", "192.168.1.1", 300);
        let claim = registry.claim_due(Instant::now()).remove(0);

        registry.update(&id, Some("192.168.1.2"), None).unwrap();
        let snapshot = registry.get(&id).unwrap();
        assert_eq!(snapshot.address, Ipv4Addr::new(192, 168, 1, 2));
        assert_eq!(snapshot.interval.as_secs(), 300);
        assert_eq!(registry.snapshot_due(Instant::now()).len(), 1);

        // The old probe is still outstanding, so no second claim yet
        assert!(snapshot.in_flight);
        assert!(registry.claim_due(Instant::now()).is_empty());

        assert!(registry.record_result(&claim, true, |_| {}).is_none());
        let snapshot = registry.get(&id).unwrap();
        assert_eq!(snapshot.state, LinkState::Unknown);
        assert!(!snapshot.in_flight);

        let fresh = registry.claim_due(Instant::now());
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].address, Ipv4Addr::new(192, 168, 1, 2));
    }

    #[test]
    fn test_repeated_updates_keep_one_claim_outstanding() {
        let (registry, id) = registry_with("switch", "10.0.0.1", 300);
        let first = registry.claim_due(Instant::now()).remove(0);

        for interval in [60, 120, 90] {
            registry.update(&id, None, Some(interval)).unwrap();
            assert!(registry.claim_due(Instant::now()).is_empty());
        }

        // Dropping the stale claim frees the target without recording anything
        registry.release(&first);
        assert_eq!(registry.get(&id).unwrap().state, LinkState::Unknown);
        assert_eq!(registry.claim_due(Instant::now()).len(), 1);
        assert!(registry.claim_due(Instant::now()).is_empty());
    }

    #[test]
    fn test_result_from_before_readd_is_discarded() {
        let (registry, id) = registry_with("camera", "10.0.0.30", 60);
        let old = registry.claim_due(Instant::now()).remove(0);

        registry.remove(&id);
        registry.add("camera", "10.0.0.31", 60).unwrap();
        let current = registry.claim_due(Instant::now()).remove(0);
        assert_eq!(current.address, Ipv4Addr::new(10, 0, 0, 31));

        let mut called = false;
        assert!(registry.record_result(&old, true, |_| called = true).is_none());
        assert!(!called);
        registry.release(&old);

        let snapshot = registry.get(&id).unwrap();
        assert_eq!(snapshot.state, LinkState::Unknown);
        assert!(snapshot.in_flight);
        assert!(registry.claim_due(Instant::now()).is_empty());

        let change = registry.record_result(&current, false, |_| {}).unwrap();
        assert_eq!(change.address, Ipv4Addr::new(10, 0, 0, 31));
    }

    #[test]
    fn test_update_is_all_or_nothing() {
        let (registry, id) = registry_with("router", "192.168.1.1", 300);
        let before = registry.get(&id).unwrap();

        let err = registry.update(&id, Some("10.0.0.9"), Some(0)).unwrap_err();
        assert_eq!(err.to_string(), "interval: This needs to be > 0.");
        assert_eq!(registry.get(&id).unwrap(), before);

        let err = registry.update(&TargetId::from("ghost"), None, Some(60)).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownTarget(_)));
    }

    #[test]
    fn test_unchanged_update_keeps_schedule() {
        let (registry, id) = registry_with("router", "192.168.1.1", 300);
        let now = Instant::now();
        registry.claim_due(now);

        registry.update(&id, Some("192.168.1.1"), Some(300)).unwrap();
        assert_eq!(registry.get(&id).unwrap().next_due_at, now + Duration::from_secs(300));
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_configuration_changes_log_at_info() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let (registry, id) = registry_with("router", "192.168.1.1", 300);
            registry.update(&id, None, Some(60)).unwrap();
            registry.remove(&id);
        });

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        for message in ["Endpoint added", "Endpoint updated", "Endpoint removed"] {
            assert!(output.contains(message), "missing {message:?} in {output}");
        }
    }

    #[test]
    fn test_snapshot_due_order() {
        let registry = Registry::new();
        registry.add("b", "10.0.0.2", 60).unwrap();
        registry.add("a", "10.0.0.1", 60).unwrap();
        registry.add("c", "10.0.0.3", 60).unwrap();

        let later = Instant::now() + Duration::from_secs(1);
        registry.claim_due(later);
        registry.force_check(&TargetId::from("c"));

        let due = registry.snapshot_due(Instant::now());
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, TargetId::from("c"));
        let expected: Vec<TargetId> = vec!["a".into(), "b".into(), "c".into()];
        assert_eq!(registry.ids(), expected);
    }
}
