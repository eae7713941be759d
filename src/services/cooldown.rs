//! Per-entrance alert cooldown
//!
//! Cooldown timestamps live behind the `CooldownStore` trait so tests can
//! inject their own store. Absence of an entry means "never alerted".
//! Entries are never evicted; the map is bounded by the entrance count.

use crate::domain::types::EntranceId;
use rustc_hash::FxHashMap;
use std::time::Duration;

/// Storage for last-alert timestamps (epoch ms)
pub trait CooldownStore: Send {
    fn last_alert(&self, id: &EntranceId) -> Option<u64>;
    fn set_last_alert(&mut self, id: &EntranceId, at_ms: u64);
}

/// Process-lifetime store; lost on restart
#[derive(Debug, Default)]
pub struct InMemoryCooldownStore {
    last_alerts: FxHashMap<EntranceId, u64>,
}

impl InMemoryCooldownStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.last_alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_alerts.is_empty()
    }
}

impl CooldownStore for InMemoryCooldownStore {
    fn last_alert(&self, id: &EntranceId) -> Option<u64> {
        self.last_alerts.get(id).copied()
    }

    fn set_last_alert(&mut self, id: &EntranceId, at_ms: u64) {
        self.last_alerts.insert(id.clone(), at_ms);
    }
}

/// Answers "was this entrance alerted too recently?"
///
/// Reads are public. The only writer is the alert dispatcher, after the
/// notification channel confirmed delivery.
pub struct CooldownTracker<S: CooldownStore = InMemoryCooldownStore> {
    store: S,
    window_ms: u64,
}

impl CooldownTracker<InMemoryCooldownStore> {
    pub fn new(window: Duration) -> Self {
        Self::with_store(InMemoryCooldownStore::new(), window)
    }
}

impl<S: CooldownStore> CooldownTracker<S> {
    pub fn with_store(store: S, window: Duration) -> Self {
        Self { store, window_ms: window.as_millis() as u64 }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn last_alert(&self, id: &EntranceId) -> Option<u64> {
        self.store.last_alert(id)
    }

    /// True iff `now - last_alert(id) < window`
    ///
    /// A `now` before the recorded alert (wall clock stepped back) is treated
    /// as still cooling down.
    pub fn is_on_cooldown(&self, id: &EntranceId, now_ms: u64) -> bool {
        match self.store.last_alert(id) {
            None => false,
            Some(last) if now_ms < last => true,
            Some(last) => now_ms - last < self.window_ms,
        }
    }

    pub(in crate::services) fn record_alert(&mut self, id: &EntranceId, now_ms: u64) {
        self.store.set_last_alert(id, now_ms);
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
