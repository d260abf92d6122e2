//! Subscription registry: who listens for what.
//!
//! Two indexes over the live descriptors, kept consistent under one lock:
//! - `by_object`: registered object → its descriptors
//! - `by_event_type`: exact event type → descriptors declared for that type
//!
//! Every mutation and every read takes the lock for the duration of that one
//! operation only. Readers get a snapshot (`Vec` of `Arc`s), so delivery
//! never runs under the lock and a subscriber may register or unregister from
//! inside its own method. A batch built before an `unregister` may still
//! deliver once to the object it removed.
//!
//! Objects dropped without unregistering never count as registered. Their
//! entries are pruned when a lookup meets them and by a periodic sweep on
//! `register`, so the indexes do not grow with dead subscribers.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use smallvec::SmallVec;
use tracing::debug;

use crate::error::{BusError, Result};
use crate::event::EventType;
use crate::subscription::{SubscriberId, Subscription};

type Descriptors = SmallVec<[Arc<Subscription>; 4]>;

/// Object count below which `register` does not sweep.
const MIN_SWEEP_THRESHOLD: usize = 64;

struct ObjectEntry {
    name: &'static str,
    liveness: Weak<dyn Any + Send + Sync>,
    subscriptions: Descriptors,
}

impl ObjectEntry {
    fn is_live(&self) -> bool {
        self.liveness.strong_count() > 0
    }
}

struct Indexes {
    by_object: HashMap<SubscriberId, ObjectEntry>,
    by_event_type: HashMap<EventType, Vec<Arc<Subscription>>>,
    sweep_threshold: usize,
}

impl Default for Indexes {
    fn default() -> Self {
        Self {
            by_object: HashMap::new(),
            by_event_type: HashMap::new(),
            sweep_threshold: MIN_SWEEP_THRESHOLD,
        }
    }
}

impl Indexes {
    fn remove_object(&mut self, id: SubscriberId) -> Option<ObjectEntry> {
        let entry = self.by_object.remove(&id)?;
        for subscription in &entry.subscriptions {
            let event_type = subscription.event_type();
            if let Some(bucket) = self.by_event_type.get_mut(&event_type) {
                bucket.retain(|s| !Arc::ptr_eq(s, subscription));
                if bucket.is_empty() {
                    self.by_event_type.remove(&event_type);
                }
            }
        }
        Some(entry)
    }

    /// Drops every entry whose object is gone. Returns how many were dropped.
    fn sweep(&mut self) -> usize {
        let dead: Vec<SubscriberId> = self
            .by_object
            .iter()
            .filter(|(_, entry)| !entry.is_live())
            .map(|(id, _)| *id)
            .collect();
        for id in &dead {
            self.remove_object(*id);
        }
        if !dead.is_empty() {
            debug!(
                purged = dead.len(),
                "purged registrations of dropped subscribers"
            );
        }
        dead.len()
    }

    /// Sweeps once the object count doubles since the last sweep, keeping
    /// the cost amortised over registrations.
    fn maybe_sweep(&mut self) {
        if self.by_object.len() < self.sweep_threshold {
            return;
        }
        self.sweep();
        self.sweep_threshold = (self.by_object.len() * 2).max(MIN_SWEEP_THRESHOLD);
    }
}

/// Thread-safe registry of live subscriptions.
#[derive(Default)]
pub struct Registry {
    indexes: RwLock<Indexes>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Indexes> {
        // Subscriber code never runs under this lock, so a poisoned guard
        // still holds consistent indexes.
        self.indexes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Indexes> {
        self.indexes.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts all of `object`'s descriptors into both indexes atomically.
    ///
    /// Returns the inserted descriptors so the caller can replay sticky events.
    /// An entry left behind by an object that was dropped without
    /// unregistering is replaced.
    pub fn register<S: Send + Sync + 'static>(
        &self,
        object: &Arc<S>,
        subscriptions: Vec<Subscription>,
    ) -> Result<Vec<Arc<Subscription>>> {
        let id = SubscriberId::of(object.as_ref());
        let name = std::any::type_name::<S>();
        let subscriptions: Vec<Arc<Subscription>> =
            subscriptions.into_iter().map(Arc::new).collect();

        let mut indexes = self.write();
        if let Some(existing) = indexes.by_object.get(&id) {
            if existing.is_live() {
                return Err(BusError::AlreadyRegistered { subscriber: name });
            }
            debug!(
                subscriber = existing.name,
                "purging stale registration of a dropped subscriber"
            );
            indexes.remove_object(id);
        }
        indexes.maybe_sweep();

        for subscription in &subscriptions {
            indexes
                .by_event_type
                .entry(subscription.event_type())
                .or_default()
                .push(Arc::clone(subscription));
        }
        let weak: Weak<S> = Arc::downgrade(object);
        let liveness: Weak<dyn Any + Send + Sync> = weak;
        indexes.by_object.insert(
            id,
            ObjectEntry {
                name,
                liveness,
                subscriptions: subscriptions.iter().cloned().collect(),
            },
        );
        Ok(subscriptions)
    }

    /// Removes `object` and all its descriptors from both indexes.
    ///
    /// Returns how many descriptors were removed. An entry whose object was
    /// dropped is pruned and reported as not registered.
    pub fn unregister<S: 'static>(&self, object: &S) -> Result<usize> {
        let id = SubscriberId::of(object);
        match self.write().remove_object(id) {
            Some(entry) if entry.is_live() => Ok(entry.subscriptions.len()),
            _ => Err(BusError::NotRegistered {
                subscriber: std::any::type_name::<S>(),
            }),
        }
    }

    /// Snapshot of the live descriptors declared for exactly `event_type`.
    ///
    /// Meeting a dropped subscriber prunes it from both indexes.
    pub fn descriptors_for(&self, event_type: EventType) -> Vec<Arc<Subscription>> {
        let snapshot = self
            .read()
            .by_event_type
            .get(&event_type)
            .cloned()
            .unwrap_or_default();
        if snapshot.iter().all(|s| s.is_live()) {
            return snapshot;
        }

        let (live, dead): (Vec<_>, Vec<_>) = snapshot.into_iter().partition(|s| s.is_live());
        let mut indexes = self.write();
        for subscription in dead {
            // Re-checked under the write lock: the id may have been taken
            // over by a new registration in between.
            let stale = indexes
                .by_object
                .get(&subscription.subscriber())
                .is_some_and(|entry| !entry.is_live());
            if stale {
                indexes.remove_object(subscription.subscriber());
            }
        }
        live
    }

    /// True if `object` is currently registered.
    pub fn contains<S: 'static>(&self, object: &S) -> bool {
        self.read()
            .by_object
            .get(&SubscriberId::of(object))
            .is_some_and(ObjectEntry::is_live)
    }

    /// True if any live subscriber listens for exactly `event_type`.
    pub fn has_subscribers(&self, event_type: EventType) -> bool {
        self.read()
            .by_event_type
            .get(&event_type)
            .is_some_and(|bucket| bucket.iter().any(|s| s.is_live()))
    }

    /// Total number of live descriptors.
    pub fn len(&self) -> usize {
        self.read()
            .by_object
            .values()
            .filter(|entry| entry.is_live())
            .map(|entry| entry.subscriptions.len())
            .sum()
    }

    /// True when no live object is registered.
    pub fn is_empty(&self) -> bool {
        !self.read().by_object.values().any(ObjectEntry::is_live)
    }

    /// Drops the entries of every subscriber that was dropped without
    /// unregistering. Returns how many objects were purged.
    pub fn purge_dropped(&self) -> usize {
        self.write().sweep()
    }
}
