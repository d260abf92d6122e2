//! Sticky events: the last sticky-posted event of each type, kept for replay
//! to subscribers that register later.
//!
//! Entries never expire. Each slot is replaced whole, so a reader sees either
//! the previous event or the new one.

use dashmap::DashMap;

use crate::event::{EventRef, EventType};

/// Last sticky event per exact event type.
#[derive(Default)]
pub struct StickyStore {
    events: DashMap<EventType, EventRef>,
}

impl StickyStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `event` under `event_type`, returning the one it replaced.
    pub fn insert(&self, event_type: EventType, event: EventRef) -> Option<EventRef> {
        self.events.insert(event_type, event)
    }

    /// The stored event of `event_type`, if any.
    pub fn get(&self, event_type: EventType) -> Option<EventRef> {
        self.events.get(&event_type).map(|entry| entry.value().clone())
    }

    /// Removes and returns the stored event of `event_type`.
    pub fn remove(&self, event_type: EventType) -> Option<EventRef> {
        self.events.remove(&event_type).map(|(_, event)| event)
    }

    /// Drops every stored event.
    pub fn clear(&self) {
        self.events.clear();
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
