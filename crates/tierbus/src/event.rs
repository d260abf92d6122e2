//! Event values and the type hierarchy the bus routes on.
//!
//! Rust has no class inheritance, so the ancestor chain is expressed by
//! composition: a derived event embeds its parent and hands out a view of
//! itself as that parent through [`Event::supertype`]. The dispatcher walks
//! these views from the concrete type up to the root (where `supertype`
//! returns `None`) and delivers each level to the subscribers of that exact
//! type.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::warn;

/// A value that can be posted on the bus.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tierbus::{Event, EventRef};
///
/// #[derive(Clone)]
/// struct Connected { host: String }
/// impl Event for Connected {}
///
/// struct Reconnected { base: Connected, attempts: u32 }
/// impl Event for Reconnected {
///     fn supertype(&self) -> Option<EventRef> {
///         Some(Arc::new(self.base.clone()))
///     }
/// }
/// ```
pub trait Event: Send + Sync + 'static {
    /// This event viewed as its parent type, or `None` at the root.
    fn supertype(&self) -> Option<EventRef> {
        None
    }
}

/// Shared, type-erased event.
pub type EventRef = Arc<dyn AnyEvent>;

/// Object-safe face of [`Event`], implemented for every event type.
pub trait AnyEvent: Send + Sync + 'static {
    /// Exact runtime type of this value.
    fn event_type(&self) -> EventType;

    /// Parent view, see [`Event::supertype`].
    fn parent(&self) -> Option<EventRef>;

    /// Borrow as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Convert into a shared `Any` for owned downcasting.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<E: Event> AnyEvent for E {
    fn event_type(&self) -> EventType {
        EventType::of::<E>()
    }

    fn parent(&self) -> Option<EventRef> {
        Event::supertype(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl fmt::Debug for dyn AnyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyEvent")
            .field("type", &self.event_type())
            .finish()
    }
}

/// Downcast a shared event to its concrete type.
pub fn downcast<E: Event>(event: EventRef) -> Option<Arc<E>> {
    event.into_any().downcast::<E>().ok()
}

/// Identity of an event type.
///
/// Equality and hashing use the `TypeId` only; the name is kept for logs.
#[derive(Clone, Copy)]
pub struct EventType {
    id: TypeId,
    name: &'static str,
}

impl EventType {
    /// The event type of `E`.
    pub fn of<E: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<E>(),
            name: std::any::type_name::<E>(),
        }
    }

    /// Fully qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for EventType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventType {}

impl Hash for EventType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Walks an event's ancestor chain, most derived view first.
///
/// A chain that comes back to a type it already yielded is cut there.
pub(crate) struct Lineage {
    next: Option<EventRef>,
    seen: SmallVec<[EventType; 4]>,
}

impl Lineage {
    pub(crate) fn new(event: EventRef) -> Self {
        Self {
            next: Some(event),
            seen: SmallVec::new(),
        }
    }
}

impl Iterator for Lineage {
    type Item = EventRef;

    fn next(&mut self) -> Option<EventRef> {
        let current = self.next.take()?;
        let event_type = current.event_type();
        if self.seen.contains(&event_type) {
            warn!(%event_type, "event supertype chain revisits a type; stopping walk");
            return None;
        }
        self.seen.push(event_type);
        self.next = current.parent();
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Base(u8);
    impl Event for Base {}

    #[derive(Clone)]
    struct Middle(Base);
    impl Event for Middle {
        fn supertype(&self) -> Option<EventRef> {
            Some(Arc::new(self.0.clone()))
        }
    }

    struct Leaf(Middle);
    impl Event for Leaf {
        fn supertype(&self) -> Option<EventRef> {
            Some(Arc::new(self.0.clone()))
        }
    }

    // Points back at itself.
    #[derive(Clone)]
    struct Loop;
    impl Event for Loop {
        fn supertype(&self) -> Option<EventRef> {
            Some(Arc::new(Loop))
        }
    }

    #[test]
    fn lineage_runs_from_concrete_type_to_root() {
        let types: Vec<_> = Lineage::new(Arc::new(Leaf(Middle(Base(7)))))
            .map(|e| e.event_type())
            .collect();
        assert_eq!(
            types,
            vec![
                EventType::of::<Leaf>(),
                EventType::of::<Middle>(),
                EventType::of::<Base>()
            ]
        );
    }

    #[test]
    fn parent_views_carry_the_embedded_value() {
        let root = Lineage::new(Arc::new(Middle(Base(42)))).last().unwrap();
        let base = downcast::<Base>(root).unwrap();
        assert_eq!(base.0, 42);
    }

    #[test]
    fn cyclic_chain_terminates() {
        assert_eq!(Lineage::new(Arc::new(Loop)).count(), 1);
    }

    #[test]
    fn downcast_to_wrong_type_is_none() {
        let event: EventRef = Arc::new(Base(1));
        assert!(downcast::<Middle>(event).is_none());
    }

    #[test]
    fn event_type_equality_ignores_name() {
        assert_eq!(EventType::of::<Base>(), EventType::of::<Base>());
        assert_ne!(EventType::of::<Base>(), EventType::of::<Middle>());
        assert!(EventType::of::<Base>().name().ends_with("Base"));
    }
}
