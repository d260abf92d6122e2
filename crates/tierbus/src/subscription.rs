//! The subscription descriptor: one subscriber method bound to one object.

use std::any::{Any, TypeId};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use tracing::{trace, warn};
use uuid::Uuid;

use crate::error::BusError;
use crate::event::{AnyEvent, EventType};
use crate::subscriber::{Call, Flow, MethodTemplate, ThreadAffinity};

/// Identity of a registered object: its address together with its concrete
/// type.
///
/// The type keeps a field stored at offset 0 of a subscriber, or a value of
/// another type reusing a freed allocation, from passing as the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId {
    address: usize,
    type_id: TypeId,
}

impl SubscriberId {
    /// Identity of the object behind `subscriber`.
    ///
    /// The same for `&*arc` and the `Arc` it came from, so a subscriber can
    /// name itself from inside one of its own methods.
    pub fn of<S: 'static>(subscriber: &S) -> Self {
        Self {
            address: subscriber as *const S as *const () as usize,
            type_id: TypeId::of::<S>(),
        }
    }
}

/// Bound, type-erased method target.
trait Target: Send + Sync {
    /// `None` once the object has been dropped.
    fn invoke(&self, event: &dyn AnyEvent) -> Option<anyhow::Result<Flow>>;

    fn is_live(&self) -> bool;
}

struct Bound<S> {
    object: Weak<S>,
    call: Call<S>,
}

impl<S: Send + Sync + 'static> Target for Bound<S> {
    fn invoke(&self, event: &dyn AnyEvent) -> Option<anyhow::Result<Flow>> {
        let object = self.object.upgrade()?;
        Some((self.call)(&object, event))
    }

    fn is_live(&self) -> bool {
        self.object.strong_count() > 0
    }
}

/// One subscriber method bound to one registered object.
///
/// The descriptor holds only a weak reference: the bus never keeps a
/// subscriber alive.
pub struct Subscription {
    id: Uuid,
    subscriber: SubscriberId,
    subscriber_name: &'static str,
    event_type: EventType,
    priority: i32,
    cancellable: bool,
    affinity: ThreadAffinity,
    target: Box<dyn Target>,
}

impl Subscription {
    pub(crate) fn bind<S: Send + Sync + 'static>(
        object: &Arc<S>,
        template: &MethodTemplate<S>,
        priority: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subscriber: SubscriberId::of(object.as_ref()),
            subscriber_name: std::any::type_name::<S>(),
            event_type: template.event_type,
            priority,
            cancellable: template.cancellable,
            affinity: template.affinity,
            target: Box::new(Bound {
                object: Arc::downgrade(object),
                call: Arc::clone(&template.call),
            }),
        }
    }

    /// Unique id of this descriptor, for logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The owning object.
    pub fn subscriber(&self) -> SubscriberId {
        self.subscriber
    }

    /// Declared parameter type.
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Higher runs first.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Whether this method may halt its batch.
    pub fn is_cancellable(&self) -> bool {
        self.cancellable
    }

    /// Where this method runs.
    pub fn affinity(&self) -> ThreadAffinity {
        self.affinity
    }

    /// False once the owning object has been dropped.
    pub fn is_live(&self) -> bool {
        self.target.is_live()
    }

    /// Runs the method on the current thread.
    ///
    /// Errors and panics are logged and reported as [`Flow::Continue`], as is
    /// any outcome of a non-cancellable method.
    pub(crate) fn invoke(&self, event: &dyn AnyEvent) -> Flow {
        trace!(
            subscription_id = %self.id,
            event_type = %self.event_type,
            priority = self.priority,
            "invoking subscriber"
        );
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.target.invoke(event)));
        let reason = match outcome {
            Ok(Some(Ok(flow))) if self.cancellable => return flow,
            Ok(Some(Ok(_))) => return Flow::Continue,
            Ok(None) => {
                trace!(
                    subscription_id = %self.id,
                    subscriber = self.subscriber_name,
                    "subscriber dropped without unregistering; skipping"
                );
                return Flow::Continue;
            }
            Ok(Some(Err(err))) => format!("{err:#}"),
            Err(payload) => panic_message(payload.as_ref()),
        };

        let err = BusError::SubscriberInvocation {
            event_type: self.event_type,
            reason,
        };
        warn!(
            subscription_id = %self.id,
            subscriber = self.subscriber_name,
            label = err.as_label(),
            "{err}"
        );
        Flow::Continue
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("subscriber", &self.subscriber_name)
            .field("event_type", &self.event_type)
            .field("priority", &self.priority)
            .field("cancellable", &self.cancellable)
            .field("affinity", &self.affinity)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache;
    use crate::event::Event;
    use crate::subscriber::{Methods, Subscriber};

    struct Ping;
    impl Event for Ping {}

    struct Flaky;

    impl Subscriber for Flaky {
        fn subscriptions(methods: &mut Methods<Self>) {
            methods
                .on_cancellable::<Ping, _>(ThreadAffinity::Posting, |_, _| Ok(Flow::Halt))
                .on::<Ping, _>(ThreadAffinity::Posting, |_, _| anyhow::bail!("nope"))
                .on_cancellable::<Ping, _>(ThreadAffinity::Posting, |_, _| panic!("kaboom"));
        }
    }

    fn bound(object: &Arc<Flaky>) -> Vec<Subscription> {
        cache::resolve::<Flaky>()
            .iter()
            .map(|template| Subscription::bind(object, template, 100))
            .collect()
    }

    #[test]
    fn halting_result_is_passed_through() {
        let object = Arc::new(Flaky);
        let subs = bound(&object);
        assert_eq!(subs[0].invoke(&Ping), Flow::Halt);
    }

    #[test]
    fn errors_and_panics_do_not_cancel() {
        let object = Arc::new(Flaky);
        let subs = bound(&object);
        assert_eq!(subs[1].invoke(&Ping), Flow::Continue);
        assert_eq!(subs[2].invoke(&Ping), Flow::Continue);
    }

    #[test]
    fn dropped_subscriber_is_skipped() {
        let object = Arc::new(Flaky);
        let subs = bound(&object);
        assert!(subs[0].is_live());
        drop(object);
        assert!(!subs[0].is_live());
        assert_eq!(subs[0].invoke(&Ping), Flow::Continue);
    }

    #[test]
    fn identity_matches_for_arc_and_reference() {
        let object = Arc::new(Flaky);
        let subs = bound(&object);
        assert_eq!(subs[0].subscriber(), SubscriberId::of(object.as_ref()));
        assert_ne!(subs[0].id(), subs[1].id());
        assert_ne!(
            SubscriberId::of(Arc::new(Flaky).as_ref()),
            SubscriberId::of(object.as_ref())
        );
    }

    #[test]
    fn identity_includes_the_concrete_type() {
        struct Wrapper {
            inner: Flaky,
        }
        let wrapper = Arc::new(Wrapper { inner: Flaky });
        // Zero-sized first field shares the wrapper's address.
        assert_eq!(
            &wrapper.inner as *const Flaky as usize,
            Arc::as_ptr(&wrapper) as usize
        );
        assert_ne!(
            SubscriberId::of(&wrapper.inner),
            SubscriberId::of(wrapper.as_ref())
        );
    }
}
