//! Subscriber declarations.
//!
//! A [`Subscriber`] lists its subscriber methods once per type in
//! [`Subscriber::subscriptions`]. The bus resolves that list on first
//! registration of the type and caches it (see [`crate::cache`]); each
//! registration then binds the cached templates to the registered object.

use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;

use crate::event::{AnyEvent, Event, EventType};

/// Whether a cancellable subscriber lets delivery continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep delivering to the rest of the batch.
    Continue,
    /// Stop delivering to lower-priority subscribers of this type level.
    Halt,
}

impl Flow {
    /// True for [`Flow::Halt`].
    pub fn is_halt(self) -> bool {
        matches!(self, Flow::Halt)
    }
}

impl From<bool> for Flow {
    fn from(halt: bool) -> Self {
        if halt {
            Flow::Halt
        } else {
            Flow::Continue
        }
    }
}

/// Where a subscriber body runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ThreadAffinity {
    /// Inline, on the thread that posted the event.
    #[default]
    Posting,
    /// On the bus's affine execution context (e.g. a UI thread).
    Affine,
}

/// An object that receives events.
///
/// # Example
///
/// ```
/// use tierbus::{Event, Flow, Methods, Subscriber, ThreadAffinity};
///
/// struct Ping;
/// impl Event for Ping {}
///
/// struct Audit;
///
/// impl Subscriber for Audit {
///     fn subscriptions(methods: &mut Methods<Self>) {
///         methods
///             .on::<Ping, _>(ThreadAffinity::Posting, |_audit, _ping| Ok(()))
///             .on_cancellable::<Ping, _>(ThreadAffinity::Posting, |_audit, _ping| {
///                 Ok(Flow::Halt)
///             });
///     }
/// }
/// ```
pub trait Subscriber: Send + Sync + Sized + 'static {
    /// Declares this type's subscriber methods.
    ///
    /// Must be a pure function of the type: the result is cached for the
    /// lifetime of the process.
    fn subscriptions(methods: &mut Methods<Self>);
}

pub(crate) type Call<S> = Arc<dyn Fn(&S, &dyn AnyEvent) -> anyhow::Result<Flow> + Send + Sync>;

/// One declared subscriber method, not yet bound to an object.
pub struct MethodTemplate<S> {
    pub(crate) event_type: EventType,
    pub(crate) cancellable: bool,
    pub(crate) affinity: ThreadAffinity,
    pub(crate) call: Call<S>,
}

impl<S> MethodTemplate<S> {
    /// Declared parameter type.
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Whether the method may halt its batch.
    pub fn is_cancellable(&self) -> bool {
        self.cancellable
    }

    /// Where the method runs.
    pub fn affinity(&self) -> ThreadAffinity {
        self.affinity
    }
}

impl<S> Clone for MethodTemplate<S> {
    fn clone(&self) -> Self {
        Self {
            event_type: self.event_type,
            cancellable: self.cancellable,
            affinity: self.affinity,
            call: Arc::clone(&self.call),
        }
    }
}

impl<S> fmt::Debug for MethodTemplate<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTemplate")
            .field("event_type", &self.event_type)
            .field("cancellable", &self.cancellable)
            .field("affinity", &self.affinity)
            .finish()
    }
}

/// Collects the method declarations of one subscriber type.
pub struct Methods<S> {
    templates: Vec<MethodTemplate<S>>,
}

impl<S: Subscriber> Methods<S> {
    pub(crate) fn new() -> Self {
        Self {
            templates: Vec::new(),
        }
    }

    /// Declares a method receiving `E` whose outcome never halts delivery.
    pub fn on<E, F>(&mut self, affinity: ThreadAffinity, handler: F) -> &mut Self
    where
        E: Event,
        F: Fn(&S, &E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.push::<E>(false, affinity, move |subscriber, event| {
            handler(subscriber, event).map(|()| Flow::Continue)
        })
    }

    /// Declares a cancellable method receiving `E`.
    ///
    /// Returning [`Flow::Halt`] stops delivery to the lower-priority
    /// subscribers of the same type level.
    pub fn on_cancellable<E, F>(&mut self, affinity: ThreadAffinity, handler: F) -> &mut Self
    where
        E: Event,
        F: Fn(&S, &E) -> anyhow::Result<Flow> + Send + Sync + 'static,
    {
        self.push::<E>(true, affinity, handler)
    }

    fn push<E: Event>(
        &mut self,
        cancellable: bool,
        affinity: ThreadAffinity,
        handler: impl Fn(&S, &E) -> anyhow::Result<Flow> + Send + Sync + 'static,
    ) -> &mut Self {
        let call: Call<S> = Arc::new(move |subscriber: &S, event: &dyn AnyEvent| {
            match event.as_any().downcast_ref::<E>() {
                Some(event) => handler(subscriber, event),
                None => Err(anyhow!(
                    "expected {} but was handed {}",
                    EventType::of::<E>(),
                    event.event_type()
                )),
            }
        });
        self.templates.push(MethodTemplate {
            event_type: EventType::of::<E>(),
            cancellable,
            affinity,
            call,
        });
        self
    }

    pub(crate) fn into_templates(self) -> Vec<MethodTemplate<S>> {
        self.templates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tick(u32);
    impl Event for Tick {}

    struct Tock;
    impl Event for Tock {}

    struct Clock;

    impl Subscriber for Clock {
        fn subscriptions(methods: &mut Methods<Self>) {
            methods
                .on::<Tick, _>(ThreadAffinity::Posting, |_, _| Ok(()))
                .on_cancellable::<Tick, _>(ThreadAffinity::Affine, |_, tick| {
                    Ok(Flow::from(tick.0 > 3))
                });
        }
    }

    fn templates() -> Vec<MethodTemplate<Clock>> {
        let mut methods = Methods::new();
        Clock::subscriptions(&mut methods);
        methods.into_templates()
    }

    #[test]
    fn declarations_keep_their_options() {
        let templates = templates();
        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0].event_type(), EventType::of::<Tick>());
        assert!(!templates[0].is_cancellable());
        assert_eq!(templates[0].affinity(), ThreadAffinity::Posting);
        assert!(templates[1].is_cancellable());
        assert_eq!(templates[1].affinity(), ThreadAffinity::Affine);
    }

    #[test]
    fn plain_methods_always_continue() {
        let templates = templates();
        let flow = (templates[0].call)(&Clock, &Tick(10)).unwrap();
        assert_eq!(flow, Flow::Continue);
    }

    #[test]
    fn cancellable_methods_report_their_flow() {
        let templates = templates();
        assert_eq!((templates[1].call)(&Clock, &Tick(1)).unwrap(), Flow::Continue);
        assert_eq!((templates[1].call)(&Clock, &Tick(5)).unwrap(), Flow::Halt);
    }

    #[test]
    fn mismatched_event_is_an_error() {
        let templates = templates();
        assert!((templates[0].call)(&Clock, &Tock).is_err());
    }
}
