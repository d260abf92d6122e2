//! The public bus handle and its builder.

use std::fmt;
use std::sync::Arc;

use crate::config::BusConfig;
use crate::context::ExecutionContext;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::event::{downcast, Event, EventRef, EventType};
use crate::router::ThreadRouter;
use crate::subscriber::Subscriber;

/// In-process event bus.
///
/// Cheap to clone; clones share registrations and sticky events.
///
/// ### Properties
/// - **Synchronous**: `post` returns after every inline subscriber ran and
///   every cross-context cancellable subscriber answered.
/// - **Weak**: registered objects are not kept alive by the bus.
/// - **Reentrant**: subscribers may post, register and unregister from
///   inside their own methods.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<Dispatcher>,
    config: Arc<BusConfig>,
}

impl Bus {
    /// A bus with default settings and no affine context.
    pub fn new() -> Self {
        BusBuilder::new().build()
    }

    /// Starts a [`BusBuilder`].
    pub fn builder() -> BusBuilder {
        BusBuilder::new()
    }

    /// Settings this bus was built with.
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Registers `object` at the default priority.
    ///
    /// # Errors
    /// [`BusError::AlreadyRegistered`](crate::BusError::AlreadyRegistered) if
    /// it is already registered, or
    /// [`BusError::InvalidDescriptor`](crate::BusError::InvalidDescriptor) if
    /// its declarations cannot be routed.
    pub fn register<S: Subscriber>(&self, object: &Arc<S>) -> Result<()> {
        self.inner
            .register_and_replay(object, self.config.default_priority, false)
    }

    /// Registers `object` at `priority`.
    pub fn register_with_priority<S: Subscriber>(&self, object: &Arc<S>, priority: i32) -> Result<()> {
        self.inner.register_and_replay(object, priority, false)
    }

    /// Registers `object` at the default priority and replays matching sticky
    /// events to it before returning.
    pub fn register_sticky<S: Subscriber>(&self, object: &Arc<S>) -> Result<()> {
        self.inner
            .register_and_replay(object, self.config.default_priority, true)
    }

    /// Registers `object` at `priority` and replays matching sticky events.
    pub fn register_sticky_with_priority<S: Subscriber>(
        &self,
        object: &Arc<S>,
        priority: i32,
    ) -> Result<()> {
        self.inner.register_and_replay(object, priority, true)
    }

    /// Removes every subscription of `object`.
    ///
    /// Takes a plain reference so a subscriber can unregister itself from
    /// inside one of its methods. A batch already in flight may still
    /// deliver to it once.
    pub fn unregister<S: Subscriber>(&self, object: &S) -> Result<()> {
        self.inner.unregister(object)
    }

    /// True if `object` is currently registered.
    pub fn is_registered<S: Subscriber>(&self, object: &S) -> bool {
        self.inner.registry().contains(object)
    }

    /// Posts `event` to the subscribers of its type and of every supertype.
    pub fn post<E: Event>(&self, event: E) {
        self.inner.post(Arc::new(event), false);
    }

    /// Posts `event` and keeps it as the sticky event of its type.
    pub fn post_sticky<E: Event>(&self, event: E) {
        self.inner.post(Arc::new(event), true);
    }

    /// Posts an already shared event.
    pub fn post_shared(&self, event: EventRef, sticky: bool) {
        self.inner.post(event, sticky);
    }

    /// The last sticky event of type `E`.
    pub fn sticky_event<E: Event>(&self) -> Option<Arc<E>> {
        self.inner
            .sticky()
            .get(EventType::of::<E>())
            .and_then(downcast::<E>)
    }

    /// Removes and returns the sticky event of type `E`.
    pub fn remove_sticky_event<E: Event>(&self) -> Option<Arc<E>> {
        self.inner
            .sticky()
            .remove(EventType::of::<E>())
            .and_then(downcast::<E>)
    }

    /// Drops every sticky event.
    pub fn clear_sticky_events(&self) {
        self.inner.sticky().clear();
    }

    /// True if anyone subscribes to exactly `E`.
    pub fn has_subscribers_for<E: Event>(&self) -> bool {
        self.inner.has_subscribers(EventType::of::<E>())
    }

    /// Number of live subscriptions across all objects.
    pub fn subscription_count(&self) -> usize {
        self.inner.registry().len()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("name", &self.config.name)
            .field("subscriptions", &self.subscription_count())
            .field("sticky_events", &self.inner.sticky().len())
            .finish()
    }
}

/// Builder for [`Bus`].
///
/// ```
/// use std::sync::Arc;
/// use tierbus::{Bus, LoopContext};
///
/// let ui = Arc::new(LoopContext::spawn("ui").unwrap());
/// let bus = Bus::builder()
///     .name("app")
///     .default_priority(50)
///     .affine_context(ui.clone())
///     .build();
/// assert_eq!(bus.config().default_priority, 50);
/// ui.shutdown();
/// ```
#[derive(Default)]
pub struct BusBuilder {
    config: BusConfig,
    affine: Option<Arc<dyn ExecutionContext>>,
}

impl BusBuilder {
    /// Builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all settings.
    pub fn with_config(mut self, config: BusConfig) -> Self {
        self.config = config;
        self
    }

    /// Priority for registrations that do not name one.
    pub fn default_priority(mut self, priority: i32) -> Self {
        self.config.default_priority = priority;
        self
    }

    /// Name attached to log records.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// The context [`ThreadAffinity::Affine`](crate::ThreadAffinity::Affine)
    /// methods run on.
    pub fn affine_context(mut self, context: Arc<dyn ExecutionContext>) -> Self {
        self.affine = Some(context);
        self
    }

    /// Builds the bus.
    pub fn build(self) -> Bus {
        let router = ThreadRouter::new(self.affine);
        Bus {
            inner: Arc::new(Dispatcher::new(self.config.name.clone(), router)),
            config: Arc::new(self.config),
        }
    }
}
