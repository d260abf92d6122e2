//! Dispatcher: routes a posted event through its type levels.
//!
//! ```text
//! post(Derived)
//!   ├─► level Derived: registry snapshot ─► EventBatch ─► router (per descriptor)
//!   │        └─ a cancellable descriptor returning Halt ends this level only
//!   ├─► level Base:    registry snapshot ─► EventBatch ─► router
//!   └─► sticky? store Derived
//! ```
//!
//! Each level is an independent batch with its own cancellation scope:
//! halting `Derived` still delivers to `Base` subscribers.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::batch::EventBatch;
use crate::cache;
use crate::error::{BusError, Result};
use crate::event::{EventRef, EventType, Lineage};
use crate::registry::Registry;
use crate::router::ThreadRouter;
use crate::sticky::StickyStore;
use crate::subscriber::{Subscriber, ThreadAffinity};
use crate::subscription::Subscription;

/// How one batch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BatchOutcome {
    pub(crate) delivered: usize,
    pub(crate) halted: bool,
}

pub(crate) struct Dispatcher {
    name: String,
    registry: Registry,
    sticky: StickyStore,
    router: ThreadRouter,
}

impl Dispatcher {
    pub(crate) fn new(name: String, router: ThreadRouter) -> Self {
        Self {
            name,
            registry: Registry::new(),
            sticky: StickyStore::new(),
            router,
        }
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    pub(crate) fn sticky(&self) -> &StickyStore {
        &self.sticky
    }

    /// Delivers `event` to every level of its type chain, then stores it if
    /// `sticky`.
    pub(crate) fn post(&self, event: EventRef, sticky: bool) {
        let root = event.event_type();
        debug!(bus = %self.name, event_type = %root, sticky, "posting event");

        for level in Lineage::new(Arc::clone(&event)) {
            let subscriptions = self.registry.descriptors_for(level.event_type());
            if subscriptions.is_empty() {
                continue;
            }
            let outcome = self.deliver_batch(EventBatch::new(subscriptions), &level);
            trace!(
                bus = %self.name,
                event_type = %level.event_type(),
                delivered = outcome.delivered,
                halted = outcome.halted,
                "type level delivered"
            );
        }

        if sticky {
            self.sticky.insert(root, event);
        }
    }

    /// Registers `object` and, if `wants_sticky`, replays the stored sticky
    /// event of each new descriptor's type to that descriptor alone.
    pub(crate) fn register_and_replay<S: Subscriber>(
        &self,
        object: &Arc<S>,
        priority: i32,
        wants_sticky: bool,
    ) -> Result<()> {
        let subscriber = std::any::type_name::<S>();
        let templates = cache::resolve::<S>();
        if templates.is_empty() {
            return Err(BusError::InvalidDescriptor {
                subscriber,
                reason: "declares no subscriber methods".to_string(),
            });
        }
        if let Some(template) = templates
            .iter()
            .find(|t| t.affinity() == ThreadAffinity::Affine && !self.router.has_affine_context())
        {
            return Err(BusError::InvalidDescriptor {
                subscriber,
                reason: format!(
                    "method for {} requires an affine context but the bus has none",
                    template.event_type()
                ),
            });
        }

        let subscriptions = templates
            .iter()
            .map(|template| Subscription::bind(object, template, priority))
            .collect();
        let inserted = self.registry.register(object, subscriptions)?;
        debug!(
            bus = %self.name,
            subscriber,
            priority,
            methods = inserted.len(),
            sticky = wants_sticky,
            "registered subscriber"
        );

        if wants_sticky {
            for subscription in inserted {
                if let Some(event) = self.sticky.get(subscription.event_type()) {
                    trace!(
                        bus = %self.name,
                        subscription_id = %subscription.id(),
                        event_type = %subscription.event_type(),
                        "replaying sticky event"
                    );
                    self.deliver_batch(EventBatch::single(subscription), &event);
                }
            }
        }
        Ok(())
    }

    pub(crate) fn unregister<S: Subscriber>(&self, object: &S) -> Result<()> {
        let removed = self.registry.unregister(object)?;
        debug!(
            bus = %self.name,
            subscriber = std::any::type_name::<S>(),
            methods = removed,
            "unregistered subscriber"
        );
        Ok(())
    }

    pub(crate) fn has_subscribers(&self, event_type: EventType) -> bool {
        self.registry.has_subscribers(event_type)
    }

    fn deliver_batch(&self, batch: EventBatch, event: &EventRef) -> BatchOutcome {
        let mut outcome = BatchOutcome {
            delivered: 0,
            halted: false,
        };
        for subscription in batch {
            outcome.delivered += 1;
            if self.router.deliver(&subscription, event).is_halt() {
                trace!(
                    bus = %self.name,
                    subscription_id = %subscription.id(),
                    event_type = %subscription.event_type(),
                    "batch halted by cancellable subscriber"
                );
                outcome.halted = true;
                break;
            }
        }
        outcome
    }
}
