//! Thread router: decides where each subscriber body runs.
//!
//! | affinity | poster on affine context | outcome                         |
//! |----------|--------------------------|---------------------------------|
//! | Posting  | any                      | inline                          |
//! | Affine   | yes                      | inline                          |
//! | Affine   | no, cancellable          | submitted, poster waits         |
//! | Affine   | no, not cancellable      | submitted, fire-and-forget      |
//!
//! The poster only waits when it needs the [`Flow`] to decide whether the
//! batch goes on. There is no timeout: if the affine context is itself
//! blocked waiting on the poster, both wait forever.

use std::sync::Arc;

use futures::channel::oneshot;
use tracing::{trace, warn};

use crate::context::{ContextId, ExecutionContext, Job};
use crate::event::EventRef;
use crate::subscriber::{Flow, ThreadAffinity};
use crate::subscription::Subscription;

pub(crate) struct ThreadRouter {
    affine: Option<Arc<dyn ExecutionContext>>,
}

impl ThreadRouter {
    pub(crate) fn new(affine: Option<Arc<dyn ExecutionContext>>) -> Self {
        Self { affine }
    }

    pub(crate) fn has_affine_context(&self) -> bool {
        self.affine.is_some()
    }

    /// Delivers `event` to one descriptor and reports whether to go on.
    pub(crate) fn deliver(&self, subscription: &Arc<Subscription>, event: &EventRef) -> Flow {
        let context = match (subscription.affinity(), &self.affine) {
            (ThreadAffinity::Posting, _) => return subscription.invoke(event.as_ref()),
            (ThreadAffinity::Affine, None) => {
                // Registration refuses affine methods without a context.
                trace!(subscription_id = %subscription.id(), "no affine context; running inline");
                return subscription.invoke(event.as_ref());
            }
            (ThreadAffinity::Affine, Some(context)) => context,
        };

        if context.id() == ContextId::current() {
            return subscription.invoke(event.as_ref());
        }

        let target = Arc::clone(subscription);
        let event = Arc::clone(event);
        if !subscription.is_cancellable() {
            let job: Job = Box::new(move || {
                target.invoke(event.as_ref());
            });
            self.submit(context.as_ref(), subscription, job);
            return Flow::Continue;
        }

        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            let _ = tx.send(target.invoke(event.as_ref()));
        });
        if !self.submit(context.as_ref(), subscription, job) {
            return Flow::Continue;
        }
        futures::executor::block_on(rx).unwrap_or_else(|_| {
            warn!(
                subscription_id = %subscription.id(),
                context = context.label(),
                "affine job dropped before running; continuing"
            );
            Flow::Continue
        })
    }

    fn submit(&self, context: &dyn ExecutionContext, subscription: &Subscription, job: Job) -> bool {
        match context.submit(job) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    subscription_id = %subscription.id(),
                    event_type = %subscription.event_type(),
                    label = err.as_label(),
                    "{err}; subscriber skipped"
                );
                false
            }
        }
    }
}
