//! # Tierbus
//!
//! An in-process publish/subscribe event bus that routes each event along its
//! type hierarchy, in priority order, with cancellation, thread affinity and
//! sticky replay.
//!
//! ## Core Concepts
//!
//! - [`Event`] = a value that is posted. Derived events expose a view of
//!   themselves as their parent type through [`Event::supertype`].
//! - [`Subscriber`] = an object that declares methods, each accepting one
//!   event type.
//! - [`Bus`] = the registry of subscribers, the dispatcher, and the sticky
//!   store.
//!
//! ## Architecture
//!
//! ```text
//! post(event)
//!     │
//!     ▼
//! Dispatcher ── walk type chain: Derived ─► Base ─► (root)
//!     │
//!     ├─► Registry.descriptors_for(level)      (snapshot, lock released)
//!     │
//!     ├─► EventBatch (highest priority first)
//!     │
//!     └─► ThreadRouter.deliver(descriptor)
//!             │
//!     Posting ├─► invoke inline
//!             │
//!     Affine  └─► inline if already on the affine context,
//!                 else submit (wait only if cancellable)
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Priority order** - Within one type level, higher priority completes
//!    before lower priority starts. Equal priorities run in no fixed order.
//! 2. **Level-scoped cancellation** - A cancellable method returning
//!    [`Flow::Halt`] stops the rest of its own type level only; supertype
//!    levels still run.
//! 3. **No lock during delivery** - Subscriber code never runs while the
//!    registry is locked, so it may register, unregister and post.
//! 4. **Isolation** - Errors and panics in a subscriber are logged and
//!    count as [`Flow::Continue`]; they never reach the poster.
//! 5. **Weak subscribers** - The bus never keeps a registered object alive.
//!    One dropped without unregistering stops counting as registered and its
//!    entries are pruned.
//!
//! ## Known Hazards
//!
//! - A batch snapshotted before `unregister` may still deliver once to the
//!   removed object.
//! - A poster waiting on a cancellable affine method has no timeout. If the
//!   affine context is blocked on the poster, both wait forever.
//!
//! ## Example
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use tierbus::{impl_event, Bus, Flow, Methods, Subscriber, ThreadAffinity};
//!
//! #[derive(Clone)]
//! struct Message { body: String }
//! struct Command { message: Message }
//!
//! impl_event!(Message);
//! impl_event!(Command => message);
//!
//! #[derive(Default)]
//! struct Log { lines: Mutex<Vec<String>> }
//!
//! impl Subscriber for Log {
//!     fn subscriptions(methods: &mut Methods<Self>) {
//!         methods
//!             .on::<Message, _>(ThreadAffinity::Posting, |log, m| {
//!                 log.lines.lock().unwrap().push(format!("message {}", m.body));
//!                 Ok(())
//!             })
//!             .on_cancellable::<Command, _>(ThreadAffinity::Posting, |log, c| {
//!                 log.lines.lock().unwrap().push(format!("command {}", c.message.body));
//!                 Ok(Flow::Halt)
//!             });
//!     }
//! }
//!
//! let bus = Bus::new();
//! let log = Arc::new(Log::default());
//! bus.register(&log).unwrap();
//!
//! bus.post(Command { message: Message { body: "/quit".into() } });
//! assert_eq!(*log.lines.lock().unwrap(), ["command /quit", "message /quit"]);
//! ```

// Core modules
mod batch;
mod bus;
mod cache;
mod config;
mod context;
mod dispatch;
mod error;
mod event;
mod event_macro;
mod registry;
mod router;
mod sticky;
mod subscriber;
mod subscription;


// Stress tests (test-only)
#[cfg(test)]
mod stress_tests;

// Re-export event types
pub use event::{downcast, AnyEvent, Event, EventRef, EventType};

// Re-export subscriber declaration types
pub use subscriber::{Flow, MethodTemplate, Methods, Subscriber, ThreadAffinity};

// Re-export descriptor and registry types
pub use batch::EventBatch;
pub use registry::Registry;
pub use sticky::StickyStore;
pub use subscription::{SubscriberId, Subscription};

// Re-export execution context types
pub use context::{ContextId, ExecutionContext, Job, LoopContext};

// Re-export bus types (primary entry point)
pub use bus::{Bus, BusBuilder};
pub use config::{BusConfig, DEFAULT_PRIORITY};

// Re-export error types
pub use error::{BusError, Result};

// Re-export method cache diagnostics
pub use cache::cached_subscriber_types;
