//! Process-wide cache of resolved subscriber methods, keyed by subscriber type.
//!
//! Entries are created on first registration of a type and never
//! invalidated. Two threads resolving the same unseen type at once may both
//! run [`Subscriber::subscriptions`]; the result is deterministic, so the
//! last write wins.

use std::any::{Any, TypeId};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tracing::trace;

use crate::subscriber::{MethodTemplate, Methods, Subscriber};

type Resolved<S> = Arc<Vec<MethodTemplate<S>>>;

fn cache() -> &'static DashMap<TypeId, Arc<dyn Any + Send + Sync>> {
    static CACHE: OnceLock<DashMap<TypeId, Arc<dyn Any + Send + Sync>>> = OnceLock::new();
    CACHE.get_or_init(DashMap::new)
}

/// Resolved method templates for `S`, computing them on first use.
pub fn resolve<S: Subscriber>() -> Resolved<S> {
    let key = TypeId::of::<S>();
    let hit = cache().get(&key).map(|entry| Arc::clone(entry.value()));
    if let Some(templates) = hit.and_then(|entry| entry.downcast::<Vec<MethodTemplate<S>>>().ok()) {
        return templates;
    }

    let mut methods = Methods::new();
    S::subscriptions(&mut methods);
    let templates: Resolved<S> = Arc::new(methods.into_templates());
    trace!(
        subscriber = std::any::type_name::<S>(),
        methods = templates.len(),
        "resolved subscriber methods"
    );
    cache().insert(key, templates.clone());
    templates
}

/// Number of subscriber types resolved so far.
pub fn cached_subscriber_types() -> usize {
    cache().len()
}
