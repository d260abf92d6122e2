//! Error types for the event bus.
//!
//! Structural misuse (double registration, unregistering a stranger,
//! malformed subscribers) is returned to the caller immediately. Failures
//! inside subscriber bodies are never returned: the dispatcher wraps them in
//! [`BusError::SubscriberInvocation`], logs them and moves on to the next
//! subscriber.

use thiserror::Error;

use crate::event::EventType;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors produced by the bus.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BusError {
    /// The object is already registered and still alive.
    #[error("subscriber {subscriber} is already registered")]
    AlreadyRegistered {
        /// Type name of the subscriber object.
        subscriber: &'static str,
    },

    /// The object is not currently registered.
    #[error("subscriber {subscriber} is not registered")]
    NotRegistered {
        /// Type name of the subscriber object.
        subscriber: &'static str,
    },

    /// A subscriber declared a method the bus cannot route.
    #[error("invalid subscriber {subscriber}: {reason}")]
    InvalidDescriptor {
        /// Type name of the subscriber object.
        subscriber: &'static str,
        /// What is wrong with the declaration.
        reason: String,
    },

    /// The affine execution context no longer accepts work.
    #[error("execution context '{context}' is closed")]
    ContextClosed {
        /// Label of the context.
        context: String,
    },

    /// A subscriber body returned an error or panicked.
    #[error("subscriber for {event_type} failed: {reason}")]
    SubscriberInvocation {
        /// The event type level being delivered.
        event_type: EventType,
        /// Rendered error or panic payload.
        reason: String,
    },
}

impl BusError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::AlreadyRegistered { .. } => "bus_already_registered",
            BusError::NotRegistered { .. } => "bus_not_registered",
            BusError::InvalidDescriptor { .. } => "bus_invalid_descriptor",
            BusError::ContextClosed { .. } => "bus_context_closed",
            BusError::SubscriberInvocation { .. } => "bus_subscriber_invocation",
        }
    }

    /// True for errors caused by the caller misusing the registration API.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            BusError::AlreadyRegistered { .. }
                | BusError::NotRegistered { .. }
                | BusError::InvalidDescriptor { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_stable() {
        let err = BusError::AlreadyRegistered { subscriber: "Foo" };
        assert_eq!(err.as_label(), "bus_already_registered");
        assert!(err.is_misuse());

        let err = BusError::ContextClosed {
            context: "main".to_string(),
        };
        assert_eq!(err.as_label(), "bus_context_closed");
        assert!(!err.is_misuse());
        assert_eq!(err.to_string(), "execution context 'main' is closed");
    }

    #[test]
    fn invocation_error_names_the_event_type() {
        let err = BusError::SubscriberInvocation {
            event_type: EventType::of::<u32>(),
            reason: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "subscriber for u32 failed: boom");
    }
}
