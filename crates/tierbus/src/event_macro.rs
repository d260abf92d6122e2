//! Macros for reducing event boilerplate.

/// Implement [`Event`](crate::Event) for a type.
///
/// `impl_event!(T)` declares a root event. `impl_event!(T => field)`
/// declares an event whose parent view is the `Clone` value in `field`.
///
/// # Example
///
/// ```
/// use tierbus::impl_event;
///
/// #[derive(Debug, Clone)]
/// struct MessageReceived {
///     body: String,
/// }
///
/// #[derive(Debug, Clone)]
/// struct PrivateMessageReceived {
///     message: MessageReceived,
///     from: String,
/// }
///
/// impl_event!(MessageReceived);
/// impl_event!(PrivateMessageReceived => message);
/// ```
#[macro_export]
macro_rules! impl_event {
    ($event:ty) => {
        impl $crate::Event for $event {}
    };
    ($event:ty => $parent:ident) => {
        impl $crate::Event for $event {
            fn supertype(&self) -> ::std::option::Option<$crate::EventRef> {
                ::std::option::Option::Some(::std::sync::Arc::new(
                    ::std::clone::Clone::clone(&self.$parent),
                ))
            }
        }
    };
}
