//! Bus configuration.

/// Priority used by [`Bus::register`](crate::Bus::register) and
/// [`Bus::register_sticky`](crate::Bus::register_sticky).
pub const DEFAULT_PRIORITY: i32 = 100;

/// Settings for one [`Bus`](crate::Bus).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Priority for registrations that do not name one. Higher runs first.
    pub default_priority: i32,
    /// Attached to every log record of the bus.
    pub name: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            default_priority: DEFAULT_PRIORITY,
            name: "tierbus".to_string(),
        }
    }
}
