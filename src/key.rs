//! Message-type keys for the event registry.

use std::any::TypeId;

/// Compile-time identifier of a message type.
///
/// Registries key containers by `EventKey` rather than by runtime type tests:
/// equality and hashing use only the `TypeId`, the name is kept for
/// diagnostics and error messages.
///
/// # Examples
///
/// ```rust
/// use ferrous_events::{EventKey, key_of_message};
///
/// struct Started;
/// struct Stopped;
///
/// let a = key_of_message::<Started>();
/// let b = EventKey::of::<Started>();
/// assert_eq!(a, b);
/// assert_ne!(a, key_of_message::<Stopped>());
/// assert!(a.display_name().ends_with("Started"));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct EventKey {
    id: TypeId,
    name: &'static str,
}

impl EventKey {
    /// Key for message type `T`.
    #[inline(always)]
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The message type name, for display.
    pub fn display_name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }
}

// TypeId-only comparison; the name is informational.
impl PartialEq for EventKey {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventKey {}

impl std::hash::Hash for EventKey {
    #[inline(always)]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for EventKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// Helper for creating message keys.
#[inline(always)]
pub fn key_of_message<T: 'static>() -> EventKey {
    EventKey::of::<T>()
}
