/// Unit tests for EventKey

use ferrous_events::{key_of_message, EventContainer, EventContainerInstance, EventKey};
use std::any::TypeId;
use std::collections::HashSet;

struct Started;
struct Stopped;

#[test]
fn test_key_equality_uses_type_only() {
    assert_eq!(EventKey::of::<Started>(), key_of_message::<Started>());
    assert_ne!(EventKey::of::<Started>(), EventKey::of::<Stopped>());
    assert_eq!(EventKey::of::<Started>().type_id(), TypeId::of::<Started>());
}

#[test]
fn test_key_hashing() {
    let mut keys = HashSet::new();
    keys.insert(EventKey::of::<Started>());
    keys.insert(key_of_message::<Started>());
    keys.insert(EventKey::of::<Stopped>());
    assert_eq!(keys.len(), 2);
}

#[test]
fn test_key_display_is_type_name() {
    let key = EventKey::of::<Vec<u8>>();
    assert_eq!(key.to_string(), "alloc::vec::Vec<u8>");
    assert_eq!(key.display_name(), std::any::type_name::<Vec<u8>>());
}

#[test]
fn test_container_reports_its_message_key() {
    let container = EventContainer::<Started>::new();
    let erased: &dyn EventContainerInstance = &container;
    assert_eq!(erased.key(), EventKey::of::<Started>());
    assert_eq!(container.key(), key_of_message::<Started>());
    container.dispose();
}
