#![no_main]

use libfuzzer_sys::fuzz_target;
use ferrous_events::{Diagnostics, EventCollection, EventConfig, EventContainer, Handler};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const CONTAINERS: usize = 4;
const HANDLERS: usize = 4;

// Interprets each byte as one operation on a small graph of containers and
// checks dispatch counts against a model of who is wired to whom.
fuzz_target!(|data: &[u8]| {
    let config = EventConfig::new().with_diagnostics(Diagnostics::none());
    let hits: Vec<Arc<AtomicUsize>> = (0..CONTAINERS).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    let containers: Vec<EventContainer<u8>> = (0..CONTAINERS)
        .map(|_| EventContainer::with_config(config.clone()))
        .collect();
    let handlers: Vec<Vec<Handler<u8>>> = hits
        .iter()
        .map(|counter| {
            (0..HANDLERS)
                .map(|_| {
                    let counter = counter.clone();
                    Handler::new(move |_, _| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                })
                .collect()
        })
        .collect();
    let collection = EventCollection::with_config(config);

    for byte in data {
        let op = byte >> 5;
        let a = (*byte as usize >> 2) % CONTAINERS;
        let b = *byte as usize % CONTAINERS;
        match op {
            0 => containers[a].add_handler(&handlers[a][b]),
            1 => containers[a].remove_handler(&handlers[a][b]),
            2 => containers[a].send_to(&containers[b]),
            3 => containers[a].disconnect(&containers[b]),
            4 => {
                let before = hits[a].load(Ordering::SeqCst);
                let delivered = containers[a].invoke_message(*byte).unwrap();
                if containers[a].is_disposed() {
                    assert!(!delivered);
                    assert_eq!(hits[a].load(Ordering::SeqCst), before);
                }
            }
            5 => containers[a].dispose(),
            6 => {
                let _ = collection.add_event(containers[a].clone());
            }
            _ => collection.connect(&containers[a]),
        }
        for container in &containers {
            if container.is_disposed() {
                assert!(container.is_empty());
                assert_eq!(container.inbound_count(), 0);
            }
        }
    }

    collection.dispose();
    for container in &containers {
        container.dispose();
    }
});
