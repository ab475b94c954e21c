/// Disposal tests
///
/// Exactly-once teardown under repeated and concurrent dispose calls, the
/// drop-time safety net, and composed teardown through the Dispose trait.

use ferrous_events::{
    CountingSink, Diagnostics, Dispose, DisposalState, EventConfig, EventContainer, Handler,
    Lifecycle,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

fn counting_config() -> (Arc<CountingSink>, EventConfig) {
    let sink = Arc::new(CountingSink::new());
    let config = EventConfig::new().with_diagnostics(Diagnostics::from_sink(sink.clone()));
    (sink, config)
}

// ===== Test Types =====

struct Socket {
    lifecycle: Lifecycle,
    closes: Arc<AtomicUsize>,
}

impl Socket {
    fn new(diagnostics: Diagnostics, closes: Arc<AtomicUsize>) -> Self {
        Self {
            lifecycle: Lifecycle::new::<Socket>(diagnostics),
            closes,
        }
    }
}

impl Dispose for Socket {
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn teardown(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.lifecycle.finalize(|| self.teardown());
    }
}

/// Owns a socket and a container; teardown chains into both.
struct Session {
    lifecycle: Lifecycle,
    socket: Socket,
    events: EventContainer<String>,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl Dispose for Session {
    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn teardown(&self) {
        self.log.lock().unwrap().push("session");
        self.events.dispose();
        self.socket.dispose();
    }
}

// ===== Tests =====

#[test]
fn test_repeated_dispose_notifies_observers_once() {
    let (sink, config) = counting_config();
    let producer = EventContainer::<u32>::with_config(config.clone());
    let consumer = EventContainer::<u32>::with_config(config);
    producer.send_to(&consumer);

    for _ in 0..5 {
        consumer.dispose();
    }

    assert_eq!(consumer.state(), DisposalState::Disposed);
    assert_eq!(producer.wired_count(), 0);
    assert_eq!(sink.disposed(), 1);
    producer.dispose();
}

#[test]
fn test_concurrent_dispose_runs_teardown_once() {
    const THREADS: usize = 32;
    let closes = Arc::new(AtomicUsize::new(0));
    let sink = Arc::new(CountingSink::new());
    let socket = Arc::new(Socket::new(Diagnostics::from_sink(sink.clone()), closes.clone()));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let socket = socket.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                socket.dispose();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert_eq!(sink.disposed(), 1);
    drop(socket);
    assert_eq!(sink.finalized(), 0);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_container_dispose_unwires_once() {
    const THREADS: usize = 16;
    let (sink, config) = counting_config();
    let producer = EventContainer::<u32>::with_config(config.clone());
    let consumer = EventContainer::<u32>::with_config(config);
    producer.send_to(&consumer);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let consumer = consumer.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                consumer.dispose();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(sink.disposed(), 1);
    assert!(producer.is_empty());
    producer.dispose();
}

#[test]
fn test_finalizer_reports_leak_with_creation_site() {
    struct SiteSink(Mutex<Option<String>>);
    impl ferrous_events::DiagnosticsSink for SiteSink {
        fn finalized_without_dispose(&self, _type_name: &str, site: &str) {
            *self.0.lock().unwrap() = Some(site.to_string());
        }
    }

    let sink = Arc::new(SiteSink(Mutex::new(None)));
    let config = EventConfig::new().with_diagnostics(Diagnostics::from_sink(sink.clone()));
    let container = EventContainer::<u8>::with_config(config);
    drop(container);

    let site = sink.0.lock().unwrap().clone().unwrap();
    assert!(site.contains("disposal.rs"), "unexpected site: {}", site);
}

#[test]
fn test_panicking_teardown_in_drop_is_contained() {
    struct Faulty {
        lifecycle: Lifecycle,
    }
    impl Drop for Faulty {
        fn drop(&mut self) {
            self.lifecycle.finalize(|| panic!("teardown failed"));
        }
    }

    let sink = Arc::new(CountingSink::new());
    let faulty = Faulty {
        lifecycle: Lifecycle::new::<Faulty>(Diagnostics::from_sink(sink.clone())),
    };
    drop(faulty);

    assert_eq!(sink.finalized(), 1);
    assert_eq!(sink.finalizer_panics(), 1);
}

#[test]
fn test_composed_teardown_chains_once() {
    let (sink, config) = counting_config();
    let closes = Arc::new(AtomicUsize::new(0));
    let log = Arc::new(Mutex::new(Vec::new()));
    let session = Session {
        lifecycle: Lifecycle::new::<Session>(config.diagnostics.clone()),
        socket: Socket::new(config.diagnostics.clone(), closes.clone()),
        events: EventContainer::with_config(config),
        log: log.clone(),
    };
    session.events.add_handler(&Handler::new(|_, _| Ok(())));

    session.dispose();
    session.dispose();

    assert_eq!(*log.lock().unwrap(), vec!["session"]);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
    assert!(session.events.is_disposed());
    assert!(session.events.is_empty());
    assert_eq!(sink.disposed(), 3);
    drop(session);
    assert_eq!(sink.finalized(), 0);
}

#[test]
fn test_disposed_container_is_inert() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let handler = Handler::<u32>::new(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let container = EventContainer::<u32>::new();
    container.add_handler(&handler);
    container.dispose();

    container.add_handler(&handler);
    assert!(!container.invoke_message(1).unwrap());
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(container.handler_count(), 0);
}
