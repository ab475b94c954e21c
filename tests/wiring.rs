/// Wiring tests
///
/// Producer to consumer links: forwarding, disconnect, automatic unwiring
/// when either side is disposed or dropped, and chains of containers.

use ferrous_events::{EventConsumer, EventContainer, EventProducer, Handler, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn counting_consumer(hits: &Arc<AtomicUsize>) -> EventConsumer<u32> {
    let hits = hits.clone();
    EventConsumer::with_handler(Handler::new(move |_, n: &u32| {
        hits.fetch_add(*n as usize, Ordering::SeqCst);
        Ok(())
    }))
}

#[test]
fn test_send_to_forwards_sender_and_message() {
    struct Origin;
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    let consumer = EventConsumer::with_handler(Handler::new(move |sender, msg: &String| {
        *sink.lock().unwrap() = Some((sender.downcast_ref::<Origin>().is_some(), msg.clone()));
        Ok(())
    }));
    let producer = EventProducer::<String>::new();
    producer.send_to(&consumer);

    assert!(producer.invoke(&Sender::from_value(Origin), "payload".into()).unwrap());
    assert_eq!(*seen.lock().unwrap(), Some((true, "payload".to_string())));

    producer.dispose();
    consumer.dispose();
}

#[test]
fn test_consumer_dispose_unwires_producer() {
    let hits = Arc::new(AtomicUsize::new(0));
    let producer = EventProducer::<u32>::new();
    let consumer = counting_consumer(&hits);
    producer.send_to(&consumer);

    producer.invoke_message(1).unwrap();
    consumer.dispose();
    assert!(!producer.invoke_message(1).unwrap());
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(producer.is_empty());
    producer.dispose();
}

#[test]
fn test_disconnect_then_dispose_does_not_touch_producer() {
    let hits = Arc::new(AtomicUsize::new(0));
    let producer = EventProducer::<u32>::new();
    let consumer = counting_consumer(&hits);
    let other = counting_consumer(&hits);
    producer.send_to(&consumer);
    producer.send_to(&other);

    producer.disconnect(&consumer);
    assert_eq!(consumer.inbound_count(), 0);
    consumer.dispose();
    assert_eq!(producer.wired_count(), 1);

    producer.invoke_message(3).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    producer.dispose();
    other.dispose();
}

#[test]
fn test_producer_dispose_releases_consumer_observers() {
    let hits = Arc::new(AtomicUsize::new(0));
    let producer = EventProducer::<u32>::new();
    let consumer = counting_consumer(&hits);
    producer.send_to(&consumer);
    assert_eq!(consumer.inbound_count(), 1);

    producer.dispose();
    assert_eq!(consumer.inbound_count(), 0);
    assert!(consumer.invoke_message(2).unwrap());
    consumer.dispose();
}

#[test]
fn test_producer_does_not_keep_consumer_alive() {
    let hits = Arc::new(AtomicUsize::new(0));
    let producer = EventProducer::<u32>::new();
    {
        let consumer = counting_consumer(&hits);
        producer.send_to(&consumer);
    }
    assert_eq!(producer.wired_count(), 0);
    assert!(!producer.invoke_message(1).unwrap());
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    producer.dispose();
}

#[test]
fn test_chained_containers_forward_in_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let (first_log, last_log) = (log.clone(), log.clone());

    let head = EventContainer::<u32>::new();
    let middle = EventContainer::<u32>::with_handler(Handler::new(move |_, _| {
        first_log.lock().unwrap().push("middle");
        Ok(())
    }));
    let tail = EventContainer::<u32>::with_handler(Handler::new(move |_, _| {
        last_log.lock().unwrap().push("tail");
        Ok(())
    }));
    head.send_to(&middle);
    middle.send_to(&tail);

    head.invoke_message(0).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["middle", "tail"]);

    middle.dispose();
    assert!(!head.invoke_message(0).unwrap());
    assert!(tail.invoke_message(0).unwrap());
    assert_eq!(*log.lock().unwrap(), vec!["middle", "tail", "tail"]);

    head.dispose();
    tail.dispose();
}

#[test]
fn test_consumer_error_propagates_to_producer() {
    let producer = EventProducer::<u32>::new();
    let consumer = EventConsumer::with_handler(Handler::new(|_, _: &u32| Err("rejected".into())));
    producer.send_to(&consumer);

    let err = producer.invoke_message(1).unwrap_err();
    assert_eq!(err.to_string(), "Handler failed: rejected");
    producer.dispose();
    consumer.dispose();
}

#[test]
fn test_wiring_twice_delivers_twice() {
    let hits = Arc::new(AtomicUsize::new(0));
    let producer = EventProducer::<u32>::new();
    let consumer = counting_consumer(&hits);
    producer.send_to(&consumer);
    producer.send_to(&consumer);

    producer.invoke_message(1).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    consumer.dispose();
    assert_eq!(producer.wired_count(), 0);
    producer.dispose();
}

#[test]
fn test_direct_and_wired_subscribers_follow_registration_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let recorder = |name: &'static str| {
        let log = log.clone();
        Handler::new(move |_, _: &u32| {
            log.lock().unwrap().push(name);
            Ok(())
        })
    };

    let producer = EventProducer::<u32>::new();
    let consumer = EventConsumer::with_handler(recorder("wired"));
    let (first, second) = (recorder("h1"), recorder("h2"));
    producer.add_handler(&first);
    producer.send_to(&consumer);
    producer.add_handler(&second);

    producer.invoke_message(7).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["h1", "wired", "h2"]);

    // Re-registering moves the handler behind the link.
    producer.remove_handler(&first);
    producer.add_handler(&first);
    log.lock().unwrap().clear();
    producer.invoke_message(7).unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["wired", "h2", "h1"]);

    producer.dispose();
    consumer.dispose();
}

#[test]
fn test_wiring_cycle_dispatches_each_container_once() {
    let (a_hits, b_hits, c_hits) = (
        Arc::new(AtomicUsize::new(0)),
        Arc::new(AtomicUsize::new(0)),
        Arc::new(AtomicUsize::new(0)),
    );
    let a = counting_consumer(&a_hits);
    let b = counting_consumer(&b_hits);
    let c = counting_consumer(&c_hits);
    a.send_to(&b);
    b.send_to(&c);
    c.send_to(&a);

    assert!(a.invoke_message(1).unwrap());
    assert!(b.invoke_message(10).unwrap());
    assert_eq!(a_hits.load(Ordering::SeqCst), 11);
    assert_eq!(b_hits.load(Ordering::SeqCst), 11);
    assert_eq!(c_hits.load(Ordering::SeqCst), 11);

    // A later, unrelated invoke on the same thread is unaffected.
    c.disconnect(&a);
    a.invoke_message(100).unwrap();
    assert_eq!(c_hits.load(Ordering::SeqCst), 111);

    a.dispose();
    b.dispose();
    c.dispose();
}
