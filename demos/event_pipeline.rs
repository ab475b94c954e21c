//! Event Pipeline Demo - wiring containers into a small processing chain
//!
//! This example demonstrates:
//! - Registering containers in an EventCollection
//! - Forwarding messages from a producer to a consumer
//! - Mixing synchronous and fire-and-forget async handlers
//! - Disposal cutting every link at once

use ferrous_events::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
struct OrderPlaced {
    id: u32,
    total_cents: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let collection = EventCollection::new();

    let ingress = EventProducer::<OrderPlaced>::new();
    let billing = EventConsumer::<OrderPlaced>::new();
    ingress.send_to(&billing);
    collection.add_event(billing.clone())?;

    billing.add_handler(&Handler::new(|_, order: &OrderPlaced| {
        println!("billing order {} for {} cents", order.id, order.total_cents);
        Ok(())
    }));

    let audited = Arc::new(AtomicUsize::new(0));
    let counter = audited.clone();
    billing.add_async_handler(AsyncHandler::from_fn(move |_, order: Arc<OrderPlaced>| {
        let counter = counter.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            counter.fetch_add(1, Ordering::SeqCst);
            println!("audited order {}", order.id);
            Ok(())
        }
    }));

    for id in 1..=3 {
        ingress.invoke_message(OrderPlaced {
            id,
            total_cents: u64::from(id) * 1_250,
        })?;
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    println!("{} orders audited", audited.load(Ordering::SeqCst));

    // Disposing the producer unwires the consumer as well.
    ingress.dispose();
    println!("billing inbound links after dispose: {}", billing.inbound_count());

    collection.dispose();
    Ok(())
}
