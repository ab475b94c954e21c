//! Graceful Shutdown Demo - a worker loop that stops cleanly on Ctrl-C
//!
//! This example demonstrates:
//! - Installing the Ctrl-C interrupt source
//! - Observing cancellation through the guard's event
//! - Suppressing termination so the worker can drain and exit on its own

use ferrous_events::*;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("ferrous_events=debug"))
        .init();

    let source = CtrlCInterruptSource::install()?;
    let guard = CancellationGuard::new(
        source,
        CancellationConfig::new().with_interrupt_policy(InterruptPolicy::Continue),
    );

    guard
        .cancellation_event()
        .add_handler(&Handler::new(|_, event: &CancellationEvent| {
            println!(
                "cancellation requested (interrupted: {}, after {:?})",
                event.interrupted,
                event.token.elapsed()
            );
            Ok(())
        }));

    let token = guard.token()?;
    println!("working, press Ctrl-C to stop");

    let mut ticks = 0u64;
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = sleep(Duration::from_millis(250)) => {
                ticks += 1;
                if ticks % 4 == 0 {
                    println!("tick {}", ticks);
                }
            }
        }
    }

    println!("drained after {} ticks", ticks);
    guard.dispose();
    Ok(())
}
