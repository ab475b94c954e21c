/// Cancellation guard tests
///
/// One-shot behavior across concurrent cancel and interrupt calls, re-arming
/// with reset, interrupt policy and disposal.

use ferrous_events::{
    CancellationConfig, CancellationGuard, CancellationToken, EventError, Handler,
    InterruptAction, InterruptPolicy, InterruptSource, ManualInterruptSource,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn observed(guard: &CancellationGuard) -> Arc<AtomicUsize> {
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    guard.cancellation_event().add_handler(&Handler::new(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));
    fired
}

#[test]
fn test_concurrent_cancel_and_interrupt_fire_once() {
    const THREADS: usize = 24;
    let source = Arc::new(ManualInterruptSource::new());
    let guard = CancellationGuard::new(source.clone(), CancellationConfig::new());
    let fired = observed(&guard);
    let token = guard.token().unwrap();
    let transitions = Arc::new(AtomicUsize::new(0));
    let counter = transitions.clone();
    token.on_cancel(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let barrier = Arc::new(Barrier::new(THREADS));
    let wins = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let guard = guard.clone();
            let source = source.clone();
            let barrier = barrier.clone();
            let wins = wins.clone();
            thread::spawn(move || {
                barrier.wait();
                if i % 3 == 0 {
                    source.raise();
                } else if guard.cancel() {
                    wins.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(wins.load(Ordering::SeqCst) <= 1);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(transitions.load(Ordering::SeqCst), 1);
    assert!(token.is_cancelled());
    guard.dispose();
}

#[test]
fn test_reset_rearms_with_fresh_token() {
    let guard = CancellationGuard::detached(CancellationConfig::new());
    let fired = observed(&guard);

    let first = guard.token().unwrap();
    assert!(guard.cancel());
    guard.reset(false);

    let second = guard.token().unwrap();
    assert!(first.is_cancelled());
    assert!(!second.is_cancelled());
    assert!(!guard.is_cancellation_requested());

    assert!(guard.cancel());
    assert!(second.is_cancelled());
    assert_eq!(fired.load(Ordering::SeqCst), 2);
    guard.dispose();
}

#[test]
fn test_interrupt_policy_from_config() {
    let source = Arc::new(ManualInterruptSource::new());
    let continuing = CancellationGuard::new(
        source.clone(),
        CancellationConfig::new().with_interrupt_policy(InterruptPolicy::Continue),
    );
    assert!(continuing.continue_exec());
    assert_eq!(source.raise(), InterruptAction::Suppress);
    continuing.dispose();

    let terminating = CancellationGuard::new(source.clone(), CancellationConfig::new());
    assert_eq!(source.raise(), InterruptAction::Terminate);
    assert!(terminating.is_cancellation_requested());
    terminating.dispose();
}

#[test]
fn test_interrupt_after_cancel_still_reports_policy() {
    let source = Arc::new(ManualInterruptSource::new());
    let guard = CancellationGuard::new(source.clone(), CancellationConfig::new());
    let fired = observed(&guard);

    guard.cancel();
    guard.set_continue_exec(true);
    assert_eq!(source.raise(), InterruptAction::Suppress);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    guard.dispose();
}

#[test]
fn test_disposed_guard_is_inert() {
    let source = Arc::new(ManualInterruptSource::new());
    let guard = CancellationGuard::new(source.clone(), CancellationConfig::new());
    let fired = observed(&guard);
    guard.dispose();

    assert_eq!(source.subscriber_count(), 0);
    assert!(!guard.try_begin_cancel());
    assert!(!guard.cancel());
    source.raise();
    guard.reset(true);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert!(matches!(guard.token(), Err(EventError::UseAfterDispose { .. })));
}

#[test]
fn test_dropped_guard_unsubscribes() {
    let source = Arc::new(ManualInterruptSource::new());
    {
        let _guard = CancellationGuard::new(source.clone(), CancellationConfig::new());
        assert_eq!(source.subscriber_count(), 1);
    }
    assert_eq!(source.subscriber_count(), 0);
}

#[test]
fn test_custom_interrupt_source() {
    use ferrous_events::{InterruptHandler, SubscriptionId};
    use std::sync::Mutex;

    #[derive(Default)]
    struct SingleSlot {
        handler: Mutex<Option<InterruptHandler>>,
    }

    impl InterruptSource for SingleSlot {
        fn subscribe(&self, handler: InterruptHandler) -> SubscriptionId {
            *self.handler.lock().unwrap() = Some(handler);
            SubscriptionId::new(1)
        }

        fn unsubscribe(&self, _id: SubscriptionId) {
            *self.handler.lock().unwrap() = None;
        }
    }

    let source = Arc::new(SingleSlot::default());
    let guard = CancellationGuard::new(source.clone(), CancellationConfig::new());
    let handler = source.handler.lock().unwrap().clone().unwrap();
    assert_eq!(handler(), InterruptAction::Terminate);
    assert!(guard.is_cancellation_requested());

    guard.unregister();
    assert!(source.handler.lock().unwrap().is_none());
    guard.dispose();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_async_and_awaiting_token() {
    let guard = CancellationGuard::detached(CancellationConfig::new());
    let fired = observed(&guard);
    let token: CancellationToken = guard.token().unwrap();

    let waiter = tokio::spawn(async move {
        token.cancelled().await;
        token.elapsed()
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(guard.cancel_async().await);
    assert!(!guard.cancel_async().await);
    assert!(!guard.cancel());

    let elapsed = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .unwrap()
        .unwrap();
    assert!(elapsed >= Duration::from_millis(10));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    guard.dispose();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_sync_async_and_interrupt_cancels_fire_once() {
    const ROUNDS: usize = 50;
    const TASKS: usize = 12;

    for _ in 0..ROUNDS {
        let source = Arc::new(ManualInterruptSource::new());
        let guard = CancellationGuard::new(
            source.clone(),
            CancellationConfig::new().with_interrupt_policy(InterruptPolicy::Continue),
        );
        let fired = observed(&guard);
        let barrier = Arc::new(tokio::sync::Barrier::new(TASKS));
        let wins = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..TASKS)
            .map(|i| {
                let guard = guard.clone();
                let source = source.clone();
                let barrier = barrier.clone();
                let wins = wins.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    let won = match i % 3 {
                        0 => {
                            assert_eq!(source.raise(), InterruptAction::Suppress);
                            false
                        }
                        1 => guard.cancel(),
                        _ => guard.cancel_async().await,
                    };
                    if won {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert!(guard.is_cancellation_requested());
        assert!(wins.load(Ordering::SeqCst) <= 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        guard.dispose();
    }
}
