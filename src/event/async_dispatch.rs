//! Fire-and-forget fan-out helpers.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::{JoinError, JoinSet};

use crate::error::{AggregateHandlerError, HandlerResult};
use crate::event::handler::{AsyncEventHandler, AsyncHandler, Handler, Sender};
use crate::internal::panic_message;

/// Awaits every task and collects a description of each failure, whether an
/// `Err` return or a panic.
pub(crate) async fn collect_failures(tasks: &mut JoinSet<HandlerResult>) -> Vec<String> {
    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(error)) => failures.push(error.to_string()),
            Err(join_error) => failures.push(describe_join_error(join_error)),
        }
    }
    failures
}

fn describe_join_error(error: JoinError) -> String {
    if error.is_panic() {
        let payload = error.into_panic();
        format!("panicked: {}", panic_message(payload.as_ref()))
    } else {
        "cancelled".to_string()
    }
}

/// Runs a synchronous handler's callbacks concurrently on the blocking pool.
struct BlockingAdapter<T> {
    handler: Handler<T>,
}

#[async_trait]
impl<T: Send + Sync + 'static> AsyncEventHandler<T> for BlockingAdapter<T> {
    async fn handle(&self, sender: Sender, msg: Arc<T>) -> HandlerResult {
        let mut tasks = JoinSet::new();
        for callback in self.handler.callbacks().iter().cloned() {
            let sender = sender.clone();
            let msg = msg.clone();
            tasks.spawn_blocking(move || callback(&sender, &*msg));
        }
        let failures = collect_failures(&mut tasks).await;
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Box::new(AggregateHandlerError { failures }))
        }
    }
}

pub(crate) fn blocking_adapter<T: Send + Sync + 'static>(handler: Handler<T>) -> AsyncHandler<T> {
    AsyncHandler::new(BlockingAdapter { handler })
}
