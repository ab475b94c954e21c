//! Per-thread chain of containers currently forwarding a message.
//!
//! Wiring may form cycles (`a -> b -> a`). Each hop records itself here so
//! dispatch can skip a link into a container that is already forwarding on
//! this thread instead of recursing until the stack overflows.

use std::cell::RefCell;

thread_local! {
    static CHAIN: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// Keeps one hop on the chain until dropped, including during unwinding.
pub(crate) struct ForwardGuard {
    pushed: usize,
}

impl ForwardGuard {
    /// Records the hop `from -> to`. Returns `None` when `to` is already on
    /// the chain, i.e. following the link would close a cycle.
    pub(crate) fn enter(from: u64, to: u64) -> Option<Self> {
        CHAIN.with(|chain| {
            let mut chain = chain.borrow_mut();
            if chain.contains(&to) {
                return None;
            }
            let mut pushed = 1;
            if chain.last() != Some(&from) {
                chain.push(from);
                pushed += 1;
            }
            chain.push(to);
            Some(Self { pushed })
        })
    }
}

impl Drop for ForwardGuard {
    fn drop(&mut self) {
        let _ = CHAIN.try_with(|chain| {
            let mut chain = chain.borrow_mut();
            let keep = chain.len().saturating_sub(self.pushed);
            chain.truncate(keep);
        });
    }
}
