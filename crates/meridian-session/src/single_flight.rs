//! Single-flight execution
//!
//! Verification can be requested from many places at once (an explicit call,
//! the outbound request hook, several hooks racing). Running the cycle more
//! than once would hammer the token endpoint and could interleave store
//! writes, so overlapping callers are collapsed onto one execution: the
//! first caller's operation runs, everyone else attaches to it and receives
//! a clone of the same output. Once the operation settles the slot is
//! cleared and the next caller starts a fresh cycle.
//!
//! Failures are values here (the output is typically a `Result`), which is
//! how an error reaches every attached caller. A panicking operation poisons
//! the shared slot; don't panic.

use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::sync::Mutex;

/// Collapses overlapping executions of one logical operation.
pub struct SingleFlight<T> {
    in_flight: Arc<Mutex<Option<Shared<BoxFuture<'static, T>>>>>,
}

impl<T> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    /// Whether a cycle is currently in flight.
    pub async fn is_running(&self) -> bool {
        self.in_flight.lock().await.is_some()
    }
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> SingleFlight<T> {
    /// Run `op`, or attach to the execution already in flight.
    ///
    /// When a cycle is running, `op` is dropped unexecuted and the caller
    /// receives the in-flight cycle's output. The slot clears the moment the
    /// running operation settles, so a caller arriving afterwards starts a
    /// new cycle rather than reading a stale result.
    pub async fn run<F>(&self, op: F) -> T
    where
        F: Future<Output = T> + Send + 'static,
    {
        let shared = {
            let mut slot = self.in_flight.lock().await;
            match slot.as_ref() {
                Some(existing) => existing.clone(),
                None => {
                    let guard = Arc::clone(&self.in_flight);
                    let wrapped: BoxFuture<'static, T> = async move {
                        let out = op.await;
                        // Clear before resolving so nobody attaches to a
                        // settled cycle.
                        *guard.lock().await = None;
                        out
                    }
                    .boxed();
                    let shared = wrapped.shared();
                    *slot = Some(shared.clone());
                    shared
                }
            }
        };

        // The slot lock is released before awaiting; attaching callers only
        // contend on the brief clone above.
        shared.await
    }
}
