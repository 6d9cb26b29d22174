//! Process-wide exclusion around model calls.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// Lets one generation at a time reach the model.
///
/// llama.cpp keeps a single KV cache per slot, so interleaved requests would
/// clobber each other's state. Waiters are served in arrival order.
#[derive(Default)]
pub struct GenerationGate {
    lock: Mutex<()>,
    waiting: AtomicUsize,
}

/// Counts a caller as waiting until it is dropped.
struct Waiting<'a>(&'a AtomicUsize);

impl<'a> Waiting<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl GenerationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the gate.
    ///
    /// The gate is released when `f` finishes, fails, or the returned future
    /// is dropped.
    pub async fn with_exclusive_access<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _permit = {
            let _waiting = Waiting::enter(&self.waiting);
            self.lock.lock().await
        };
        f().await
    }

    /// Callers queued for the gate, not counting the one holding it.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Whether a generation is in progress.
    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}
