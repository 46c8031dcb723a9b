//! Search input debouncing.
//!
//! Each term change replaces the pending timer. Only the timer scheduled by
//! the most recent change can fire, so a burst of keystrokes results in one
//! action carrying the final term.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

pub const DEFAULT_SEARCH_DELAY: Duration = Duration::from_millis(500);

struct DebounceState {
    term: String,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

pub struct SearchDebouncer {
    delay: Duration,
    inner: Arc<Mutex<DebounceState>>,
}

impl SearchDebouncer {
    pub fn new(delay: Duration, initial_term: impl Into<String>) -> Self {
        Self {
            delay,
            inner: Arc::new(Mutex::new(DebounceState {
                term: initial_term.into(),
                generation: 0,
                timer: None,
            })),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// The current term, committed or not.
    pub fn term(&self) -> String {
        self.inner.lock().term.clone()
    }

    /// Whether a timer is waiting to fire.
    pub fn is_pending(&self) -> bool {
        self.inner.lock().timer.is_some()
    }

    /// Store `term` and schedule `action` to run with it after the delay,
    /// discarding any previously scheduled action that has not fired yet.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_term_change<F, Fut>(&self, term: impl Into<String>, action: F)
    where
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.inner.lock();
        if let Some(previous) = state.timer.take() {
            previous.abort();
        }
        state.term = term.into();
        state.generation += 1;

        let generation = state.generation;
        let delay = self.delay;
        let inner = Arc::clone(&self.inner);
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let term = {
                let mut state = inner.lock();
                if state.generation != generation {
                    return;
                }
                // Detach before acting so a later change cannot abort a
                // running action.
                state.timer = None;
                state.term.clone()
            };
            tracing::debug!(term = %term, "Search term settled");
            action(term).await;
        }));
    }

    /// Replace the term without scheduling anything, cancelling any pending
    /// timer.
    pub fn set_term_now(&self, term: impl Into<String>) {
        let mut state = self.inner.lock();
        if let Some(previous) = state.timer.take() {
            previous.abort();
        }
        state.generation += 1;
        state.term = term.into();
    }

    /// Cancel the pending timer, if any. The stored term is kept.
    pub fn cancel(&self) {
        let mut state = self.inner.lock();
        state.generation += 1;
        if let Some(previous) = state.timer.take() {
            previous.abort();
        }
    }
}

impl Drop for SearchDebouncer {
    fn drop(&mut self) {
        if let Some(timer) = self.inner.lock().timer.take() {
            timer.abort();
        }
    }
}
