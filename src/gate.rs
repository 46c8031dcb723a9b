//! Single-flight request coalescing.
//!
//! A [`PendingGate`] guards one named loader. At most one execution of the
//! loader's callback is in flight at a time. Parameters that arrive while it
//! is busy are remembered, and once the current execution finishes the
//! callback runs once more with the latest of them, unless they equal the
//! parameters that were just used.

use std::future::Future;

use parking_lot::Mutex;
use tokio::sync::watch;

/// What became of a call to [`PendingGate::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome<R> {
    /// This call ran the callback. Holds the output of the last execution,
    /// which used the most recent parameters.
    Completed(R),
    /// The gate was busy. The parameters were run by the in-flight
    /// execution, or replaced by newer ones before it got to them.
    Queued,
    /// The gate was busy with these exact parameters already pending.
    Duplicate,
}

impl<R> GateOutcome<R> {
    pub fn into_completed(self) -> Option<R> {
        match self {
            GateOutcome::Completed(output) => Some(output),
            GateOutcome::Queued | GateOutcome::Duplicate => None,
        }
    }
}

struct GateState<P> {
    busy: bool,
    last_params: Option<P>,
    executions: u64,
}

pub struct PendingGate<P> {
    name: String,
    state: Mutex<GateState<P>>,
    busy_tx: watch::Sender<bool>,
}

impl<P: Clone + PartialEq> PendingGate<P> {
    pub fn new(name: impl Into<String>) -> Self {
        let (busy_tx, _) = watch::channel(false);
        Self {
            name: name.into(),
            state: Mutex::new(GateState {
                busy: false,
                last_params: None,
                executions: 0,
            }),
            busy_tx,
        }
    }

    /// The loader name this gate reports under.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_busy(&self) -> bool {
        self.state.lock().busy
    }

    /// Number of callback executions started so far.
    pub fn executions(&self) -> u64 {
        self.state.lock().executions
    }

    /// Watch the busy flag. The receiver only sees a change on a real
    /// transition, so a drained follow-up run does not flicker to `false`.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.busy_tx.subscribe()
    }

    /// Run `callback` under this gate.
    ///
    /// A call that finds the gate busy records its parameters and waits. It
    /// returns [`GateOutcome::Queued`] once the in-flight execution has picked
    /// them up and settled, or as soon as newer parameters replace them. If
    /// the execution goes away without settling (panic, or its future being
    /// dropped), the caller whose parameters are still recorded takes over and
    /// runs them itself.
    ///
    /// The busy flag is released on every exit path, including a panic inside
    /// the callback and the returned future being dropped mid-flight.
    pub async fn run<F, Fut, R>(&self, params: P, callback: F) -> GateOutcome<R>
    where
        F: FnMut(P) -> Fut,
        Fut: Future<Output = R>,
    {
        let mut busy_rx = {
            let mut state = self.state.lock();
            if state.busy && state.last_params.as_ref() == Some(&params) {
                tracing::trace!(loader = %self.name, "Duplicate request ignored");
                return GateOutcome::Duplicate;
            }

            state.last_params = Some(params.clone());
            if state.busy {
                tracing::debug!(loader = %self.name, "Loader busy, request queued");
                Some(self.busy_tx.subscribe())
            } else {
                state.busy = true;
                None
            }
        };

        while let Some(rx) = busy_rx.as_mut() {
            if rx.changed().await.is_err() {
                return GateOutcome::Queued;
            }

            let mut state = self.state.lock();
            if state.last_params.as_ref() != Some(&params) {
                return GateOutcome::Queued;
            }
            if !state.busy {
                tracing::debug!(loader = %self.name, "Taking over abandoned request");
                state.busy = true;
                busy_rx = None;
            }
        }

        self.drive(params, callback).await
    }

    /// Execute with `params` until the recorded parameters stop changing.
    /// The caller has already marked the gate busy.
    async fn drive<F, Fut, R>(&self, params: P, mut callback: F) -> GateOutcome<R>
    where
        F: FnMut(P) -> Fut,
        Fut: Future<Output = R>,
    {
        self.set_busy_flag(true);

        let mut params = params;
        loop {
            self.state.lock().executions += 1;

            let release = scopeguard::guard(self, |gate| gate.release());
            let output = callback(params.clone()).await;
            scopeguard::ScopeGuard::into_inner(release);

            let mut state = self.state.lock();
            match state.last_params.clone() {
                Some(latest) if latest != params => {
                    tracing::debug!(loader = %self.name, "Parameters changed in flight, running again");
                    params = latest;
                }
                _ => {
                    state.last_params = None;
                    state.busy = false;
                    drop(state);
                    self.set_busy_flag(false);
                    return GateOutcome::Completed(output);
                }
            }
        }
    }

    /// Abnormal exit. The recorded parameters are kept so a waiting caller
    /// can pick them up.
    fn release(&self) {
        self.state.lock().busy = false;
        tracing::debug!(loader = %self.name, "Loader released without settling");
        self.set_busy_flag(false);
    }

    fn set_busy_flag(&self, busy: bool) {
        self.busy_tx.send_if_modified(|current| {
            if *current == busy {
                return false;
            }
            *current = busy;
            true
        });
    }
}
