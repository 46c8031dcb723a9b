//! Single-flight behavior of the loader gate.

use paginationable::{GateOutcome, PendingGate};
use parking_lot::Mutex;
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Callback that records its params and takes 100ms.
fn slow_recorder<'a>(
    log: &'a Mutex<Vec<u32>>,
) -> impl FnMut(u32) -> Pin<Box<dyn Future<Output = u32> + Send + 'a>> + 'a {
    move |params| {
        Box::pin(async move {
            log.lock().push(params);
            tokio::time::sleep(Duration::from_millis(100)).await;
            params
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_requests_while_busy_run_once_with_latest_params() {
    let gate = PendingGate::new("isLoading");
    let log = Mutex::new(Vec::new());

    let (first, second, third, fourth) = tokio::join!(
        gate.run(1, slow_recorder(&log)),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            gate.run(2, slow_recorder(&log)).await
        },
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            gate.run(3, slow_recorder(&log)).await
        },
        async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            gate.run(4, slow_recorder(&log)).await
        },
    );

    assert_eq!(first, GateOutcome::Completed(4));
    assert_eq!(second, GateOutcome::Queued);
    assert_eq!(third, GateOutcome::Queued);
    assert_eq!(fourth, GateOutcome::Queued);
    assert_eq!(*log.lock(), vec![1, 4]);
    assert_eq!(gate.executions(), 2);
    assert!(!gate.is_busy());
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_params_while_busy_are_ignored() {
    let gate = PendingGate::new("isLoading");
    let log = Mutex::new(Vec::new());

    let (first, second) = tokio::join!(gate.run(7, slow_recorder(&log)), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        gate.run(7, slow_recorder(&log)).await
    });

    assert_eq!(first, GateOutcome::Completed(7));
    assert_eq!(second, GateOutcome::Duplicate);
    assert_eq!(*log.lock(), vec![7]);
}

#[tokio::test(start_paused = true)]
async fn test_params_reverting_to_in_flight_value_do_not_rerun() {
    let gate = PendingGate::new("isLoading");
    let log = Mutex::new(Vec::new());

    let (first, _, _) = tokio::join!(
        gate.run(1, slow_recorder(&log)),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            gate.run(2, slow_recorder(&log)).await
        },
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            gate.run(1, slow_recorder(&log)).await
        },
    );

    assert_eq!(first, GateOutcome::Completed(1));
    assert_eq!(*log.lock(), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn test_params_arriving_during_follow_up_run_are_drained() {
    let gate = PendingGate::new("isLoading");
    let log = Mutex::new(Vec::new());

    let (first, _, _) = tokio::join!(
        gate.run(1, slow_recorder(&log)),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            gate.run(2, slow_recorder(&log)).await
        },
        async {
            // Lands while the follow-up run for 2 is in flight.
            tokio::time::sleep(Duration::from_millis(150)).await;
            gate.run(3, slow_recorder(&log)).await
        },
    );

    assert_eq!(first, GateOutcome::Completed(3));
    assert_eq!(*log.lock(), vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_executions_never_overlap() {
    let gate = Arc::new(PendingGate::new("isLoading"));
    let active = Arc::new(Mutex::new((0u32, 0u32)));

    let mut handles = Vec::new();
    for i in 0..10u32 {
        let gate = Arc::clone(&gate);
        let active = Arc::clone(&active);
        handles.push(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(u64::from(i) * 15)).await;
            gate.run(i, move |_| {
                let active = Arc::clone(&active);
                async move {
                    {
                        let mut guard = active.lock();
                        guard.0 += 1;
                        guard.1 = guard.1.max(guard.0);
                    }
                    tokio::time::sleep(Duration::from_millis(40)).await;
                    active.lock().0 -= 1;
                }
            })
            .await
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(active.lock().1, 1);
    assert!(!gate.is_busy());
}

#[tokio::test(start_paused = true)]
async fn test_busy_flag_observers_see_one_cycle() {
    let gate = PendingGate::new("isLoading");
    let log = Mutex::new(Vec::new());
    let mut rx = gate.subscribe();
    let transitions = Mutex::new(Vec::new());

    tokio::join!(
        async {
            tokio::join!(gate.run(1, slow_recorder(&log)), async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                gate.run(2, slow_recorder(&log)).await
            });
        },
        async {
            while rx.changed().await.is_ok() {
                let busy = *rx.borrow_and_update();
                transitions.lock().push(busy);
                if !busy {
                    break;
                }
            }
        },
    );

    // Two executions, one busy period.
    assert_eq!(*log.lock(), vec![1, 2]);
    assert_eq!(*transitions.lock(), vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn test_nested_params_compare_structurally() {
    let gate = PendingGate::new("isLoading");
    let runs = Mutex::new(Vec::new());
    let runs_ref = &runs;

    let record = move |params: serde_json::Value| async move {
        runs_ref.lock().push(params);
        tokio::time::sleep(Duration::from_millis(100)).await;
    };

    tokio::join!(gate.run(json!({"filter": {"a": 1, "b": 2}}), record), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        // Same object with keys in another order: treated as unchanged.
        gate.run(json!({"filter": {"b": 2, "a": 1}}), record).await
    });
    assert_eq!(runs.lock().len(), 1);

    tokio::join!(gate.run(json!({"ids": [1, 2]}), record), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        // Reordered array: a change.
        gate.run(json!({"ids": [2, 1]}), record).await
    });
    assert_eq!(runs.lock().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_queued_params_run_when_execution_is_abandoned() {
    let gate = Arc::new(PendingGate::new("isLoading"));
    let log = Arc::new(Mutex::new(Vec::new()));

    let spawn_run = |params: u32| {
        let gate = Arc::clone(&gate);
        let log = Arc::clone(&log);
        tokio::spawn(async move {
            gate.run(params, move |p| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().push(p);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    p
                }
            })
            .await
        })
    };

    let first = spawn_run(1);
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = spawn_run(2);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(*log.lock(), vec![1]);

    first.abort();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(first.await.unwrap_err().is_cancelled());
    assert_eq!(second.await.unwrap(), GateOutcome::Completed(2));
    assert_eq!(*log.lock(), vec![1, 2]);
    assert!(!gate.is_busy());
}

#[tokio::test(start_paused = true)]
async fn test_superseded_waiter_does_not_take_over() {
    let gate = Arc::new(PendingGate::new("isLoading"));
    let log = Arc::new(Mutex::new(Vec::new()));

    let spawn_run = |params: u32| {
        let gate = Arc::clone(&gate);
        let log = Arc::clone(&log);
        tokio::spawn(async move {
            gate.run(params, move |p| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().push(p);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    p
                }
            })
            .await
        })
    };

    let first = spawn_run(1);
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = spawn_run(2);
    tokio::time::sleep(Duration::from_millis(10)).await;
    let third = spawn_run(3);
    tokio::time::sleep(Duration::from_millis(10)).await;

    first.abort();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(second.await.unwrap(), GateOutcome::Queued);
    assert_eq!(third.await.unwrap(), GateOutcome::Completed(3));
    assert_eq!(*log.lock(), vec![1, 3]);
}
