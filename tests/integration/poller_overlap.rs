//! Slow producers, overlapping ticks and shutdown

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use pmm_console::poller::{PollerHandle, ResultOrdering, Snapshot, TickPolicy, producer_fn};
use tokio::sync::broadcast::error::RecvError;

/// Tracks started calls and the highest number of calls running at once
#[derive(Default)]
struct Calls {
    started: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

type SlowProducer = Box<dyn Fn() -> BoxFuture<'static, anyhow::Result<usize>> + Send + Sync>;

/// Producer whose n-th call takes `delay(n)` and returns n
fn slow_producer(calls: Arc<Calls>, delay: fn(usize) -> Duration) -> SlowProducer {
    Box::new(move || {
        let calls = calls.clone();
        Box::pin(async move {
            let n = calls.started.fetch_add(1, Ordering::SeqCst);
            let running = calls.running.fetch_add(1, Ordering::SeqCst) + 1;
            calls.max_running.fetch_max(running, Ordering::SeqCst);

            tokio::time::sleep(delay(n)).await;

            calls.running.fetch_sub(1, Ordering::SeqCst);
            Ok(n)
        })
    })
}

#[tokio::test(start_paused = true)]
async fn test_overlap_issues_every_tick() {
    let calls = Arc::new(Calls::default());
    let handle = PollerHandle::spawn(
        "overlap",
        producer_fn(slow_producer(calls.clone(), |_| Duration::from_secs(25))),
        Duration::from_secs(10),
        TickPolicy::Overlap,
    )
    .unwrap();

    tokio::time::sleep(Duration::from_secs(35)).await;

    // ticks at 0s, 10s, 20s and 30s, each call runs for 25s
    assert_eq!(calls.started.load(Ordering::SeqCst), 4);
    assert_eq!(calls.max_running.load(Ordering::SeqCst), 3);

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_serialize_never_overlaps() {
    let calls = Arc::new(Calls::default());
    let handle = PollerHandle::spawn(
        "serialize",
        producer_fn(slow_producer(calls.clone(), |_| Duration::from_secs(25))),
        Duration::from_secs(10),
        TickPolicy::Serialize,
    )
    .unwrap();

    tokio::time::sleep(Duration::from_secs(80)).await;

    assert_eq!(calls.max_running.load(Ordering::SeqCst), 1);
    assert!(calls.started.load(Ordering::SeqCst) <= 4);

    handle.shutdown().await.unwrap();
}

/// First call is slow, second one fast, so they settle out of issue order
fn out_of_order(n: usize) -> Duration {
    if n == 0 {
        Duration::from_secs(15)
    } else {
        Duration::from_secs(1)
    }
}

async fn settle_out_of_order(ordering: ResultOrdering) -> Snapshot<usize> {
    let calls = Arc::new(Calls::default());
    let (handle, actor) = PollerHandle::new(
        "out-of-order",
        producer_fn(slow_producer(calls, out_of_order)),
        Duration::from_secs(10),
        TickPolicy::Overlap,
    )
    .unwrap();
    let snapshot = Snapshot::new(ordering);
    snapshot.follow(&handle);
    tokio::spawn(actor.run());

    // call 1 settles at 11s, call 0 at 15s
    tokio::time::sleep(Duration::from_secs(16)).await;
    handle.shutdown().await.unwrap();

    snapshot
}

#[tokio::test(start_paused = true)]
async fn test_last_settled_keeps_stale_result() {
    let snapshot = settle_out_of_order(ResultOrdering::LastSettled).await;

    let state = snapshot.state().await;
    assert_eq!(state.settled, 2);
    assert_eq!(state.value, Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_newest_issued_drops_stale_result() {
    let snapshot = settle_out_of_order(ResultOrdering::NewestIssued).await;

    let state = snapshot.state().await;
    assert_eq!(state.settled, 2);
    assert_eq!(state.value, Some(1));
    assert_eq!(state.applied_seq, Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_lets_in_flight_call_settle() {
    let calls = Arc::new(Calls::default());
    let handle = PollerHandle::spawn(
        "in-flight",
        producer_fn(slow_producer(calls.clone(), |_| Duration::from_secs(20))),
        Duration::from_secs(100),
        TickPolicy::Overlap,
    )
    .unwrap();
    let mut events = handle.subscribe();

    tokio::time::sleep(Duration::from_secs(1)).await;
    handle.shutdown().await.unwrap();

    let event = events.recv().await.unwrap();
    assert_eq!(event.seq, 0);
    assert_eq!(event.outcome, Ok(0));

    drop(handle);
    assert!(matches!(events.recv().await, Err(RecvError::Closed)));
    assert_eq!(calls.started.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_serialized_call() {
    let calls = Arc::new(Calls::default());
    let handle = PollerHandle::spawn(
        "in-flight",
        producer_fn(slow_producer(calls.clone(), |_| Duration::from_secs(20))),
        Duration::from_secs(100),
        TickPolicy::Serialize,
    )
    .unwrap();
    let mut events = handle.subscribe();

    tokio::time::sleep(Duration::from_secs(1)).await;
    handle.shutdown().await.unwrap();

    let event = events.recv().await.unwrap();
    assert_eq!(event.outcome, Ok(0));
    assert_eq!(calls.running.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_no_calls_after_shutdown() {
    let calls = Arc::new(Calls::default());
    let handle = PollerHandle::spawn(
        "stopped",
        producer_fn(slow_producer(calls.clone(), |_| Duration::from_secs(1))),
        Duration::from_secs(10),
        TickPolicy::Overlap,
    )
    .unwrap();

    tokio::time::sleep(Duration::from_secs(15)).await;
    handle.shutdown().await.unwrap();
    let before = calls.started.load(Ordering::SeqCst);
    assert_eq!(before, 2);

    // six more periods pass without a single tick
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(calls.started.load(Ordering::SeqCst), before);
    assert!(handle.is_stopped());
    assert!(handle.poll_now().await.is_err());
}
