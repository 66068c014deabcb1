//! Integration tests for the serialized worker.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use autoworker::{Failure, IdleHook, Worker};

async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn items_are_processed_in_submission_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let worker = {
        let seen = Arc::clone(&seen);
        Worker::new(move |n: u32| {
            let seen = Arc::clone(&seen);
            async move {
                tokio::task::yield_now().await;
                seen.lock().unwrap().push(n);
                Ok::<_, anyhow::Error>(n)
            }
        })
    };

    for n in 0..200 {
        worker.submit(n, None);
    }
    let last = worker.submit_and_await(200, None).await;
    assert_eq!(last.value(), Some(&200));

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen, (0..=200).collect::<Vec<_>>());
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn awaited_items_resolve_with_value_or_failure() {
    let worker = Worker::new(|n: u32| async move {
        if n % 2 == 1 {
            anyhow::bail!("odd input {n}");
        }
        Ok(n * 10)
    });

    let completions: Vec<_> = (0..6).map(|n| worker.submit_and_await(n, None)).collect();
    for (n, completion) in (0u32..).zip(completions) {
        let outcome = completion.await;
        if n % 2 == 0 {
            assert!(outcome.is_success(), "item {n} should succeed");
            assert_eq!(outcome.value(), Some(&(n * 10)));
            assert!(outcome.failure().is_none());
        } else {
            assert!(!outcome.is_success(), "item {n} should fail");
            let message = outcome
                .failure()
                .and_then(Failure::process_error)
                .map(|e| e.to_string());
            assert_eq!(message, Some(format!("odd input {n}")));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panic_is_captured_and_loop_keeps_running() {
    let worker = Worker::new(|n: u32| async move {
        if n == 3 {
            panic!("bad item {n}");
        }
        Ok::<_, anyhow::Error>(n)
    });

    let panicked = worker.submit_and_await(3, None);
    let after = worker.submit_and_await(4, None);

    match panicked.await.failure() {
        Some(Failure::Panicked(msg)) => assert_eq!(msg, "bad item 3"),
        other => panic!("expected Panicked, got {other:?}"),
    }
    assert_eq!(after.await.value(), Some(&4));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fire_and_forget_failure_does_not_affect_siblings() {
    let worker = Worker::new(|n: u32| async move {
        if n == 0 {
            anyhow::bail!("first item fails");
        }
        Ok(n)
    });

    worker.submit(0, None);
    assert_eq!(worker.submit_and_await(1, None).await.value(), Some(&1));
}

#[test]
fn completion_resolves_abandoned_when_runtime_shuts_down() {
    let worker = Worker::new(|_n: u32| async move {
        std::future::pending::<()>().await;
        Ok::<u32, anyhow::Error>(0)
    });

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let completion = runtime.block_on(async {
        let completion = worker.submit_and_await(1, None);
        // Let the loop pick the item up so it is in flight, not queued.
        tokio::time::sleep(Duration::from_millis(100)).await;
        completion
    });
    drop(runtime);

    let outcome = tokio::runtime::Runtime::new()
        .unwrap()
        .block_on(completion);
    assert!(matches!(outcome.failure(), Some(Failure::Abandoned)));
}

// ---------------------------------------------------------------------------
// Start / stop coordination
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn worker_restarts_after_draining() {
    let worker = Worker::new(|s: &'static str| async move { Ok::<_, anyhow::Error>(s.len()) });

    assert_eq!(worker.submit_and_await("a", None).await.value(), Some(&1));
    wait_until(|| !worker.has_pending_or_active_work()).await;

    assert_eq!(worker.submit_and_await("bb", None).await.value(), Some(&2));
    wait_until(|| !worker.has_pending_or_active_work()).await;
    assert_eq!(worker.pending_len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn idle_hook_fires_once_per_idle_transition() {
    let idles = Arc::new(AtomicUsize::new(0));
    let hook: IdleHook = {
        let idles = Arc::clone(&idles);
        Arc::new(move || {
            idles.fetch_add(1, Ordering::SeqCst);
        })
    };
    let worker = Worker::new(|n: u32| async move { Ok::<_, anyhow::Error>(n) });

    assert!(worker.submit_and_await(1, Some(Arc::clone(&hook))).await.is_success());
    wait_until(|| idles.load(Ordering::SeqCst) == 1).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(idles.load(Ordering::SeqCst), 1);

    assert!(worker.submit_and_await(2, Some(hook)).await.is_success());
    wait_until(|| idles.load(Ordering::SeqCst) == 2).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_submitters_get_exactly_once_serial_processing() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let processed = Arc::new(Mutex::new(Vec::new()));

    let worker = {
        let in_flight = Arc::clone(&in_flight);
        let max_in_flight = Arc::clone(&max_in_flight);
        let processed = Arc::clone(&processed);
        Worker::new(move |n: usize| {
            let in_flight = Arc::clone(&in_flight);
            let max_in_flight = Arc::clone(&max_in_flight);
            let processed = Arc::clone(&processed);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                processed.lock().unwrap().push(n);
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(n)
            }
        })
    };

    let handles: Vec<_> = (0..100)
        .map(|n| {
            let worker = worker.clone();
            tokio::spawn(async move { worker.submit_and_await(n, None).await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().is_success());
    }

    let processed = processed.lock().unwrap().clone();
    assert_eq!(processed.len(), 100);
    let unique: HashSet<_> = processed.into_iter().collect();
    assert_eq!(unique.len(), 100);
    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
}
