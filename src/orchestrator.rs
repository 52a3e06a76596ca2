//! Bounded fan-out/fan-in for bulk device operations
//!
//! ## Responsibilities
//!
//! - Run one async operation per work item across at most `cap` workers
//! - Isolate per-item failure: a panicked worker yields a failure result
//!   for that item instead of aborting the batch
//! - Guarantee completeness: exactly one result per input item
//!
//! Result order follows spawn order here, but callers must not rely on it;
//! every bulk API documents order as unspecified.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Concurrency cap for pure probe/read operations (scan, refresh)
pub const PROBE_CONCURRENCY: usize = 16;

/// Concurrency cap for operations with heavier device-side cost
/// (firmware upload, camera batch configuration, SSH backup/restore)
pub const HEAVY_CONCURRENCY: usize = 8;

/// Fan `items` out over `min(N, cap)` concurrent workers and collect one
/// result per item. `fallback` converts an item into a failure result when
/// its worker panicked.
pub async fn run<T, R, F, Fut, P>(items: Vec<T>, cap: usize, op: F, fallback: P) -> Vec<R>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    P: Fn(&T) -> R,
{
    if items.is_empty() {
        return Vec::new();
    }

    let cap = cap.min(items.len()).max(1);
    let semaphore = Arc::new(Semaphore::new(cap));
    let op = Arc::new(op);

    let mut handles = Vec::with_capacity(items.len());
    for item in items {
        let permit = semaphore.clone().acquire_owned().await.unwrap();
        let op = op.clone();
        let spawned = item.clone();
        let handle = tokio::spawn(async move {
            let result = op(spawned).await;
            drop(permit);
            result
        });
        handles.push((item, handle));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (item, handle) in handles {
        match handle.await {
            Ok(result) => results.push(result),
            Err(e) => {
                tracing::error!(error = %e, "Batch worker aborted");
                results.push(fallback(&item));
            }
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn one_result_per_item() {
        let items: Vec<u32> = (0..50).collect();
        let results = run(
            items,
            HEAVY_CONCURRENCY,
            |n| async move { n * 2 },
            |n| n * 2,
        )
        .await;
        assert_eq!(results.len(), 50);
        let mut sorted = results.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn empty_input_yields_empty_output() {
        let results: Vec<u32> = run(Vec::new(), 8, |n: u32| async move { n }, |n| *n).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn panicked_worker_becomes_failure_result() {
        let items = vec![1u32, 2, 3];
        let results = run(
            items,
            8,
            |n| async move {
                if n == 2 {
                    panic!("boom");
                }
                Ok::<u32, String>(n)
            },
            |n| Err(format!("worker failed for {}", n)),
        )
        .await;
        assert_eq!(results.len(), 3);
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_cap() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (a, p) = (active.clone(), peak.clone());

        let results = run(
            (0..40u32).collect(),
            4,
            move |_| {
                let (a, p) = (a.clone(), p.clone());
                async move {
                    let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                    p.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                    a.fetch_sub(1, Ordering::SeqCst);
                    true
                }
            },
            |_| false,
        )
        .await;

        assert_eq!(results.len(), 40);
        assert!(peak.load(Ordering::SeqCst) <= 4);
    }
}
