//! Per-approach batch execution.

use std::future::Future;

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;

use super::profile::ExecutionApproach;
use super::ReclaimHook;
use crate::error::Result;

/// Items per streaming sub-chunk.
pub(crate) const STREAMING_CHUNK: usize = 4;
/// Approximate number of chunked sub-chunks.
pub(crate) const CHUNKED_PARTS: usize = 4;
/// Sequential reclaim hint cadence, in items.
pub(crate) const SEQUENTIAL_RECLAIM_EVERY: usize = 5;

/// Outcome of executing one batch.
pub(crate) struct BatchRun<T, R> {
    pub results: Vec<R>,
    /// Items never handed to the processor because of cancellation.
    pub remaining: Vec<T>,
}

/// Run one batch with the given approach.
///
/// An error from any processor call fails the whole batch. Cancellation is
/// honoured between sub-chunks; items not yet started come back in
/// [`BatchRun::remaining`].
pub(crate) async fn execute<T, R, F, Fut>(
    approach: ExecutionApproach,
    items: Vec<T>,
    processor: &F,
    parallelism: usize,
    reclaim: Option<&ReclaimHook>,
    cancel: Option<&CancellationToken>,
) -> Result<BatchRun<T, R>>
where
    F: Fn(Vec<T>) -> Fut,
    Fut: Future<Output = Result<Vec<R>>>,
{
    match approach {
        ExecutionApproach::Sequential => {
            let reclaim = reclaim.map(|hook| (hook, SEQUENTIAL_RECLAIM_EVERY));
            run_in_order(split(items, 1), processor, false, reclaim, cancel).await
        }
        ExecutionApproach::Streaming => {
            run_in_order(split(items, STREAMING_CHUNK), processor, true, None, cancel).await
        }
        ExecutionApproach::Chunked => {
            let size = items.len().div_ceil(CHUNKED_PARTS).max(1);
            run_in_order(split(items, size), processor, false, None, cancel).await
        }
        ExecutionApproach::Parallel => {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Ok(BatchRun {
                    results: Vec::new(),
                    remaining: items,
                });
            }
            let size = (items.len() / parallelism.max(1)).max(1);
            let outputs = join_all(split(items, size).into_iter().map(processor)).await;
            let mut results = Vec::new();
            for output in outputs {
                results.extend(output?);
            }
            Ok(BatchRun {
                results,
                remaining: Vec::new(),
            })
        }
    }
}

async fn run_in_order<T, R, F, Fut>(
    chunks: Vec<Vec<T>>,
    processor: &F,
    yield_between: bool,
    reclaim: Option<(&ReclaimHook, usize)>,
    cancel: Option<&CancellationToken>,
) -> Result<BatchRun<T, R>>
where
    F: Fn(Vec<T>) -> Fut,
    Fut: Future<Output = Result<Vec<R>>>,
{
    let mut results = Vec::new();
    let mut done = 0usize;
    let mut chunks = chunks.into_iter();
    while let Some(chunk) = chunks.next() {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            let mut remaining = chunk;
            remaining.extend(chunks.flatten());
            return Ok(BatchRun { results, remaining });
        }
        done += chunk.len();
        results.extend(processor(chunk).await?);
        if let Some((hook, every)) = reclaim
            && done % every == 0
        {
            hook();
        }
        if yield_between && chunks.len() > 0 {
            tokio::task::yield_now().await;
        }
    }
    Ok(BatchRun {
        results,
        remaining: Vec::new(),
    })
}

/// Split `items` into owned chunks of at most `size`, preserving order.
pub(crate) fn split<T>(mut items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut chunks = Vec::with_capacity(items.len().div_ceil(size));
    while !items.is_empty() {
        let rest = items.split_off(size.min(items.len()));
        chunks.push(std::mem::replace(&mut items, rest));
    }
    chunks
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::HuginnError;

    fn recording() -> (Arc<Mutex<Vec<usize>>>, impl Fn(Vec<u32>) -> std::future::Ready<Result<Vec<u32>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&calls);
        let processor = move |items: Vec<u32>| {
            seen.lock().unwrap().push(items.len());
            std::future::ready(Ok(items.into_iter().map(|i| i * 10).collect()))
        };
        (calls, processor)
    }

    #[test]
    fn split_preserves_order() {
        assert_eq!(split(vec![1, 2, 3, 4, 5], 2), vec![vec![1, 2], vec![3, 4], vec![5]]);
        assert!(split(Vec::<u8>::new(), 3).is_empty());
    }

    #[tokio::test]
    async fn sequential_calls_once_per_item() {
        let (calls, processor) = recording();
        let run = execute(ExecutionApproach::Sequential, vec![1, 2, 3], &processor, 4, None, None)
            .await
            .unwrap();
        assert_eq!(run.results, vec![10, 20, 30]);
        assert_eq!(*calls.lock().unwrap(), vec![1, 1, 1]);
    }

    #[tokio::test]
    async fn streaming_uses_four_item_chunks() {
        let (calls, processor) = recording();
        let items: Vec<u32> = (0..10).collect();
        let run = execute(ExecutionApproach::Streaming, items, &processor, 4, None, None)
            .await
            .unwrap();
        assert_eq!(run.results.len(), 10);
        assert_eq!(*calls.lock().unwrap(), vec![4, 4, 2]);
    }

    #[tokio::test]
    async fn chunked_uses_about_four_parts() {
        let (calls, processor) = recording();
        let items: Vec<u32> = (0..10).collect();
        execute(ExecutionApproach::Chunked, items, &processor, 4, None, None)
            .await
            .unwrap();
        assert_eq!(*calls.lock().unwrap(), vec![3, 3, 3, 1]);
    }

    #[tokio::test]
    async fn parallel_keeps_chunk_order() {
        let (calls, processor) = recording();
        let items: Vec<u32> = (0..8).collect();
        let run = execute(ExecutionApproach::Parallel, items, &processor, 4, None, None)
            .await
            .unwrap();
        assert_eq!(run.results, (0..8).map(|i| i * 10).collect::<Vec<_>>());
        assert_eq!(calls.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn sequential_reclaims_every_five_items() {
        let (_, processor) = recording();
        let hints = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hints);
        let hook: ReclaimHook = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let items: Vec<u32> = (0..12).collect();
        execute(ExecutionApproach::Sequential, items, &processor, 1, Some(&hook), None)
            .await
            .unwrap();
        assert_eq!(hints.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn any_failure_fails_the_batch() {
        let processor = |items: Vec<u32>| {
            std::future::ready(if items.contains(&3) {
                Err(HuginnError::EmbeddingGeneration("boom".into()))
            } else {
                Ok(items)
            })
        };
        let result = execute(ExecutionApproach::Parallel, (0..8).collect(), &processor, 4, None, None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cancelled_batch_returns_items_untouched() {
        let (calls, processor) = recording();
        let token = CancellationToken::new();
        token.cancel();
        let run = execute(ExecutionApproach::Streaming, vec![1, 2, 3], &processor, 1, None, Some(&token))
            .await
            .unwrap();
        assert!(run.results.is_empty());
        assert_eq!(run.remaining, vec![1, 2, 3]);
        assert!(calls.lock().unwrap().is_empty());
    }
}
