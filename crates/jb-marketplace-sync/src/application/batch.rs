//! # Batch Fetch Pipeline
//!
//! Runs one fetch per key, in key order, and aggregates the per-item
//! results under a single [`BatchFailurePolicy`].

use std::fmt::Display;
use std::future::Future;

use crate::config::BatchFailurePolicy;
use crate::domain::{MarketplaceError, MarketplaceResult};

/// Per-item results of a batch that was not aborted.
#[derive(Debug)]
pub struct BatchOutcome<K, T> {
    /// Fetched items, in key order.
    pub succeeded: Vec<(K, T)>,
    /// Skipped items (isolate policy only).
    pub failed: Vec<(K, MarketplaceError)>,
}

impl<K, T> Default for BatchOutcome<K, T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<K: Display, T> BatchOutcome<K, T> {
    /// Human-readable description of each skipped item.
    pub fn failure_descriptions(&self, what: &str) -> Vec<String> {
        self.failed
            .iter()
            .map(|(key, err)| format!("{} {}: {}", what, key, err))
            .collect()
    }
}

/// Fetch every key sequentially.
///
/// - `FailFast`: stop at the first error and return it; nothing partial
///   escapes.
/// - `Isolate`: record the error against its key and continue.
pub async fn run_batch<K, T, F, Fut>(
    keys: impl IntoIterator<Item = K>,
    policy: BatchFailurePolicy,
    mut fetch: F,
) -> MarketplaceResult<BatchOutcome<K, T>>
where
    K: Copy,
    F: FnMut(K) -> Fut,
    Fut: Future<Output = MarketplaceResult<T>>,
{
    let mut outcome = BatchOutcome::default();
    for key in keys {
        match fetch(key).await {
            Ok(item) => outcome.succeeded.push((key, item)),
            Err(err) => match policy {
                BatchFailurePolicy::FailFast => return Err(err),
                BatchFailurePolicy::Isolate => outcome.failed.push((key, err)),
            },
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fetch_even(calls: &Cell<u32>) -> impl FnMut(u32) -> std::future::Ready<MarketplaceResult<u32>> + '_ {
        move |key| {
            calls.set(calls.get() + 1);
            std::future::ready(if key % 2 == 0 {
                Ok(key * 10)
            } else {
                Err(MarketplaceError::ConnectionError(format!("key {}", key)))
            })
        }
    }

    #[tokio::test]
    async fn test_fail_fast_stops_at_first_error() {
        let calls = Cell::new(0);
        let result = run_batch(vec![2, 3, 4], BatchFailurePolicy::FailFast, fetch_even(&calls)).await;
        assert!(matches!(result, Err(MarketplaceError::ConnectionError(_))));
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn test_isolate_collects_failures() {
        let calls = Cell::new(0);
        let outcome = run_batch(vec![2, 3, 4], BatchFailurePolicy::Isolate, fetch_even(&calls))
            .await
            .unwrap();
        assert_eq!(outcome.succeeded, vec![(2, 20), (4, 40)]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, 3);
        assert_eq!(calls.get(), 3);
        assert_eq!(outcome.failure_descriptions("key").len(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let calls = Cell::new(0);
        let outcome = run_batch(Vec::new(), BatchFailurePolicy::FailFast, fetch_even(&calls))
            .await
            .unwrap();
        assert!(outcome.succeeded.is_empty());
        assert!(outcome.failed.is_empty());
    }
}
