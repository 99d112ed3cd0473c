//! Per-import record of the dimension-type constraints already created.

use std::collections::HashSet;
use std::future::Future;
use tokio::sync::Mutex;

/// Set of dimension-type labels whose unique constraint exists.
///
/// One cache lives for exactly one import and is shared by all of its
/// dimension workers. The lock is held while the constraint is created, so
/// concurrent workers for the same type wait rather than create it twice,
/// and a failed creation leaves the label unmarked.
#[derive(Debug, Default)]
pub struct ConstraintCache {
    labels: Mutex<HashSet<String>>,
}

impl ConstraintCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `create` unless `label` is already cached.
    ///
    /// Returns `Ok(true)` if this call created the constraint.
    pub async fn ensure<F, Fut, E>(&self, label: &str, create: F) -> Result<bool, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let mut labels = self.labels.lock().await;
        if labels.contains(label) {
            return Ok(false);
        }
        create().await?;
        labels.insert(label.to_string());
        Ok(true)
    }

    pub async fn contains(&self, label: &str) -> bool {
        self.labels.lock().await.contains(label)
    }

    pub async fn len(&self) -> usize {
        self.labels.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.labels.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn creates_each_label_once() {
        let cache = ConstraintCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            cache
                .ensure("_1_geography", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(())
                })
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.contains("_1_geography").await);
    }

    #[tokio::test]
    async fn failed_creation_is_not_cached() {
        let cache = ConstraintCache::new();

        let first = cache.ensure("_1_age", || async { Err("boom") }).await;
        assert_eq!(first, Err("boom"));
        assert!(cache.is_empty().await);

        let second = cache.ensure("_1_age", || async { Ok::<_, &str>(()) }).await;
        assert_eq!(second, Ok(true));
    }

    #[tokio::test]
    async fn concurrent_tasks_race_on_one_label() {
        let cache = Arc::new(ConstraintCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let mut set = tokio::task::JoinSet::new();

        for i in 0..32 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            set.spawn(async move {
                let label = format!("_1_dim{}", i % 4);
                cache
                    .ensure(&label, || async {
                        tokio::task::yield_now().await;
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, ()>(())
                    })
                    .await
                    .unwrap();
            });
        }
        while let Some(result) = set.join_next().await {
            result.unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(cache.len().await, 4);
    }
}
