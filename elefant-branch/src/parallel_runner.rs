use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Limits how many futures make progress at the same time.
///
/// Unlike spawning, the futures are driven by whoever awaits them, so they are free to
/// borrow the connection and the catalog.
#[derive(Clone)]
pub struct ParallelRunner {
    permits: Arc<Semaphore>,
}

impl ParallelRunner {
    pub fn new(max_parallelism: NonZeroUsize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_parallelism.get()))
        }
    }

    pub async fn run<F>(&self, run: F) -> F::Output
        where F: Future,
    {
        // The semaphore is owned by the runner and never closed, so acquiring can only wait.
        let permit = self.permits.acquire().await.ok();

        let result = run.await;

        drop(permit);

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn never_runs_more_than_allowed() {
        let runner = ParallelRunner::new(NonZeroUsize::new(2).unwrap());
        let running = AtomicUsize::new(0);
        let max_seen = AtomicUsize::new(0);

        let (running, max_seen) = (&running, &max_seen);
        let tasks = (0..8).map(|i| {
            runner.run(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                i
            })
        });

        let results = join_all(tasks).await;

        assert_eq!(results, (0..8).collect::<Vec<_>>());
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }
}
