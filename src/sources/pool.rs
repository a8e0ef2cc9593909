use std::{future::Future, sync::Arc};
use tokio::sync::Semaphore;
use tracing::debug;

/// Bounds how many media jobs (yt-dlp processes, downloads) run at once so a
/// burst of requests in one guild cannot starve the others.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Runs `job` once a slot is free.
    pub async fn run<F, T>(&self, job: F) -> T
    where
        F: Future<Output = T>,
    {
        // The semaphore is never closed, so acquire only fails if that changes.
        let _permit = self.permits.acquire().await.ok();
        debug!("🧵 Media job started ({} slots free)", self.available());
        job.await
    }

    /// Runs blocking work on tokio's blocking threads, still within the bound.
    pub async fn blocking<F, T>(&self, work: F) -> std::io::Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.run(async move {
            tokio::task::spawn_blocking(work)
                .await
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn never_exceeds_its_size() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs = (0..6).map(|_| {
            let pool = pool.clone();
            let running = running.clone();
            let peak = peak.clone();
            tokio::spawn(async move {
                pool.run(async {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await
            })
        });

        for job in futures::future::join_all(jobs).await {
            job.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn blocking_returns_the_value() {
        let pool = WorkerPool::new(1);
        let value = pool.blocking(|| 40 + 2).await.unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn zero_size_is_bumped_to_one() {
        assert_eq!(WorkerPool::new(0).size(), 1);
    }
}
