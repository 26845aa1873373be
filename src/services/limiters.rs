use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::domain::error::AppError;

/// Bounded concurrency for outbound calls that must protect an upstream
/// quota (embedding batches, indexing workers). Acquiring blocks up to
/// `acquire_timeout`, after which the caller sees a `Timeout`.
#[derive(Clone)]
pub struct Limiters {
    pub embedding: Arc<Semaphore>,
    pub indexing: Arc<Semaphore>,
    pub acquire_timeout: Duration,
}

impl Limiters {
    pub fn new(embedding_concurrency: usize, indexing_pool_size: usize, acquire_timeout: Duration) -> Self {
        Self {
            embedding: Arc::new(Semaphore::new(embedding_concurrency.max(1))),
            indexing: Arc::new(Semaphore::new(indexing_pool_size.max(1))),
            acquire_timeout,
        }
    }

    pub async fn acquire_timed(
        sem: Arc<Semaphore>,
        acquire_timeout: Duration,
    ) -> Result<(OwnedSemaphorePermit, Duration), AppError> {
        let start = Instant::now();

        let permit = tokio::time::timeout(acquire_timeout, sem.acquire_owned())
            .await
            .map_err(|_| AppError::Timeout)?
            .map_err(|_| AppError::Internal("semaphore closed".to_string()))?;

        Ok((permit, start.elapsed()))
    }
}
