use flume::{bounded, Receiver, Sender};
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::types::ActivityEvent;

/// Tuning knobs for the background audit worker pool. Same shape as the
/// teacher's `LoggerConfig`.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub batch_timeout_ms: u64,
    pub worker_count: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            batch_size: 100,
            batch_timeout_ms: 1000,
            worker_count: 2,
        }
    }
}

/// Async audit trail for `TokenMetrics`, guardian fail-open events and
/// indexing stage transitions (§7, §8). Non-blocking: `log` enqueues and
/// returns immediately, dropping the event with a warning if the bounded
/// channel is full rather than applying backpressure to the turn in
/// progress — grounded on `logging/logger.rs::ActivityLogger`.
#[derive(Clone)]
pub struct ActivityLogger {
    sender: Sender<ActivityEvent>,
}

impl ActivityLogger {
    pub fn new(pool: PgPool, config: LoggerConfig) -> Self {
        let (sender, receiver) = bounded(config.queue_capacity);

        info!(
            queue_capacity = config.queue_capacity,
            batch_size = config.batch_size,
            workers = config.worker_count,
            "activity logger starting"
        );

        for worker_id in 0..config.worker_count.max(1) {
            let pool = pool.clone();
            let receiver = receiver.clone();
            let config = config.clone();
            tokio::spawn(async move {
                Self::worker_loop(worker_id, pool, receiver, config).await;
            });
        }

        Self { sender }
    }

    pub fn log(&self, event: ActivityEvent) {
        if let Err(e) = self.sender.try_send(event) {
            warn!(error = %e, "activity log queue full, dropping event");
        }
    }

    async fn worker_loop(worker_id: usize, pool: PgPool, receiver: Receiver<ActivityEvent>, config: LoggerConfig) {
        let mut batch: Vec<ActivityEvent> = Vec::with_capacity(config.batch_size);
        let batch_timeout = Duration::from_millis(config.batch_timeout_ms);

        loop {
            let deadline = tokio::time::Instant::now() + batch_timeout;

            while batch.len() < config.batch_size {
                match tokio::time::timeout_at(deadline, receiver.recv_async()).await {
                    Ok(Ok(event)) => batch.push(event),
                    Ok(Err(_)) => {
                        if !batch.is_empty() {
                            Self::flush_batch(&pool, &batch, worker_id).await;
                        }
                        info!(worker_id, "activity logger shutting down");
                        return;
                    }
                    Err(_) => break,
                }
            }

            if !batch.is_empty() {
                Self::flush_batch(&pool, &batch, worker_id).await;
                batch.clear();
            } else {
                sleep(Duration::from_millis(100)).await;
            }
        }
    }

    async fn flush_batch(pool: &PgPool, batch: &[ActivityEvent], worker_id: usize) {
        debug!(worker_id, count = batch.len(), "flushing activity batch");

        let mut query_builder = sqlx::QueryBuilder::new(
            "INSERT INTO activity_events (sid, fid, kind, message, system_tokens, history_tokens, \
             user_tokens, was_cached, created_at) ",
        );

        query_builder.push_values(batch, |mut b, event| {
            b.push_bind(event.sid.clone())
                .push_bind(event.fid)
                .push_bind(event.kind.as_str())
                .push_bind(event.message.clone())
                .push_bind(event.system_tokens)
                .push_bind(event.history_tokens)
                .push_bind(event.user_tokens)
                .push_bind(event.was_cached)
                .push_bind(event.created_at);
        });

        if let Err(e) = query_builder.build().execute(pool).await {
            error!(worker_id, error = %e, "failed to flush activity batch");
        }
    }

    pub fn queue_len(&self) -> usize {
        self.sender.len()
    }

    pub fn is_queue_full(&self) -> bool {
        self.sender.is_full()
    }
}

pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS activity_events (
            id BIGSERIAL PRIMARY KEY,
            sid TEXT,
            fid BIGINT,
            kind TEXT NOT NULL,
            message TEXT,
            system_tokens BIGINT,
            history_tokens BIGINT,
            user_tokens BIGINT,
            was_cached BOOLEAN,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )"#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
