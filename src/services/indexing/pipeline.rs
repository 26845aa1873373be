use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::config::RagConfig;
use crate::domain::error::AppError;
use crate::domain::models::{Chunk, FileId};
use crate::domain::ports::{ChatRepository, EmbeddingProvider, VectorStore};
use crate::logging::{ActivityEvent, ActivityKind, ActivityLogger};

use super::chunker::TextChunker;
use crate::services::limiters::Limiters;

/// C9. PDF → sections → chunks → embeddings → vector store, per §4.8.
/// Grounded on `services/document_service.rs::process_upload`'s
/// parse-then-chunk-then-batch-embed-then-insert shape, with the
/// teacher's silent zero-vector fallback on embedding failure
/// (`process_document_background`) deliberately dropped: a partially
/// embedded file must end `error`, never `indexed` (§3's chunk
/// invariant), so any batch failure triggers full rollback instead.
pub struct IndexingPipeline {
    repository: Arc<dyn ChatRepository>,
    embedder: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    limiters: Arc<Limiters>,
    logger: ActivityLogger,
    window: usize,
    overlap: usize,
    batch_size: usize,
    /// At most one active pipeline per `fid` — a per-fid async mutex map.
    file_locks: DashMap<FileId, Arc<AsyncMutex<()>>>,
}

impl IndexingPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repository: Arc<dyn ChatRepository>,
        embedder: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
        limiters: Arc<Limiters>,
        logger: ActivityLogger,
        rag_config: &RagConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            repository,
            embedder,
            vector_store,
            limiters,
            logger,
            window: rag_config.chunk_size,
            overlap: rag_config.chunk_overlap,
            batch_size: batch_size.max(1),
            file_locks: DashMap::new(),
        }
    }

    fn log_stage(&self, fid: FileId, message: impl Into<String>) {
        self.logger.log(
            ActivityEvent::builder(ActivityKind::IndexingStage)
                .fid(fid)
                .message(message)
                .build(),
        );
    }

    fn lock_for(&self, fid: FileId) -> Arc<AsyncMutex<()>> {
        self.file_locks.entry(fid).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    /// Runs the full pipeline for a `ready` file. Bounded by the shared
    /// indexing semaphore (default pool size 2, §5) so at most that many
    /// files index concurrently; per-`fid` locking additionally forbids
    /// two concurrent runs on the *same* file.
    pub async fn run(&self, fid: FileId) -> Result<(), AppError> {
        let (_permit, waited) =
            Limiters::acquire_timed(self.limiters.indexing.clone(), self.limiters.acquire_timeout).await?;
        if waited.as_millis() > 50 {
            info!(fid, waited_ms = waited.as_millis(), "waited for indexing pool slot");
        }

        let lock = self.lock_for(fid);
        let _guard = lock.lock().await;

        match self.run_locked(fid).await {
            Ok(total) => {
                self.repository
                    .update_file_status(fid, "indexed", None, Some(total as i64))
                    .await?;
                self.log_stage(fid, format!("indexed, total_chunks={total}"));
                info!(fid, total_chunks = total, "file indexed");
                Ok(())
            }
            Err(e) => {
                warn!(fid, error = %e, "indexing failed, rolling back");
                let _ = self.vector_store.delete_by_file(fid).await;
                let _ = self
                    .repository
                    .update_file_status(fid, "error", Some(&e.to_string()), Some(0))
                    .await;
                self.log_stage(fid, format!("error: {e}"));
                Err(e)
            }
        }
    }

    async fn run_locked(&self, fid: FileId) -> Result<usize, AppError> {
        self.repository.update_file_status(fid, "processing", None, None).await?;
        self.log_stage(fid, "processing started");

        // Explicit reindex = delete chunks + re-run (§4.8 step 6, Open
        // Question #2): drop any chunks from a prior successful run before
        // emitting new ones, so a re-index that produces fewer chunks than
        // the last run can't leave stale trailing `chunk_index` rows behind.
        self.vector_store.delete_by_file(fid).await?;

        let sections = self.repository.list_sections(fid).await?;
        let chunker = TextChunker::new(self.window, self.overlap);

        // Emit (text, page_number) pairs in section order; chunk_index is
        // assigned globally across the whole file, not per-section.
        let mut pending: Vec<(String, Option<i32>)> = Vec::new();
        for section in &sections {
            let page_number = section.page_range.map(|(start, _)| start);
            for piece in chunker.chunk(&section.text) {
                pending.push((piece.content, page_number));
            }
        }

        let mut total = 0usize;
        let mut next_index = 0i64;

        for batch in pending.chunks(self.batch_size) {
            // Cancellation barrier: observe a mid-run deletion between
            // batches and stop without writing further chunks.
            if self.repository.get_file(fid).await.is_err() {
                return Err(AppError::NotFound(format!("file {fid} deleted mid-index")));
            }

            let texts: Vec<String> = batch.iter().map(|(text, _)| text.clone()).collect();
            let embeddings = self.embedder.embed_many(&texts).await?;

            let chunks: Vec<Chunk> = batch
                .iter()
                .zip(embeddings.into_iter())
                .map(|((text, page_number), embedding)| {
                    let chunk = Chunk {
                        fid,
                        chunk_index: next_index,
                        text: text.clone(),
                        embedding,
                        page_number: *page_number,
                        section_type: None,
                        file_name: None,
                    };
                    next_index += 1;
                    chunk
                })
                .collect();

            let inserted = self.vector_store.upsert_chunks(fid, &chunks).await?;
            total += inserted;
        }

        Ok(total)
    }

    pub fn evict_file(&self, fid: FileId) {
        self.file_locks.remove(&fid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{FileDocument, FileSection, FileStatus, Message, Role, Session};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FakeRepo {
        file: Mutex<FileDocument>,
        sections: Vec<FileSection>,
        deleted: Mutex<bool>,
    }

    #[async_trait]
    impl ChatRepository for FakeRepo {
        async fn create_session(&self, _owner: &str, _title: &str) -> Result<Session, AppError> {
            unimplemented!()
        }
        async fn get_session(&self, _sid: &str) -> Result<Session, AppError> {
            unimplemented!()
        }
        async fn delete_session(&self, _sid: &str) -> Result<bool, AppError> {
            unimplemented!()
        }
        async fn add_message(&self, _sid: &str, _role: Role, _content: &str) -> Result<Message, AppError> {
            unimplemented!()
        }
        async fn list_messages(&self, _sid: &str) -> Result<Vec<Message>, AppError> {
            unimplemented!()
        }
        async fn create_file(&self, _filename: &str, _path: &str) -> Result<FileDocument, AppError> {
            unimplemented!()
        }
        async fn list_files(&self) -> Result<Vec<FileDocument>, AppError> {
            unimplemented!()
        }
        async fn get_file(&self, _fid: FileId) -> Result<FileDocument, AppError> {
            if *self.deleted.lock().unwrap() {
                return Err(AppError::NotFound("gone".into()));
            }
            Ok(self.file.lock().unwrap().clone())
        }
        async fn update_file_status(
            &self,
            _fid: FileId,
            status: &str,
            error: Option<&str>,
            total_chunks: Option<i64>,
        ) -> Result<(), AppError> {
            let mut file = self.file.lock().unwrap();
            file.status = FileStatus::from_str(status).unwrap_or(FileStatus::Error);
            file.error_message = error.map(|s| s.to_string());
            if let Some(tc) = total_chunks {
                file.total_chunks = tc;
            }
            Ok(())
        }
        async fn list_sections(&self, _fid: FileId) -> Result<Vec<FileSection>, AppError> {
            Ok(self.sections.clone())
        }
    }

    struct FakeEmbedder {
        fail_on_batch: Option<usize>,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        async fn embed_one(&self, _text: &str) -> Result<Vec<f32>, AppError> {
            Ok(vec![0.0; 768])
        }
        async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
            let call = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if Some(call) == self.fail_on_batch {
                return Err(AppError::EmbeddingUnavailable("simulated failure".into()));
            }
            Ok(texts.iter().map(|_| vec![0.1f32; 768]).collect())
        }
    }

    #[derive(Default)]
    struct FakeVectorStore {
        chunks: Mutex<Vec<Chunk>>,
    }

    #[async_trait]
    impl VectorStore for FakeVectorStore {
        async fn upsert_chunks(&self, _fid: FileId, chunks: &[Chunk]) -> Result<usize, AppError> {
            self.chunks.lock().unwrap().extend(chunks.iter().cloned());
            Ok(chunks.len())
        }
        async fn search(&self, _fid: Option<FileId>, _q: &[f32], _k: usize) -> Result<Vec<(Chunk, f32)>, AppError> {
            Ok(Vec::new())
        }
        async fn delete_by_file(&self, _fid: FileId) -> Result<usize, AppError> {
            let mut chunks = self.chunks.lock().unwrap();
            let n = chunks.len();
            chunks.clear();
            Ok(n)
        }
        async fn count_chunks(&self, _fid: Option<FileId>) -> Result<i64, AppError> {
            Ok(self.chunks.lock().unwrap().len() as i64)
        }
    }

    fn test_logger() -> ActivityLogger {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/indexing_pipeline_test")
            .expect("lazy pool construction never connects eagerly");
        ActivityLogger::new(pool, Default::default())
    }

    fn chunk(idx: i64) -> Chunk {
        Chunk {
            fid: 1,
            chunk_index: idx,
            text: format!("stale chunk {idx}"),
            embedding: vec![0.0; 768],
            page_number: None,
            section_type: None,
            file_name: None,
        }
    }

    fn rag_config() -> RagConfig {
        RagConfig {
            top_k: 10,
            ctx_chars: 12_000,
            chunk_size: 20,
            chunk_overlap: 5,
            max_history_messages: 5,
        }
    }

    fn test_file() -> FileDocument {
        FileDocument {
            fid: 1,
            filename: "doc.pdf".to_string(),
            path: "/tmp/doc.pdf".to_string(),
            status: FileStatus::Ready,
            total_chunks: 0,
            error_message: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn successful_run_marks_file_indexed() {
        let repo: Arc<dyn ChatRepository> = Arc::new(FakeRepo {
            file: Mutex::new(test_file()),
            sections: vec![FileSection {
                fid: 1,
                section_index: 0,
                page_range: Some((1, 1)),
                text: "a".repeat(100),
            }],
            deleted: Mutex::new(false),
        });
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::new(FakeEmbedder { fail_on_batch: None, calls: Default::default() });
        let store: Arc<dyn VectorStore> = Arc::new(FakeVectorStore::default());
        let limiters = Arc::new(Limiters::new(2, 2, Duration::from_secs(5)));

        let pipeline =
            IndexingPipeline::new(repo.clone(), embedder, store.clone(), limiters, test_logger(), &rag_config(), 4);
        pipeline.run(1).await.unwrap();

        assert_eq!(store.count_chunks(Some(1)).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn reindex_deletes_prior_chunks_before_reinserting() {
        let repo: Arc<dyn ChatRepository> = Arc::new(FakeRepo {
            file: Mutex::new(test_file()),
            sections: vec![FileSection {
                fid: 1,
                section_index: 0,
                page_range: None,
                // Short enough to produce a single chunk this run.
                text: "c".repeat(20),
            }],
            deleted: Mutex::new(false),
        });
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::new(FakeEmbedder { fail_on_batch: None, calls: Default::default() });
        let store: Arc<dyn VectorStore> = Arc::new(FakeVectorStore::default());

        // Seed the store as if a prior, larger run had already indexed this
        // file with 10 chunks.
        let prior_chunks: Vec<Chunk> = (0..10).map(chunk).collect();
        store.upsert_chunks(1, &prior_chunks).await.unwrap();
        assert_eq!(store.count_chunks(Some(1)).await.unwrap(), 10);

        let limiters = Arc::new(Limiters::new(2, 2, Duration::from_secs(5)));
        let pipeline = IndexingPipeline::new(repo, embedder, store.clone(), limiters, test_logger(), &rag_config(), 4);
        pipeline.run(1).await.unwrap();

        // Only this run's single chunk remains — no stale trailing rows
        // from the larger prior run survive the reindex.
        assert_eq!(store.count_chunks(Some(1)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failure_mid_run_rolls_back_and_marks_error() {
        let repo: Arc<dyn ChatRepository> = Arc::new(FakeRepo {
            file: Mutex::new(test_file()),
            sections: vec![FileSection {
                fid: 1,
                section_index: 0,
                page_range: None,
                text: "b".repeat(200),
            }],
            deleted: Mutex::new(false),
        });
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::new(FakeEmbedder { fail_on_batch: Some(1), calls: Default::default() });
        let store: Arc<dyn VectorStore> = Arc::new(FakeVectorStore::default());
        let limiters = Arc::new(Limiters::new(2, 2, Duration::from_secs(5)));

        let pipeline = IndexingPipeline::new(repo, embedder, store.clone(), limiters, test_logger(), &rag_config(), 4);
        let result = pipeline.run(1).await;

        assert!(result.is_err());
        assert_eq!(store.count_chunks(Some(1)).await.unwrap(), 0);
    }
}
