use async_trait::async_trait;

use super::error::AppError;
use super::models::{
    Chunk, FileDocument, FileId, FileSection, GuardianVerdict, Message, Role, Session, UserId,
    WebResult,
};

/// C2 — persistent sessions/messages/files metadata.
#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn create_session(&self, owner: &UserId, title: &str) -> Result<Session, AppError>;
    async fn get_session(&self, sid: &str) -> Result<Session, AppError>;
    async fn delete_session(&self, sid: &str) -> Result<bool, AppError>;
    async fn add_message(&self, sid: &str, role: Role, content: &str) -> Result<Message, AppError>;
    async fn list_messages(&self, sid: &str) -> Result<Vec<Message>, AppError>;
    async fn create_file(&self, filename: &str, path: &str) -> Result<FileDocument, AppError>;
    async fn list_files(&self) -> Result<Vec<FileDocument>, AppError>;
    async fn get_file(&self, fid: FileId) -> Result<FileDocument, AppError>;
    async fn update_file_status(
        &self,
        fid: FileId,
        status: &str,
        error: Option<&str>,
        total_chunks: Option<i64>,
    ) -> Result<(), AppError>;
    /// Sections produced by the external PDF-extraction collaborator for a
    /// `ready` file, ordered by `section_index`. The indexing pipeline
    /// streams these to build chunks.
    async fn list_sections(&self, fid: FileId) -> Result<Vec<FileSection>, AppError>;
}

/// C3 — chunk storage and top-k cosine-distance search.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert_chunks(&self, fid: FileId, chunks: &[Chunk]) -> Result<usize, AppError>;
    /// Ascending distance; ties broken by lower `chunk_index`.
    async fn search(
        &self,
        fid: Option<FileId>,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<(Chunk, f32)>, AppError>;
    async fn delete_by_file(&self, fid: FileId) -> Result<usize, AppError>;
    async fn count_chunks(&self, fid: Option<FileId>) -> Result<i64, AppError>;
}

/// C4 — text to fixed-dim vector, batched.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, AppError>;
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError>;
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct LlmOpts {
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub use_cache: bool,
}

#[derive(Debug, Clone)]
pub struct TokenReport {
    pub system_tokens: i64,
    pub history_tokens: i64,
    pub user_tokens: i64,
}

/// C5 — chat completion over a message list. Primary and fallback both
/// implement this single port.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat_completion(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
        opts: &LlmOpts,
    ) -> Result<(String, TokenReport), AppError>;
}

/// C7 — domain-whitelisted web query with TTL cache. Never raises to the
/// orchestrator: failures degrade to an empty result set.
#[async_trait]
pub trait WebSearchTool: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Vec<WebResult>;
    fn should_search(&self, user_message: &str) -> bool;
}

/// C8 — heuristic + remote classifier deciding allow/block.
#[async_trait]
pub trait Guardian: Send + Sync {
    async fn evaluate(&self, user_message: &str, context_snippets: Option<&[String]>) -> GuardianVerdict;
}
