use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, server-generated session identity.
pub type SessionId = String;
/// Opaque user identity as seen by the orchestration core.
pub type UserId = String;
/// File identity for uploaded documents.
pub type FileId = i64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub sid: SessionId,
    pub owner: UserId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub sid: SessionId,
    pub role: Role,
    pub content: String,
    pub index: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    Processing,
    Ready,
    Indexed,
    Error,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Processing => "processing",
            FileStatus::Ready => "ready",
            FileStatus::Indexed => "indexed",
            FileStatus::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "ready" => Some(Self::Ready),
            "indexed" => Some(Self::Indexed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDocument {
    pub fid: FileId,
    pub filename: String,
    pub path: String,
    pub status: FileStatus,
    pub total_chunks: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileDocument {
    /// Open Question #2: `ready` with chunks already present is treated as
    /// `indexed` for RAG eligibility, without mutating storage.
    pub fn effective_status(&self) -> FileStatus {
        if self.status == FileStatus::Ready && self.total_chunks > 0 {
            FileStatus::Indexed
        } else {
            self.status
        }
    }

    pub fn is_rag_eligible(&self) -> bool {
        self.effective_status() == FileStatus::Indexed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSection {
    pub fid: FileId,
    pub section_index: i64,
    pub page_range: Option<(i32, i32)>,
    pub text: String,
}

/// Fixed embedding dimension. `len(embedding) == EMBEDDING_DIM` is a
/// system-wide invariant enforced by the vector store.
pub const EMBEDDING_DIM: usize = 768;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub fid: FileId,
    pub chunk_index: i64,
    pub text: String,
    pub embedding: Vec<f32>,
    pub page_number: Option<i32>,
    pub section_type: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PromptCacheEntry {
    pub sid: SessionId,
    pub agent_role: String,
    pub first_full_sent: bool,
    pub full_prompt_text: String,
    pub reference_prompt_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenMetrics {
    pub sid: SessionId,
    pub call_index: i64,
    pub system_tokens: i64,
    pub history_tokens: i64,
    pub user_tokens: i64,
    pub was_cached: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatLevel {
    None,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardianVerdict {
    pub allowed: bool,
    pub reason: Option<String>,
    pub threat_level: ThreatLevel,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub score: f32,
    pub source: String,
}
