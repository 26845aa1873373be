use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// A single frozen configuration value built once from the environment at
/// boot. No runtime mutation — per §9's "dynamic configuration objects"
/// redesign guidance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub database: DatabaseConfig,
    pub vector_database: DatabaseConfig,
    pub embedding: EmbeddingConfig,
    pub llm_primary: LlmAdapterConfig,
    pub llm_fallback: LlmAdapterConfig,
    pub rag: RagConfig,
    pub web_search: WebSearchConfig,
    pub guardian: GuardianConfig,
    pub rate_limit: RateLimitConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory uploaded files are written to before the external
    /// extraction collaborator picks them up (§1).
    pub storage_dir: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub jwt_expire_minutes: u64,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_max_size: u32,
    pub pool_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    /// `EMBEDDING_DIM`; must equal 768.
    pub dimension: usize,
    /// `EMBEDDING_BATCH_SIZE`.
    pub batch_size: usize,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmAdapterConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
    pub max_output_tokens: u32,
    pub temperature: f32,
    /// Open Question #1: conservative default token budget that, when
    /// exceeded, forces the orchestrator to pick this adapter. Only
    /// meaningful on `llm_primary`.
    pub context_token_budget: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RagConfig {
    /// `RAG_TOP_K`.
    pub top_k: usize,
    /// `RAG_CTX_CHARS`.
    pub ctx_chars: usize,
    /// `EMBEDDING_CHUNK_SIZE`.
    pub chunk_size: usize,
    /// `EMBEDDING_CHUNK_OVERLAP`.
    pub chunk_overlap: usize,
    /// `MAX_HISTORY_MESSAGES`.
    pub max_history_messages: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebSearchConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub allowed_domains: Vec<String>,
    pub ttl_seconds: u64,
    pub rate_limit_per_minute: u32,
    pub max_results: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuardianConfig {
    pub enabled: bool,
    pub remote_base_url: Option<String>,
    pub remote_api_key: Option<String>,
    pub remote_rate_limit_per_minute: u32,
    pub cache_ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    pub register_per_hour: u32,
    pub login_per_minute: u32,
    pub chat_per_minute: u32,
    pub index_per_minute: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    pub max_connections: usize,
    pub embedding_concurrency: usize,
    pub indexing_pool_size: usize,
    pub turn_deadline_seconds: u64,
}

impl Settings {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let settings = Config::builder()
            .add_source(File::with_name("config/settings").required(false))
            .add_source(Environment::with_prefix("APP").separator("__").try_parsing(true))
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }
}
