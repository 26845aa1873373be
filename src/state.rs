use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;

use crate::config::Settings;
use crate::database::{DbPool, PgChatRepository};
use crate::domain::ports::{ChatRepository, EmbeddingProvider};
use crate::logging::ActivityLogger;
use crate::security::{AuthService, RateLimiter, UserStore};
use crate::services::indexing::IndexingPipeline;
use crate::services::llm::HttpLlmAdapter;
use crate::services::{ChatService, HttpEmbeddingService, HttpWebSearchTool, Limiters, PromptCache, TwoTierGuardian};
use crate::vector::PgVectorStore;

/// Application state shared across handlers, mirroring the teacher's
/// `state.rs::AppState` composition — one `Arc` per long-lived service,
/// cloned cheaply per request.
#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub repository: Arc<dyn ChatRepository>,
    pub vector_store: Arc<PgVectorStore>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub chat_service: Arc<ChatService>,
    pub indexing_pipeline: Arc<IndexingPipeline>,
    pub users: Arc<UserStore>,
    pub auth_service: Arc<AuthService>,
    pub logger: ActivityLogger,
    pub rate_limit_register: Arc<RateLimiter>,
    pub rate_limit_login: Arc<RateLimiter>,
    pub rate_limit_chat: Arc<RateLimiter>,
    pub rate_limit_index: Arc<RateLimiter>,
}

impl AppState {
    pub async fn build(settings: Settings) -> anyhow::Result<Self> {
        let chat_pool = DbPool::new(&settings.database).await?;
        let vector_pool = DbPool::new(&settings.vector_database).await?;

        let repository = Arc::new(PgChatRepository::new(chat_pool.clone()));
        repository.ensure_schema().await?;

        let vector_store = Arc::new(PgVectorStore::new(vector_pool));
        vector_store.ensure_schema().await?;

        let users = Arc::new(UserStore::new(chat_pool.clone()));
        users.ensure_schema().await?;

        let logger = ActivityLogger::new(chat_pool.get_pool().clone(), Default::default());
        crate::logging::ensure_schema(chat_pool.get_pool()).await?;

        let limiters = Arc::new(Limiters::new(
            settings.limits.embedding_concurrency,
            settings.limits.indexing_pool_size,
            Duration::from_secs(5),
        ));

        let embedder = Arc::new(HttpEmbeddingService::new(&settings.embedding, limiters.clone()));
        let llm_primary = Arc::new(HttpLlmAdapter::new(&settings.llm_primary));
        let llm_fallback = Arc::new(HttpLlmAdapter::new(&settings.llm_fallback));
        let web_search = Arc::new(HttpWebSearchTool::new(&settings.web_search));
        let guardian = Arc::new(TwoTierGuardian::new(&settings.guardian));
        let prompt_cache = Arc::new(PromptCache::new());

        let chat_service = Arc::new(ChatService::new(
            repository.clone() as Arc<dyn ChatRepository>,
            vector_store.clone(),
            embedder.clone(),
            llm_primary,
            llm_fallback,
            prompt_cache,
            web_search,
            guardian,
            logger.clone(),
            settings.rag.clone(),
            settings.llm_primary.clone(),
            settings.llm_fallback.clone(),
            Duration::from_secs(settings.limits.turn_deadline_seconds),
        ));

        let indexing_pipeline = Arc::new(IndexingPipeline::new(
            repository.clone() as Arc<dyn ChatRepository>,
            embedder.clone(),
            vector_store.clone(),
            limiters,
            logger.clone(),
            &settings.rag,
            settings.embedding.batch_size,
        ));

        let auth_service = Arc::new(AuthService::new(&settings.security.jwt_secret, settings.security.jwt_expire_minutes));

        let rate_limit_register = Arc::new(RateLimiter::new(settings.rate_limit.register_per_hour, Duration::from_secs(3600)));
        let rate_limit_login = Arc::new(RateLimiter::new(settings.rate_limit.login_per_minute, Duration::from_secs(60)));
        let rate_limit_chat = Arc::new(RateLimiter::new(settings.rate_limit.chat_per_minute, Duration::from_secs(60)));
        let rate_limit_index = Arc::new(RateLimiter::new(settings.rate_limit.index_per_minute, Duration::from_secs(60)));

        Ok(Self {
            settings,
            repository: repository as Arc<dyn ChatRepository>,
            vector_store,
            embedder: embedder as Arc<dyn EmbeddingProvider>,
            chat_service,
            indexing_pipeline,
            users,
            auth_service,
            logger,
            rate_limit_register,
            rate_limit_login,
            rate_limit_chat,
            rate_limit_index,
        })
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.auth_service.clone()
    }
}

impl FromRef<AppState> for Arc<ChatService> {
    fn from_ref(state: &AppState) -> Self {
        state.chat_service.clone()
    }
}
