mod settings;

pub use settings::{
    DatabaseConfig, EmbeddingConfig, GuardianConfig, LimitsConfig, LlmAdapterConfig, RagConfig,
    RateLimitConfig, SecurityConfig, ServerConfig, Settings, WebSearchConfig,
};
