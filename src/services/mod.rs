pub mod embedding_service;
pub mod guardian;
pub mod indexing;
pub mod limiters;
pub mod llm;
pub mod orchestrator;
pub mod prompt_cache;
pub mod roles;
pub mod web_search;

pub use embedding_service::HttpEmbeddingService;
pub use guardian::TwoTierGuardian;
pub use limiters::Limiters;
pub use orchestrator::{ChatService, ChatTurnOutcome};
pub use prompt_cache::PromptCache;
pub use web_search::HttpWebSearchTool;
