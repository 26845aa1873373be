use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::config::{LlmAdapterConfig, RagConfig};
use crate::domain::error::AppError;
use crate::domain::models::{Chunk, FileId, Role, SessionId, UserId};
use crate::domain::ports::{
    ChatMessage, ChatRepository, EmbeddingProvider, Guardian, LlmOpts, LlmProvider, VectorStore,
    WebSearchTool,
};
use crate::logging::{ActivityEvent, ActivityKind, ActivityLogger};

use super::prompt_cache::{estimate_tokens, PromptCache};
use super::roles::{self, RoleDescriptor};

/// Result of one turn of §4.9's algorithm.
#[derive(Debug, Clone)]
pub struct ChatTurnOutcome {
    pub sid: SessionId,
    pub reply: String,
    /// False iff the assistant-message write failed after a successful
    /// LLM call — the reply is still returned (§7's propagation policy).
    pub assistant_persisted: bool,
}

/// C10. The composition: guardian → session → RAG decision → prompt
/// assembly → LLM selection → persist → return, grounded on
/// `services/conversation/manager.rs`'s struct shape. The
/// planner/verification/deep-scan loop that file layers on top has no
/// counterpart in §4.9's fixed, non-looping turn algorithm and is not
/// carried over.
pub struct ChatService {
    repository: Arc<dyn ChatRepository>,
    vector_store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    llm_primary: Arc<dyn LlmProvider>,
    llm_fallback: Arc<dyn LlmProvider>,
    prompt_cache: Arc<PromptCache>,
    web_search: Arc<dyn WebSearchTool>,
    guardian: Arc<dyn Guardian>,
    logger: ActivityLogger,
    rag: RagConfig,
    primary: LlmAdapterConfig,
    fallback_opts: LlmAdapterConfig,
    turn_deadline: Duration,
    call_counters: DashMap<SessionId, AtomicI64>,
}

impl ChatService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repository: Arc<dyn ChatRepository>,
        vector_store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm_primary: Arc<dyn LlmProvider>,
        llm_fallback: Arc<dyn LlmProvider>,
        prompt_cache: Arc<PromptCache>,
        web_search: Arc<dyn WebSearchTool>,
        guardian: Arc<dyn Guardian>,
        logger: ActivityLogger,
        rag: RagConfig,
        primary: LlmAdapterConfig,
        fallback_opts: LlmAdapterConfig,
        turn_deadline: Duration,
    ) -> Self {
        Self {
            repository,
            vector_store,
            embedder,
            llm_primary,
            llm_fallback,
            prompt_cache,
            web_search,
            guardian,
            logger,
            rag,
            primary,
            fallback_opts,
            turn_deadline,
            call_counters: DashMap::new(),
        }
    }

    #[instrument(skip(self, user_text), fields(agent_role = %agent_role))]
    pub async fn handle_message(
        &self,
        sid_or_new: Option<String>,
        owner: &UserId,
        user_text: &str,
        agent_role: &str,
        fid: Option<FileId>,
    ) -> Result<ChatTurnOutcome, AppError> {
        tokio::time::timeout(self.turn_deadline, self.handle_message_inner(sid_or_new, owner, user_text, agent_role, fid))
            .await
            .map_err(|_| AppError::Timeout)?
    }

    async fn handle_message_inner(
        &self,
        sid_or_new: Option<String>,
        owner: &UserId,
        user_text: &str,
        agent_role: &str,
        fid: Option<FileId>,
    ) -> Result<ChatTurnOutcome, AppError> {
        // 1. Guardian gate — runs before any repository write or LLM call.
        let verdict = self.guardian.evaluate(user_text, None).await;
        if verdict.categories.iter().any(|c| c == "guardian_unavailable") {
            self.logger.log(
                ActivityEvent::builder(ActivityKind::GuardianFailOpen)
                    .message("guardian remote tier unavailable, failed open")
                    .build(),
            );
        }
        if !verdict.allowed {
            self.logger.log(
                ActivityEvent::builder(ActivityKind::GuardianBlocked)
                    .message(verdict.reason.clone().unwrap_or_default())
                    .build(),
            );
            return Err(AppError::MessageBlocked(verdict));
        }

        // 2. Session resolve.
        let session = match sid_or_new {
            None => self.repository.create_session(owner, &derive_title(user_text)).await?,
            Some(sid) => self.repository.get_session(&sid).await?,
        };
        let sid = session.sid.clone();

        // 3. Persist user message — failures here fail the turn before any LLM call.
        self.repository.add_message(&sid, Role::User, user_text).await?;

        // 4. RAG decision.
        let rag_block = match fid {
            Some(fid) => match self.repository.get_file(fid).await {
                Ok(file) if file.is_rag_eligible() => {
                    let qvec = self.embedder.embed_one(user_text).await?;
                    let results = self.vector_store.search(Some(fid), &qvec, self.rag.top_k).await?;
                    build_rag_context(&results, self.rag.ctx_chars).map(|text| (fid, text))
                }
                Ok(_) => None,
                Err(AppError::NotFound(_)) => None,
                Err(other) => return Err(other),
            },
            None => None,
        };

        // 5. Web-search decision, independent of RAG.
        let web_block = if self.web_search.should_search(user_text) {
            let results = self.web_search.search(user_text, 3).await;
            build_web_context(&results)
        } else {
            None
        };

        let role = roles::lookup(agent_role);
        let dynamic_context = rag_block.is_some() || web_block.is_some();

        // 6. Prompt assembly.
        let (system_prompt, use_cache, was_cached) = if dynamic_context {
            let prompt = assemble_dynamic_prompt(role, &rag_block, &web_block);
            (prompt, false, false)
        } else {
            let selection = self.prompt_cache.resolve(&sid, agent_role, role.full_prompt, role.reference_prompt);
            let was_cached = selection.was_cached;
            (selection.text, true, was_cached)
        };

        // 7. Message history.
        let mut history = self.repository.list_messages(&sid).await?;
        if use_cache {
            let keep = self.rag.max_history_messages;
            if history.len() > keep {
                history = history.split_off(history.len() - keep);
            }
        }

        let system_tokens = estimate_tokens(&system_prompt);
        let history_tokens: i64 = history.iter().map(|m| estimate_tokens(&m.content)).sum();
        let user_tokens = estimate_tokens(user_text);
        let estimated_total = system_tokens + history_tokens + user_tokens;

        // 8. LLM selection.
        let use_fallback = dynamic_context || estimated_total > self.primary.context_token_budget as i64;

        let chat_messages: Vec<ChatMessage> =
            history.iter().map(|m| ChatMessage { role: m.role, content: m.content.clone() }).collect();

        let opts = LlmOpts {
            max_output_tokens: if use_fallback { self.fallback_opts.max_output_tokens } else { self.primary.max_output_tokens },
            temperature: if use_fallback { self.fallback_opts.temperature } else { self.primary.temperature },
            use_cache,
        };

        // 9. Call, with one retry on the fallback if the primary fails.
        let (reply, _report) = if use_fallback {
            self.llm_fallback
                .chat_completion(&system_prompt, &chat_messages, &opts)
                .await
                .map_err(|_| AppError::LLMExhausted)?
        } else {
            match self.llm_primary.chat_completion(&system_prompt, &chat_messages, &opts).await {
                Ok(result) => result,
                Err(AppError::LLMUnavailable(reason)) => {
                    warn!(sid = %sid, reason = %reason, "primary LLM failed, retrying with fallback");
                    let fallback_opts = LlmOpts { use_cache: false, ..opts };
                    self.llm_fallback
                        .chat_completion(&system_prompt, &chat_messages, &fallback_opts)
                        .await
                        .map_err(|_| AppError::LLMExhausted)?
                }
                Err(other) => return Err(other),
            }
        };

        // 10. Persist assistant message; a write failure here is logged, not fatal.
        let assistant_persisted = match self.repository.add_message(&sid, Role::Assistant, &reply).await {
            Ok(_) => true,
            Err(e) => {
                warn!(sid = %sid, error = %e, "failed to persist assistant message");
                false
            }
        };

        let call_index = self
            .call_counters
            .entry(sid.clone())
            .or_insert_with(|| AtomicI64::new(0))
            .fetch_add(1, Ordering::SeqCst);

        self.logger.log(
            ActivityEvent::builder(ActivityKind::TurnCompleted)
                .sid(sid.clone())
                .tokens(system_tokens, history_tokens, user_tokens)
                .was_cached(was_cached)
                .message(format!("call_index={call_index}"))
                .build(),
        );

        info!(sid = %sid, used_fallback = use_fallback, dynamic_context, "turn completed");

        // 11. Return.
        Ok(ChatTurnOutcome { sid, reply, assistant_persisted })
    }

    pub fn evict_session(&self, sid: &str) {
        self.prompt_cache.evict_session(sid);
        self.call_counters.remove(sid);
    }
}

fn derive_title(user_text: &str) -> String {
    let trimmed = user_text.trim();
    if trimmed.is_empty() {
        return "New session".to_string();
    }
    let truncated: String = trimmed.chars().take(60).collect();
    truncated
}

/// Builds the RAG excerpt block: `[chunk <idx>, similarity=<1-d>]` per
/// hit, concatenated in ascending-distance order and cut to `budget`
/// characters. The budget is enforced by truncating the last chunk that
/// would overflow it rather than dropping it outright — "never breaking
/// mid-chunk except to enforce the budget" (§4.9 step 4).
fn build_rag_context(results: &[(Chunk, f32)], budget: usize) -> Option<String> {
    if results.is_empty() {
        return None;
    }

    let mut out = String::new();
    let mut out_len = 0usize;

    for (chunk, distance) in results {
        let similarity = 1.0 - distance;
        let piece = format!("[chunk {}, similarity={:.4}]\n{}\n\n", chunk.chunk_index, similarity, chunk.text);
        let piece_len = piece.chars().count();

        if out_len + piece_len > budget {
            let remaining = budget.saturating_sub(out_len);
            if remaining > 0 {
                out.extend(piece.chars().take(remaining));
            }
            break;
        }

        out.push_str(&piece);
        out_len += piece_len;
    }

    if out.trim().is_empty() {
        None
    } else {
        Some(out)
    }
}

fn build_web_context(results: &[crate::domain::models::WebResult]) -> Option<String> {
    if results.is_empty() {
        return None;
    }

    let mut out = String::new();
    for (i, result) in results.iter().enumerate() {
        out.push_str(&format!("[{}] {} ({}): {}\n", i + 1, result.title, result.url, result.snippet));
    }
    Some(out)
}

fn assemble_dynamic_prompt(
    role: &RoleDescriptor,
    rag_block: &Option<(FileId, String)>,
    web_block: &Option<String>,
) -> String {
    let mut prompt = String::from(role.full_prompt);

    if let Some((fid, block)) = rag_block {
        prompt.push_str(&format!("\n\n--- EXCERPT (fid={fid}) ---\n{block}--- END ---"));
    }

    if let Some(block) = web_block {
        prompt.push_str(&format!("\n\n--- EXCERPT (web) ---\n{block}--- END ---"));
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{FileId as Fid, ThreatLevel};

    fn chunk(idx: i64, text: &str) -> Chunk {
        Chunk {
            fid: 1 as Fid,
            chunk_index: idx,
            text: text.to_string(),
            embedding: vec![0.0; 768],
            page_number: None,
            section_type: None,
            file_name: None,
        }
    }

    #[test]
    fn rag_context_includes_similarity_and_index() {
        let results = vec![(chunk(0, "first chunk"), 0.1), (chunk(1, "second chunk"), 0.2)];
        let block = build_rag_context(&results, 10_000).unwrap();
        assert!(block.contains("[chunk 0, similarity=0.9000]"));
        assert!(block.contains("first chunk"));
        assert!(block.contains("[chunk 1, similarity=0.8000]"));
    }

    #[test]
    fn rag_context_empty_results_degrades_to_none() {
        assert!(build_rag_context(&[], 10_000).is_none());
    }

    #[test]
    fn rag_context_respects_character_budget() {
        let results = vec![(chunk(0, &"a".repeat(100)), 0.0), (chunk(1, &"b".repeat(100)), 0.0)];
        let block = build_rag_context(&results, 50).unwrap();
        assert_eq!(block.chars().count(), 50);
    }

    #[test]
    fn dynamic_prompt_contains_fid_delimiter() {
        let role = RoleDescriptor { name: "architect", full_prompt: "FULL", reference_prompt: "REF" };
        let rag = Some((2 as Fid, "excerpt text".to_string()));
        let prompt = assemble_dynamic_prompt(&role, &rag, &None);
        assert!(prompt.contains("--- EXCERPT (fid=2) ---"));
        assert!(prompt.contains("excerpt text"));
    }

    #[test]
    fn guardian_verdict_categories_flag_fail_open() {
        let verdict = crate::domain::models::GuardianVerdict {
            allowed: true,
            reason: None,
            threat_level: ThreatLevel::None,
            categories: vec!["guardian_unavailable".to_string()],
        };
        assert!(verdict.categories.iter().any(|c| c == "guardian_unavailable"));
    }
}
