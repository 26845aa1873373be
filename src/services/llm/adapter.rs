use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmAdapterConfig;
use crate::domain::error::AppError;
use crate::domain::ports::{ChatMessage, LlmOpts, LlmProvider, TokenReport};

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ChatCompletionChoice {
    message: WireReply,
}

#[derive(Deserialize)]
struct WireReply {
    content: String,
}

#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: i64,
    #[serde(default)]
    completion_tokens: i64,
}

/// C5 adapter. `Primary` and `Fallback` in `services::orchestrator` are
/// each just an `Arc<HttpLlmAdapter>` built from a different
/// `LlmAdapterConfig` — one port, two configurations, as §4.4 specifies.
/// Non-streaming: `stream: bool` is always sent as `false` since
/// token-by-token delivery is a non-goal.
pub struct HttpLlmAdapter {
    client: Client,
    base_url: String,
}

impl HttpLlmAdapter {
    pub fn new(config: &LlmAdapterConfig) -> Self {
        let mut builder = Client::builder().timeout(Duration::from_secs(config.timeout_seconds));
        if let Some(key) = &config.api_key {
            let mut headers = reqwest::header::HeaderMap::new();
            if let Ok(value) = reqwest::header::HeaderValue::from_str(&format!("Bearer {key}")) {
                headers.insert(reqwest::header::AUTHORIZATION, value);
            }
            builder = builder.default_headers(headers);
        }

        Self {
            client: builder.build().expect("failed to build llm http client"),
            base_url: config.base_url.clone(),
        }
    }
}

#[async_trait]
impl LlmProvider for HttpLlmAdapter {
    async fn chat_completion(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
        opts: &LlmOpts,
    ) -> Result<(String, TokenReport), AppError> {
        let mut wire_messages = Vec::with_capacity(messages.len() + 1);
        wire_messages.push(WireMessage { role: "system", content: system_prompt });
        for message in messages {
            wire_messages.push(WireMessage { role: message.role.as_str(), content: &message.content });
        }

        let request = ChatCompletionRequest {
            messages: wire_messages,
            max_tokens: opts.max_output_tokens,
            temperature: opts.temperature,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::LLMUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let retriable = status.is_server_error() || status.as_u16() == 429;
            let body = response.text().await.unwrap_or_default();
            if retriable {
                return Err(AppError::LLMUnavailable(format!("{status}: {body}")));
            }
            return Err(AppError::LLMUnavailable(format!("non-retriable {status}: {body}")));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AppError::LLMUnavailable(e.to_string()))?;

        let reply = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::LLMUnavailable("empty completion response".to_string()))?
            .message
            .content;

        let usage = parsed.usage.unwrap_or_default();

        Ok((
            reply,
            TokenReport {
                system_tokens: 0,
                history_tokens: usage.prompt_tokens,
                user_tokens: usage.completion_tokens,
            },
        ))
    }
}
