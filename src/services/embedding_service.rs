use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::domain::error::AppError;
use crate::domain::ports::EmbeddingProvider;

use super::limiters::Limiters;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

/// C4 adapter. Batches `embed_many` into groups of `batch_size`, runs each
/// group's requests concurrently, and bounds total in-flight embedding
/// calls with a semaphore sized to protect the upstream quota — same shape
/// as `services/embedding_service.rs` in the teacher.
pub struct HttpEmbeddingService {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
    batch_size: usize,
    cache: DashMap<String, Vec<f32>>,
    limiters: Arc<Limiters>,
}

impl HttpEmbeddingService {
    pub fn new(config: &EmbeddingConfig, limiters: Arc<Limiters>) -> Self {
        let mut builder = Client::builder().timeout(Duration::from_secs(config.timeout_seconds));
        if let Some(key) = &config.api_key {
            let mut headers = reqwest::header::HeaderMap::new();
            if let Ok(value) = reqwest::header::HeaderValue::from_str(&format!("Bearer {key}")) {
                headers.insert(reqwest::header::AUTHORIZATION, value);
            }
            builder = builder.default_headers(headers);
        }

        Self {
            client: builder.build().expect("failed to build embedding http client"),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            dimension: config.dimension,
            batch_size: config.batch_size.max(1),
            cache: DashMap::new(),
            limiters,
        }
    }

    async fn embed_uncached(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let (_permit, waited) =
            Limiters::acquire_timed(self.limiters.embedding.clone(), self.limiters.acquire_timeout).await?;
        if waited > Duration::from_millis(50) {
            debug!(waited_ms = waited.as_millis(), "waited for embedding permit");
        }

        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .json(&EmbeddingRequest { input: text, model: &self.model })
            .send()
            .await
            .map_err(|e| AppError::EmbeddingUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::EmbeddingUnavailable(format!("{status}: {body}")));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AppError::EmbeddingUnavailable(e.to_string()))?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| AppError::EmbeddingUnavailable("empty embedding response".to_string()))?
            .embedding;

        if embedding.len() != self.dimension {
            warn!(expected = self.dimension, actual = embedding.len(), "embedding dimension mismatch");
            return Err(AppError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        Ok(embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingService {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, AppError> {
        if let Some(cached) = self.cache.get(text) {
            return Ok(cached.clone());
        }

        let embedding = self.embed_uncached(text).await?;
        self.cache.insert(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let mut results = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let futures = batch.iter().map(|text| self.embed_one(text));
            let batch_results = futures::future::join_all(futures).await;

            for result in batch_results {
                results.push(result?);
            }
        }

        Ok(results)
    }
}
