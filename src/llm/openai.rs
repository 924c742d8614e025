//! OpenAI-compatible HTTP adapter.
//!
//! One client serves both seams: chat completions for [`GenerativeModel`]
//! and `/v1/embeddings` for [`EmbeddingProvider`]. Works against any server
//! speaking the OpenAI wire shape (LM Studio, llama.cpp server, vLLM, or the
//! hosted API). HTTP-level failures map to the transient error variants so
//! the engine's retry policy applies.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::errors::RagError;
use crate::embedding::EmbeddingProvider;

use super::provider::GenerativeModel;
use super::types::ChatRequest;

#[derive(Clone)]
pub struct OpenAiCompatClient {
    base_url: String,
    api_key: Option<String>,
    chat_model: String,
    embedding_model: String,
    embedding_dimensions: usize,
    client: Client,
}

impl OpenAiCompatClient {
    pub fn new(
        base_url: impl Into<String>,
        chat_model: impl Into<String>,
        embedding_model: impl Into<String>,
        embedding_dimensions: usize,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            chat_model: chat_model.into(),
            embedding_model: embedding_model.into(),
            embedding_dimensions,
            client: Client::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn request(&self, url: &str, body: &Value) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(url).json(body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }
}

#[async_trait]
impl GenerativeModel for OpenAiCompatClient {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, RagError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut body = json!({
            "model": self.chat_model,
            "messages": request.messages,
            "stream": false,
        });
        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = request.max_tokens {
                obj.insert("max_tokens".to_string(), json!(t));
            }
            if let Some(s) = request.stop {
                obj.insert("stop".to_string(), json!(s));
            }
        }

        let res = self
            .request(&url, &body)
            .send()
            .await
            .map_err(|e| RagError::GenerationFailed(format!("request failed: {e}")))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::GenerationFailed(format!(
                "chat completion returned {status}: {text}"
            )));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| RagError::GenerationFailed(format!("bad response body: {e}")))?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        if content.is_empty() {
            return Err(RagError::GenerationFailed(
                "completion contained no content".to_string(),
            ));
        }
        Ok(content)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatClient {
    fn model_id(&self) -> &str {
        &self.embedding_model
    }

    fn dimensions(&self) -> usize {
        self.embedding_dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let vectors = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| RagError::EmbeddingUnavailable("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({
            "model": self.embedding_model,
            "input": texts,
        });

        let res = self
            .request(&url, &body)
            .send()
            .await
            .map_err(|e| RagError::EmbeddingUnavailable(format!("request failed: {e}")))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::EmbeddingUnavailable(format!(
                "embeddings returned {status}: {text}"
            )));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| RagError::EmbeddingUnavailable(format!("bad response body: {e}")))?;

        let mut embeddings = Vec::with_capacity(texts.len());
        if let Some(data) = payload["data"].as_array() {
            for item in data {
                if let Some(vals) = item["embedding"].as_array() {
                    let vector: Vec<f32> = vals
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect();
                    embeddings.push(vector);
                }
            }
        }

        if embeddings.len() != texts.len() {
            return Err(RagError::EmbeddingUnavailable(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }
        Ok(embeddings)
    }
}
