use crate::services::traits::{CompletionService, EmbeddingService, StructuredPrompt, UpstreamError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// OpenAI-compatible API client
///
/// Serves both external collaborators of the pipeline:
/// - strict JSON-schema chat completions for profile extraction
/// - text embeddings for greenflag matching
///
/// Every request is bounded by the client-wide timeout.
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    extraction_model: String,
    embedding_model: String,
    embedding_dimensions: usize,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

fn classify(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout
    } else {
        UpstreamError::RequestError(err)
    }
}

impl OpenAiClient {
    pub fn new(
        base_url: String,
        api_key: String,
        extraction_model: String,
        embedding_model: String,
        embedding_dimensions: usize,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url,
            api_key,
            extraction_model,
            embedding_model,
            embedding_dimensions,
            client,
        })
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, UpstreamError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(classify)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read body".to_string());
            return Err(UpstreamError::ApiError { status, body });
        }

        response.json().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout
            } else {
                UpstreamError::InvalidResponse(e.to_string())
            }
        })
    }
}

#[async_trait]
impl CompletionService for OpenAiClient {
    async fn complete_json(&self, prompt: &StructuredPrompt) -> Result<String, UpstreamError> {
        let request = json!({
            "model": self.extraction_model,
            "temperature": 0,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": prompt.schema_name,
                    "strict": true,
                    "schema": prompt.schema,
                },
            },
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user },
            ],
        });

        tracing::debug!(model = %self.extraction_model, "Structured completion request");

        let response: ChatResponse = self.post_json("chat/completions", &request).await?;

        let message = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| UpstreamError::InvalidResponse("No choices in response".into()))?;

        if let Some(refusal) = message.refusal {
            return Err(UpstreamError::InvalidResponse(format!("Model refused: {}", refusal)));
        }

        message
            .content
            .ok_or_else(|| UpstreamError::InvalidResponse("No content in response".into()))
    }
}

#[async_trait]
impl EmbeddingService for OpenAiClient {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, UpstreamError> {
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: text,
            dimensions: self.embedding_dimensions,
        };

        tracing::debug!(model = %self.embedding_model, chars = text.len(), "Embedding request");

        let response: EmbeddingResponse = self.post_json("embeddings", &request).await?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| UpstreamError::InvalidResponse("No embedding in response".into()))
    }
}
