use crate::models::Embedding;
use crate::services::traits::{EmbeddingService, UpstreamError};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("no tags to embed")]
    NoTags,

    #[error("embedding service failed: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding service returned a zero or non-finite vector")]
    Degenerate,
}

/// Concatenate tags into the single text unit that gets embedded
pub fn tags_text(tags: &[String]) -> Option<String> {
    let text = tags
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then_some(text)
}

/// Turns greenflags into a fixed-dimension unit-norm vector
#[derive(Clone)]
pub struct EmbeddingGenerator {
    service: Arc<dyn EmbeddingService>,
    dimensions: usize,
}

impl EmbeddingGenerator {
    pub fn new(service: Arc<dyn EmbeddingService>, dimensions: usize) -> Self {
        Self { service, dimensions }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub async fn embed(&self, tags: &[String]) -> Result<Embedding, EmbeddingError> {
        let text = tags_text(tags).ok_or(EmbeddingError::NoTags)?;

        let raw = self.service.embed_text(&text).await?;
        if raw.len() != self.dimensions {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimensions,
                actual: raw.len(),
            });
        }

        Embedding::normalized(raw).ok_or(EmbeddingError::Degenerate)
    }
}
