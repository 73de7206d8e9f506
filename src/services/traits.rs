use crate::models::{
    ContactId, ContactPair, Embedding, MatchInsert, MatchRecord, Profile, ProfilePatch,
    SimilarProfile,
};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the profile and match stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Revision conflict on profile {contact_id}: expected revision {expected}")]
    RevisionConflict { contact_id: String, expected: i64 },

    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

/// Errors raised by the idempotency store
#[derive(Debug, Error)]
pub enum IdempotencyError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),
}

/// Errors raised by the language model and embedding services
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Request timed out")]
    Timeout,

    #[error("API returned error ({status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// Persisted profiles keyed by contact identifier
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, contact_id: &ContactId) -> Result<Option<Profile>, StoreError>;

    /// Apply `patch` in one atomic write, creating the profile when
    /// `patch.expected_revision` is zero.
    ///
    /// Fails with [`StoreError::RevisionConflict`] when the stored revision
    /// moved on (or the profile already exists for a create).
    async fn upsert(&self, contact_id: &ContactId, patch: &ProfilePatch) -> Result<Profile, StoreError>;

    /// Top `limit` profiles by cosine similarity to `embedding`, at or above
    /// `threshold`, best first with ties broken by the smaller identifier
    async fn find_similar(
        &self,
        embedding: &Embedding,
        limit: usize,
        threshold: f64,
    ) -> Result<Vec<SimilarProfile>, StoreError>;

    async fn health_check(&self) -> bool {
        true
    }
}

/// Symmetric match records keyed by unordered contact pair
#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn find(&self, pair: &ContactPair) -> Result<Option<MatchRecord>, StoreError>;

    /// Single atomic insert keyed by the pair. Returns the existing record with
    /// `inserted: false` when one is already there.
    async fn insert_if_absent(&self, pair: &ContactPair, similarity: f64) -> Result<MatchInsert, StoreError>;
}

/// Keyed claims with expiry used to admit each event once
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically claim `key` for `ttl`. `false` if it is already claimed or processed.
    async fn try_claim(&self, key: &str, ttl: Duration) -> Result<bool, IdempotencyError>;

    /// Turn a claim into a long-lived processed mark
    async fn mark_processed(&self, key: &str, ttl: Duration) -> Result<(), IdempotencyError>;

    /// Drop a claim so a redelivery can retry
    async fn release(&self, key: &str) -> Result<(), IdempotencyError>;
}

/// A chat completion constrained to a strict JSON schema
#[derive(Debug, Clone)]
pub struct StructuredPrompt {
    pub system: String,
    pub user: String,
    pub schema_name: String,
    pub schema: serde_json::Value,
}

/// External structured-generation service
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Raw JSON text of the model's answer
    async fn complete_json(&self, prompt: &StructuredPrompt) -> Result<String, UpstreamError>;
}

/// External text embedding service
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, UpstreamError>;
}
