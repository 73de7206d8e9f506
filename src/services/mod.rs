// Service exports
pub mod idempotency;
pub mod memory;
pub mod openai;
pub mod postgres;
pub mod traits;

pub use idempotency::{IdempotencyKey, MemoryIdempotencyStore, RedisIdempotencyStore};
pub use memory::{MemoryMatchStore, MemoryProfileStore};
pub use openai::OpenAiClient;
pub use postgres::PostgresClient;
pub use traits::{
    CompletionService, EmbeddingService, IdempotencyError, IdempotencyStore, MatchStore,
    ProfileStore, StoreError, StructuredPrompt, UpstreamError,
};
