// Core pipeline exports
pub mod dedup;
pub mod embedding;
pub mod extraction;
pub mod matcher;
pub mod merge;
pub mod pipeline;
pub mod similarity;

pub use dedup::{Admission, AdmissionGuard, EventDeduplicator};
pub use embedding::{EmbeddingError, EmbeddingGenerator};
pub use extraction::{parse_extraction, profile_schema, ExtractionError, ProfileExtractor};
pub use matcher::{MatchOutcome, Matcher, DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_TOP_K};
pub use merge::{is_complete, merge, MergePolicy};
pub use pipeline::{AppliedUpdate, ProcessOutcome, ProfileChangeOutcome, ProfileSync};
pub use similarity::cosine_similarity;
