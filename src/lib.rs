//! Lume Intake - call-intake profile service for the Lume dating app
//!
//! Turns voice-agent call transcripts into structured dating profiles and
//! pairs people whose greenflags are semantically close. Every webhook event
//! is processed at most once and every pair is matched at most once.

pub mod config;
pub mod core;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use core::{Matcher, MergePolicy, ProcessOutcome, ProfileSync};
pub use error::ServiceError;
pub use models::{ContactId, ContactPair, Embedding, MatchRecord, Profile, ProfileFields};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let pair = ContactPair::new(
            ContactId::parse("+2").unwrap(),
            ContactId::parse("+1").unwrap(),
        )
        .unwrap();
        assert_eq!(pair.low().as_str(), "+1");
        assert_eq!(Matcher::default().top_k(), 2);
    }
}
