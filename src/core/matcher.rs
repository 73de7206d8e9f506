use crate::models::{ContactId, ContactPair, Embedding, MatchRecord, SimilarProfile};
use crate::services::traits::{MatchStore, ProfileStore, StoreError};
use std::cmp::Ordering;

/// Neighbours fetched per search. The trigger profile is usually one of them.
pub const DEFAULT_TOP_K: usize = 2;

/// Minimum cosine similarity for a match (inclusive)
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;

/// Result of running the matcher for one profile
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    /// Nothing other than the trigger profile cleared the threshold
    NoCandidate,
    /// The best candidate is already paired with the trigger profile
    AlreadyMatched(MatchRecord),
    Created(MatchRecord),
}

impl MatchOutcome {
    pub fn record(&self) -> Option<&MatchRecord> {
        match self {
            MatchOutcome::NoCandidate => None,
            MatchOutcome::AlreadyMatched(record) | MatchOutcome::Created(record) => Some(record),
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, MatchOutcome::Created(_))
    }
}

/// Nearest-neighbour matcher over greenflag embeddings
///
/// # Pipeline Stages
/// 1. Top-K similarity search in the profile store
/// 2. Self-exclusion and threshold filter
/// 3. Best candidate, ties broken by the smaller identifier
/// 4. Insert-if-absent keyed by the unordered pair
#[derive(Debug, Clone)]
pub struct Matcher {
    top_k: usize,
    threshold: f64,
}

impl Matcher {
    pub fn new(top_k: usize, threshold: f64) -> Self {
        Self {
            top_k: top_k.max(1),
            threshold,
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Pick the single match candidate out of a neighbour list
    pub fn select_candidate(
        &self,
        trigger: &ContactId,
        neighbours: Vec<SimilarProfile>,
    ) -> Option<SimilarProfile> {
        neighbours
            .into_iter()
            .filter(|n| &n.contact_id != trigger)
            .filter(|n| n.similarity.is_finite() && n.similarity >= self.threshold)
            .max_by(|a, b| {
                a.similarity
                    .partial_cmp(&b.similarity)
                    .unwrap_or(Ordering::Equal)
                    // max_by keeps the last maximum, so the smaller id must compare greater
                    .then_with(|| b.contact_id.cmp(&a.contact_id))
            })
    }

    /// Find the best partner for `contact` and record the pair once
    pub async fn match_profile(
        &self,
        profiles: &dyn ProfileStore,
        matches: &dyn MatchStore,
        contact: &ContactId,
        embedding: &Embedding,
    ) -> Result<MatchOutcome, StoreError> {
        let neighbours = profiles.find_similar(embedding, self.top_k, self.threshold).await?;
        let total = neighbours.len();

        let Some(candidate) = self.select_candidate(contact, neighbours) else {
            tracing::debug!("No match candidate for {} among {} neighbours", contact, total);
            return Ok(MatchOutcome::NoCandidate);
        };

        let Some(pair) = ContactPair::new(contact.clone(), candidate.contact_id.clone()) else {
            return Ok(MatchOutcome::NoCandidate);
        };

        if let Some(existing) = matches.find(&pair).await? {
            tracing::debug!("{} and {} are already matched", pair.low(), pair.high());
            return Ok(MatchOutcome::AlreadyMatched(existing));
        }

        let insert = matches.insert_if_absent(&pair, candidate.similarity).await?;
        if insert.inserted {
            tracing::info!(
                "Matched {} with {} (similarity {:.3})",
                pair.low(),
                pair.high(),
                candidate.similarity
            );
            Ok(MatchOutcome::Created(insert.record))
        } else {
            Ok(MatchOutcome::AlreadyMatched(insert.record))
        }
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_K, DEFAULT_SIMILARITY_THRESHOLD)
    }
}
