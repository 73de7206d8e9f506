use crate::core::similarity::cosine_similarity;
use crate::models::{
    ContactId, ContactPair, Embedding, EmbeddingChange, MatchInsert, MatchRecord, Profile,
    ProfilePatch, SimilarProfile,
};
use crate::services::traits::{MatchStore, ProfileStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-process profile store for single-instance deployments and tests
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<ContactId, Profile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.profiles.read().await.len()
    }
}

/// Copy every `Some` field of `patch` over `profile`
fn apply_patch(profile: &mut Profile, patch: &ProfilePatch) {
    let target = &mut profile.fields;
    let fields = patch.fields.clone();

    if fields.first_name.is_some() {
        target.first_name = fields.first_name;
    }
    if fields.gender.is_some() {
        target.gender = fields.gender;
    }
    if fields.year_of_birth.is_some() {
        target.year_of_birth = fields.year_of_birth;
    }
    if fields.job_or_education.is_some() {
        target.job_or_education = fields.job_or_education;
    }
    if fields.relationship_type.is_some() {
        target.relationship_type = fields.relationship_type;
    }
    if fields.dealbreakers.is_some() {
        target.dealbreakers = fields.dealbreakers;
    }
    if fields.greenflags.is_some() {
        target.greenflags = fields.greenflags;
    }
    if fields.dating_preferences.is_some() {
        target.dating_preferences = fields.dating_preferences;
    }
    if fields.time_since_single.is_some() {
        target.time_since_single = fields.time_since_single;
    }

    match &patch.embedding {
        EmbeddingChange::Keep => {}
        EmbeddingChange::Clear => profile.embedding = None,
        EmbeddingChange::Set(embedding) => profile.embedding = Some(embedding.clone()),
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get(&self, contact_id: &ContactId) -> Result<Option<Profile>, StoreError> {
        Ok(self.profiles.read().await.get(contact_id).cloned())
    }

    async fn upsert(&self, contact_id: &ContactId, patch: &ProfilePatch) -> Result<Profile, StoreError> {
        let mut profiles = self.profiles.write().await;

        let current = profiles.get(contact_id).map(|p| p.revision).unwrap_or(0);
        if current != patch.expected_revision {
            return Err(StoreError::RevisionConflict {
                contact_id: contact_id.to_string(),
                expected: patch.expected_revision,
            });
        }

        let now = chrono::Utc::now();
        let profile = profiles.entry(contact_id.clone()).or_insert_with(|| {
            let mut created = Profile::unsaved(contact_id.clone());
            created.created_at = Some(now);
            created
        });

        apply_patch(profile, patch);
        profile.revision += 1;
        profile.updated_at = Some(now);

        Ok(profile.clone())
    }

    async fn find_similar(
        &self,
        embedding: &Embedding,
        limit: usize,
        threshold: f64,
    ) -> Result<Vec<SimilarProfile>, StoreError> {
        let profiles = self.profiles.read().await;

        let mut similar: Vec<SimilarProfile> = profiles
            .values()
            .filter_map(|p| {
                let other = p.embedding.as_ref()?;
                let similarity = cosine_similarity(embedding.as_slice(), other.as_slice())?;
                (similarity >= threshold).then(|| SimilarProfile {
                    contact_id: p.contact_id.clone(),
                    similarity,
                })
            })
            .collect();

        similar.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.contact_id.cmp(&b.contact_id))
        });
        similar.truncate(limit);

        Ok(similar)
    }
}

/// In-process match store
#[derive(Default)]
pub struct MemoryMatchStore {
    records: RwLock<HashMap<ContactPair, MatchRecord>>,
}

impl MemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<MatchRecord> {
        self.records.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl MatchStore for MemoryMatchStore {
    async fn find(&self, pair: &ContactPair) -> Result<Option<MatchRecord>, StoreError> {
        Ok(self.records.read().await.get(pair).cloned())
    }

    async fn insert_if_absent(&self, pair: &ContactPair, similarity: f64) -> Result<MatchInsert, StoreError> {
        let mut records = self.records.write().await;

        if let Some(existing) = records.get(pair) {
            return Ok(MatchInsert {
                inserted: false,
                record: existing.clone(),
            });
        }

        let record = MatchRecord::new(pair, similarity);
        records.insert(pair.clone(), record.clone());

        Ok(MatchInsert {
            inserted: true,
            record,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProfileFields;

    fn id(s: &str) -> ContactId {
        ContactId::parse(s).unwrap()
    }

    fn with_embedding(values: Vec<f32>) -> ProfilePatch {
        ProfilePatch {
            expected_revision: 0,
            fields: ProfileFields::default(),
            embedding: EmbeddingChange::Set(Embedding::normalized(values).unwrap()),
        }
    }

    #[tokio::test]
    async fn test_upsert_creates_then_requires_revision() {
        let store = MemoryProfileStore::new();

        let created = store.upsert(&id("a"), &ProfilePatch::create()).await.unwrap();
        assert_eq!(created.revision, 1);

        let again = store.upsert(&id("a"), &ProfilePatch::create()).await;
        assert!(matches!(again, Err(StoreError::RevisionConflict { .. })));

        let patch = ProfilePatch {
            expected_revision: 1,
            fields: ProfileFields {
                first_name: Some("Ana".into()),
                ..Default::default()
            },
            embedding: EmbeddingChange::Keep,
        };
        let updated = store.upsert(&id("a"), &patch).await.unwrap();
        assert_eq!(updated.revision, 2);
        assert_eq!(updated.fields.first_name.as_deref(), Some("Ana"));
    }

    #[tokio::test]
    async fn test_find_similar_orders_and_filters() {
        let store = MemoryProfileStore::new();
        store.upsert(&id("b"), &with_embedding(vec![1.0, 0.0])).await.unwrap();
        store.upsert(&id("a"), &with_embedding(vec![1.0, 0.0])).await.unwrap();
        store.upsert(&id("c"), &with_embedding(vec![0.0, 1.0])).await.unwrap();
        store.upsert(&id("d"), &ProfilePatch::create()).await.unwrap();

        let query = Embedding::normalized(vec![1.0, 0.0]).unwrap();
        let similar = store.find_similar(&query, 5, 0.7).await.unwrap();

        let ids: Vec<&str> = similar.iter().map(|s| s.contact_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_match_insert_if_absent() {
        let store = MemoryMatchStore::new();
        let pair = ContactPair::new(id("b"), id("a")).unwrap();

        let first = store.insert_if_absent(&pair, 0.9).await.unwrap();
        let reversed = ContactPair::new(id("a"), id("b")).unwrap();
        let second = store.insert_if_absent(&reversed, 0.8).await.unwrap();

        assert!(first.inserted);
        assert!(!second.inserted);
        assert_eq!(first.record.id, second.record.id);
        assert_eq!(store.records().await.len(), 1);
    }
}
