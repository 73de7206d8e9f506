use crate::core::dedup::{Admission, EventDeduplicator};
use crate::core::embedding::EmbeddingGenerator;
use crate::core::extraction::ProfileExtractor;
use crate::core::matcher::{MatchOutcome, Matcher};
use crate::core::merge::{self, MergePolicy};
use crate::error::ServiceError;
use crate::models::{
    field_statuses, CallPayload, ContactId, EmbeddingChange, FieldStatus, InboundCall, MatchRecord,
    Profile, ProfileChangeRequest, ProfileField, ProfileFields, ProfilePatch,
};
use crate::services::traits::{MatchStore, ProfileStore, StoreError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use validator::Validate;

/// Compare-and-set attempts before a profile write is given up
const MAX_WRITE_ATTEMPTS: usize = 5;

/// Result of processing one call-completion event
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessOutcome {
    Processed {
        contact_id: ContactId,
        updated_fields: Vec<&'static str>,
        embedding_updated: bool,
        #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
        match_record: Option<MatchRecord>,
    },
    AlreadyProcessed {
        call_id: String,
    },
    ProfileComplete {
        contact_id: ContactId,
        embedding_updated: bool,
        #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
        match_record: Option<MatchRecord>,
    },
}

/// Result of the database-change webhook
#[derive(Debug, Clone)]
pub enum ProfileChangeOutcome {
    NoRelevantChanges,
    Matched(MatchOutcome),
}

/// A persisted merge and its side effects
#[derive(Debug, Clone)]
pub struct AppliedUpdate {
    pub profile: Profile,
    pub changed: Vec<ProfileField>,
    pub embedding_updated: bool,
    pub match_outcome: Option<MatchOutcome>,
}

/// Call intake pipeline: dedup, gate, extract, merge, embed, match
#[derive(Clone)]
pub struct ProfileSync {
    profiles: Arc<dyn ProfileStore>,
    matches: Arc<dyn MatchStore>,
    extractor: ProfileExtractor,
    embedder: EmbeddingGenerator,
    dedup: EventDeduplicator,
    matcher: Matcher,
}

impl ProfileSync {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        matches: Arc<dyn MatchStore>,
        extractor: ProfileExtractor,
        embedder: EmbeddingGenerator,
        dedup: EventDeduplicator,
        matcher: Matcher,
    ) -> Self {
        Self {
            profiles,
            matches,
            extractor,
            embedder,
            dedup,
            matcher,
        }
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub async fn health_check(&self) -> bool {
        self.profiles.health_check().await
    }

    /// Handle a `call_ended` event at most once per call id
    pub async fn process_call_ended(&self, call: &CallPayload) -> Result<ProcessOutcome, ServiceError> {
        call.validate()?;
        let contact = ContactId::parse(&call.from_number)?;

        let guard = match self.dedup.admit(&call.call_id).await? {
            Admission::Accepted(guard) => guard,
            Admission::RejectedDuplicate => {
                tracing::info!(call_id = %call.call_id, "Duplicate delivery, skipping");
                return Ok(ProcessOutcome::AlreadyProcessed {
                    call_id: call.call_id.clone(),
                });
            }
        };

        match self.sync_call(&contact, call).await {
            Ok(outcome) => {
                if let Err(e) = guard.complete().await {
                    tracing::error!(
                        call_id = %call.call_id,
                        "Processed but failed to mark as done, a redelivery after the in-flight TTL will run again: {}",
                        e
                    );
                    return Err(e.into());
                }
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!(
                    call_id = %call.call_id,
                    contact_id = %contact,
                    "Processing failed, releasing event for redelivery: {}",
                    e
                );
                guard.release().await;
                Err(e)
            }
        }
    }

    async fn sync_call(&self, contact: &ContactId, call: &CallPayload) -> Result<ProcessOutcome, ServiceError> {
        let (profile, _) = self.get_or_create(contact).await?;

        if merge::is_complete(&profile.fields) {
            tracing::info!(contact_id = %contact, "Profile already complete, skipping extraction");
            // Still finish an embedding or match an earlier attempt left undone
            let applied = self
                .apply_candidate(profile, &ProfileFields::default(), MergePolicy::FillMissing)
                .await?;
            return Ok(ProcessOutcome::ProfileComplete {
                contact_id: contact.clone(),
                embedding_updated: applied.embedding_updated,
                match_record: created_record(applied.match_outcome),
            });
        }

        let candidate = self
            .extractor
            .extract(&call.transcript, &call.retell_llm_dynamic_variables)
            .await?;

        let applied = self.apply_candidate(profile, &candidate, MergePolicy::FillMissing).await?;

        tracing::info!(
            call_id = %call.call_id,
            contact_id = %contact,
            updated = applied.changed.len(),
            "Call processed"
        );

        Ok(ProcessOutcome::Processed {
            contact_id: contact.clone(),
            updated_fields: applied.changed.iter().map(|f| f.name()).collect(),
            embedding_updated: applied.embedding_updated,
            match_record: created_record(applied.match_outcome),
        })
    }

    /// Fetch a profile, creating an empty one when the contact is unknown.
    /// The flag is `true` when this call created it.
    pub async fn get_or_create(&self, contact: &ContactId) -> Result<(Profile, bool), ServiceError> {
        if let Some(profile) = self.profiles.get(contact).await? {
            return Ok((profile, false));
        }

        match self.profiles.upsert(contact, &ProfilePatch::create()).await {
            Ok(profile) => {
                tracing::info!(contact_id = %contact, "Created profile");
                Ok((profile, true))
            }
            // Lost the create race, the other writer's row is what we want
            Err(StoreError::RevisionConflict { .. }) => self
                .profiles
                .get(contact)
                .await?
                .map(|p| (p, false))
                .ok_or_else(|| ServiceError::Internal(format!("profile {} vanished after create", contact))),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_profile(&self, contact: &ContactId) -> Result<Profile, ServiceError> {
        self.profiles
            .get(contact)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("profile {} not found", contact)))
    }

    /// Named-field update from an operator; present values always win
    pub async fn update_profile(
        &self,
        contact: &ContactId,
        values: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<AppliedUpdate, ServiceError> {
        let candidate = merge::candidate_from_named(values)?;
        let current = self.get_profile(contact).await?;
        self.apply_candidate(current, &candidate, MergePolicy::Overwrite).await
    }

    /// Field map the voice agent gets at the start of a call
    pub async fn inbound_lookup(
        &self,
        call: &InboundCall,
    ) -> Result<BTreeMap<&'static str, FieldStatus>, ServiceError> {
        call.validate()?;
        let contact = ContactId::parse(&call.from_number)?;

        let (profile, created) = self.get_or_create(&contact).await?;
        if created {
            return Ok(BTreeMap::new());
        }
        Ok(field_statuses(&profile.fields))
    }

    /// Re-run matching when a stored embedding changed outside this service
    pub async fn handle_profile_change(
        &self,
        change: &ProfileChangeRequest,
    ) -> Result<ProfileChangeOutcome, ServiceError> {
        let record = change
            .record
            .as_ref()
            .ok_or_else(|| ServiceError::Validation("record is required".to_string()))?;

        let new_embedding = record.greenflags_vector_embedding.as_ref().filter(|v| !v.is_null());
        let old_embedding = change
            .old_record
            .as_ref()
            .and_then(|r| r.greenflags_vector_embedding.as_ref())
            .filter(|v| !v.is_null());

        if new_embedding.is_none() || new_embedding == old_embedding {
            return Ok(ProfileChangeOutcome::NoRelevantChanges);
        }

        let phone = record
            .phone_number
            .as_deref()
            .ok_or_else(|| ServiceError::Validation("record.phone_number is required".to_string()))?;
        let contact = ContactId::parse(phone)?;

        let profile = self.get_profile(&contact).await?;
        let Some(embedding) = profile.embedding.as_ref() else {
            return Ok(ProfileChangeOutcome::NoRelevantChanges);
        };

        let outcome = self
            .matcher
            .match_profile(self.profiles.as_ref(), self.matches.as_ref(), &contact, embedding)
            .await?;
        Ok(ProfileChangeOutcome::Matched(outcome))
    }

    async fn embedding_change(&self, contact: &ContactId, tags: &[String]) -> EmbeddingChange {
        if tags.is_empty() {
            return EmbeddingChange::Clear;
        }
        match self.embedder.embed(tags).await {
            Ok(embedding) => EmbeddingChange::Set(embedding),
            Err(e) => {
                tracing::warn!(contact_id = %contact, "Embedding failed, saving profile without one: {}", e);
                EmbeddingChange::Clear
            }
        }
    }

    /// Merge `candidate` into `current` and persist it with a revision guard.
    ///
    /// On a conflicting write the merge is redone against the fresh row. The
    /// candidate is never re-extracted and an embedding is computed once per
    /// distinct tag set. A profile with tags but no embedding is embedded even
    /// when the candidate changes nothing, and a profile that needs no write is
    /// matched again so a match lost to an earlier failure is recovered.
    pub async fn apply_candidate(
        &self,
        mut current: Profile,
        candidate: &ProfileFields,
        policy: MergePolicy,
    ) -> Result<AppliedUpdate, ServiceError> {
        let contact = current.contact_id.clone();
        let mut embedded: Option<(Vec<String>, EmbeddingChange)> = None;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let merged = merge::merge(&current.fields, candidate, policy);
            let changed = merge::changed_fields(&current.fields, &merged);
            let tags_changed = changed.contains(&ProfileField::Greenflags);
            let tags = merged.tags();

            let embedding = if tags_changed || (!current.has_embedding() && !tags.is_empty()) {
                let change = match &embedded {
                    Some((previous, change)) if *previous == tags => change.clone(),
                    _ => {
                        let change = self.embedding_change(&contact, &tags).await;
                        embedded = Some((tags, change.clone()));
                        change
                    }
                };
                match change {
                    // Another failed retry of a missing embedding leaves the row as is
                    EmbeddingChange::Clear if !tags_changed => EmbeddingChange::Keep,
                    change => change,
                }
            } else {
                EmbeddingChange::Keep
            };

            if changed.is_empty() && matches!(embedding, EmbeddingChange::Keep) {
                return self.rematch(current).await;
            }

            let patch = ProfilePatch {
                expected_revision: current.revision,
                fields: merged,
                embedding,
            };

            match self.profiles.upsert(&contact, &patch).await {
                Ok(saved) => return self.after_write(saved, changed, patch.embedding).await,
                Err(StoreError::RevisionConflict { .. }) => {
                    tracing::debug!(contact_id = %contact, attempt, "Revision conflict, merging again");
                    current = self
                        .profiles
                        .get(&contact)
                        .await?
                        .unwrap_or_else(|| Profile::unsaved(contact.clone()));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ServiceError::Internal(format!(
            "gave up writing profile {} after {} conflicting attempts",
            contact, MAX_WRITE_ATTEMPTS
        )))
    }

    /// Nothing to write: match the stored embedding again. The pair-keyed
    /// insert makes this a no-op once the match exists.
    async fn rematch(&self, current: Profile) -> Result<AppliedUpdate, ServiceError> {
        let match_outcome = match current.embedding.as_ref() {
            Some(vector) => Some(
                self.matcher
                    .match_profile(self.profiles.as_ref(), self.matches.as_ref(), &current.contact_id, vector)
                    .await?,
            ),
            None => None,
        };

        if let Some(record) = match_outcome.as_ref().filter(|o| o.is_created()).and_then(|o| o.record()) {
            tracing::info!(
                contact_id = %current.contact_id,
                "Recovered match {} / {}",
                record.user1_phone,
                record.user2_phone
            );
        }

        Ok(AppliedUpdate {
            profile: current,
            changed: Vec::new(),
            embedding_updated: false,
            match_outcome,
        })
    }

    async fn after_write(
        &self,
        saved: Profile,
        changed: Vec<ProfileField>,
        embedding: EmbeddingChange,
    ) -> Result<AppliedUpdate, ServiceError> {
        let match_outcome = match &embedding {
            EmbeddingChange::Set(vector) => Some(
                self.matcher
                    .match_profile(self.profiles.as_ref(), self.matches.as_ref(), &saved.contact_id, vector)
                    .await?,
            ),
            _ => None,
        };

        Ok(AppliedUpdate {
            profile: saved,
            changed,
            embedding_updated: !matches!(embedding, EmbeddingChange::Keep),
            match_outcome,
        })
    }
}

fn created_record(outcome: Option<MatchOutcome>) -> Option<MatchRecord> {
    match outcome {
        Some(MatchOutcome::Created(record)) => Some(record),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProfileRecord;
    use crate::services::traits::{CompletionService, EmbeddingService, StructuredPrompt, UpstreamError};
    use crate::services::{MemoryIdempotencyStore, MemoryMatchStore, MemoryProfileStore};
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    struct Unreachable;

    #[async_trait]
    impl CompletionService for Unreachable {
        async fn complete_json(&self, _prompt: &StructuredPrompt) -> Result<String, UpstreamError> {
            Err(UpstreamError::Timeout)
        }
    }

    #[async_trait]
    impl EmbeddingService for Unreachable {
        async fn embed_text(&self, _text: &str) -> Result<Vec<f32>, UpstreamError> {
            Err(UpstreamError::Timeout)
        }
    }

    fn sync(profiles: Arc<MemoryProfileStore>) -> ProfileSync {
        ProfileSync::new(
            profiles,
            Arc::new(MemoryMatchStore::new()),
            ProfileExtractor::new(Arc::new(Unreachable)),
            EmbeddingGenerator::new(Arc::new(Unreachable), 4),
            EventDeduplicator::new(
                Arc::new(MemoryIdempotencyStore::new(100)),
                Duration::from_secs(60),
                Duration::from_secs(3600),
            ),
            Matcher::default(),
        )
    }

    fn id(s: &str) -> ContactId {
        ContactId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let profiles = Arc::new(MemoryProfileStore::new());
        let sync = sync(profiles.clone());

        let (_, created) = sync.get_or_create(&id("+1")).await.unwrap();
        let (again, created_again) = sync.get_or_create(&id("+1")).await.unwrap();

        assert!(created);
        assert!(!created_again);
        assert_eq!(again.revision, 1);
        assert_eq!(profiles.len().await, 1);
    }

    #[tokio::test]
    async fn test_embedding_failure_does_not_block_write() {
        let profiles = Arc::new(MemoryProfileStore::new());
        let sync = sync(profiles.clone());
        let (profile, _) = sync.get_or_create(&id("+1")).await.unwrap();

        let candidate = ProfileFields {
            greenflags: Some(vec!["kind".into()]),
            ..Default::default()
        };
        let applied = sync
            .apply_candidate(profile, &candidate, MergePolicy::FillMissing)
            .await
            .unwrap();

        assert_eq!(applied.changed, vec![ProfileField::Greenflags]);
        assert!(!applied.profile.has_embedding());
        assert!(applied.match_outcome.is_none());
        assert_eq!(applied.profile.fields.tags(), vec!["kind"]);
    }

    #[tokio::test]
    async fn test_update_missing_profile_is_not_found() {
        let sync = sync(Arc::new(MemoryProfileStore::new()));
        let values = json!({ "first_name": "Ana" });

        let err = sync.update_profile(&id("+1"), values.as_object().unwrap()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_profile_change_without_new_embedding() {
        let sync = sync(Arc::new(MemoryProfileStore::new()));
        let record = ProfileRecord {
            phone_number: Some("+1".into()),
            greenflags_vector_embedding: Some(json!("[0.1,0.2]")),
        };

        let unchanged = ProfileChangeRequest {
            kind: Some("UPDATE".into()),
            table: Some("users".into()),
            record: Some(record.clone()),
            old_record: Some(record),
        };
        assert!(matches!(
            sync.handle_profile_change(&unchanged).await.unwrap(),
            ProfileChangeOutcome::NoRelevantChanges
        ));

        let cleared = ProfileChangeRequest {
            kind: None,
            table: None,
            record: Some(ProfileRecord {
                phone_number: Some("+1".into()),
                greenflags_vector_embedding: None,
            }),
            old_record: None,
        };
        assert!(matches!(
            sync.handle_profile_change(&cleared).await.unwrap(),
            ProfileChangeOutcome::NoRelevantChanges
        ));
    }
}
