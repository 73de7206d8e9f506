use crate::models::{
    ContactId, ContactPair, DatingPreferences, Embedding, EmbeddingChange, Gender, MatchInsert,
    MatchRecord, Profile, ProfileFields, ProfilePatch, SimilarProfile,
};
use crate::services::traits::{MatchStore, ProfileStore, StoreError};
use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::time::Duration;

/// PostgreSQL client holding profiles and greenflag matches
///
/// Every write is a single statement: profile updates are guarded by the
/// row's `revision`, match inserts by the unique canonical pair.
pub struct PostgresClient {
    pool: PgPool,
}

const PROFILE_COLUMNS: &str = r#"
    phone_number, first_name, gender, year_of_birth, job_or_education,
    relationship_type, dealbreakers, greenflags, dating_preferences,
    time_since_single, greenflags_vector_embedding, revision, created_at, updated_at
"#;

impl PostgresClient {
    /// Create a new PostgreSQL client from a connection string
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a new PostgreSQL client from settings
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        acquire_timeout_secs: Option<u64>,
        idle_timeout_secs: Option<u64>,
    ) -> Result<Self, StoreError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
            Duration::from_secs(acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(idle_timeout_secs.unwrap_or(600)),
        )
        .await
    }

    fn profile_from_row(row: &PgRow) -> Result<Profile, StoreError> {
        let phone: String = row.try_get("phone_number")?;
        let contact_id =
            ContactId::parse(&phone).map_err(|e| StoreError::InvalidData(e.to_string()))?;

        let gender = row
            .try_get::<Option<String>, _>("gender")?
            .map(|g| g.parse::<Gender>())
            .transpose()
            .map_err(StoreError::InvalidData)?;

        let dating_preferences = row
            .try_get::<Option<Json<DatingPreferences>>, _>("dating_preferences")?
            .map(|json| json.0);

        let embedding = row
            .try_get::<Option<Vector>, _>("greenflags_vector_embedding")?
            .map(|v| Embedding::from_stored(v.to_vec()));

        Ok(Profile {
            contact_id,
            fields: ProfileFields {
                first_name: row.try_get("first_name")?,
                gender,
                year_of_birth: row.try_get("year_of_birth")?,
                job_or_education: row.try_get("job_or_education")?,
                relationship_type: row.try_get("relationship_type")?,
                dealbreakers: row.try_get("dealbreakers")?,
                greenflags: row.try_get("greenflags")?,
                dating_preferences,
                time_since_single: row.try_get("time_since_single")?,
            },
            embedding,
            revision: row.try_get("revision")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn match_from_row(row: &PgRow) -> Result<MatchRecord, StoreError> {
        let user1: String = row.try_get("user1_phone")?;
        let user2: String = row.try_get("user2_phone")?;

        Ok(MatchRecord {
            id: row.try_get("id")?,
            user1_phone: ContactId::parse(&user1)
                .map_err(|e| StoreError::InvalidData(e.to_string()))?,
            user2_phone: ContactId::parse(&user2)
                .map_err(|e| StoreError::InvalidData(e.to_string()))?,
            similarity: row.try_get("similarity")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn insert_profile(
        &self,
        contact_id: &ContactId,
        patch: &ProfilePatch,
    ) -> Result<Option<PgRow>, StoreError> {
        let query = format!(
            r#"
            INSERT INTO users (
                phone_number, first_name, gender, year_of_birth, job_or_education,
                relationship_type, dealbreakers, greenflags, dating_preferences,
                time_since_single, greenflags_vector_embedding, revision
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 1)
            ON CONFLICT (phone_number) DO NOTHING
            RETURNING {}
            "#,
            PROFILE_COLUMNS
        );

        let embedding = match &patch.embedding {
            EmbeddingChange::Set(e) => Some(Vector::from(e.as_slice().to_vec())),
            EmbeddingChange::Keep | EmbeddingChange::Clear => None,
        };

        let fields = &patch.fields;
        let row = sqlx::query(&query)
            .bind(contact_id.as_str())
            .bind(fields.first_name.clone())
            .bind(fields.gender.map(|g| g.as_str()))
            .bind(fields.year_of_birth)
            .bind(fields.job_or_education.clone())
            .bind(fields.relationship_type.clone())
            .bind(fields.dealbreakers.clone())
            .bind(fields.greenflags.clone())
            .bind(fields.dating_preferences.clone().map(Json))
            .bind(fields.time_since_single.clone())
            .bind(embedding)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn update_profile(
        &self,
        contact_id: &ContactId,
        patch: &ProfilePatch,
    ) -> Result<Option<PgRow>, StoreError> {
        let query = format!(
            r#"
            UPDATE users SET
                first_name = COALESCE($2, first_name),
                gender = COALESCE($3, gender),
                year_of_birth = COALESCE($4, year_of_birth),
                job_or_education = COALESCE($5, job_or_education),
                relationship_type = COALESCE($6, relationship_type),
                dealbreakers = COALESCE($7, dealbreakers),
                greenflags = COALESCE($8, greenflags),
                dating_preferences = COALESCE($9, dating_preferences),
                time_since_single = COALESCE($10, time_since_single),
                greenflags_vector_embedding = CASE WHEN $11 THEN $12 ELSE greenflags_vector_embedding END,
                revision = revision + 1,
                updated_at = NOW()
            WHERE phone_number = $1 AND revision = $13
            RETURNING {}
            "#,
            PROFILE_COLUMNS
        );

        let (touch_embedding, embedding) = match &patch.embedding {
            EmbeddingChange::Keep => (false, None),
            EmbeddingChange::Clear => (true, None),
            EmbeddingChange::Set(e) => (true, Some(Vector::from(e.as_slice().to_vec()))),
        };

        let fields = &patch.fields;
        let row = sqlx::query(&query)
            .bind(contact_id.as_str())
            .bind(fields.first_name.clone())
            .bind(fields.gender.map(|g| g.as_str()))
            .bind(fields.year_of_birth)
            .bind(fields.job_or_education.clone())
            .bind(fields.relationship_type.clone())
            .bind(fields.dealbreakers.clone())
            .bind(fields.greenflags.clone())
            .bind(fields.dating_preferences.clone().map(Json))
            .bind(fields.time_since_single.clone())
            .bind(touch_embedding)
            .bind(embedding)
            .bind(patch.expected_revision)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }
}

#[async_trait]
impl ProfileStore for PostgresClient {
    async fn get(&self, contact_id: &ContactId) -> Result<Option<Profile>, StoreError> {
        let query = format!("SELECT {} FROM users WHERE phone_number = $1", PROFILE_COLUMNS);

        let row = sqlx::query(&query)
            .bind(contact_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::profile_from_row).transpose()
    }

    async fn upsert(&self, contact_id: &ContactId, patch: &ProfilePatch) -> Result<Profile, StoreError> {
        let row = if patch.expected_revision == 0 {
            self.insert_profile(contact_id, patch).await?
        } else {
            self.update_profile(contact_id, patch).await?
        };

        match row {
            Some(row) => {
                let profile = Self::profile_from_row(&row)?;
                tracing::debug!(
                    "Wrote profile {} (revision {})",
                    contact_id,
                    profile.revision
                );
                Ok(profile)
            }
            None => Err(StoreError::RevisionConflict {
                contact_id: contact_id.to_string(),
                expected: patch.expected_revision,
            }),
        }
    }

    async fn find_similar(
        &self,
        embedding: &Embedding,
        limit: usize,
        threshold: f64,
    ) -> Result<Vec<SimilarProfile>, StoreError> {
        let query = r#"
            SELECT phone_number, 1 - (greenflags_vector_embedding <=> $1) AS similarity
            FROM users
            WHERE greenflags_vector_embedding IS NOT NULL
              AND 1 - (greenflags_vector_embedding <=> $1) >= $2
            ORDER BY greenflags_vector_embedding <=> $1, phone_number
            LIMIT $3
        "#;

        let rows = sqlx::query(query)
            .bind(Vector::from(embedding.as_slice().to_vec()))
            .bind(threshold)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let phone: String = row.try_get("phone_number")?;
                Ok(SimilarProfile {
                    contact_id: ContactId::parse(&phone)
                        .map_err(|e| StoreError::InvalidData(e.to_string()))?,
                    similarity: row.try_get("similarity")?,
                })
            })
            .collect()
    }

    async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }
}

#[async_trait]
impl MatchStore for PostgresClient {
    async fn find(&self, pair: &ContactPair) -> Result<Option<MatchRecord>, StoreError> {
        let query = r#"
            SELECT id, user1_phone, user2_phone, similarity, created_at
            FROM greenflags_embedding_matches
            WHERE user1_phone = $1 AND user2_phone = $2
        "#;

        let row = sqlx::query(query)
            .bind(pair.low().as_str())
            .bind(pair.high().as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::match_from_row).transpose()
    }

    /// Uses INSERT ... ON CONFLICT DO NOTHING on the canonical pair, so two
    /// sides matching each other at the same moment still yield one row.
    async fn insert_if_absent(&self, pair: &ContactPair, similarity: f64) -> Result<MatchInsert, StoreError> {
        let candidate = MatchRecord::new(pair, similarity);

        let query = r#"
            INSERT INTO greenflags_embedding_matches (id, user1_phone, user2_phone, similarity, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user1_phone, user2_phone) DO NOTHING
            RETURNING id, user1_phone, user2_phone, similarity, created_at
        "#;

        let row = sqlx::query(query)
            .bind(candidate.id)
            .bind(candidate.user1_phone.as_str())
            .bind(candidate.user2_phone.as_str())
            .bind(candidate.similarity)
            .bind(candidate.created_at)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = row {
            return Ok(MatchInsert {
                inserted: true,
                record: Self::match_from_row(&row)?,
            });
        }

        let existing = self.find(pair).await?.ok_or_else(|| {
            StoreError::InvalidData(format!(
                "match {} <-> {} conflicted but is not readable",
                pair.low(),
                pair.high()
            ))
        })?;

        Ok(MatchInsert {
            inserted: false,
            record: existing,
        })
    }
}
