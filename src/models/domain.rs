use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum accepted length of a contact identifier
const MAX_CONTACT_ID_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid contact identifier: {0}")]
pub struct InvalidContactId(pub String);

/// Stable contact identifier (the caller's phone number in webhook payloads)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactId(String);

impl ContactId {
    pub fn parse(raw: &str) -> Result<Self, InvalidContactId> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InvalidContactId("empty".to_string()));
        }
        if trimmed.len() > MAX_CONTACT_ID_LEN {
            return Err(InvalidContactId(format!(
                "longer than {} characters",
                MAX_CONTACT_ID_LEN
            )));
        }
        if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(InvalidContactId(format!("{:?} contains whitespace", trimmed)));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            other => Err(format!("unknown gender {:?}", other)),
        }
    }
}

/// Structured dating preferences
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DatingPreferences {
    /// Minimum age preference for dating
    #[serde(rename = "minAge")]
    pub min_age: Option<i32>,
    /// Maximum age preference for dating
    #[serde(rename = "maxAge")]
    pub max_age: Option<i32>,
    /// Preferred gender for dating
    pub gender: Option<Gender>,
}

impl DatingPreferences {
    pub fn is_empty(&self) -> bool {
        self.min_age.is_none() && self.max_age.is_none() && self.gender.is_none()
    }
}

/// The closed set of tracked profile fields.
///
/// Used both as the extraction schema (every key required, every value
/// nullable) and as the merge unit. `None` means "no value".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ProfileFields {
    /// The user's first name.
    pub first_name: Option<String>,
    /// The user's gender.
    pub gender: Option<Gender>,
    /// The year the user was born.
    pub year_of_birth: Option<i32>,
    /// The user's job or education status.
    pub job_or_education: Option<String>,
    /// The type of relationship the user is seeking (casual, long-term, still figuring it out).
    pub relationship_type: Option<String>,
    /// A list of dealbreakers the user has.
    pub dealbreakers: Option<Vec<String>>,
    /// A list of green flags the user looks for in a partner.
    pub greenflags: Option<Vec<String>>,
    /// The user's dating preferences.
    pub dating_preferences: Option<DatingPreferences>,
    /// Time elapsed since the user was last in a relationship.
    pub time_since_single: Option<String>,
}

impl ProfileFields {
    /// Greenflags with blank entries dropped, in their original order
    pub fn tags(&self) -> Vec<String> {
        self.greenflags
            .iter()
            .flatten()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Field names that exist on a stored profile but are never merge targets
pub const PROTECTED_FIELDS: &[&str] = &[
    "id",
    "contact_id",
    "phone_number",
    "created_at",
    "updated_at",
    "revision",
    "greenflags_vector_embedding",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldNameError {
    #[error("field '{0}' is protected and cannot be updated")]
    Protected(String),

    #[error("unknown profile field '{0}'")]
    Unknown(String),
}

/// Compile-time names for the tracked fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileField {
    FirstName,
    Gender,
    YearOfBirth,
    JobOrEducation,
    RelationshipType,
    Dealbreakers,
    Greenflags,
    DatingPreferences,
    TimeSinceSingle,
}

impl ProfileField {
    pub const ALL: [ProfileField; 9] = [
        ProfileField::FirstName,
        ProfileField::Gender,
        ProfileField::YearOfBirth,
        ProfileField::JobOrEducation,
        ProfileField::RelationshipType,
        ProfileField::Dealbreakers,
        ProfileField::Greenflags,
        ProfileField::DatingPreferences,
        ProfileField::TimeSinceSingle,
    ];

    /// Wire and column name
    pub fn name(&self) -> &'static str {
        match self {
            ProfileField::FirstName => "first_name",
            ProfileField::Gender => "gender",
            ProfileField::YearOfBirth => "year_of_birth",
            ProfileField::JobOrEducation => "job_or_education",
            ProfileField::RelationshipType => "relationship_type",
            ProfileField::Dealbreakers => "dealbreakers",
            ProfileField::Greenflags => "greenflags",
            ProfileField::DatingPreferences => "dating_preferences",
            ProfileField::TimeSinceSingle => "time_since_single",
        }
    }
}

impl FromStr for ProfileField {
    type Err = FieldNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(field) = ProfileField::ALL.iter().find(|f| f.name() == s) {
            return Ok(*field);
        }
        if PROTECTED_FIELDS.contains(&s) {
            return Err(FieldNameError::Protected(s.to_string()));
        }
        Err(FieldNameError::Unknown(s.to_string()))
    }
}

impl fmt::Display for ProfileField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unit-norm embedding vector derived from a profile's greenflags
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// L2-normalize `values`. Returns `None` for empty, non-finite or zero vectors.
    pub fn normalized(mut values: Vec<f32>) -> Option<Self> {
        if values.is_empty() || values.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let norm = values.iter().map(|v| (*v as f64).powi(2)).sum::<f64>().sqrt();
        if norm == 0.0 {
            return None;
        }
        for v in values.iter_mut() {
            *v = (*v as f64 / norm) as f32;
        }
        Some(Self(values))
    }

    /// Wrap values read back from a store that only holds normalized vectors
    pub fn from_stored(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }
}

/// Persisted profile
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub contact_id: ContactId,
    #[serde(flatten)]
    pub fields: ProfileFields,
    #[serde(skip)]
    pub embedding: Option<Embedding>,
    /// Compare-and-set token, bumped on every write. Zero means "not stored yet".
    pub revision: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// A profile that does not exist in the store yet
    pub fn unsaved(contact_id: ContactId) -> Self {
        Self {
            contact_id,
            fields: ProfileFields::default(),
            embedding: None,
            revision: 0,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding.is_some()
    }
}

/// What a write does to the embedding column
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingChange {
    Keep,
    Clear,
    Set(Embedding),
}

/// A single atomic profile write.
///
/// Applied only if the stored revision still equals `expected_revision`
/// (zero: the profile must not exist yet). `None` fields leave the stored
/// value unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfilePatch {
    pub expected_revision: i64,
    pub fields: ProfileFields,
    pub embedding: EmbeddingChange,
}

impl ProfilePatch {
    /// Create an empty profile if none exists
    pub fn create() -> Self {
        Self {
            expected_revision: 0,
            fields: ProfileFields::default(),
            embedding: EmbeddingChange::Keep,
        }
    }
}

/// Profile returned by a similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarProfile {
    pub contact_id: ContactId,
    pub similarity: f64,
}

/// Unordered pair of distinct contacts, stored smaller identifier first
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContactPair {
    low: ContactId,
    high: ContactId,
}

impl ContactPair {
    /// Returns `None` when both sides are the same contact
    pub fn new(a: ContactId, b: ContactId) -> Option<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Some(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn low(&self) -> &ContactId {
        &self.low
    }

    pub fn high(&self) -> &ContactId {
        &self.high
    }
}

/// Symmetric match between two profiles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: uuid::Uuid,
    pub user1_phone: ContactId,
    pub user2_phone: ContactId,
    pub similarity: f64,
    pub created_at: DateTime<Utc>,
}

impl MatchRecord {
    pub fn new(pair: &ContactPair, similarity: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            user1_phone: pair.low().clone(),
            user2_phone: pair.high().clone(),
            similarity,
            created_at: Utc::now(),
        }
    }

    pub fn pair(&self) -> Option<ContactPair> {
        ContactPair::new(self.user1_phone.clone(), self.user2_phone.clone())
    }
}

/// Result of an insert-if-absent on the match store
#[derive(Debug, Clone)]
pub struct MatchInsert {
    pub inserted: bool,
    pub record: MatchRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ContactId {
        ContactId::parse(s).unwrap()
    }

    #[test]
    fn test_contact_id_rejects_blank_and_spaces() {
        assert!(ContactId::parse("   ").is_err());
        assert!(ContactId::parse("+1 213 777").is_err());
        assert_eq!(ContactId::parse(" +12137771234 ").unwrap().as_str(), "+12137771234");
    }

    #[test]
    fn test_pair_is_unordered() {
        let ab = ContactPair::new(id("a"), id("b")).unwrap();
        let ba = ContactPair::new(id("b"), id("a")).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab.low().as_str(), "a");
        assert!(ContactPair::new(id("a"), id("a")).is_none());
    }

    #[test]
    fn test_field_names_are_closed() {
        assert_eq!("greenflags".parse::<ProfileField>().unwrap(), ProfileField::Greenflags);
        assert_eq!(
            "phone_number".parse::<ProfileField>(),
            Err(FieldNameError::Protected("phone_number".to_string()))
        );
        assert_eq!(
            "favorite_color".parse::<ProfileField>(),
            Err(FieldNameError::Unknown("favorite_color".to_string()))
        );
    }

    #[test]
    fn test_embedding_normalization() {
        let e = Embedding::normalized(vec![3.0, 4.0]).unwrap();
        assert!((e.as_slice()[0] - 0.6).abs() < 1e-6);
        assert!((e.as_slice()[1] - 0.8).abs() < 1e-6);
        assert!(Embedding::normalized(vec![0.0, 0.0]).is_none());
        assert!(Embedding::normalized(vec![f32::NAN]).is_none());
    }

    #[test]
    fn test_tags_skip_blank_entries() {
        let fields = ProfileFields {
            greenflags: Some(vec!["honest".into(), "  ".into(), " funny ".into()]),
            ..Default::default()
        };
        assert_eq!(fields.tags(), vec!["honest", "funny"]);
    }
}
