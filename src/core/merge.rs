use crate::models::{DatingPreferences, FieldNameError, Gender, ProfileField, ProfileFields};
use thiserror::Error;

/// How a candidate value is combined with the stored one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Keep stored values, fill only empty fields from the candidate
    #[default]
    FillMissing,
    /// Any present candidate value replaces the stored one
    Overwrite,
}

#[derive(Debug, Error)]
pub enum MergeRequestError {
    #[error(transparent)]
    Field(#[from] FieldNameError),

    #[error("invalid field value: {0}")]
    InvalidValue(String),

    #[error("no fields to update")]
    Empty,
}

/// A value counts as present when it is non-null and non-empty
trait Presence {
    fn is_present(&self) -> bool;
}

impl Presence for String {
    fn is_present(&self) -> bool {
        !self.trim().is_empty()
    }
}

impl Presence for i32 {
    fn is_present(&self) -> bool {
        true
    }
}

impl Presence for Gender {
    fn is_present(&self) -> bool {
        true
    }
}

impl Presence for Vec<String> {
    fn is_present(&self) -> bool {
        self.iter().any(|s| s.is_present())
    }
}

impl Presence for DatingPreferences {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

#[inline]
fn present<T: Presence>(value: &Option<T>) -> bool {
    value.as_ref().map_or(false, Presence::is_present)
}

#[inline]
fn pick<T: Presence + Clone>(stored: &Option<T>, candidate: &Option<T>, policy: MergePolicy) -> Option<T> {
    let take_candidate = match policy {
        MergePolicy::FillMissing => !present(stored) && present(candidate),
        MergePolicy::Overwrite => present(candidate),
    };
    if take_candidate {
        candidate.clone()
    } else {
        stored.clone()
    }
}

/// Combine `candidate` into `stored` field by field
pub fn merge(stored: &ProfileFields, candidate: &ProfileFields, policy: MergePolicy) -> ProfileFields {
    ProfileFields {
        first_name: pick(&stored.first_name, &candidate.first_name, policy),
        gender: pick(&stored.gender, &candidate.gender, policy),
        year_of_birth: pick(&stored.year_of_birth, &candidate.year_of_birth, policy),
        job_or_education: pick(&stored.job_or_education, &candidate.job_or_education, policy),
        relationship_type: pick(&stored.relationship_type, &candidate.relationship_type, policy),
        dealbreakers: pick(&stored.dealbreakers, &candidate.dealbreakers, policy),
        greenflags: pick(&stored.greenflags, &candidate.greenflags, policy),
        dating_preferences: pick(&stored.dating_preferences, &candidate.dating_preferences, policy),
        time_since_single: pick(&stored.time_since_single, &candidate.time_since_single, policy),
    }
}

pub fn is_field_present(fields: &ProfileFields, field: ProfileField) -> bool {
    match field {
        ProfileField::FirstName => present(&fields.first_name),
        ProfileField::Gender => present(&fields.gender),
        ProfileField::YearOfBirth => present(&fields.year_of_birth),
        ProfileField::JobOrEducation => present(&fields.job_or_education),
        ProfileField::RelationshipType => present(&fields.relationship_type),
        ProfileField::Dealbreakers => present(&fields.dealbreakers),
        ProfileField::Greenflags => present(&fields.greenflags),
        ProfileField::DatingPreferences => present(&fields.dating_preferences),
        ProfileField::TimeSinceSingle => present(&fields.time_since_single),
    }
}

pub fn missing_fields(fields: &ProfileFields) -> Vec<ProfileField> {
    ProfileField::ALL
        .iter()
        .copied()
        .filter(|f| !is_field_present(fields, *f))
        .collect()
}

/// Completeness gate: every tracked field already holds a value
pub fn is_complete(fields: &ProfileFields) -> bool {
    missing_fields(fields).is_empty()
}

/// Fields whose value differs between `before` and `after`
pub fn changed_fields(before: &ProfileFields, after: &ProfileFields) -> Vec<ProfileField> {
    ProfileField::ALL
        .iter()
        .copied()
        .filter(|field| match field {
            ProfileField::FirstName => before.first_name != after.first_name,
            ProfileField::Gender => before.gender != after.gender,
            ProfileField::YearOfBirth => before.year_of_birth != after.year_of_birth,
            ProfileField::JobOrEducation => before.job_or_education != after.job_or_education,
            ProfileField::RelationshipType => before.relationship_type != after.relationship_type,
            ProfileField::Dealbreakers => before.dealbreakers != after.dealbreakers,
            ProfileField::Greenflags => before.tags() != after.tags(),
            ProfileField::DatingPreferences => before.dating_preferences != after.dating_preferences,
            ProfileField::TimeSinceSingle => before.time_since_single != after.time_since_single,
        })
        .collect()
}

/// Build a candidate from a name-keyed update, rejecting protected and
/// unknown names before any value is looked at
pub fn candidate_from_named(
    values: &serde_json::Map<String, serde_json::Value>,
) -> Result<ProfileFields, MergeRequestError> {
    if values.is_empty() {
        return Err(MergeRequestError::Empty);
    }

    for name in values.keys() {
        name.parse::<ProfileField>()?;
    }

    serde_json::from_value(serde_json::Value::Object(values.clone()))
        .map_err(|e| MergeRequestError::InvalidValue(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn complete() -> ProfileFields {
        ProfileFields {
            first_name: Some("Ana".into()),
            gender: Some(Gender::Female),
            year_of_birth: Some(1994),
            job_or_education: Some("engineer".into()),
            relationship_type: Some("long-term".into()),
            dealbreakers: Some(vec!["smoking".into()]),
            greenflags: Some(vec!["honest".into()]),
            dating_preferences: Some(DatingPreferences {
                min_age: Some(27),
                max_age: Some(35),
                gender: Some(Gender::Male),
            }),
            time_since_single: Some("a year".into()),
        }
    }

    #[test]
    fn test_fill_missing_keeps_existing() {
        let stored = ProfileFields {
            first_name: None,
            job_or_education: Some("engineer".into()),
            ..Default::default()
        };
        let candidate = ProfileFields {
            first_name: Some("Ana".into()),
            job_or_education: Some("doctor".into()),
            ..Default::default()
        };

        let merged = merge(&stored, &candidate, MergePolicy::FillMissing);

        assert_eq!(merged.first_name.as_deref(), Some("Ana"));
        assert_eq!(merged.job_or_education.as_deref(), Some("engineer"));
    }

    #[test]
    fn test_fill_missing_treats_blank_as_missing() {
        let stored = ProfileFields {
            first_name: Some("  ".into()),
            greenflags: Some(vec![]),
            ..Default::default()
        };
        let candidate = ProfileFields {
            first_name: Some("Ana".into()),
            greenflags: Some(vec!["kind".into()]),
            ..Default::default()
        };

        let merged = merge(&stored, &candidate, MergePolicy::FillMissing);

        assert_eq!(merged.first_name.as_deref(), Some("Ana"));
        assert_eq!(merged.greenflags, Some(vec!["kind".to_string()]));
    }

    #[test]
    fn test_overwrite_never_erases_with_null() {
        let stored = complete();
        let candidate = ProfileFields {
            job_or_education: Some("doctor".into()),
            ..Default::default()
        };

        let merged = merge(&stored, &candidate, MergePolicy::Overwrite);

        assert_eq!(merged.job_or_education.as_deref(), Some("doctor"));
        assert_eq!(merged.first_name.as_deref(), Some("Ana"));
        assert_eq!(changed_fields(&stored, &merged), vec![ProfileField::JobOrEducation]);
    }

    #[test]
    fn test_completeness_gate() {
        assert!(is_complete(&complete()));

        let mut partial = complete();
        partial.dating_preferences = Some(DatingPreferences::default());
        assert!(!is_complete(&partial));
        assert_eq!(missing_fields(&partial), vec![ProfileField::DatingPreferences]);

        assert_eq!(missing_fields(&ProfileFields::default()).len(), ProfileField::ALL.len());
    }

    #[test]
    fn test_greenflag_change_ignores_blank_tags() {
        let before = ProfileFields {
            greenflags: Some(vec!["honest".into()]),
            ..Default::default()
        };
        let after = ProfileFields {
            greenflags: Some(vec!["honest".into(), "".into()]),
            ..Default::default()
        };
        assert!(changed_fields(&before, &after).is_empty());
    }

    #[test]
    fn test_named_update_rejects_protected_fields() {
        let values = json!({ "first_name": "Ana", "phone_number": "+1" });
        let err = candidate_from_named(values.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, MergeRequestError::Field(FieldNameError::Protected(_))));

        let values = json!({ "favorite_color": "blue" });
        let err = candidate_from_named(values.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, MergeRequestError::Field(FieldNameError::Unknown(_))));
    }

    #[test]
    fn test_named_update_builds_candidate() {
        let values = json!({ "greenflags": ["kind", "curious"], "year_of_birth": 1990 });
        let candidate = candidate_from_named(values.as_object().unwrap()).unwrap();
        assert_eq!(candidate.year_of_birth, Some(1990));
        assert_eq!(candidate.tags(), vec!["kind", "curious"]);
        assert!(candidate.first_name.is_none());

        let values = json!({ "year_of_birth": "nineteen ninety" });
        let err = candidate_from_named(values.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, MergeRequestError::InvalidValue(_)));
    }
}
