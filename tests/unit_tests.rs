// Unit tests for Lume Intake

use lume_intake::core::{
    cosine_similarity,
    merge::{changed_fields, is_complete, merge, missing_fields, MergePolicy},
    parse_extraction, Matcher,
};
use lume_intake::models::{
    field_statuses, ContactId, ContactPair, DatingPreferences, Gender, ProfileField, ProfileFields,
    SimilarProfile,
};

fn id(s: &str) -> ContactId {
    ContactId::parse(s).unwrap()
}

fn neighbour(s: &str, similarity: f64) -> SimilarProfile {
    SimilarProfile {
        contact_id: id(s),
        similarity,
    }
}

fn complete_fields() -> ProfileFields {
    ProfileFields {
        first_name: Some("Ana".to_string()),
        gender: Some(Gender::Female),
        year_of_birth: Some(1994),
        job_or_education: Some("engineer".to_string()),
        relationship_type: Some("long-term".to_string()),
        dealbreakers: Some(vec!["smoking".to_string()]),
        greenflags: Some(vec!["honest".to_string(), "funny".to_string()]),
        dating_preferences: Some(DatingPreferences {
            min_age: Some(27),
            max_age: Some(35),
            gender: Some(Gender::Male),
        }),
        time_since_single: Some("six months".to_string()),
    }
}

#[test]
fn test_merge_keeps_stored_and_fills_empty() {
    let stored = ProfileFields {
        first_name: None,
        job_or_education: Some("engineer".to_string()),
        ..Default::default()
    };
    let candidate = ProfileFields {
        first_name: Some("Ana".to_string()),
        job_or_education: Some("doctor".to_string()),
        ..Default::default()
    };

    let merged = merge(&stored, &candidate, MergePolicy::FillMissing);

    assert_eq!(merged.first_name.as_deref(), Some("Ana"));
    assert_eq!(merged.job_or_education.as_deref(), Some("engineer"));
    assert_eq!(changed_fields(&stored, &merged), vec![ProfileField::FirstName]);
}

#[test]
fn test_merge_null_candidate_changes_nothing() {
    let stored = complete_fields();

    for policy in [MergePolicy::FillMissing, MergePolicy::Overwrite] {
        let merged = merge(&stored, &ProfileFields::default(), policy);
        assert_eq!(merged, stored);
    }
}

#[test]
fn test_overwrite_replaces_present_values() {
    let stored = complete_fields();
    let candidate = ProfileFields {
        greenflags: Some(vec!["kind".to_string()]),
        ..Default::default()
    };

    let merged = merge(&stored, &candidate, MergePolicy::Overwrite);

    assert_eq!(merged.tags(), vec!["kind"]);
    assert_eq!(changed_fields(&stored, &merged), vec![ProfileField::Greenflags]);
}

#[test]
fn test_completeness_requires_every_field() {
    assert!(is_complete(&complete_fields()));

    let mut partial = complete_fields();
    partial.time_since_single = Some("   ".to_string());
    assert!(!is_complete(&partial));
    assert_eq!(missing_fields(&partial), vec![ProfileField::TimeSinceSingle]);
}

#[test]
fn test_field_statuses_report_completion() {
    let fields = ProfileFields {
        first_name: Some("Ana".to_string()),
        ..Default::default()
    };

    let statuses = field_statuses(&fields);

    assert_eq!(statuses.len(), ProfileField::ALL.len());
    assert!(statuses["first_name"].is_completed);
    assert_eq!(statuses["first_name"].value, serde_json::json!("Ana"));
    assert!(!statuses["greenflags"].is_completed);
    assert!(statuses["greenflags"].value.is_null());
}

#[test]
fn test_threshold_boundary() {
    let matcher = Matcher::default();

    let below = matcher.select_candidate(&id("A"), vec![neighbour("A", 1.0), neighbour("B", 0.65)]);
    assert!(below.is_none());

    let above = matcher.select_candidate(&id("A"), vec![neighbour("A", 1.0), neighbour("B", 0.72)]);
    assert_eq!(above.unwrap().contact_id, id("B"));
}

#[test]
fn test_self_is_never_a_candidate() {
    let matcher = Matcher::default();

    let picked = matcher.select_candidate(&id("A"), vec![neighbour("A", 1.0)]);

    assert!(picked.is_none());
}

#[test]
fn test_best_similarity_wins() {
    let matcher = Matcher::new(3, 0.7);

    let picked = matcher.select_candidate(
        &id("A"),
        vec![neighbour("A", 1.0), neighbour("B", 0.75), neighbour("C", 0.91)],
    );

    assert_eq!(picked.unwrap().contact_id, id("C"));
}

#[test]
fn test_pair_canonical_order() {
    let pair = ContactPair::new(id("+2"), id("+1")).unwrap();

    assert_eq!(pair.low(), &id("+1"));
    assert_eq!(pair.high(), &id("+2"));
    assert!(ContactPair::new(id("+1"), id("+1")).is_none());
}

#[test]
fn test_cosine_similarity_properties() {
    let a = [0.6f32, 0.8];
    let b = [0.8f32, 0.6];

    let ab = cosine_similarity(&a, &b).unwrap();
    let ba = cosine_similarity(&b, &a).unwrap();

    assert_eq!(ab, ba);
    assert!((ab - 0.96).abs() < 1e-6);
    assert!((cosine_similarity(&a, &a).unwrap() - 1.0).abs() < 1e-9);
    assert!(cosine_similarity(&a, &[1.0, 0.0, 0.0]).is_none());
    assert!(cosine_similarity(&a, &[0.0, 0.0]).is_none());
}

#[test]
fn test_extraction_output_becomes_typed_candidate() {
    let output = serde_json::json!({
        "first_name": null,
        "gender": null,
        "year_of_birth": 1990,
        "job_or_education": "nurse",
        "relationship_type": null,
        "dealbreakers": [],
        "greenflags": ["patient"],
        "dating_preferences": null,
        "time_since_single": null
    });

    let fields = parse_extraction(&output.to_string()).unwrap();

    assert_eq!(fields.year_of_birth, Some(1990));
    assert_eq!(fields.tags(), vec!["patient"]);
    assert_eq!(
        missing_fields(&fields),
        vec![
            ProfileField::FirstName,
            ProfileField::Gender,
            ProfileField::RelationshipType,
            ProfileField::Dealbreakers,
            ProfileField::DatingPreferences,
            ProfileField::TimeSinceSingle,
        ]
    );
}
