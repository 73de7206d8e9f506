use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use crate::models::domain::{MatchRecord, Profile, ProfileField, ProfileFields};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

/// Value of one tracked field plus whether it is filled in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldStatus {
    pub value: serde_json::Value,
    pub is_completed: bool,
}

/// Per-field completion map handed to the voice agent
pub fn field_statuses(fields: &ProfileFields) -> BTreeMap<&'static str, FieldStatus> {
    let object = match serde_json::to_value(fields) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };

    ProfileField::ALL
        .iter()
        .map(|field| {
            let value = object
                .get(field.name())
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            let is_completed = crate::core::merge::is_field_present(fields, *field);
            (field.name(), FieldStatus { value, is_completed })
        })
        .collect()
}

/// Response to the inbound-call webhook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundCallResponse {
    pub call_inbound: InboundDynamicVariables,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundDynamicVariables {
    pub dynamic_variables: UserFieldsVariable,
}

/// Dynamic variables must be strings, so the field map travels JSON-encoded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserFieldsVariable {
    #[serde(rename = "userFields")]
    pub user_fields: String,
}

impl InboundCallResponse {
    pub fn new(user_fields: String) -> Self {
        Self {
            call_inbound: InboundDynamicVariables {
                dynamic_variables: UserFieldsVariable { user_fields },
            },
        }
    }
}

/// Response to the profile-change webhook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchUsersResponse {
    pub message: String,
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub match_record: Option<MatchRecord>,
}

/// Response to a named-field profile update
#[derive(Debug, Clone, Serialize)]
pub struct ProfileUpdateResponse {
    pub profile: Profile,
    pub updated_fields: Vec<&'static str>,
    pub embedding_updated: bool,
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub match_record: Option<MatchRecord>,
}
