use crate::models::{ProfileField, ProfileFields};
use crate::services::traits::{CompletionService, StructuredPrompt, UpstreamError};
use schemars::schema_for;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

const SCHEMA_NAME: &str = "user_profile";

const SYSTEM_INSTRUCTION: &str = "You extract dating profile information from phone call transcripts. \
Only report facts the caller stated explicitly in the transcript or that appear in the call variables. \
Use null for anything that was not mentioned.";

const DATING_PREFERENCE_KEYS: &[&str] = &["minAge", "maxAge", "gender"];

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("extraction output violates schema: {0}")]
    SchemaViolation(String),

    #[error("extraction service unavailable: {0}")]
    UpstreamUnavailable(#[from] UpstreamError),
}

impl ExtractionError {
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionError::SchemaViolation(_) => "schema_violation",
            ExtractionError::UpstreamUnavailable(_) => "upstream_unavailable",
        }
    }
}

/// Strict JSON schema for [`ProfileFields`]
///
/// Structured output in strict mode needs every object closed
/// (`additionalProperties: false`), every property listed as required and
/// no `$ref`s, so the derived schema is rewritten accordingly.
pub fn profile_schema() -> &'static Value {
    static SCHEMA: OnceLock<Value> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        let mut schema = serde_json::to_value(schema_for!(ProfileFields)).unwrap_or_default();

        let definitions = schema
            .as_object_mut()
            .and_then(|map| map.remove("definitions"))
            .unwrap_or(Value::Null);
        inline_refs(&mut schema, &definitions);
        close_objects(&mut schema);

        if let Value::Object(map) = &mut schema {
            map.remove("$schema");
            map.remove("title");
        }
        schema
    })
}

fn inline_refs(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            let target = map
                .get("$ref")
                .and_then(Value::as_str)
                .and_then(|r| r.strip_prefix("#/definitions/"))
                .and_then(|name| definitions.get(name))
                .cloned();

            if let Some(mut resolved) = target {
                inline_refs(&mut resolved, definitions);
                *value = resolved;
                return;
            }

            for v in map.values_mut() {
                inline_refs(v, definitions);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                inline_refs(item, definitions);
            }
        }
        _ => {}
    }
}

fn close_objects(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("format");
            map.remove("title");

            if let Some(Value::Object(props)) = map.get("properties") {
                let required: Vec<Value> = props.keys().cloned().map(Value::String).collect();
                map.insert("required".to_string(), Value::Array(required));
                map.insert("additionalProperties".to_string(), Value::Bool(false));
            }

            for v in map.values_mut() {
                close_objects(v);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                close_objects(item);
            }
        }
        _ => {}
    }
}

fn require_exact_keys(object: &Map<String, Value>, expected: &[&str], path: &str) -> Result<(), ExtractionError> {
    if let Some(missing) = expected.iter().find(|k| !object.contains_key(**k)) {
        return Err(ExtractionError::SchemaViolation(format!("{}missing key '{}'", path, missing)));
    }
    if let Some(extra) = object.keys().find(|k| !expected.contains(&k.as_str())) {
        return Err(ExtractionError::SchemaViolation(format!("{}unexpected key '{}'", path, extra)));
    }
    Ok(())
}

/// Validate raw model output and convert it into a typed candidate
pub fn parse_extraction(content: &str) -> Result<ProfileFields, ExtractionError> {
    let value: Value = serde_json::from_str(content)
        .map_err(|e| ExtractionError::SchemaViolation(format!("not valid JSON: {}", e)))?;

    let object = value
        .as_object()
        .ok_or_else(|| ExtractionError::SchemaViolation("expected a JSON object".to_string()))?;

    let names: Vec<&str> = ProfileField::ALL.iter().map(|f| f.name()).collect();
    require_exact_keys(object, &names, "")?;

    if let Some(Value::Object(preferences)) = object.get(ProfileField::DatingPreferences.name()) {
        require_exact_keys(preferences, DATING_PREFERENCE_KEYS, "dating_preferences: ")?;
    }

    serde_json::from_value(value).map_err(|e| ExtractionError::SchemaViolation(e.to_string()))
}

fn render_user_message(transcript: &str, context: &BTreeMap<String, Value>) -> String {
    let variables = serde_json::to_string_pretty(context).unwrap_or_else(|_| "{}".to_string());
    format!(
        "Call variables:\n{}\n\nTranscript:\n{}\n\nReturn the caller's profile in the response format.",
        variables, transcript
    )
}

/// Turns a call transcript into candidate profile fields
#[derive(Clone)]
pub struct ProfileExtractor {
    service: Arc<dyn CompletionService>,
}

impl ProfileExtractor {
    pub fn new(service: Arc<dyn CompletionService>) -> Self {
        Self { service }
    }

    /// One structured-generation call, no retry
    pub async fn extract(
        &self,
        transcript: &str,
        context: &BTreeMap<String, Value>,
    ) -> Result<ProfileFields, ExtractionError> {
        let prompt = StructuredPrompt {
            system: SYSTEM_INSTRUCTION.to_string(),
            user: render_user_message(transcript, context),
            schema_name: SCHEMA_NAME.to_string(),
            schema: profile_schema().clone(),
        };

        let started = std::time::Instant::now();
        let content = self.service.complete_json(&prompt).await?;
        let candidate = parse_extraction(&content)?;

        tracing::debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            fields_found = ProfileField::ALL.len() - crate::core::merge::missing_fields(&candidate).len(),
            "Extracted candidate profile"
        );

        Ok(candidate)
    }
}
