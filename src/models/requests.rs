use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

/// Event discriminator sent by the voice agent platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallEventKind {
    CallStarted,
    CallEnded,
    CallAnalyzed,
    CallInbound,
    #[serde(other)]
    Unknown,
}

/// Call-completion webhook
///
/// ```json
/// {
///   "event": "call_ended",
///   "call": {
///     "call_id": "string",
///     "from_number": "+12137771234",
///     "transcript": "string",
///     "retell_llm_dynamic_variables": {}
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallWebhookRequest {
    pub event: CallEventKind,
    #[serde(default)]
    pub call: Option<CallPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CallPayload {
    #[validate(length(min = 1, message = "call_id is required"))]
    pub call_id: String,
    #[validate(length(min = 1, message = "from_number is required"))]
    pub from_number: String,
    #[serde(default)]
    pub to_number: Option<String>,
    #[validate(length(min = 1, message = "transcript is required"))]
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub retell_llm_dynamic_variables: BTreeMap<String, serde_json::Value>,
}

/// Inbound-call webhook asking for the caller's known profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundCallRequest {
    pub event: CallEventKind,
    #[serde(default)]
    pub call_inbound: Option<InboundCall>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InboundCall {
    #[validate(length(min = 1, message = "from_number is required"))]
    pub from_number: String,
    #[serde(default)]
    pub to_number: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
}

/// Database-change webhook fired when a `users` row is updated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileChangeRequest {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub record: Option<ProfileRecord>,
    #[serde(default)]
    pub old_record: Option<ProfileRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRecord {
    #[serde(default)]
    pub phone_number: Option<String>,
    /// Left untyped: the database renders vectors as strings, clients as arrays
    #[serde(default)]
    pub greenflags_vector_embedding: Option<serde_json::Value>,
}
