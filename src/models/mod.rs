// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    ContactId, ContactPair, DatingPreferences, Embedding, EmbeddingChange, FieldNameError, Gender,
    InvalidContactId, MatchInsert, MatchRecord, Profile, ProfileField, ProfileFields, ProfilePatch,
    SimilarProfile, PROTECTED_FIELDS,
};
pub use requests::{
    CallEventKind, CallPayload, CallWebhookRequest, InboundCall, InboundCallRequest,
    ProfileChangeRequest, ProfileRecord,
};
pub use responses::{
    field_statuses, ErrorResponse, FieldStatus, HealthResponse, InboundCallResponse,
    MatchUsersResponse, ProfileUpdateResponse,
};
