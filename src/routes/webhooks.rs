use actix_web::{web, HttpResponse};
use crate::core::{MatchOutcome, ProfileChangeOutcome};
use crate::error::ServiceError;
use crate::models::{
    CallEventKind, CallWebhookRequest, InboundCallRequest, InboundCallResponse, MatchUsersResponse,
    ProfileChangeRequest,
};
use crate::routes::AppState;

/// Configure the voice-platform and database webhooks
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/update-user-info", web::post().to(update_user_info))
        .route("/get-user-info", web::post().to(get_user_info))
        .route("/match-users", web::post().to(match_users));
}

/// Call-completion webhook
///
/// POST /update-user-info
///
/// Only `call_ended` events are processed. Redeliveries of a processed call
/// are answered with `already_processed` and have no side effects.
async fn update_user_info(
    state: web::Data<AppState>,
    req: web::Json<CallWebhookRequest>,
) -> Result<HttpResponse, ServiceError> {
    let req = req.into_inner();

    if req.event != CallEventKind::CallEnded {
        tracing::info!("Rejecting webhook event {:?} on /update-user-info", req.event);
        return Err(ServiceError::Validation(format!(
            "unsupported event {:?}, expected call_ended",
            req.event
        )));
    }

    let call = req
        .call
        .ok_or_else(|| ServiceError::Validation("call is required".to_string()))?;

    tracing::info!(call_id = %call.call_id, "Received call_ended webhook");

    let outcome = state.sync.process_call_ended(&call).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// Inbound-call webhook
///
/// POST /get-user-info
///
/// Returns what is already known about the caller so the agent can skip
/// those questions. Unknown callers get a fresh empty profile.
async fn get_user_info(
    state: web::Data<AppState>,
    req: web::Json<InboundCallRequest>,
) -> Result<HttpResponse, ServiceError> {
    let req = req.into_inner();

    if req.event != CallEventKind::CallInbound {
        return Err(ServiceError::Validation(format!(
            "unsupported event {:?}, expected call_inbound",
            req.event
        )));
    }

    let call = req
        .call_inbound
        .ok_or_else(|| ServiceError::Validation("call_inbound is required".to_string()))?;

    let statuses = state.sync.inbound_lookup(&call).await?;
    let user_fields = serde_json::to_string(&statuses)
        .map_err(|e| ServiceError::Internal(format!("failed to encode user fields: {}", e)))?;

    tracing::debug!("Returning {} known fields for inbound call", statuses.len());

    Ok(HttpResponse::Ok().json(InboundCallResponse::new(user_fields)))
}

/// Database-change webhook
///
/// POST /match-users
///
/// Fired on every `users` row update. Only a new non-null embedding runs the
/// matcher; repeated deliveries are absorbed by the pair-keyed insert.
async fn match_users(
    state: web::Data<AppState>,
    req: web::Json<ProfileChangeRequest>,
) -> Result<HttpResponse, ServiceError> {
    let response = match state.sync.handle_profile_change(&req).await? {
        ProfileChangeOutcome::NoRelevantChanges => MatchUsersResponse {
            message: "No relevant changes".to_string(),
            match_record: None,
        },
        ProfileChangeOutcome::Matched(MatchOutcome::NoCandidate) => MatchUsersResponse {
            message: "No match found".to_string(),
            match_record: None,
        },
        ProfileChangeOutcome::Matched(MatchOutcome::AlreadyMatched(record)) => MatchUsersResponse {
            message: "Match already exists".to_string(),
            match_record: Some(record),
        },
        ProfileChangeOutcome::Matched(MatchOutcome::Created(record)) => MatchUsersResponse {
            message: "Match created".to_string(),
            match_record: Some(record),
        },
    };

    Ok(HttpResponse::Ok().json(response))
}
