use actix_web::{web, HttpResponse, Responder};
use crate::core::MatchOutcome;
use crate::error::ServiceError;
use crate::models::{ContactId, HealthResponse, ProfileUpdateResponse};
use crate::routes::AppState;

/// Configure profile and health routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/users/{contact_id}", web::get().to(get_user))
        .route("/users/{contact_id}", web::patch().to(update_user));
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let store_healthy = state.sync.health_check().await;

    let status = if store_healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// GET /api/v1/users/{contact_id}
async fn get_user(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let contact = ContactId::parse(&path)?;
    let profile = state.sync.get_profile(&contact).await?;
    Ok(HttpResponse::Ok().json(profile))
}

/// Update named profile fields
///
/// PATCH /api/v1/users/{contact_id}
///
/// Request body:
/// ```json
/// {
///   "job_or_education": "doctor",
///   "greenflags": ["kind", "curious"]
/// }
/// ```
///
/// Present values replace stored ones. Protected and unknown field names are
/// rejected before anything is written.
async fn update_user(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<serde_json::Map<String, serde_json::Value>>,
) -> Result<HttpResponse, ServiceError> {
    let contact = ContactId::parse(&path)?;

    let applied = state.sync.update_profile(&contact, &req).await?;

    tracing::info!(
        contact_id = %contact,
        updated = applied.changed.len(),
        embedding_updated = applied.embedding_updated,
        "Profile updated"
    );

    Ok(HttpResponse::Ok().json(ProfileUpdateResponse {
        updated_fields: applied.changed.iter().map(|f| f.name()).collect(),
        embedding_updated: applied.embedding_updated,
        match_record: match applied.match_outcome {
            Some(MatchOutcome::Created(record)) => Some(record),
            _ => None,
        },
        profile: applied.profile,
    }))
}
