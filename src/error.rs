use crate::core::extraction::ExtractionError;
use crate::core::merge::MergeRequestError;
use crate::models::{ErrorResponse, FieldNameError, InvalidContactId};
use crate::services::traits::{IdempotencyError, StoreError};
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

/// Request-level error, rendered as an [`ErrorResponse`]
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("field '{0}' is protected and cannot be updated")]
    ProtectedField(String),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Idempotency(#[from] IdempotencyError),

    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable error name used in response bodies
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "ValidationError",
            ServiceError::NotFound(_) => "NotFoundError",
            ServiceError::ProtectedField(_) => "ProtectedFieldError",
            ServiceError::Extraction(_) => "UpstreamError",
            ServiceError::Store(_) | ServiceError::Idempotency(_) | ServiceError::Internal(_) => "InternalError",
        }
    }
}

impl From<InvalidContactId> for ServiceError {
    fn from(err: InvalidContactId) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl From<MergeRequestError> for ServiceError {
    fn from(err: MergeRequestError) -> Self {
        match err {
            MergeRequestError::Field(FieldNameError::Protected(name)) => ServiceError::ProtectedField(name),
            other => ServiceError::Validation(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ServiceError::Validation(errors.to_string())
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) | ServiceError::ProtectedField(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        HttpResponse::build(status).json(ErrorResponse {
            error: self.kind().to_string(),
            message: self.to_string(),
            status_code: status.as_u16(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::traits::UpstreamError;

    #[test]
    fn test_status_codes() {
        assert_eq!(ServiceError::Validation("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ServiceError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ServiceError::from(MergeRequestError::Field(FieldNameError::Protected("revision".into()))).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::from(ExtractionError::UpstreamUnavailable(UpstreamError::Timeout)).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_protected_field_kind() {
        let err = ServiceError::from(MergeRequestError::Field(FieldNameError::Protected("phone_number".into())));
        assert_eq!(err.kind(), "ProtectedFieldError");

        let err = ServiceError::from(MergeRequestError::Field(FieldNameError::Unknown("height".into())));
        assert_eq!(err.kind(), "ValidationError");
    }
}
