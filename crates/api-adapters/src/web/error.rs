use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use domains::DomainError;
use serde::{Deserialize, Serialize};
use tracing::error;

/// JSON error payload: `{ "error": "...", "field": "slug" }`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Debug)]
pub enum ApiError {
    Domain(DomainError),
    /// Neither the socket nor a trusted header gave a client address.
    UnknownClient,
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self::Domain(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            Self::Domain(err) => err,
            Self::UnknownClient => {
                let body = ErrorBody {
                    error: "client address unavailable".into(),
                    field: None,
                };
                return (StatusCode::BAD_REQUEST, Json(body)).into_response();
            }
        };

        let (status, field) = match &err {
            DomainError::Validation { field, .. } => (StatusCode::UNPROCESSABLE_ENTITY, Some(*field)),
            DomainError::Conflict(constraint) => (StatusCode::CONFLICT, Some(constraint.field())),
            DomainError::Referential(_) => (StatusCode::CONFLICT, None),
            DomainError::Auth => (StatusCode::UNAUTHORIZED, None),
            DomainError::Challenge(_) => (StatusCode::FORBIDDEN, None),
            DomainError::NotFound { .. } => (StatusCode::NOT_FOUND, None),
            DomainError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %err, "request failed");
            "internal error".to_string()
        } else {
            err.to_string()
        };

        let body = ErrorBody {
            error: message,
            field: field.map(str::to_string),
        };
        (status, Json(body)).into_response()
    }
}
