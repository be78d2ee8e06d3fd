use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::ServiceError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(&'static str),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    UnprocessableEntity(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Forbidden(message) => Self::Forbidden(message),
            ServiceError::NotFound(message) => Self::NotFound(message),
            ServiceError::InvalidState(message) => Self::UnprocessableEntity(message),
            ServiceError::Conflict(message) => Self::Conflict(message),
            ServiceError::Validation(message) => Self::BadRequest(message),
            ServiceError::Storage(err) => Self::internal(err, "Storage operation failed"),
        }
    }
}

fn error_body(status: StatusCode, detail: String) -> Response {
    (status, Json(ErrorResponse { status: status.as_u16(), detail })).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(message) => {
                let mut response = error_body(StatusCode::UNAUTHORIZED, message.to_string());
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                response
            }
            ApiError::Forbidden(message) => error_body(StatusCode::FORBIDDEN, message.to_string()),
            ApiError::BadRequest(message) => error_body(StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => error_body(StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => error_body(StatusCode::CONFLICT, message),
            ApiError::UnprocessableEntity(message) => {
                error_body(StatusCode::UNPROCESSABLE_ENTITY, message)
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                error_body(StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_map_to_distinct_statuses() {
        let cases = [
            (ServiceError::Forbidden("no"), StatusCode::FORBIDDEN),
            (ServiceError::not_found("Test"), StatusCode::NOT_FOUND),
            (ServiceError::invalid_state("closed"), StatusCode::UNPROCESSABLE_ENTITY),
            (ServiceError::Conflict("dup".into()), StatusCode::CONFLICT),
            (ServiceError::validation("bad"), StatusCode::BAD_REQUEST),
        ];
        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn unauthorized_carries_bearer_challenge() {
        let response = ApiError::Unauthorized("nope").into_response();
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }
}
