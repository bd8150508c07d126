//! JSON error responses.
//!
//! Every failure leaves the server as `{"error": ...}`, where the value is
//! a message string or, for validation failures, a map of field messages.

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::models::Validator;
use crate::security::AdmissionError;
use crate::store::{MutationError, StoreError};

const SERVER_ERROR_MESSAGE: &str = "the server encountered a problem and could not process your request";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("the requested resource could not be found")]
    NotFound,

    #[error("the {0} method is not supported for this resource")]
    MethodNotAllowed(Method),

    #[error("{0}")]
    BadRequest(String),

    #[error("body must not be larger than {0} bytes")]
    PayloadTooLarge(usize),

    #[error("request failed validation")]
    FailedValidation(Validator),

    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("the server is shutting down, please retry shortly")]
    ShuttingDown,

    /// Detail is logged, never sent to the client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::FailedValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::EditConflict => StatusCode::CONFLICT,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::FailedValidation(errors) => json!({ "error": errors }),
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                json!({ "error": SERVER_ERROR_MESSAGE })
            }
            other => json!({ "error": other.to_string() }),
        };

        let mut response = (status, Json(body)).into_response();
        if matches!(self, ApiError::ShuttingDown) {
            response
                .headers_mut()
                .insert(header::CONNECTION, HeaderValue::from_static("close"));
        }
        response
    }
}

impl From<AdmissionError> for ApiError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::KeyExtraction => ApiError::Internal(err.to_string()),
            AdmissionError::RateLimited { .. } => ApiError::RateLimited,
            AdmissionError::ShuttingDown => ApiError::ShuttingDown,
        }
    }
}

impl From<MutationError> for ApiError {
    fn from(err: MutationError) -> Self {
        match err {
            MutationError::Conflict { .. } => ApiError::EditConflict,
            MutationError::NotFound(_) => ApiError::NotFound,
            MutationError::Store(err) => err.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn internal_detail_is_not_leaked() {
        let response = ApiError::Internal("db exploded".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await, json!({ "error": SERVER_ERROR_MESSAGE }));
    }

    #[tokio::test]
    async fn validation_errors_are_a_field_map() {
        let mut v = Validator::new();
        v.add_error("email", "must be provided");
        let response = ApiError::FailedValidation(v).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await, json!({ "error": { "email": "must be provided" } }));
    }

    #[test]
    fn admission_errors_keep_their_meaning() {
        assert_eq!(
            ApiError::from(AdmissionError::KeyExtraction).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(AdmissionError::RateLimited { client: "1.2.3.4".into() }).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::from(AdmissionError::ShuttingDown).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn mutation_errors_map_to_conflict_and_not_found() {
        let conflict = MutationError::Conflict { id: 1, expected_version: 1 };
        assert_eq!(ApiError::from(conflict).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::from(MutationError::NotFound(1)).status(), StatusCode::NOT_FOUND);
    }
}
