//! HTTP error mapping.
use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::storage::StorageError;

pub const BASIC_CHALLENGE: &str = r#"Basic realm="admin""#;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    /// Missing or wrong admin credentials; `challenge` adds a Basic auth prompt.
    #[error("Unauthorized")]
    Unauthorized { challenge: bool },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(format!("Invalid JSON body: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Unauthorized { .. } => (StatusCode::UNAUTHORIZED, "Unauthorized".into()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Self::Storage(err) => {
                log::error!("Storage error: {err}");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            Self::Internal(msg) => {
                log::error!("Internal error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".into())
            }
        };

        let mut response = (status, Json(json!({ "error": message }))).into_response();
        if matches!(self, Self::Unauthorized { challenge: true }) {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(BASIC_CHALLENGE),
            );
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_challenge_is_attached_only_when_requested() {
        let response = ApiError::Unauthorized { challenge: true }.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[header::WWW_AUTHENTICATE],
            BASIC_CHALLENGE
        );

        let response = ApiError::Unauthorized { challenge: false }.into_response();
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());
    }

    #[test]
    fn statuses_follow_the_variant() {
        assert_eq!(
            ApiError::bad_request("nope").into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Conflict("superseded".into()).into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Internal("boom".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
