//! HTTP-facing error kinds and their fixed JSON bodies.
//!
//! Validation and format errors carry structured detail. Authorization and
//! conflict errors carry a fixed message only. Internal errors are logged with
//! their cause inside the request span and reach the client as an opaque message.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{HeaderValue, StatusCode, header::WWW_AUTHENTICATE},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{error, warn};

use super::{
    handlers::{
        ads::price::PRICE_FORMAT_ERROR,
        auth::{principal::AuthError, permission::AuthzError},
    },
    storage::StorageError,
};

pub const INTERNAL_ERROR_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("failed validation")]
    ValidationFailed(BTreeMap<String, String>),
    #[error("{0}")]
    BadRequest(String),
    #[error("invalid price format")]
    InvalidPriceFormat,
    #[error("the requested resource could not be found")]
    NotFound,
    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,
    #[error("invalid or missing authentication token")]
    InvalidToken,
    #[error("you must be authenticated to access this resource")]
    AuthenticationRequired,
    #[error("invalid authentication credentials")]
    InvalidCredentials,
    #[error("your user account must be activated to access this resource")]
    InactiveAccount,
    #[error("your user account doesn't have the necessary permissions to access this resource")]
    NotPermitted,
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("the server encountered a problem and could not process your request")]
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }

    /// Single-field validation failure.
    pub fn invalid_field(field: &str, message: &str) -> Self {
        Self::ValidationFailed(BTreeMap::from([(field.to_string(), message.to_string())]))
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BadRequest(_) | Self::InvalidPriceFormat => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::EditConflict => StatusCode::CONFLICT,
            Self::InvalidToken | Self::AuthenticationRequired | Self::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            Self::InactiveAccount | Self::NotPermitted => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::ValidationFailed(errors) => json!({ "error": errors }),
            Self::Internal(err) => {
                error!(error = format!("{err:#}"), "request failed");
                json!({ "error": INTERNAL_ERROR_MESSAGE })
            }
            other => json!({ "error": other.to_string() }),
        };

        let mut response = (status, Json(body)).into_response();
        if matches!(self, Self::InvalidToken) {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => Self::NotFound,
            StorageError::EditConflict => Self::EditConflict,
            StorageError::DuplicateEmail => {
                Self::invalid_field("email", "a user with this email address already exists")
            }
            other => Self::internal(other),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidToken => Self::InvalidToken,
            AuthError::Storage(err) => Self::internal(err),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::AuthenticationRequired => Self::AuthenticationRequired,
            AuthzError::InactiveAccount => Self::InactiveAccount,
            AuthzError::NotPermitted => Self::NotPermitted,
            AuthzError::Storage(err) => Self::internal(err),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = rejection.body_text();
        if message.contains(PRICE_FORMAT_ERROR) {
            return Self::InvalidPriceFormat;
        }
        warn!(status = %rejection.status(), "rejected request body: {message}");
        Self::BadRequest(message)
    }
}
