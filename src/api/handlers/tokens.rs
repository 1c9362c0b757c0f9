//! Authentication token issuance.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};
use utoipa::ToSchema;

use super::{
    auth::{Scope, password::verify_password},
    users::{normalize_email, validate_email, validate_password},
};
use crate::api::{AppState, error::ApiError, validator::Validator};

pub const AUTHENTICATION_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateTokenRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IssuedToken {
    pub token: String,
    pub expiry: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenEnvelope {
    pub authentication_token: IssuedToken,
}

#[utoipa::path(
    post,
    path = "/v1/tokens/authentication",
    request_body = CreateTokenRequest,
    responses(
        (status = 201, description = "Token issued; the plaintext is only shown here.", body = TokenEnvelope),
        (status = 401, description = "Invalid credentials."),
        (status = 422, description = "Validation failed."),
    ),
    tag = "tokens"
)]
pub async fn create_authentication_token(
    State(state): State<AppState>,
    payload: Result<Json<CreateTokenRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TokenEnvelope>), ApiError> {
    let Json(request) = payload?;
    let email = normalize_email(&request.email);

    let mut v = Validator::new();
    validate_email(&mut v, &email);
    validate_password(&mut v, &request.password);
    v.finish()?;

    let Some(user) = state.users().get_by_email(&email).await? else {
        warn!("authentication attempt for unknown email");
        return Err(ApiError::InvalidCredentials);
    };

    let matches = verify_password(request.password, user.password_hash.clone())
        .await
        .map_err(ApiError::internal)?;
    if !matches {
        warn!(user_id = user.id, "authentication attempt with wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    let token = state
        .authenticator()
        .issue(user.id, AUTHENTICATION_TOKEN_TTL, Scope::Authentication)
        .await
        .map_err(ApiError::internal)?;

    info!(user_id = user.id, "authentication token issued");
    Ok((
        StatusCode::CREATED,
        Json(TokenEnvelope {
            authentication_token: IssuedToken {
                token: token.plaintext.expose_secret().to_string(),
                expiry: token.expiry,
            },
        }),
    ))
}
