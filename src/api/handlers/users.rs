//! Registration and activation.
//!
//! Flow Overview:
//! 1) Register: validate, hash the password, insert an inactive user, grant
//!    `ads:read`, and hand a 3-day activation token to the notifier.
//! 2) Activate: resolve the owner of a live activation token, flip
//!    `activated` through the version-checked update, then revoke every
//!    activation token the user holds.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;
use utoipa::ToSchema;

use super::auth::{
    ADS_READ, Scope,
    password::hash_password,
    storage::{NewUser, User},
    token::validate_plaintext,
};
use crate::api::{
    AppState,
    error::ApiError,
    notifier::{ActivationNotice, dispatch},
    validator::{Validator, valid_email},
};

pub const ACTIVATION_TOKEN_TTL: Duration = Duration::from_secs(3 * 24 * 60 * 60);
const NAME_MAX_BYTES: usize = 500;
const PASSWORD_MIN_BYTES: usize = 8;
const PASSWORD_MAX_BYTES: usize = 72;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RegisterUserRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ActivateUserRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserEnvelope {
    pub user: User,
}

/// Emails are compared and stored in this form.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(valid_email(email), "email", "must be a valid email address");
}

pub fn validate_password(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(
        password.len() >= PASSWORD_MIN_BYTES,
        "password",
        "must be at least 8 bytes long",
    );
    v.check(
        password.len() <= PASSWORD_MAX_BYTES,
        "password",
        "must not be more than 72 bytes long",
    );
}

fn validate_registration(v: &mut Validator, name: &str, email: &str, password: &str) {
    v.check(!name.is_empty(), "name", "must be provided");
    v.check(
        name.len() <= NAME_MAX_BYTES,
        "name",
        "must not be more than 500 bytes long",
    );
    validate_email(v, email);
    validate_password(v, password);
}

#[utoipa::path(
    post,
    path = "/v1/users",
    request_body = RegisterUserRequest,
    responses(
        (status = 202, description = "User created; activation notice queued.", body = UserEnvelope),
        (status = 400, description = "Malformed body."),
        (status = 422, description = "Validation failed or email already registered."),
    ),
    tag = "users"
)]
pub async fn register_user(
    State(state): State<AppState>,
    payload: Result<Json<RegisterUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserEnvelope>), ApiError> {
    let Json(request) = payload?;
    let email = normalize_email(&request.email);

    let mut v = Validator::new();
    validate_registration(&mut v, &request.name, &email, &request.password);
    v.finish()?;

    let password_hash = hash_password(request.password)
        .await
        .map_err(ApiError::internal)?;

    let user = state
        .users()
        .insert(&NewUser {
            name: request.name,
            email,
            password_hash,
        })
        .await?;

    state.permissions().add_for_user(user.id, &[ADS_READ]).await?;

    let token = state
        .authenticator()
        .issue(user.id, ACTIVATION_TOKEN_TTL, Scope::Activation)
        .await
        .map_err(ApiError::internal)?;

    dispatch(
        state.notifier(),
        ActivationNotice {
            user_id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            token: token.plaintext,
        },
    );

    info!(user_id = user.id, "user registered");
    Ok((StatusCode::ACCEPTED, Json(UserEnvelope { user })))
}

#[utoipa::path(
    put,
    path = "/v1/users/activated",
    request_body = ActivateUserRequest,
    responses(
        (status = 200, description = "User activated.", body = UserEnvelope),
        (status = 409, description = "Edit conflict."),
        (status = 422, description = "Invalid or expired activation token."),
    ),
    tag = "users"
)]
pub async fn activate_user(
    State(state): State<AppState>,
    payload: Result<Json<ActivateUserRequest>, JsonRejection>,
) -> Result<Json<UserEnvelope>, ApiError> {
    let Json(request) = payload?;

    let mut v = Validator::new();
    validate_plaintext(&mut v, &request.token);
    v.finish()?;

    let mut user = state
        .authenticator()
        .resolve(Scope::Activation, &request.token)
        .await?
        .ok_or_else(|| ApiError::invalid_field("token", "invalid or expired activation token"))?;

    user.activated = true;
    user.version = state.users().update(&user).await?;

    state
        .authenticator()
        .revoke_all(Scope::Activation, user.id)
        .await?;

    info!(user_id = user.id, "user activated");
    Ok(Json(UserEnvelope { user }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn errors(name: &str, email: &str, password: &str) -> Vec<String> {
        let mut v = Validator::new();
        validate_registration(&mut v, name, email, password);
        match v.finish() {
            Ok(()) => Vec::new(),
            Err(ApiError::ValidationFailed(errors)) => errors.into_keys().collect(),
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn registration_rules() {
        assert!(errors("Ada", "ada@example.com", "pa55word!").is_empty());
        assert_eq!(errors("", "ada@example.com", "pa55word!"), vec!["name"]);
        assert_eq!(errors("Ada", "ada", "pa55word!"), vec!["email"]);
        assert_eq!(errors("Ada", "ada@example.com", "short"), vec!["password"]);
        assert_eq!(
            errors("Ada", "ada@example.com", &"p".repeat(73)),
            vec!["password"]
        );
        assert_eq!(
            errors(&"n".repeat(501), "", ""),
            vec!["email", "name", "password"]
        );
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
    }
}
