use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::api::{AppState, GIT_COMMIT_HASH};

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct SystemInfo {
    status: String,
    environment: String,
    version: String,
    commit: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    system_info: SystemInfo,
}

#[utoipa::path(
    get,
    path = "/v1/healthcheck",
    responses(
        (status = 200, description = "Service is available", body = Health),
        (status = 429, description = "Rate limit exceeded"),
    ),
    tag = "health"
)]
// axum handler for healthcheck
pub async fn healthcheck(State(state): State<AppState>) -> impl IntoResponse {
    let health = Health {
        system_info: SystemInfo {
            status: "available".to_string(),
            environment: state.environment().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            commit: GIT_COMMIT_HASH.to_string(),
        },
    };

    let short_hash = health.system_info.commit.get(0..7).unwrap_or("");

    let headers = format!(
        "{}:{}:{}",
        env!("CARGO_PKG_NAME"),
        health.system_info.version,
        short_hash
    )
    .parse::<HeaderValue>()
    .map(|x_app_header_value| {
        debug!("X-App header: {:?}", x_app_header_value);

        let mut headers = HeaderMap::new();

        headers.insert("X-App", x_app_header_value);

        headers
    })
    .map_err(|err| {
        error!("Failed to parse X-App header: {}", err);
    });

    // Unwrap the headers or provide a default value (empty headers) in case of an error
    let headers = headers.unwrap_or_else(|()| HeaderMap::new());

    (headers, Json(health))
}
