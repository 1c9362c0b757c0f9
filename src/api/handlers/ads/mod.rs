//! Listing endpoints.
//!
//! Flow Overview:
//! 1) Authorize the principal for `ads:read` or `ads:write`.
//! 2) Decode and validate the body or query string.
//! 3) Read, then write through the version-checked update for mutations.

pub mod filters;
pub mod price;
pub mod storage;
pub mod types;

use axum::{
    Json,
    extract::{Extension, Path, Query, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header::LOCATION},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};
use utoipa::ToSchema;

use self::{
    filters::{AdQuery, Metadata},
    types::{Ad, CreateAdRequest, UpdateAdRequest, validate_ad},
};
use super::auth::{ADS_READ, ADS_WRITE, Principal};
use crate::api::{AppState, error::ApiError, validator::Validator};

pub const EXPECTED_VERSION_HEADER: &str = "x-expected-version";

#[derive(Debug, Serialize, ToSchema)]
pub struct AdEnvelope {
    pub ad: Ad,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdsEnvelope {
    pub ads: Vec<Ad>,
    pub metadata: Metadata,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageEnvelope {
    pub message: String,
}

/// Ids come from the path as text; anything that is not a positive integer is
/// reported as a missing resource.
fn parse_id(raw: &str) -> Result<i64, ApiError> {
    match raw.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(ApiError::NotFound),
    }
}

#[utoipa::path(
    get,
    path = "/v1/ads/{id}",
    params(("id" = i64, Path, description = "Listing id")),
    responses(
        (status = 200, description = "The listing.", body = AdEnvelope),
        (status = 401, description = "Missing or invalid token."),
        (status = 403, description = "Inactive account or missing ads:read."),
        (status = 404, description = "No such listing."),
    ),
    security(("bearer" = [])),
    tag = "ads"
)]
pub async fn show_ad(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<AdEnvelope>, ApiError> {
    state.gate().authorize(&principal, ADS_READ).await?;
    let id = parse_id(&id)?;
    let ad = state.ads().get(id).await?;
    Ok(Json(AdEnvelope { ad }))
}

#[utoipa::path(
    get,
    path = "/v1/ads",
    params(
        ("title" = Option<String>, Query, description = "Full-text match on the title"),
        ("categories" = Option<String>, Query, description = "Comma separated; all must be present"),
        ("page" = Option<i64>, Query, description = "1..=10000000, default 1"),
        ("page_size" = Option<i64>, Query, description = "1..=100, default 20"),
        ("sort" = Option<String>, Query, description = "id, title, price; prefix with - for descending"),
    ),
    responses(
        (status = 200, description = "Matching listings.", body = AdsEnvelope),
        (status = 422, description = "Invalid query parameters."),
    ),
    security(("bearer" = [])),
    tag = "ads"
)]
pub async fn list_ads(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<AdsEnvelope>, ApiError> {
    state.gate().authorize(&principal, ADS_READ).await?;

    let mut v = Validator::new();
    let query = AdQuery::parse(&params, &mut v);
    v.finish()?;

    let (ads, metadata) = state
        .ads()
        .list(&query.title, &query.categories, &query.filters)
        .await?;
    debug!(count = ads.len(), page = query.filters.page, "listed ads");
    Ok(Json(AdsEnvelope { ads, metadata }))
}

#[utoipa::path(
    post,
    path = "/v1/ads",
    request_body = CreateAdRequest,
    responses(
        (status = 201, description = "Listing created.", body = AdEnvelope),
        (status = 400, description = "Malformed body or price."),
        (status = 422, description = "Validation failed."),
    ),
    security(("bearer" = [])),
    tag = "ads"
)]
pub async fn create_ad(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<CreateAdRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let user = state.gate().authorize(&principal, ADS_WRITE).await?;
    let Json(request) = payload?;

    let categories_provided = request.categories.is_some();
    let mut ad = Ad::draft(
        request.title,
        request.description,
        request.categories.unwrap_or_default(),
        request.price,
    );

    let mut v = Validator::new();
    validate_ad(&mut v, &ad, categories_provided);
    v.finish()?;

    state.ads().insert(&mut ad).await?;
    info!(ad_id = ad.id, user_id = user.id, "ad created");

    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&format!("/v1/ads/{}", ad.id)) {
        headers.insert(LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(AdEnvelope { ad })).into_response())
}

#[utoipa::path(
    patch,
    path = "/v1/ads/{id}",
    params(
        ("id" = i64, Path, description = "Listing id"),
        ("X-Expected-Version" = Option<i32>, Header, description = "Reject unless the stored version matches"),
    ),
    request_body = UpdateAdRequest,
    responses(
        (status = 200, description = "Listing updated.", body = AdEnvelope),
        (status = 404, description = "No such listing."),
        (status = 409, description = "Edit conflict."),
        (status = 422, description = "Validation failed."),
    ),
    security(("bearer" = [])),
    tag = "ads"
)]
pub async fn update_ad(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<UpdateAdRequest>, JsonRejection>,
) -> Result<Json<AdEnvelope>, ApiError> {
    let user = state.gate().authorize(&principal, ADS_WRITE).await?;
    let id = parse_id(&id)?;
    let mut ad = state.ads().get(id).await?;

    if let Some(expected) = headers.get(EXPECTED_VERSION_HEADER) {
        if expected.as_bytes() != ad.version.to_string().as_bytes() {
            return Err(ApiError::EditConflict);
        }
    }

    let Json(request) = payload?;
    request.apply(&mut ad);

    let mut v = Validator::new();
    validate_ad(&mut v, &ad, true);
    v.finish()?;

    ad.version = state.ads().update(&ad).await?;
    info!(ad_id = ad.id, version = ad.version, user_id = user.id, "ad updated");
    Ok(Json(AdEnvelope { ad }))
}

#[utoipa::path(
    delete,
    path = "/v1/ads/{id}",
    params(("id" = i64, Path, description = "Listing id")),
    responses(
        (status = 200, description = "Listing deleted.", body = MessageEnvelope),
        (status = 404, description = "No such listing."),
    ),
    security(("bearer" = [])),
    tag = "ads"
)]
pub async fn delete_ad(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<MessageEnvelope>, ApiError> {
    let user = state.gate().authorize(&principal, ADS_WRITE).await?;
    // Out-of-range ids are left to the store, which rejects them without a statement.
    let id = id.parse::<i64>().map_err(|_| ApiError::NotFound)?;
    state.ads().delete(id).await?;
    info!(ad_id = id, user_id = user.id, "ad deleted");
    Ok(Json(MessageEnvelope {
        message: "ad successfully deleted".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_must_be_positive_integers() {
        assert!(matches!(parse_id("12"), Ok(12)));
        for raw in ["0", "-1", "abc", "1.5", ""] {
            assert!(matches!(parse_id(raw), Err(ApiError::NotFound)), "{raw}");
        }
    }
}
