//! HTTP surface of the listing service.
//!
//! Every request passes, in order: request id, trace span, panic guard,
//! per-client rate limiting, then bearer authentication. Handlers run the
//! permission ladder themselves and mutate listings only through the
//! version-checked update.

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request, StatusCode, header::CONNECTION},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use secrecy::ExposeSecret;
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use std::{any::Any, net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, error, info, info_span};
use ulid::Ulid;

pub mod config;
pub mod error;
pub mod handlers;
pub mod notifier;
mod openapi;
pub mod rate_limit;
pub mod storage;
pub mod validator;


use self::{
    config::{Environment, ServerConfig},
    error::{ApiError, INTERNAL_ERROR_MESSAGE},
    handlers::{
        ads,
        ads::storage::AdStore,
        auth::{
            PermissionGate, TokenAuthenticator,
            principal::authenticate,
            storage::{PermissionStore, UserStore},
        },
        health, tokens, users,
    },
    notifier::{LogNotifier, Notifier},
    rate_limit::{RateLimiter, rate_limit},
    storage::Stores,
};

pub use openapi::openapi;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

const REQUEST_ID_HEADER: &str = "x-request-id";

struct AppStateInner {
    limiter: Arc<RateLimiter>,
    authenticator: TokenAuthenticator,
    gate: PermissionGate,
    stores: Stores,
    notifier: Arc<dyn Notifier>,
    environment: Environment,
}

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

impl AppState {
    #[must_use]
    pub fn new(
        stores: Stores,
        limiter: Arc<RateLimiter>,
        notifier: Arc<dyn Notifier>,
        environment: Environment,
    ) -> Self {
        let authenticator = TokenAuthenticator::new(stores.users.clone(), stores.tokens.clone());
        let gate = PermissionGate::new(stores.permissions.clone());
        Self {
            inner: Arc::new(AppStateInner {
                limiter,
                authenticator,
                gate,
                stores,
                notifier,
                environment,
            }),
        }
    }

    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    #[must_use]
    pub fn authenticator(&self) -> &TokenAuthenticator {
        &self.inner.authenticator
    }

    #[must_use]
    pub fn gate(&self) -> &PermissionGate {
        &self.inner.gate
    }

    #[must_use]
    pub fn ads(&self) -> &dyn AdStore {
        self.inner.stores.ads.as_ref()
    }

    #[must_use]
    pub fn users(&self) -> &dyn UserStore {
        self.inner.stores.users.as_ref()
    }

    #[must_use]
    pub fn permissions(&self) -> &dyn PermissionStore {
        self.inner.stores.permissions.as_ref()
    }

    #[must_use]
    pub fn notifier(&self) -> Arc<dyn Notifier> {
        Arc::clone(&self.inner.notifier)
    }

    #[must_use]
    pub fn environment(&self) -> Environment {
        self.inner.environment
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("limiter", &self.inner.limiter)
            .field("environment", &self.inner.environment)
            .finish_non_exhaustive()
    }
}

/// Build the application router with every middleware layer applied.
pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/v1/healthcheck", get(health::healthcheck))
        .route("/v1/ads", get(ads::list_ads).post(ads::create_ad))
        .route(
            "/v1/ads/:id",
            get(ads::show_ad)
                .patch(ads::update_ad)
                .delete(ads::delete_ad),
        )
        .route("/v1/users", post(users::register_user))
        .route("/v1/users/activated", put(users::activate_user))
        .route(
            "/v1/tokens/authentication",
            post(tokens::create_authentication_token),
        )
        .route("/v1/openapi.json", get(openapi_json))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .with_state(state);
    with_request_layers(routes)
}

/// Request id, trace span and panic guard, outermost first. The panic guard
/// sits inside the span so a caught panic is logged with the request context.
fn with_request_layers<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static(REQUEST_ID_HEADER),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                REQUEST_ID_HEADER,
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(CatchPanicLayer::custom(handle_panic)),
    )
}

/// Start the server
/// # Errors
/// Return error if failed to connect to the database or to start the server
pub async fn new(config: ServerConfig) -> Result<()> {
    let database = config.database();

    // Connect to database
    let pool = PgPoolOptions::new()
        .max_connections(database.max_connections())
        .idle_timeout(database.max_idle())
        .acquire_timeout(database.acquire_timeout())
        .test_before_acquire(true)
        .connect(database.dsn().expose_secret())
        .await
        .context("Failed to connect to database")?;

    info!(
        dsn = %database.redacted_dsn().unwrap_or_else(|_| "<invalid>".to_string()),
        max_connections = database.max_connections(),
        "database connection pool established"
    );

    let limiter = Arc::new(RateLimiter::new(*config.limiter()));
    let sweeper = limiter.spawn_sweeper();

    let state = AppState::new(
        Stores::postgres(pool.clone()),
        limiter,
        Arc::new(LogNotifier),
        config.environment(),
    );
    let app = router(state);

    let listener = TcpListener::bind(format!("::0:{}", config.port())).await?;

    info!(
        environment = %config.environment(),
        "Listening on [::]:{}",
        config.port()
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    pool.close().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        return;
    }
    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        http.target = %request.uri(),
        request_id
    )
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(panic = detail, "request handler panicked");

    let mut response = (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": INTERNAL_ERROR_MESSAGE })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));
    response
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi())
}
