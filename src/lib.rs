//! Bazaar is the backend of an agricultural marketplace: accounts acting as
//! buyers, sellers or administrators, and moderated listings.

#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
pub mod crypto;
pub mod database;
pub mod error;
pub mod guard;
pub mod identity;
pub mod listing;
mod router;
pub mod telemetry;
pub mod token;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::{get, post};
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

use crate::clock::SystemClock;
use crate::identity::{IdentityService, Registration, Role};
use crate::listing::ListingManager;

const TOKEN_SECRET_ENV: &str = "TOKEN_SECRET";
const ADMIN_PASSWORD_ENV: &str = "ADMIN_PASSWORD";
const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub db: database::Database,
    pub identities: IdentityService,
    pub listings: ListingManager,
    pub token: token::TokenManager,
    pub metrics: Option<PrometheusHandle>,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(
                    |chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                        tracing::trace!(
                            size_bytes = chunk.len(),
                            latency = ?latency,
                            "sending body chunk"
                        )
                    },
                )
                .make_span_with(
                    DefaultMakeSpan::new()
                        .include_headers(true)
                        .level(tracing::Level::INFO),
                )
                .on_request(DefaultOnRequest::new())
                .on_response(
                    DefaultOnResponse::new()
                        .include_headers(true)
                        .latency_unit(LatencyUnit::Micros),
                ),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(10),
        ))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    // Identity resolution for every route that may be authenticated.
    let authenticated = Router::new()
        .nest("/users", router::users::router())
        .nest("/listings", router::listings::router())
        .route_layer(AxumMiddleware::from_fn_with_state(
            state.clone(),
            router::auth,
        ));

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status))
        .route("/metrics", get(router::metrics))
        // `POST /register` goes to `register`.
        .route("/register", post(router::accounts::register))
        // `POST /login` goes to `login`.
        .route("/login", post(router::accounts::login))
        .merge(authenticated)
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state(
    metrics: Option<PrometheusHandle>,
) -> Result<AppState, Box<dyn std::error::Error>> {
    // read configuration file. let it in memory.
    let mut config = config::Configuration::default();
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        config = config.path(path.into());
    }
    let config = config.read()?;

    let db = database::Database::in_memory();

    let pwd = Arc::new(crypto::PasswordManager::new(config.argon2.clone())?);
    let identities = IdentityService::new(Arc::clone(&db.identities), pwd);
    let listings = ListingManager::new(Arc::clone(&db.listings));

    // handle jwt.
    let secret = std::env::var(TOKEN_SECRET_ENV)
        .map_err(|_| format!("missing `{TOKEN_SECRET_ENV}` environment variable"))?;
    let mut token = token::TokenManager::new(
        secret.as_bytes(),
        &config.url,
        config.token.lifetime,
        Arc::new(SystemClock),
    )?;
    if let Some(audience) = &config.token.audience {
        token.audience(audience);
    }

    // create first administrator.
    match (&config.admin, std::env::var(ADMIN_PASSWORD_ENV)) {
        (Some(admin), Ok(password)) => {
            let admin = identities
                .provision(Registration {
                    email: admin.email.clone(),
                    password,
                    phone: admin.phone.clone(),
                    role: Role::Admin,
                })
                .await?;
            tracing::info!(identity_id = %admin.id, "administrator provisioned");
        },
        (Some(_), Err(_)) => tracing::warn!(
            "`admin` entry ignored, missing `{ADMIN_PASSWORD_ENV}` environment variable"
        ),
        (None, _) => tracing::warn!("no administrator configured"),
    }

    Ok(AppState {
        config,
        db,
        identities,
        listings,
        token,
        metrics,
    })
}
