//! HTTP glue around the identity and listing services.

pub mod accounts;
pub mod listings;
pub mod users;

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::extract::{
    FromRequest, FromRequestParts, OptionalFromRequestParts, Request, State,
};
use axum::http::header;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use serde::Serialize;
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::AppState;
use crate::config::Configuration;
use crate::error::{Result, ServerError};
use crate::guard;
use crate::identity::{Identity, IdentityId};
use crate::listing::ListingId;

const BEARER: &str = "Bearer ";

/// JSON body checked with [`validator`] before reaching the handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// Identity behind the bearer token of the request.
///
/// Rejects with `401` when the request carries no token.
#[derive(Debug, Clone)]
pub struct Caller(pub Identity);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(Caller)
            .ok_or(ServerError::Unauthenticated)
    }
}

impl<S: Send + Sync> OptionalFromRequestParts<S> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _: &S,
    ) -> std::result::Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<Identity>().cloned().map(Caller))
    }
}

/// Custom middleware for authentification.
///
/// A request without `Authorization` header goes through anonymously. A
/// request with one must carry a valid token of an active identity.
pub async fn auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let token = match req.headers().get(header::AUTHORIZATION) {
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix(BEARER))
            .map(|token| token.trim().to_owned())
            .ok_or(ServerError::Unauthenticated)?,
        None => return Ok(next.run(req).await),
    };

    let identity = guard::authenticate(
        &state.token,
        state.db.identities.as_ref(),
        &token,
    )
    .await?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Parse an identity ID from a path. Malformed IDs do not exist.
fn identity_id(id: &str) -> Result<IdentityId> {
    IdentityId::parse(id).ok_or(ServerError::NotFound {
        resource: "identity",
    })
}

/// Parse a listing ID from a path. Malformed IDs do not exist.
fn listing_id(id: &str) -> Result<ListingId> {
    ListingId::parse(id).ok_or(ServerError::NotFound {
        resource: "listing",
    })
}

/// Structured configuration.
#[derive(Debug, Serialize)]
pub struct Status {
    name: String,
    url: String,
    version: String,
}

/// Public server status.
pub async fn status(State(config): State<Arc<Configuration>>) -> Json<Status> {
    Json(Status {
        name: config.name.clone(),
        url: config.url.clone(),
        version: config.version().to_owned(),
    })
}

/// Prometheus scrape endpoint.
pub async fn metrics(State(state): State<AppState>) -> Result<String> {
    state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .ok_or(ServerError::NotFound { resource: "metrics" })
}
