//! Users-related HTTP API.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::Result;
use crate::identity::{Identity, Role};
use crate::router::{Caller, identity_id};

#[derive(Debug, Serialize, Deserialize)]
pub struct RoleBody {
    pub role: Role,
}

/// Caller's own account.
async fn me(Caller(identity): Caller) -> Json<Identity> {
    Json(identity)
}

/// Switch the role the caller acts as.
async fn switch_role(
    State(state): State<AppState>,
    Caller(identity): Caller,
    Json(body): Json<RoleBody>,
) -> Result<Json<Identity>> {
    let identity = state
        .identities
        .switch_active_role(&identity, body.role)
        .await?;

    Ok(Json(identity))
}

/// Let the caller sell.
async fn become_seller(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> Result<Json<Identity>> {
    Ok(Json(state.identities.upgrade_to_seller(&identity).await?))
}

async fn grant_role(
    State(state): State<AppState>,
    Caller(admin): Caller,
    Path(id): Path<String>,
    Json(body): Json<RoleBody>,
) -> Result<Json<Identity>> {
    let identity = state
        .identities
        .grant_role(&admin, &identity_id(&id)?, body.role)
        .await?;

    Ok(Json(identity))
}

async fn deactivate(
    State(state): State<AppState>,
    Caller(admin): Caller,
    Path(id): Path<String>,
) -> Result<Json<Identity>> {
    let identity = state
        .identities
        .deactivate(&admin, &identity_id(&id)?)
        .await?;

    Ok(Json(identity))
}

async fn reactivate(
    State(state): State<AppState>,
    Caller(admin): Caller,
    Path(id): Path<String>,
) -> Result<Json<Identity>> {
    let identity = state
        .identities
        .reactivate(&admin, &identity_id(&id)?)
        .await?;

    Ok(Json(identity))
}

async fn remove(
    State(state): State<AppState>,
    Caller(admin): Caller,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.identities.remove(&admin, &identity_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<AppState> {
    Router::new()
        // `GET /users/@me` goes to `me`.
        .route("/@me", get(me))
        .route("/@me/role", patch(switch_role))
        .route("/@me/seller", post(become_seller))
        // Administration.
        .route("/{id}/roles", post(grant_role))
        .route("/{id}/deactivate", post(deactivate))
        .route("/{id}/reactivate", post(reactivate))
        .route("/{id}", delete(remove))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::identity::Role;
    use crate::router::tests::{json, make_request, signed_in, state};
    use crate::*;

    #[tokio::test]
    async fn test_upgrade_then_switch_role() {
        let state = state();
        let app = app(state.clone());
        let (_, token) =
            signed_in(&state, "buyer@market.example.com", Role::Buyer).await;

        let response = make_request(
            Some(&token),
            app.clone(),
            Method::PATCH,
            "/users/@me/role",
            json!({ "role": "seller" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = make_request(
            Some(&token),
            app.clone(),
            Method::POST,
            "/users/@me/seller",
            String::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = make_request(
            Some(&token),
            app.clone(),
            Method::PATCH,
            "/users/@me/role",
            json!({ "role": "seller" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = make_request(
            Some(&token),
            app,
            Method::GET,
            "/users/@me",
            String::new(),
        )
        .await;
        let body = json(response).await;
        assert_eq!(body["roles"]["active"], "seller");
        assert_eq!(body["roles"]["primary"], "buyer");
    }

    #[tokio::test]
    async fn test_admin_routes() {
        let state = state();
        let app = app(state.clone());
        let (_, admin) =
            signed_in(&state, "root@market.example.com", Role::Admin).await;
        let (buyer, token) =
            signed_in(&state, "buyer@market.example.com", Role::Buyer).await;

        // A buyer cannot administrate.
        let response = make_request(
            Some(&token),
            app.clone(),
            Method::POST,
            &format!("/users/{}/roles", buyer.id),
            json!({ "role": "admin" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = make_request(
            Some(&admin),
            app.clone(),
            Method::POST,
            &format!("/users/{}/roles", buyer.id),
            json!({ "role": "seller" }).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["roles"]["granted"], json!(["buyer", "seller"]));

        let response = make_request(
            Some(&admin),
            app.clone(),
            Method::DELETE,
            &format!("/users/{}", buyer.id),
            String::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        // Token outlives the account, but not its use.
        let response = make_request(
            Some(&token),
            app.clone(),
            Method::GET,
            "/users/@me",
            String::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = make_request(
            Some(&admin),
            app,
            Method::POST,
            "/users/not-an-id/reactivate",
            String::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
