//! Account opening and login.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use validator::Validate;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::AppState;
use crate::error::Result;
use crate::identity::{Identity, Registration, Role};
use crate::router::Valid;

pub const TOKEN_TYPE: &str = "Bearer";

#[derive(Debug, Serialize, Deserialize, Validate, Zeroize, ZeroizeOnDrop)]
pub struct RegisterBody {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(
        min = 8,
        max = 255,
        message = "Password must contain between 8 and 255 characters."
    ))]
    pub password: String,
    pub phone: String,
    #[zeroize(skip)]
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize, Validate, Zeroize, ZeroizeOnDrop)]
pub struct LoginBody {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub token_type: &'static str,
    pub token: String,
    pub expires_in: u64,
    pub identity: Identity,
}

fn session(state: &AppState, identity: Identity) -> Result<Json<Response>> {
    Ok(Json(Response {
        token_type: TOKEN_TYPE,
        token: state.token.issue(&identity)?,
        expires_in: state.token.lifetime(),
        identity,
    }))
}

/// Handler to open a buyer or seller account.
pub async fn register(
    State(state): State<AppState>,
    Valid(body): Valid<RegisterBody>,
) -> Result<(StatusCode, Json<Response>)> {
    let identity = state
        .identities
        .register(Registration {
            email: body.email.clone(),
            password: body.password.clone(),
            phone: body.phone.clone(),
            role: body.role,
        })
        .await?;

    Ok((StatusCode::CREATED, session(&state, identity)?))
}

/// Handler to exchange credentials for a session token.
pub async fn login(
    State(state): State<AppState>,
    Valid(body): Valid<LoginBody>,
) -> Result<Json<Response>> {
    let identity = state
        .identities
        .authenticate(&body.email, &body.password)
        .await?;

    session(&state, identity)
}
