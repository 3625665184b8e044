//! Error handler for bazaar.

use std::fmt;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use validator::{ValidationError, ValidationErrors};

use crate::identity::Role;
use crate::listing::ModerationStatus;

pub type Result<T> = std::result::Result<T, ServerError>;

/// What an operation expected from its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Effective or granted role must be one of these.
    AnyOf(Vec<Role>),
    /// Effective role must be exactly this one.
    EffectiveRole(Role),
    /// Caller must own the resource.
    Owner,
    /// Caller must own the resource or be an administrator.
    OwnerOrAdmin,
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::AnyOf(roles) => {
                let roles = roles
                    .iter()
                    .map(Role::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "one of [{roles}]")
            },
            Requirement::EffectiveRole(role) => write!(f, "acting as {role}"),
            Requirement::Owner => write!(f, "ownership"),
            Requirement::OwnerOrAdmin => write!(f, "ownership or admin"),
        }
    }
}

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("missing, invalid or expired token")]
    Unauthenticated,

    #[error("account is deactivated")]
    AccountDeactivated,

    #[error("operation requires {required}, caller acts as {resolved}")]
    Forbidden {
        required: Requirement,
        resolved: Role,
    },

    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Axum(#[from] JsonRejection),

    #[error(transparent)]
    Query(#[from] QueryRejection),

    #[error("cannot move listing from {from} to {to}")]
    InvalidTransition {
        from: ModerationStatus,
        to: ModerationStatus,
    },

    #[error("{resource} not found")]
    NotFound { resource: &'static str },

    #[error("internal server error, {details}")]
    Internal { details: String },
}

impl ServerError {
    /// Build a [`ServerError::Validation`] holding a single field error.
    pub fn field(
        field: &'static str,
        code: &'static str,
        message: &'static str,
    ) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(field, ValidationError::new(code).with_message(message.into()));
        ServerError::Validation(errors)
    }

    /// Wrap any infrastructure failure.
    pub fn internal(err: impl std::error::Error) -> Self {
        ServerError::Internal {
            details: err.to_string(),
        }
    }
}

impl From<crate::token::TokenError> for ServerError {
    fn from(err: crate::token::TokenError) -> Self {
        match err {
            crate::token::TokenError::InvalidToken => {
                ServerError::Unauthenticated
            },
            err => ServerError::internal(err),
        }
    }
}

impl From<crate::crypto::CryptoError> for ServerError {
    fn from(err: crate::crypto::CryptoError) -> Self {
        ServerError::internal(err)
    }
}

impl ServerError {
    /// HTTP status this failure is rendered with.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ServerError::AccountDeactivated | ServerError::Forbidden { .. } => {
                StatusCode::FORBIDDEN
            },
            ServerError::Validation(_)
            | ServerError::Axum(_)
            | ServerError::Query(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound { .. } => StatusCode::NOT_FOUND,
            ServerError::InvalidTransition { .. } => StatusCode::CONFLICT,
            ServerError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn title(&self) -> &'static str {
        match self {
            ServerError::Unauthenticated => {
                "Missing or invalid 'Authorization' header."
            },
            ServerError::AccountDeactivated => "Account is deactivated.",
            ServerError::Forbidden { .. } => {
                "You are not allowed to perform this action."
            },
            ServerError::Validation(_)
            | ServerError::Axum(_)
            | ServerError::Query(_) => {
                "There were validation errors with your request."
            },
            ServerError::NotFound { .. } => "Resource not found.",
            ServerError::InvalidTransition { .. } => {
                "Listing moderation state does not allow this."
            },
            ServerError::Internal { .. } => "Internal server error.",
        }
    }
}

/// Problem details body (RFC 7807).
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: &'static str,
    status: u16,
    detail: Option<String>,
    instance: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<FieldError>,
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

impl From<&ServerError> for ResponseError {
    fn from(err: &ServerError) -> Self {
        let status = err.status();

        // Infrastructure details stay in the logs.
        let detail = (status != StatusCode::INTERNAL_SERVER_ERROR)
            .then(|| err.to_string());

        let errors = match err {
            ServerError::Validation(errors) => errors
                .field_errors()
                .iter()
                .flat_map(|(field, issues)| {
                    issues.iter().map(move |issue| FieldError {
                        field: field.to_string(),
                        message: issue
                            .message
                            .as_ref()
                            .map(|message| message.to_string())
                            .unwrap_or_else(|| issue.code.to_string()),
                    })
                })
                .collect(),
            _ => Vec::new(),
        };

        Self {
            r#type: None,
            title: err.title(),
            status: status.as_u16(),
            detail,
            instance: None,
            errors,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        if let ServerError::Internal { details } = &self {
            tracing::error!(%details, "server returned 500 status");
        }

        (self.status(), Json(ResponseError::from(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_reports_roles() {
        let err = ServerError::Forbidden {
            required: Requirement::AnyOf(vec![Role::Seller, Role::Admin]),
            resolved: Role::Buyer,
        };
        assert_eq!(
            err.to_string(),
            "operation requires one of [seller, admin], caller acts as buyer"
        );
    }

    #[test]
    fn test_status_codes() {
        let cases = [
            (ServerError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (ServerError::AccountDeactivated, StatusCode::FORBIDDEN),
            (
                ServerError::NotFound { resource: "listing" },
                StatusCode::NOT_FOUND,
            ),
            (
                ServerError::InvalidTransition {
                    from: ModerationStatus::Approved,
                    to: ModerationStatus::Rejected,
                },
                StatusCode::CONFLICT,
            ),
            (
                ServerError::field("price", "range", "Price must be positive."),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServerError::Internal {
                    details: "store poisoned".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
