//! Authorization guard.
//!
//! Every role check goes through this module so that no call site inspects
//! only one of the three role signals of an identity.

use crate::error::{Requirement, Result, ServerError};
use crate::identity::{Identity, IdentityRepository, Role};
use crate::token::TokenManager;

/// Role used for an authorization decision.
pub fn resolve_effective_role(identity: &Identity) -> Role {
    identity.roles.effective()
}

/// Whether `identity` satisfies any of `required`.
///
/// A granted role counts even if the identity is not currently acting as
/// it.
pub fn authorize(identity: &Identity, required: &[Role]) -> bool {
    required.contains(&resolve_effective_role(identity))
        || identity.roles.intersects(required)
}

/// Fail if the account has been deactivated.
pub fn require_active(identity: &Identity) -> Result<()> {
    if identity.is_active {
        Ok(())
    } else {
        Err(ServerError::AccountDeactivated)
    }
}

/// Fail unless the identity is active and authorized for `required`.
pub fn require(identity: &Identity, required: &[Role]) -> Result<Role> {
    require_active(identity)?;

    let resolved = resolve_effective_role(identity);
    if authorize(identity, required) {
        Ok(resolved)
    } else {
        Err(ServerError::Forbidden {
            required: Requirement::AnyOf(required.to_vec()),
            resolved,
        })
    }
}

/// Fail unless the identity is active and currently acting as `role`.
pub fn require_effective(identity: &Identity, role: Role) -> Result<()> {
    require_active(identity)?;

    let resolved = resolve_effective_role(identity);
    if resolved == role {
        Ok(())
    } else {
        Err(ServerError::Forbidden {
            required: Requirement::EffectiveRole(role),
            resolved,
        })
    }
}

/// Resolve a bearer token into a live, active identity.
///
/// Tokens outlive account state changes, so the identity is re-read from
/// the store on every call.
pub async fn authenticate(
    tokens: &TokenManager,
    identities: &dyn IdentityRepository,
    token: &str,
) -> Result<Identity> {
    let id = tokens.verify(token).inspect_err(|_| {
        metrics::counter!("auth_failures_total", "reason" => "invalid_token")
            .increment(1);
    })?;

    let identity = identities
        .find_by_id(&id)
        .await?
        .ok_or(ServerError::Unauthenticated)?;

    require_active(&identity).inspect_err(|_| {
        metrics::counter!("auth_failures_total", "reason" => "deactivated")
            .increment(1);
    })?;

    Ok(identity)
}
