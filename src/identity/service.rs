//! Credential store: registration, login and role management.

use std::sync::Arc;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{CryptoError, PasswordManager};
use crate::error::{Requirement, Result, ServerError};
use crate::guard;
use crate::identity::{
    EmailAddress, Identity, IdentityId, IdentityRepository, PasswordHash,
    PhoneNumber, Role,
};

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 255;

/// Data needed to open an account.
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub phone: String,
    #[zeroize(skip)]
    pub role: Role,
}

/// Identity manager.
#[derive(Clone)]
pub struct IdentityService {
    repo: Arc<dyn IdentityRepository>,
    pwd: Arc<PasswordManager>,
}

impl IdentityService {
    /// Create a new [`IdentityService`].
    pub fn new(
        repo: Arc<dyn IdentityRepository>,
        pwd: Arc<PasswordManager>,
    ) -> Self {
        Self { repo, pwd }
    }

    /// Open a buyer or seller account.
    ///
    /// Administrators cannot register themselves.
    pub async fn register(
        &self,
        registration: Registration,
    ) -> Result<Identity> {
        if registration.role == Role::Admin {
            return Err(ServerError::field(
                "role",
                "role",
                "Role must be buyer or seller.",
            ));
        }

        self.provision(registration).await
    }

    /// Open an account with any primary role.
    pub async fn provision(
        &self,
        registration: Registration,
    ) -> Result<Identity> {
        let email = EmailAddress::parse(&registration.email)?;
        let phone = PhoneNumber::parse(&registration.phone)?;

        let length = registration.password.chars().count();
        if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&length) {
            return Err(ServerError::field(
                "password",
                "length",
                "Password must contain between 8 and 255 characters.",
            ));
        }

        let password =
            PasswordHash::new(self.pwd.hash_password(&registration.password)?);
        let identity = Identity::new(email, password, phone, registration.role);
        self.repo.insert(identity.clone()).await?;

        tracing::info!(
            identity_id = %identity.id,
            role = %registration.role,
            "identity registered"
        );

        Ok(identity)
    }

    /// Check credentials.
    ///
    /// Unknown email and wrong password are indistinguishable to the
    /// caller.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity> {
        let Ok(email) = EmailAddress::parse(email) else {
            return Err(login_failure("malformed_email"));
        };

        let Some(identity) = self.repo.find_by_email(&email).await? else {
            return Err(login_failure("unknown_email"));
        };

        match self.pwd.verify_password(password, identity.password.as_str()) {
            Ok(()) => (),
            Err(CryptoError::Mismatch) => {
                return Err(login_failure("wrong_password"));
            },
            Err(err) => return Err(err.into()),
        }

        if !identity.is_active {
            metrics::counter!("auth_failures_total", "reason" => "deactivated")
                .increment(1);
            return Err(ServerError::AccountDeactivated);
        }

        tracing::info!(
            identity_id = %identity.id,
            "authentication successful"
        );
        Ok(identity)
    }

    /// Find an identity by ID.
    pub async fn find(&self, id: &IdentityId) -> Result<Identity> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(ServerError::NotFound { resource: "identity" })
    }

    /// Change the role the caller is currently operating as.
    pub async fn switch_active_role(
        &self,
        caller: &Identity,
        role: Role,
    ) -> Result<Identity> {
        guard::require_active(caller)?;

        if !caller.roles.has(role) {
            return Err(ServerError::Forbidden {
                required: Requirement::AnyOf(vec![role]),
                resolved: guard::resolve_effective_role(caller),
            });
        }

        let identity = self.repo.activate_role(&caller.id, role).await?;
        tracing::info!(
            identity_id = %identity.id,
            %role,
            "active role switched"
        );

        Ok(identity)
    }

    /// Let a buyer start selling. The active role is left untouched.
    pub async fn upgrade_to_seller(
        &self,
        caller: &Identity,
    ) -> Result<Identity> {
        guard::require_active(caller)?;

        let identity = self.repo.grant_role(&caller.id, Role::Seller).await?;
        tracing::info!(identity_id = %identity.id, "seller role granted");

        Ok(identity)
    }

    /// Grant any role to another identity.
    pub async fn grant_role(
        &self,
        admin: &Identity,
        target: &IdentityId,
        role: Role,
    ) -> Result<Identity> {
        guard::require_effective(admin, Role::Admin)?;

        let identity = self.repo.grant_role(target, role).await?;
        tracing::info!(
            admin_id = %admin.id,
            identity_id = %identity.id,
            %role,
            "role granted"
        );

        Ok(identity)
    }

    /// Soft-disable an account. Its tokens stop working immediately.
    pub async fn deactivate(
        &self,
        admin: &Identity,
        target: &IdentityId,
    ) -> Result<Identity> {
        self.set_active(admin, target, false).await
    }

    /// Re-enable a soft-disabled account.
    pub async fn reactivate(
        &self,
        admin: &Identity,
        target: &IdentityId,
    ) -> Result<Identity> {
        self.set_active(admin, target, true).await
    }

    async fn set_active(
        &self,
        admin: &Identity,
        target: &IdentityId,
        active: bool,
    ) -> Result<Identity> {
        guard::require_effective(admin, Role::Admin)?;

        if !active && admin.id == *target {
            return Err(ServerError::field(
                "id",
                "self_deactivation",
                "Administrators cannot deactivate themselves.",
            ));
        }

        let identity = self.repo.set_active(target, active).await?;
        tracing::info!(
            admin_id = %admin.id,
            identity_id = %identity.id,
            active,
            "account activity changed"
        );

        Ok(identity)
    }

    /// Hard-delete an account.
    pub async fn remove(
        &self,
        admin: &Identity,
        target: &IdentityId,
    ) -> Result<()> {
        guard::require_effective(admin, Role::Admin)?;

        self.repo.delete(target).await?;
        tracing::info!(
            admin_id = %admin.id,
            identity_id = %target,
            "identity deleted"
        );

        Ok(())
    }
}

fn login_failure(reason: &'static str) -> ServerError {
    metrics::counter!("auth_failures_total", "reason" => reason).increment(1);
    tracing::info!(reason, "authentication failed");
    ServerError::Unauthenticated
}
