//! Identity port between the domain layer and the data mapping layer.

use async_trait::async_trait;

use crate::error::Result;
use crate::identity::{EmailAddress, Identity, IdentityId, Role};

/// Port for identity persistence.
///
/// Every mutating method is applied atomically to a single record and
/// returns the record as stored afterwards.
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    /// Store a new identity. Fails if the email is already registered.
    async fn insert(&self, identity: Identity) -> Result<()>;

    async fn find_by_id(&self, id: &IdentityId) -> Result<Option<Identity>>;

    async fn find_by_email(
        &self,
        email: &EmailAddress,
    ) -> Result<Option<Identity>>;

    /// Add `role` to the granted set.
    async fn grant_role(&self, id: &IdentityId, role: Role) -> Result<Identity>;

    /// Set the active role, only if `role` is granted at write time.
    async fn activate_role(
        &self,
        id: &IdentityId,
        role: Role,
    ) -> Result<Identity>;

    /// Soft-enable or soft-disable the account.
    async fn set_active(&self, id: &IdentityId, active: bool)
    -> Result<Identity>;

    async fn delete(&self, id: &IdentityId) -> Result<()>;
}
