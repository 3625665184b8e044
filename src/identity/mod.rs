//! Accounts, their credentials and their roles.

mod email;
mod phone;
pub mod repository;
mod role;
mod service;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use email::EmailAddress;
pub use phone::PhoneNumber;
pub use repository::IdentityRepository;
pub use role::{Role, Roles};
pub use service::{IdentityService, Registration};

/// Identifier of an account.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct IdentityId(Uuid);

impl IdentityId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an identifier coming from a token subject or a path.
    pub fn parse(id: &str) -> Option<Self> {
        Uuid::parse_str(id).ok().map(Self)
    }
}

impl Default for IdentityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Argon2id PHC string. Never leaves the credential store.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn new(phc: String) -> Self {
        Self(phc)
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordHash")
            .field("phc_string", &"[REDACTED]")
            .finish()
    }
}

/// Account record.
#[derive(Debug, Clone, Serialize)]
pub struct Identity {
    pub id: IdentityId,
    pub email: EmailAddress,
    #[serde(skip)]
    pub password: PasswordHash,
    pub phone: PhoneNumber,
    pub roles: Roles,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    /// Create a new active account acting as `primary_role`.
    pub fn new(
        email: EmailAddress,
        password: PasswordHash,
        phone: PhoneNumber,
        primary_role: Role,
    ) -> Self {
        Self {
            id: IdentityId::new(),
            email,
            password,
            phone,
            roles: Roles::new(primary_role),
            is_active: true,
            created_at: Utc::now(),
        }
    }
}
