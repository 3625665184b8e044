//! Role signals carried by an identity.
//!
//! An account holds three overlapping signals: the legacy `primary` role set
//! at registration, the set of `granted` roles it may act as, and the
//! `active` role it is currently operating as. They are kept together so
//! every authorization decision sees all three.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Capability label governing permitted operations.
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
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Seller,
    Admin,
}

impl Role {
    #[cfg(test)]
    pub const ALL: [Role; 3] = [Role::Buyer, Role::Seller, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Buyer => "buyer",
            Role::Seller => "seller",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role assignment of one identity.
///
/// Invariants: `primary ∈ granted` and `active ∈ granted` when set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Roles {
    primary: Role,
    granted: BTreeSet<Role>,
    active: Option<Role>,
}

impl Roles {
    /// Roles of a freshly registered account.
    pub fn new(primary: Role) -> Self {
        Self {
            primary,
            granted: BTreeSet::from([primary]),
            active: Some(primary),
        }
    }

    /// Rebuild roles from stored parts.
    ///
    /// Accounts created before multi-role support have no granted set and
    /// no active role; `primary` is always folded into `granted`. Returns
    /// `None` if `active` is not part of the granted set.
    pub fn from_parts(
        primary: Role,
        granted: impl IntoIterator<Item = Role>,
        active: Option<Role>,
    ) -> Option<Self> {
        let mut granted: BTreeSet<Role> = granted.into_iter().collect();
        granted.insert(primary);

        if active.is_some_and(|role| !granted.contains(&role)) {
            return None;
        }

        Some(Self {
            primary,
            granted,
            active,
        })
    }

    #[inline]
    pub fn primary(&self) -> Role {
        self.primary
    }

    #[inline]
    pub fn active(&self) -> Option<Role> {
        self.active
    }

    #[inline]
    pub fn granted(&self) -> &BTreeSet<Role> {
        &self.granted
    }

    /// Role used for authorization decisions.
    ///
    /// Falls back to `primary` for legacy accounts without an active role.
    pub fn effective(&self) -> Role {
        self.active.unwrap_or(self.primary)
    }

    /// Whether this identity is allowed to act as `role`.
    pub fn has(&self, role: Role) -> bool {
        self.granted.contains(&role)
    }

    /// Whether any granted role is part of `required`.
    pub fn intersects(&self, required: &[Role]) -> bool {
        required.iter().any(|role| self.granted.contains(role))
    }

    /// Add a role to the granted set. Returns `false` if already granted.
    pub fn grant(&mut self, role: Role) -> bool {
        self.granted.insert(role)
    }

    /// Switch the active role. Fails if `role` was never granted.
    pub fn activate(&mut self, role: Role) -> Result<(), Role> {
        if !self.granted.contains(&role) {
            return Err(self.effective());
        }
        self.active = Some(role);
        Ok(())
    }
}
