//! Moderation state machine.
//!
//! ```text
//! pending --approve--> approved
//! pending --reject---> rejected
//! approved <--admin override--> rejected
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::IdentityId;

/// Moderation status gating public visibility of a listing.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ModerationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ModerationStatus {
    /// Whether the automatic flow is over for this status.
    fn is_terminal(self) -> bool {
        !matches!(self, ModerationStatus::Pending)
    }

    /// Transition table for moderation decisions.
    ///
    /// Returns `None` if `decision` is not allowed from this status.
    pub fn apply(self, decision: Decision) -> Option<ModerationStatus> {
        (!self.is_terminal()).then(|| decision.target())
    }

    /// Administrative move between terminal states.
    pub fn override_to(
        self,
        target: ModerationStatus,
    ) -> Option<ModerationStatus> {
        (self.is_terminal() && target.is_terminal() && self != target)
            .then_some(target)
    }
}

impl fmt::Display for ModerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModerationStatus::Pending => "pending",
            ModerationStatus::Approved => "approved",
            ModerationStatus::Rejected => "rejected",
        })
    }
}

/// Moderator verdict on a pending listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    /// Status this decision leads to from `pending`.
    pub fn target(self) -> ModerationStatus {
        match self {
            Decision::Approve => ModerationStatus::Approved,
            Decision::Reject => ModerationStatus::Rejected,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        }
    }
}

/// Audit record of one status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModerationEvent {
    pub from: ModerationStatus,
    pub to: ModerationStatus,
    pub by: IdentityId,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}
