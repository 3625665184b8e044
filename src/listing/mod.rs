//! Marketplace listings.

pub(crate) mod draft;
mod lifecycle;
mod moderation;
pub mod repository;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ServerError};
use crate::identity::{IdentityId, Role};

pub use draft::{
    ContentUpdate, ImageDraft, ListingDraft, ListingPatch, LocationDraft,
};
pub use lifecycle::ListingManager;
pub use moderation::{Decision, ModerationEvent, ModerationStatus};
pub use repository::{FavoriteToggle, ListingFilter, ListingRepository};

/// Roles allowed to put items on sale.
pub const SELLER_ROLES: &[Role] = &[Role::Seller];

/// Identifier of a listing.
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
pub struct ListingId(Uuid);

impl ListingId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(id: &str) -> Option<Self> {
        Uuid::parse_str(id).ok().map(Self)
    }
}

impl Default for ListingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generates a closed, lowercase-labelled enumeration parsed from user
/// input.
macro_rules! labels {
    ($(#[$meta:meta])* $name:ident, $field:literal, $message:literal {
        $($variant:ident => $label:literal),+ $(,)?
    }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            /// Parse user input, failing with a field validation error.
            pub fn parse_field(value: &str) -> Result<Self> {
                value.parse().map_err(|_| {
                    ServerError::field($field, $field, $message)
                })
            }
        }

        impl FromStr for $name {
            type Err = ();

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                let s = s.trim();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s))
                    .ok_or(())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

labels! {
    /// Fixed catalogue sections.
    Category, "category", "Unknown category." {
        Vegetables => "vegetables",
        Fruits => "fruits",
        Grains => "grains",
        Legumes => "legumes",
        Livestock => "livestock",
        Dairy => "dairy",
        Poultry => "poultry",
        Other => "other",
    }
}

labels! {
    /// Unit a price applies to.
    Unit, "unit", "Unknown unit of sale." {
        Kg => "kg",
        Ton => "ton",
        Piece => "piece",
        Liter => "liter",
        Bag => "bag",
        Crate => "crate",
    }
}

/// Where the item can be picked up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub district: Option<String>,
}

/// Picture of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub url: String,
    pub is_primary: bool,
}

/// Representative image: first flagged primary, else first image.
pub fn primary_image(images: &[Image]) -> Option<&str> {
    images
        .iter()
        .find(|image| image.is_primary)
        .or_else(|| images.first())
        .map(|image| image.url.as_str())
}

/// Fields editable by the owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingContent {
    pub title: String,
    pub description: String,
    /// In minor currency units.
    pub price: u64,
    pub category: Category,
    pub location: Location,
    pub stock: u32,
    pub unit: Unit,
    pub images: Vec<Image>,
}

/// Listing record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub id: ListingId,
    pub owner: IdentityId,
    pub content: ListingContent,
    pub views: u64,
    pub favorites: BTreeSet<IdentityId>,
    pub status: ModerationStatus,
    pub moderation: Vec<ModerationEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    /// New pending listing with no engagement.
    pub fn new(owner: IdentityId, content: ListingContent) -> Self {
        let now = Utc::now();
        Self {
            id: ListingId::new(),
            owner,
            content,
            views: 0,
            favorites: BTreeSet::new(),
            status: ModerationStatus::Pending,
            moderation: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn primary_image(&self) -> Option<&str> {
        primary_image(&self.content.images)
    }

    pub fn is_favorited_by(&self, identity: &IdentityId) -> bool {
        self.favorites.contains(identity)
    }
}
