//! Listing port between the domain layer and the data mapping layer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::identity::IdentityId;
use crate::listing::{
    Category, ContentUpdate, Listing, ListingId, ModerationEvent,
    ModerationStatus,
};

/// Outcome of a favorite toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FavoriteToggle {
    Added,
    Removed,
}

/// Listing selection criteria. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingFilter {
    pub status: Option<ModerationStatus>,
    pub category: Option<Category>,
    pub city: Option<String>,
    pub owner: Option<IdentityId>,
    pub favorited_by: Option<IdentityId>,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
}

impl ListingFilter {
    pub fn matches(&self, listing: &Listing) -> bool {
        let content = &listing.content;

        self.status.is_none_or(|status| listing.status == status)
            && self.category.is_none_or(|c| content.category == c)
            && self.city.as_deref().is_none_or(|city| {
                content.location.city.eq_ignore_ascii_case(city.trim())
            })
            && self.owner.is_none_or(|owner| listing.owner == owner)
            && self
                .favorited_by
                .is_none_or(|identity| listing.favorites.contains(&identity))
            && self.min_price.is_none_or(|min| content.price >= min)
            && self.max_price.is_none_or(|max| content.price <= max)
    }
}

/// Port for listing persistence.
///
/// Every mutating method is atomic at the single-record level: either the
/// whole mutation lands or none of it does.
#[async_trait]
pub trait ListingRepository: Send + Sync {
    async fn insert(&self, listing: Listing) -> Result<()>;

    async fn find_by_id(&self, id: &ListingId) -> Result<Option<Listing>>;

    /// Listings matching `filter`, newest first.
    async fn search(&self, filter: &ListingFilter) -> Result<Vec<Listing>>;

    /// Overwrite owner-editable fields. Status is never touched.
    async fn update_content(
        &self,
        id: &ListingId,
        update: ContentUpdate,
        at: DateTime<Utc>,
    ) -> Result<Listing>;

    /// Move to `event.to` and append `event` to the audit trail, only if
    /// the stored status still equals `expected`.
    async fn transition(
        &self,
        id: &ListingId,
        expected: ModerationStatus,
        event: ModerationEvent,
    ) -> Result<Listing>;

    async fn delete(&self, id: &ListingId) -> Result<()>;

    /// Add exactly one view and return the new count.
    async fn increment_views(&self, id: &ListingId) -> Result<u64>;

    /// Add `identity` to favorites if absent, remove it otherwise.
    async fn toggle_favorite(
        &self,
        id: &ListingId,
        identity: IdentityId,
    ) -> Result<FavoriteToggle>;
}
