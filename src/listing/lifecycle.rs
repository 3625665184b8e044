//! Listing lifecycle: creation, edits, moderation and engagement.

use std::sync::Arc;

use chrono::Utc;

use crate::error::{Requirement, Result, ServerError};
use crate::guard;
use crate::identity::{Identity, IdentityId, Role};
use crate::listing::{
    Decision, FavoriteToggle, Listing, ListingDraft, ListingFilter, ListingId,
    ListingPatch, ListingRepository, ModerationEvent, ModerationStatus,
    SELLER_ROLES,
};

const NOT_FOUND: ServerError = ServerError::NotFound {
    resource: "listing",
};

/// Listing manager.
#[derive(Clone)]
pub struct ListingManager {
    repo: Arc<dyn ListingRepository>,
}

impl ListingManager {
    /// Create a new [`ListingManager`].
    pub fn new(repo: Arc<dyn ListingRepository>) -> Self {
        Self { repo }
    }

    async fn fetch(&self, id: &ListingId) -> Result<Listing> {
        self.repo.find_by_id(id).await?.ok_or(NOT_FOUND)
    }

    /// Whether `viewer` may see `listing` in its current status.
    fn is_visible(listing: &Listing, viewer: Option<&Identity>) -> bool {
        listing.status == ModerationStatus::Approved
            || viewer.is_some_and(|viewer| {
                listing.owner == viewer.id
                    || guard::authorize(viewer, &[Role::Admin])
            })
    }

    /// Put a new item on sale. It waits for moderation before being public.
    pub async fn create(
        &self,
        owner: &Identity,
        draft: ListingDraft,
    ) -> Result<Listing> {
        guard::require(owner, SELLER_ROLES)?;

        let listing = Listing::new(owner.id, draft.into_content()?);
        self.repo.insert(listing.clone()).await?;

        tracing::info!(
            listing_id = %listing.id,
            owner_id = %owner.id,
            "listing created"
        );

        Ok(listing)
    }

    /// Edit content fields. Only the owner may do it, administrators have
    /// no override here. The moderation status is never changed.
    pub async fn update(
        &self,
        caller: &Identity,
        id: &ListingId,
        patch: ListingPatch,
    ) -> Result<Listing> {
        guard::require_active(caller)?;

        let listing = self.fetch(id).await?;
        if listing.owner != caller.id {
            return Err(ServerError::Forbidden {
                required: Requirement::Owner,
                resolved: guard::resolve_effective_role(caller),
            });
        }

        let update = patch.into_update()?;
        if update.is_empty() {
            return Ok(listing);
        }

        let listing = self.repo.update_content(id, update, Utc::now()).await?;
        tracing::info!(listing_id = %listing.id, "listing updated");

        Ok(listing)
    }

    /// Approve or reject a pending listing.
    pub async fn moderate(
        &self,
        admin: &Identity,
        id: &ListingId,
        decision: Decision,
        reason: Option<String>,
    ) -> Result<Listing> {
        guard::require_effective(admin, Role::Admin)?;

        let listing = self.fetch(id).await?;
        let Some(target) = listing.status.apply(decision) else {
            return Err(ServerError::InvalidTransition {
                from: listing.status,
                to: decision.target(),
            });
        };

        let listing = self
            .record_transition(admin, listing.status, target, id, reason)
            .await?;
        metrics::counter!(
            "listing_moderations_total",
            "decision" => decision.as_str()
        )
        .increment(1);

        Ok(listing)
    }

    /// Move a moderated listing between approved and rejected.
    pub async fn override_status(
        &self,
        admin: &Identity,
        id: &ListingId,
        target: ModerationStatus,
        reason: Option<String>,
    ) -> Result<Listing> {
        guard::require_effective(admin, Role::Admin)?;

        let listing = self.fetch(id).await?;
        let Some(target) = listing.status.override_to(target) else {
            return Err(ServerError::InvalidTransition {
                from: listing.status,
                to: target,
            });
        };

        let listing = self
            .record_transition(admin, listing.status, target, id, reason)
            .await?;
        metrics::counter!(
            "listing_moderations_total",
            "decision" => "override"
        )
        .increment(1);

        Ok(listing)
    }

    async fn record_transition(
        &self,
        admin: &Identity,
        from: ModerationStatus,
        to: ModerationStatus,
        id: &ListingId,
        reason: Option<String>,
    ) -> Result<Listing> {
        let event = ModerationEvent {
            from,
            to,
            by: admin.id,
            at: Utc::now(),
            reason,
        };

        // Fails if another moderator got there first.
        let listing = self.repo.transition(id, from, event).await?;
        tracing::info!(
            listing_id = %listing.id,
            admin_id = %admin.id,
            %from,
            %to,
            "listing moderated"
        );

        Ok(listing)
    }

    /// Remove a listing. Owner or administrator.
    pub async fn delete(
        &self,
        caller: &Identity,
        id: &ListingId,
    ) -> Result<()> {
        guard::require_active(caller)?;

        let listing = self.fetch(id).await?;
        if listing.owner != caller.id
            && !guard::authorize(caller, &[Role::Admin])
        {
            return Err(ServerError::Forbidden {
                required: Requirement::OwnerOrAdmin,
                resolved: guard::resolve_effective_role(caller),
            });
        }

        self.repo.delete(id).await?;
        tracing::info!(
            listing_id = %id,
            caller_id = %caller.id,
            "listing deleted"
        );

        Ok(())
    }

    /// Count one more view and return the new total.
    ///
    /// Hidden listings answer like missing ones, so their counter never
    /// leaks to other callers.
    pub async fn increment_view(
        &self,
        id: &ListingId,
        viewer: Option<&Identity>,
    ) -> Result<u64> {
        let listing = self.fetch(id).await?;
        if !Self::is_visible(&listing, viewer) {
            return Err(NOT_FOUND);
        }

        let views = self.repo.increment_views(id).await?;
        metrics::counter!("listing_views_total").increment(1);

        Ok(views)
    }

    /// Add the listing to the identity's favorites, or remove it if it is
    /// already there.
    pub async fn toggle_favorite(
        &self,
        identity: &Identity,
        id: &ListingId,
    ) -> Result<FavoriteToggle> {
        guard::require_active(identity)?;

        let listing = self.fetch(id).await?;
        if !Self::is_visible(&listing, Some(identity)) {
            return Err(NOT_FOUND);
        }

        let toggle = self.repo.toggle_favorite(id, identity.id).await?;
        tracing::debug!(
            listing_id = %id,
            identity_id = %identity.id,
            ?toggle,
            "favorite toggled"
        );

        Ok(toggle)
    }

    /// Read one listing. Listings awaiting or refused moderation only
    /// exist for their owner and administrators.
    pub async fn get(
        &self,
        id: &ListingId,
        viewer: Option<&Identity>,
    ) -> Result<Listing> {
        let listing = self.fetch(id).await?;

        if Self::is_visible(&listing, viewer) {
            Ok(listing)
        } else {
            Err(NOT_FOUND)
        }
    }

    /// Public catalogue. Only approved listings are returned, whatever the
    /// requested status.
    pub async fn search(&self, filter: ListingFilter) -> Result<Vec<Listing>> {
        self.repo
            .search(&ListingFilter {
                status: Some(ModerationStatus::Approved),
                ..filter
            })
            .await
    }

    /// Every listing of `owner`, in any status.
    pub async fn listings_of(
        &self,
        owner: &IdentityId,
    ) -> Result<Vec<Listing>> {
        self.repo
            .search(&ListingFilter {
                owner: Some(*owner),
                ..Default::default()
            })
            .await
    }

    /// Approved listings favorited by `identity`.
    pub async fn favorites_of(
        &self,
        identity: &IdentityId,
    ) -> Result<Vec<Listing>> {
        self.search(ListingFilter {
            favorited_by: Some(*identity),
            ..Default::default()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryListingStore;
    use crate::identity::tests::identity;
    use crate::listing::draft::tests::draft;

    fn manager() -> ListingManager {
        ListingManager::new(Arc::new(MemoryListingStore::default()))
    }

    fn admin() -> Identity {
        identity(Role::Admin)
    }

    async fn approved(manager: &ListingManager, seller: &Identity) -> Listing {
        let listing = manager.create(seller, draft()).await.unwrap();
        manager
            .moderate(&admin(), &listing.id, Decision::Approve, None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_requires_seller_capability() {
        let manager = manager();

        let buyer = identity(Role::Buyer);
        assert!(matches!(
            manager.create(&buyer, draft()).await,
            Err(ServerError::Forbidden { resolved: Role::Buyer, .. })
        ));

        // Granted but not active still counts.
        let mut upgraded = identity(Role::Buyer);
        upgraded.roles.grant(Role::Seller);
        let listing = manager.create(&upgraded, draft()).await.unwrap();

        assert_eq!(listing.status, ModerationStatus::Pending);
        assert_eq!(listing.views, 0);
        assert!(listing.favorites.is_empty());
        assert_eq!(listing.owner, upgraded.id);
    }

    #[tokio::test]
    async fn test_create_with_negative_price_stores_nothing() {
        let manager = manager();
        let seller = identity(Role::Seller);

        let mut draft = draft();
        draft.price = -1;
        assert!(matches!(
            manager.create(&seller, draft).await,
            Err(ServerError::Validation(_))
        ));
        assert!(manager.listings_of(&seller.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_by_non_owner_is_forbidden() {
        let manager = manager();
        let seller = identity(Role::Seller);
        let listing = manager.create(&seller, draft()).await.unwrap();

        let patch = ListingPatch {
            price: Some(1),
            ..Default::default()
        };
        for intruder in [identity(Role::Seller), admin()] {
            assert!(matches!(
                manager.update(&intruder, &listing.id, patch.clone()).await,
                Err(ServerError::Forbidden {
                    required: Requirement::Owner,
                    ..
                })
            ));
        }

        let stored = manager.get(&listing.id, Some(&seller)).await.unwrap();
        assert_eq!(stored, listing);
    }

    #[tokio::test]
    async fn test_update_never_changes_status() {
        let manager = manager();
        let seller = identity(Role::Seller);
        let listing = approved(&manager, &seller).await;

        let updated = manager
            .update(
                &seller,
                &listing.id,
                ListingPatch {
                    title: Some("Cherry tomatoes".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.content.title, "Cherry tomatoes");
        assert_eq!(updated.status, ModerationStatus::Approved);
        assert_eq!(updated.moderation, listing.moderation);
    }

    #[tokio::test]
    async fn test_moderation_is_one_way() {
        let manager = manager();
        let seller = identity(Role::Seller);
        let listing = approved(&manager, &seller).await;
        assert_eq!(listing.moderation.len(), 1);

        let err = manager
            .moderate(&admin(), &listing.id, Decision::Reject, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServerError::InvalidTransition {
                from: ModerationStatus::Approved,
                ..
            }
        ));

        let stored = manager.get(&listing.id, None).await.unwrap();
        assert_eq!(stored.status, ModerationStatus::Approved);
    }

    #[tokio::test]
    async fn test_moderation_requires_acting_admin() {
        let manager = manager();
        let seller = identity(Role::Seller);
        let listing = manager.create(&seller, draft()).await.unwrap();

        let mut dormant = identity(Role::Seller);
        dormant.roles.grant(Role::Admin);
        assert!(matches!(
            manager
                .moderate(&dormant, &listing.id, Decision::Approve, None)
                .await,
            Err(ServerError::Forbidden {
                required: Requirement::EffectiveRole(Role::Admin),
                ..
            })
        ));

        dormant.roles.activate(Role::Admin).unwrap();
        let rejected = manager
            .moderate(
                &dormant,
                &listing.id,
                Decision::Reject,
                Some("blurry pictures".into()),
            )
            .await
            .unwrap();

        assert_eq!(rejected.status, ModerationStatus::Rejected);
        let event = &rejected.moderation[0];
        assert_eq!(event.by, dormant.id);
        assert_eq!(event.from, ModerationStatus::Pending);
        assert_eq!(event.reason.as_deref(), Some("blurry pictures"));
    }

    #[tokio::test]
    async fn test_override_between_terminal_states() {
        let manager = manager();
        let seller = identity(Role::Seller);
        let pending = manager.create(&seller, draft()).await.unwrap();

        assert!(matches!(
            manager
                .override_status(
                    &admin(),
                    &pending.id,
                    ModerationStatus::Approved,
                    None
                )
                .await,
            Err(ServerError::InvalidTransition { .. })
        ));

        let listing = approved(&manager, &seller).await;
        let rejected = manager
            .override_status(
                &admin(),
                &listing.id,
                ModerationStatus::Rejected,
                Some("counterfeit".into()),
            )
            .await
            .unwrap();
        assert_eq!(rejected.status, ModerationStatus::Rejected);
        assert_eq!(rejected.moderation.len(), 2);

        assert!(matches!(
            manager
                .override_status(
                    &admin(),
                    &listing.id,
                    ModerationStatus::Pending,
                    None
                )
                .await,
            Err(ServerError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_visibility() {
        let manager = manager();
        let seller = identity(Role::Seller);
        let pending = manager.create(&seller, draft()).await.unwrap();

        assert!(manager.get(&pending.id, Some(&seller)).await.is_ok());
        assert!(manager.get(&pending.id, Some(&admin())).await.is_ok());
        for viewer in [None, Some(&identity(Role::Buyer))] {
            assert!(matches!(
                manager.get(&pending.id, viewer).await,
                Err(ServerError::NotFound { .. })
            ));
        }

        let public = approved(&manager, &seller).await;
        let catalogue = manager.search(ListingFilter::default()).await.unwrap();
        assert_eq!(catalogue.len(), 1);
        assert_eq!(catalogue[0].id, public.id);

        // Asking for pending listings still only yields approved ones.
        let sneaky = manager
            .search(ListingFilter {
                status: Some(ModerationStatus::Pending),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(sneaky.len(), 1);

        assert_eq!(manager.listings_of(&seller.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete() {
        let manager = manager();
        let seller = identity(Role::Seller);
        let first = manager.create(&seller, draft()).await.unwrap();
        let second = manager.create(&seller, draft()).await.unwrap();

        assert!(matches!(
            manager.delete(&identity(Role::Buyer), &first.id).await,
            Err(ServerError::Forbidden {
                required: Requirement::OwnerOrAdmin,
                ..
            })
        ));

        manager.delete(&seller, &first.id).await.unwrap();
        manager.delete(&admin(), &second.id).await.unwrap();
        assert!(matches!(
            manager.delete(&seller, &first.id).await,
            Err(ServerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_toggle_favorite_twice_restores_set() {
        let manager = manager();
        let seller = identity(Role::Seller);
        let listing = approved(&manager, &seller).await;
        let buyer = identity(Role::Buyer);

        assert_eq!(
            manager.toggle_favorite(&buyer, &listing.id).await.unwrap(),
            FavoriteToggle::Added
        );
        assert_eq!(manager.favorites_of(&buyer.id).await.unwrap().len(), 1);

        assert_eq!(
            manager.toggle_favorite(&buyer, &listing.id).await.unwrap(),
            FavoriteToggle::Removed
        );
        let stored = manager.get(&listing.id, None).await.unwrap();
        assert_eq!(stored.favorites, listing.favorites);
    }

    #[tokio::test]
    async fn test_cannot_favorite_hidden_listing() {
        let manager = manager();
        let seller = identity(Role::Seller);
        let pending = manager.create(&seller, draft()).await.unwrap();

        assert!(matches!(
            manager
                .toggle_favorite(&identity(Role::Buyer), &pending.id)
                .await,
            Err(ServerError::NotFound { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_views() {
        let manager = manager();
        let seller = identity(Role::Seller);
        let listing = approved(&manager, &seller).await;

        let tasks: Vec<_> = (0..100)
            .map(|_| {
                let manager = manager.clone();
                let id = listing.id;
                tokio::spawn(async move { manager.increment_view(&id, None).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = manager.get(&listing.id, None).await.unwrap();
        assert_eq!(stored.views, listing.views + 100);
    }

    #[tokio::test]
    async fn test_hidden_listing_views_are_not_counted() {
        let manager = manager();
        let seller = identity(Role::Seller);
        let pending = manager.create(&seller, draft()).await.unwrap();

        for viewer in [None, Some(&identity(Role::Buyer))] {
            assert!(matches!(
                manager.increment_view(&pending.id, viewer).await,
                Err(ServerError::NotFound { .. })
            ));
        }
        assert_eq!(
            manager.increment_view(&pending.id, Some(&seller)).await.unwrap(),
            1
        );
        assert_eq!(
            manager.increment_view(&pending.id, Some(&admin())).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_deactivated_caller_is_refused() {
        let manager = manager();
        let mut seller = identity(Role::Seller);
        let listing = manager.create(&seller, draft()).await.unwrap();
        seller.is_active = false;

        assert!(matches!(
            manager.create(&seller, draft()).await,
            Err(ServerError::AccountDeactivated)
        ));
        assert!(matches!(
            manager
                .update(&seller, &listing.id, ListingPatch::default())
                .await,
            Err(ServerError::AccountDeactivated)
        ));
        assert!(matches!(
            manager.delete(&seller, &listing.id).await,
            Err(ServerError::AccountDeactivated)
        ));
    }
}
