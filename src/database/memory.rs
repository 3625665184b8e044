//! In-memory storage implementations.
//!
//! Records live in slots shared through `Arc`; the index lock is only held
//! to find or insert a slot, while each slot serializes its own mutations.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use crate::error::{Requirement, Result, ServerError};
use crate::identity::{
    EmailAddress, Identity, IdentityId, IdentityRepository, Role,
};
use crate::listing::{
    ContentUpdate, FavoriteToggle, Listing, ListingFilter, ListingId,
    ListingRepository, ModerationEvent, ModerationStatus,
};

/// In-memory identity store.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    identities: RwLock<HashMap<IdentityId, Identity>>,
    emails: RwLock<HashMap<EmailAddress, IdentityId>>,
}

impl MemoryIdentityStore {
    fn modify<F>(&self, id: &IdentityId, f: F) -> Result<Identity>
    where
        F: FnOnce(&mut Identity) -> Result<()>,
    {
        let mut identities = self.identities.write();
        let identity = identities
            .get_mut(id)
            .ok_or(ServerError::NotFound { resource: "identity" })?;

        f(identity)?;
        Ok(identity.clone())
    }
}

#[async_trait]
impl IdentityRepository for MemoryIdentityStore {
    async fn insert(&self, identity: Identity) -> Result<()> {
        // Lock order: emails, then identities.
        let mut emails = self.emails.write();
        if emails.contains_key(&identity.email) {
            return Err(ServerError::field(
                "email",
                "unique",
                "Email is already registered.",
            ));
        }

        emails.insert(identity.email.clone(), identity.id);
        self.identities.write().insert(identity.id, identity);
        Ok(())
    }

    async fn find_by_id(&self, id: &IdentityId) -> Result<Option<Identity>> {
        Ok(self.identities.read().get(id).cloned())
    }

    async fn find_by_email(
        &self,
        email: &EmailAddress,
    ) -> Result<Option<Identity>> {
        let Some(id) = self.emails.read().get(email).copied() else {
            return Ok(None);
        };
        self.find_by_id(&id).await
    }

    async fn grant_role(&self, id: &IdentityId, role: Role) -> Result<Identity> {
        self.modify(id, |identity| {
            identity.roles.grant(role);
            Ok(())
        })
    }

    async fn activate_role(
        &self,
        id: &IdentityId,
        role: Role,
    ) -> Result<Identity> {
        self.modify(id, |identity| {
            identity.roles.activate(role).map_err(|resolved| {
                ServerError::Forbidden {
                    required: Requirement::AnyOf(vec![role]),
                    resolved,
                }
            })
        })
    }

    async fn set_active(
        &self,
        id: &IdentityId,
        active: bool,
    ) -> Result<Identity> {
        self.modify(id, |identity| {
            identity.is_active = active;
            Ok(())
        })
    }

    async fn delete(&self, id: &IdentityId) -> Result<()> {
        let mut emails = self.emails.write();
        let identity = self
            .identities
            .write()
            .remove(id)
            .ok_or(ServerError::NotFound { resource: "identity" })?;
        emails.remove(&identity.email);
        Ok(())
    }
}

/// One listing. The view counter lives outside the record lock so that
/// increments never wait on content edits.
#[derive(Debug)]
struct Slot {
    listing: Mutex<Listing>,
    views: AtomicU64,
}

impl Slot {
    fn new(listing: Listing) -> Self {
        Self {
            views: AtomicU64::new(listing.views),
            listing: Mutex::new(listing),
        }
    }

    fn snapshot(&self) -> Listing {
        let mut listing = self.listing.lock().clone();
        listing.views = self.views.load(Ordering::Acquire);
        listing
    }
}

/// In-memory listing store.
#[derive(Debug, Default)]
pub struct MemoryListingStore {
    slots: RwLock<HashMap<ListingId, Arc<Slot>>>,
}

impl MemoryListingStore {
    fn slot(&self, id: &ListingId) -> Result<Arc<Slot>> {
        self.slots
            .read()
            .get(id)
            .cloned()
            .ok_or(ServerError::NotFound { resource: "listing" })
    }
}

#[async_trait]
impl ListingRepository for MemoryListingStore {
    async fn insert(&self, listing: Listing) -> Result<()> {
        self.slots
            .write()
            .insert(listing.id, Arc::new(Slot::new(listing)));
        Ok(())
    }

    async fn find_by_id(&self, id: &ListingId) -> Result<Option<Listing>> {
        Ok(self.slots.read().get(id).map(|slot| slot.snapshot()))
    }

    async fn search(&self, filter: &ListingFilter) -> Result<Vec<Listing>> {
        let slots: Vec<Arc<Slot>> =
            self.slots.read().values().cloned().collect();

        let mut listings: Vec<Listing> = slots
            .iter()
            .map(|slot| slot.snapshot())
            .filter(|listing| filter.matches(listing))
            .collect();
        listings.sort_by(|a, b| {
            b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id))
        });

        Ok(listings)
    }

    async fn update_content(
        &self,
        id: &ListingId,
        update: ContentUpdate,
        at: DateTime<Utc>,
    ) -> Result<Listing> {
        let slot = self.slot(id)?;
        {
            let mut listing = slot.listing.lock();
            update.apply(&mut listing.content);
            listing.updated_at = at;
        }
        Ok(slot.snapshot())
    }

    async fn transition(
        &self,
        id: &ListingId,
        expected: ModerationStatus,
        event: ModerationEvent,
    ) -> Result<Listing> {
        let slot = self.slot(id)?;
        {
            let mut listing = slot.listing.lock();
            if listing.status != expected {
                return Err(ServerError::InvalidTransition {
                    from: listing.status,
                    to: event.to,
                });
            }

            listing.status = event.to;
            listing.updated_at = event.at;
            listing.moderation.push(event);
        }
        Ok(slot.snapshot())
    }

    async fn delete(&self, id: &ListingId) -> Result<()> {
        self.slots
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or(ServerError::NotFound { resource: "listing" })
    }

    async fn increment_views(&self, id: &ListingId) -> Result<u64> {
        let slot = self.slot(id)?;
        Ok(slot.views.fetch_add(1, Ordering::AcqRel) + 1)
    }

    async fn toggle_favorite(
        &self,
        id: &ListingId,
        identity: IdentityId,
    ) -> Result<FavoriteToggle> {
        let slot = self.slot(id)?;
        let mut listing = slot.listing.lock();

        if listing.favorites.remove(&identity) {
            Ok(FavoriteToggle::Removed)
        } else {
            listing.favorites.insert(identity);
            Ok(FavoriteToggle::Added)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::tests::identity;
    use crate::listing::tests::content;

    #[tokio::test]
    async fn test_identity_email_is_unique() {
        let store = MemoryIdentityStore::default();
        let first = identity(Role::Buyer);
        let mut second = identity(Role::Seller);
        second.email = first.email.clone();

        store.insert(first.clone()).await.unwrap();
        assert!(matches!(
            store.insert(second).await,
            Err(ServerError::Validation(_))
        ));

        let found = store.find_by_email(&first.email).await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
    }

    #[tokio::test]
    async fn test_identity_delete_frees_email() {
        let store = MemoryIdentityStore::default();
        let buyer = identity(Role::Buyer);
        store.insert(buyer.clone()).await.unwrap();

        store.delete(&buyer.id).await.unwrap();
        assert!(store.find_by_email(&buyer.email).await.unwrap().is_none());
        assert!(store.insert(buyer.clone()).await.is_ok());

        assert!(matches!(
            store.delete(&IdentityId::new()).await,
            Err(ServerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_activate_role_checks_grant_at_write_time() {
        let store = MemoryIdentityStore::default();
        let buyer = identity(Role::Buyer);
        store.insert(buyer.clone()).await.unwrap();

        assert!(matches!(
            store.activate_role(&buyer.id, Role::Admin).await,
            Err(ServerError::Forbidden { .. })
        ));

        store.grant_role(&buyer.id, Role::Admin).await.unwrap();
        let updated = store.activate_role(&buyer.id, Role::Admin).await.unwrap();
        assert_eq!(updated.roles.effective(), Role::Admin);
    }

    #[tokio::test]
    async fn test_transition_is_conditional() {
        let store = MemoryListingStore::default();
        let listing = Listing::new(IdentityId::new(), content());
        let id = listing.id;
        store.insert(listing).await.unwrap();

        let event = |to| ModerationEvent {
            from: ModerationStatus::Pending,
            to,
            by: IdentityId::new(),
            at: Utc::now(),
            reason: None,
        };

        let approved = store
            .transition(
                &id,
                ModerationStatus::Pending,
                event(ModerationStatus::Approved),
            )
            .await
            .unwrap();
        assert_eq!(approved.status, ModerationStatus::Approved);
        assert_eq!(approved.moderation.len(), 1);

        let err = store
            .transition(
                &id,
                ModerationStatus::Pending,
                event(ModerationStatus::Rejected),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServerError::InvalidTransition {
                from: ModerationStatus::Approved,
                to: ModerationStatus::Rejected,
            }
        ));

        let stored = store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, ModerationStatus::Approved);
        assert_eq!(stored.moderation.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_views_are_not_lost() {
        let store = Arc::new(MemoryListingStore::default());
        let listing = Listing::new(IdentityId::new(), content());
        let id = listing.id;
        store.insert(listing).await.unwrap();

        let tasks: Vec<_> = (0..500)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.increment_views(&id).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored.views, 500);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_toggles_never_duplicate() {
        let store = Arc::new(MemoryListingStore::default());
        let listing = Listing::new(IdentityId::new(), content());
        let id = listing.id;
        store.insert(listing).await.unwrap();

        let fan = IdentityId::new();
        let tasks: Vec<_> = (0..101)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(
                    async move { store.toggle_favorite(&id, fan).await },
                )
            })
            .collect();

        let mut added = 0;
        for task in tasks {
            if task.await.unwrap().unwrap() == FavoriteToggle::Added {
                added += 1;
            }
        }

        // Toggles alternate, so 101 calls net one addition.
        assert_eq!(added, 51);
        let stored = store.find_by_id(&id).await.unwrap().unwrap();
        assert!(stored.is_favorited_by(&fan));
        assert_eq!(stored.favorites.len(), 1);
    }

    #[tokio::test]
    async fn test_search_newest_first() {
        let store = MemoryListingStore::default();
        let owner = IdentityId::new();

        let mut old = Listing::new(owner, content());
        old.created_at = Utc::now() - chrono::Duration::days(1);
        let new = Listing::new(owner, content());
        let mut other = Listing::new(IdentityId::new(), content());
        other.content.price = 10_000;

        store.insert(old.clone()).await.unwrap();
        store.insert(new.clone()).await.unwrap();
        store.insert(other.clone()).await.unwrap();

        let mine = store
            .search(&ListingFilter {
                owner: Some(owner),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(
            mine.iter().map(|l| l.id).collect::<Vec<_>>(),
            vec![new.id, old.id]
        );

        let expensive = store
            .search(&ListingFilter {
                min_price: Some(1_000),
                city: Some("lyon".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(expensive.len(), 1);
        assert_eq!(expensive[0].id, other.id);
    }
}
