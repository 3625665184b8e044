//! database (db) union structure.

pub mod memory;

use std::sync::Arc;

use crate::identity::IdentityRepository;
use crate::listing::ListingRepository;

/// Repositories shared by the services.
#[derive(Clone)]
pub struct Database {
    pub identities: Arc<dyn IdentityRepository>,
    pub listings: Arc<dyn ListingRepository>,
}

impl Database {
    /// Create empty in-memory stores.
    pub fn in_memory() -> Self {
        tracing::info!("in-memory stores ready");

        Self {
            identities: Arc::new(memory::MemoryIdentityStore::default()),
            listings: Arc::new(memory::MemoryListingStore::default()),
        }
    }
}
