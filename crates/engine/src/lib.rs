pub mod config;
pub mod identity;
pub mod listing;
pub mod reconcile;
pub mod relationships;
pub mod status;
pub mod store;

use std::sync::Arc;

use tether_common::config::ListingConfig;

use identity::IdentityDirectory;
use listing::ListingService;
use relationships::RelationshipService;
use status::StatusResolver;
use store::EdgeStore;

/// The three engine services wired against one store and one identity
/// directory.
#[derive(Clone)]
pub struct Engine {
    pub relationships: RelationshipService,
    pub status: StatusResolver,
    pub listing: ListingService,
}

impl Engine {
    pub fn new(
        edges: Arc<dyn EdgeStore>,
        identities: Arc<dyn IdentityDirectory>,
        listing: ListingConfig,
    ) -> Self {
        Self {
            relationships: RelationshipService::new(Arc::clone(&edges), Arc::clone(&identities)),
            status: StatusResolver::new(Arc::clone(&edges)),
            listing: ListingService::new(edges, identities, listing),
        }
    }
}
