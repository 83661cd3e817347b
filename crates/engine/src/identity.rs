//! Seam to the profile service.
//!
//! The engine never touches profile rows directly: existence checks, display
//! enrichment and every connection counter mutation go through
//! [`IdentityDirectory`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use tether_common::types::DisplayInfo;
use tether_common::UserId;

pub type IdentityFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, IdentityError>> + Send + 'a>>;

pub trait IdentityDirectory: Send + Sync {
    fn exists<'a>(&'a self, id: UserId) -> IdentityFuture<'a, bool>;

    /// Add `delta` (may be negative) to the identity's `connection_count`.
    fn increment_connection_count<'a>(&'a self, id: UserId, delta: i64)
        -> IdentityFuture<'a, ()>;

    /// Overwrite `connection_count`. Used only by the repair pass.
    fn set_connection_count<'a>(&'a self, id: UserId, count: i64) -> IdentityFuture<'a, ()>;

    /// Display data for `ids` in one round trip. Identities that don't exist,
    /// or don't match `name_filter`, are absent from the map.
    fn batch_fetch_display_info<'a>(
        &'a self,
        ids: &'a [UserId],
        name_filter: Option<&'a str>,
    ) -> IdentityFuture<'a, HashMap<UserId, DisplayInfo>>;

    /// Keyset page of identities with their stored counters, ordered by id.
    fn list_identities<'a>(
        &'a self,
        after: Option<UserId>,
        limit: u32,
    ) -> IdentityFuture<'a, Vec<(UserId, i64)>>;
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Identity backend error: {0}")]
    Backend(String),

    #[error("Identity {0} not found")]
    Missing(UserId),
}

impl From<IdentityError> for tether_common::TetherError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::Missing(id) => {
                tether_common::TetherError::NotFound(format!("identity {}", id))
            }
            other => tether_common::TetherError::Identity(other.to_string()),
        }
    }
}
