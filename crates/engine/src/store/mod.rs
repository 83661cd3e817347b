mod edges;
mod memory;
mod profiles;

pub use memory::MemoryStore;

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use tether_common::config::StoreConfig;
use tether_common::types::{EdgeKind, RelationshipEdge, SortDirection};
use tether_common::{EdgeId, UserId};

/// Boxed future returned by the store seams.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Result of a conditional insert against a track's uniqueness slot.
#[derive(Clone, Debug, PartialEq)]
pub enum InsertOutcome {
    /// The slot was free and now holds this edge.
    Inserted(RelationshipEdge),
    /// Another edge already occupies the slot. Nothing was written.
    Duplicate,
}

/// Which side of an edge the scanned participant must be on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParticipantRole {
    Any,
    Initiator,
    Target,
}

/// Sorted, paginated scan of one participant's edges. Ordered by
/// `created_at`, ties broken by edge id.
#[derive(Clone, Debug)]
pub struct EdgeScan {
    pub participant: UserId,
    pub role: ParticipantRole,
    pub kinds: Vec<EdgeKind>,
    pub order: SortDirection,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl EdgeScan {
    /// Unpaginated scan, newest first.
    pub fn all(participant: UserId, role: ParticipantRole, kinds: &[EdgeKind]) -> Self {
        Self {
            participant,
            role,
            kinds: kinds.to_vec(),
            order: SortDirection::Desc,
            offset: 0,
            limit: None,
        }
    }

    pub fn paged(mut self, order: SortDirection, offset: usize, limit: usize) -> Self {
        self.order = order;
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    pub(crate) fn matches(&self, edge: &RelationshipEdge) -> bool {
        let on_side = match self.role {
            ParticipantRole::Any => edge.touches(self.participant),
            ParticipantRole::Initiator => edge.initiator == self.participant,
            ParticipantRole::Target => edge.target == self.participant,
        };
        on_side && self.kinds.contains(&edge.kind)
    }
}

/// Persistence seam for relationship edges.
///
/// Every mutating method is a single atomic write. Uniqueness of the
/// connection slot (unordered pair) and the follow slot (directed pair) is
/// enforced by the store itself, never by a prior read.
pub trait EdgeStore: Send + Sync {
    /// Directed point lookup: an edge `initiator -> target` whose kind is in `kinds`.
    fn find_edge<'a>(
        &'a self,
        initiator: UserId,
        target: UserId,
        kinds: &'a [EdgeKind],
    ) -> StoreFuture<'a, Option<RelationshipEdge>>;

    /// Undirected lookup: an edge between `a` and `b` in either direction.
    fn find_between<'a>(
        &'a self,
        a: UserId,
        b: UserId,
        kinds: &'a [EdgeKind],
    ) -> StoreFuture<'a, Option<RelationshipEdge>>;

    /// Insert unless the edge's track slot is already occupied.
    fn insert_if_absent<'a>(&'a self, edge: &'a RelationshipEdge)
        -> StoreFuture<'a, InsertOutcome>;

    /// Compare-and-set the kind of the directed edge `initiator -> target`
    /// from `from` to `to`. `created_at` is replaced when `stamped_at` is
    /// given. `None` when no edge in state `from` exists.
    fn transition<'a>(
        &'a self,
        initiator: UserId,
        target: UserId,
        from: EdgeKind,
        to: EdgeKind,
        stamped_at: Option<DateTime<Utc>>,
    ) -> StoreFuture<'a, Option<RelationshipEdge>>;

    /// Delete an edge if its kind is still one of `kinds`. Returns the deleted row.
    fn delete_edge<'a>(
        &'a self,
        id: EdgeId,
        kinds: &'a [EdgeKind],
    ) -> StoreFuture<'a, Option<RelationshipEdge>>;

    /// Flip `counters_applied` from false to true on a `Connected` edge.
    /// Exactly one caller wins.
    fn claim_counters<'a>(&'a self, id: EdgeId) -> StoreFuture<'a, bool>;

    fn scan<'a>(&'a self, scan: &'a EdgeScan) -> StoreFuture<'a, Vec<RelationshipEdge>>;

    /// Number of edges the scan would return, ignoring offset and limit.
    fn count<'a>(&'a self, scan: &'a EdgeScan) -> StoreFuture<'a, u64>;

    /// Which of `candidates` hold a `Connected` edge with `subject`. One round trip.
    fn connected_among<'a>(
        &'a self,
        subject: UserId,
        candidates: &'a [UserId],
    ) -> StoreFuture<'a, HashSet<UserId>>;

    /// `Connected` edges whose counters were never claimed.
    fn unclaimed_connections<'a>(&'a self, limit: u32)
        -> StoreFuture<'a, Vec<RelationshipEdge>>;
}

/// PostgreSQL client for the relationship store and profile counters.
pub struct StoreClient {
    pool: PgPool,
}

impl StoreClient {
    /// Connect to PostgreSQL and return a client with a connection pool.
    pub async fn connect(database_url: &str, config: &StoreConfig) -> Result<Self, StoreError> {
        tracing::info!(
            max_connections = config.max_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let client = Self { pool };
        client.health_check().await?;
        tracing::info!("PostgreSQL connection established");

        Ok(client)
    }

    /// Verify the connection is alive.
    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        tracing::info!("Running PostgreSQL migrations");

        sqlx::migrate!("src/store/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        tracing::info!("PostgreSQL migrations complete");
        Ok(())
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("PostgreSQL connection error: {0}")]
    Connection(String),

    #[error("PostgreSQL query error: {0}")]
    Query(String),

    #[error("PostgreSQL migration error: {0}")]
    Migration(String),

    /// A persisted row could not be mapped back to a domain value.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Illegal edge transition {from:?} -> {to:?}")]
    IllegalTransition { from: EdgeKind, to: EdgeKind },

    /// The in-memory store's lock was poisoned by a panicking writer.
    #[error("Store lock poisoned: {0}")]
    LockPoisoned(String),
}

impl From<StoreError> for tether_common::TetherError {
    fn from(e: StoreError) -> Self {
        tether_common::TetherError::Store(e.to_string())
    }
}
