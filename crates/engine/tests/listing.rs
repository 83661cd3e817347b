//! Listing scenarios: pagination, sorting, name filters and batch enrichment.
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};

use tether_common::config::ListingConfig;
use tether_common::types::{
    ConnectionQuery, DisplayInfo, EdgeKind, PageRequest, Profile, RelationshipEdge, SortDirection,
    SortKey,
};
use tether_common::{TetherError, UserId};

use tether_engine::identity::{IdentityDirectory, IdentityFuture};
use tether_engine::listing::ListingService;
use tether_engine::relationships::RelationshipService;
use tether_engine::store::{EdgeStore, MemoryStore};

/// Counts batch display lookups so tests can assert one call per listing.
struct CountingDirectory {
    inner: Arc<MemoryStore>,
    batch_calls: AtomicUsize,
}

impl CountingDirectory {
    fn calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }
}

impl IdentityDirectory for CountingDirectory {
    fn exists<'a>(&'a self, id: UserId) -> IdentityFuture<'a, bool> {
        self.inner.exists(id)
    }

    fn increment_connection_count<'a>(
        &'a self,
        id: UserId,
        delta: i64,
    ) -> IdentityFuture<'a, ()> {
        self.inner.increment_connection_count(id, delta)
    }

    fn set_connection_count<'a>(&'a self, id: UserId, count: i64) -> IdentityFuture<'a, ()> {
        self.inner.set_connection_count(id, count)
    }

    fn batch_fetch_display_info<'a>(
        &'a self,
        ids: &'a [UserId],
        name_filter: Option<&'a str>,
    ) -> IdentityFuture<'a, HashMap<UserId, DisplayInfo>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.batch_fetch_display_info(ids, name_filter)
    }

    fn list_identities<'a>(
        &'a self,
        after: Option<UserId>,
        limit: u32,
    ) -> IdentityFuture<'a, Vec<(UserId, i64)>> {
        self.inner.list_identities(after, limit)
    }
}

struct Fixture {
    store: Arc<MemoryStore>,
    directory: Arc<CountingDirectory>,
    listing: ListingService,
}

fn setup() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let directory = Arc::new(CountingDirectory {
        inner: store.clone(),
        batch_calls: AtomicUsize::new(0),
    });
    let listing = ListingService::new(
        store.clone(),
        directory.clone(),
        ListingConfig {
            default_page_size: 20,
            max_page_size: 50,
        },
    );
    Fixture {
        store,
        directory,
        listing,
    }
}

fn add_user(store: &MemoryStore, first: &str, last: &str) -> UserId {
    let profile = Profile::new(first, last);
    let id = profile.id();
    store.insert_profile(profile);
    id
}

/// Store an edge `minutes_ago` in the past through the normal slot checks.
async fn add_edge(
    store: &MemoryStore,
    initiator: UserId,
    target: UserId,
    kind: EdgeKind,
    minutes_ago: i64,
) -> RelationshipEdge {
    let mut edge = RelationshipEdge::new(initiator, target, kind).unwrap();
    edge.created_at = Utc::now() - Duration::minutes(minutes_ago);
    edge.counters_applied = kind == EdgeKind::Connected;
    store.insert_if_absent(&edge).await.unwrap();
    edge
}

fn first_names(items: &[tether_common::types::ListedRelationship]) -> Vec<&str> {
    items.iter().map(|r| r.user.first_name.as_str()).collect()
}

// -----------------------------------------------------------------------
// 1. Connections
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_connections_paginate_newest_first() {
    let fx = setup();
    let u = add_user(&fx.store, "Una", "User");
    let oldest = add_user(&fx.store, "Oldest", "One");
    let middle = add_user(&fx.store, "Middle", "One");
    let newest = add_user(&fx.store, "Newest", "One");

    add_edge(&fx.store, u, oldest, EdgeKind::Connected, 30).await;
    add_edge(&fx.store, middle, u, EdgeKind::Connected, 20).await;
    add_edge(&fx.store, u, newest, EdgeKind::Connected, 10).await;

    let first = fx
        .listing
        .list_connections(u, &ConnectionQuery::new(1, 2))
        .await
        .unwrap();
    assert_eq!(first_names(&first.items), vec!["Newest", "Middle"]);
    assert_eq!(first.total, 3);

    let second = fx
        .listing
        .list_connections(u, &ConnectionQuery::new(2, 2))
        .await
        .unwrap();
    assert_eq!(first_names(&second.items), vec!["Oldest"]);
    assert_eq!(second.total, 3);

    assert_eq!(fx.directory.calls(), 2, "one batch lookup per page");
}

#[tokio::test]
async fn test_connections_ascending() {
    let fx = setup();
    let u = add_user(&fx.store, "Una", "User");
    let old = add_user(&fx.store, "Old", "One");
    let new = add_user(&fx.store, "New", "One");
    add_edge(&fx.store, u, old, EdgeKind::Connected, 30).await;
    add_edge(&fx.store, u, new, EdgeKind::Connected, 5).await;

    let mut query = ConnectionQuery::new(1, 10);
    query.direction = SortDirection::Asc;
    let page = fx.listing.list_connections(u, &query).await.unwrap();

    assert_eq!(first_names(&page.items), vec!["Old", "New"]);
}

#[tokio::test]
async fn test_connections_sorted_by_name_then_paginated() {
    let fx = setup();
    let u = add_user(&fx.store, "Una", "User");
    for (i, (first, last)) in [
        ("carol", "Zeta"),
        ("Alice", "Young"),
        ("bob", "Xavier"),
        ("Dave", "Walker"),
    ]
    .into_iter()
    .enumerate()
    {
        let other = add_user(&fx.store, first, last);
        add_edge(&fx.store, u, other, EdgeKind::Connected, i as i64 + 1).await;
    }

    let mut query = ConnectionQuery::new(1, 3);
    query.sort_by = SortKey::FirstName;
    query.direction = SortDirection::Asc;
    let page = fx.listing.list_connections(u, &query).await.unwrap();
    assert_eq!(first_names(&page.items), vec!["Alice", "bob", "carol"]);
    assert_eq!(page.total, 4);

    query.sort_by = SortKey::LastName;
    query.page = PageRequest::new(2, 3);
    let page = fx.listing.list_connections(u, &query).await.unwrap();
    assert_eq!(first_names(&page.items), vec!["carol"]);

    assert_eq!(fx.directory.calls(), 2);
}

#[tokio::test]
async fn test_connections_name_filter() {
    let fx = setup();
    let u = add_user(&fx.store, "Una", "User");
    let ann = add_user(&fx.store, "Ann", "Smith");
    let dan = add_user(&fx.store, "Bob", "Danvers");
    let zed = add_user(&fx.store, "Zed", "Quinn");
    add_edge(&fx.store, u, ann, EdgeKind::Connected, 3).await;
    add_edge(&fx.store, u, dan, EdgeKind::Connected, 2).await;
    add_edge(&fx.store, u, zed, EdgeKind::Connected, 1).await;

    let mut query = ConnectionQuery::new(1, 10);
    query.name_filter = Some("AN".into());
    let page = fx.listing.list_connections(u, &query).await.unwrap();

    assert_eq!(page.total, 2);
    assert_eq!(first_names(&page.items), vec!["Bob", "Ann"]);

    // A blank filter matches everyone.
    query.name_filter = Some("   ".into());
    let page = fx.listing.list_connections(u, &query).await.unwrap();
    assert_eq!(page.total, 3);
}

#[tokio::test]
async fn test_connections_viewer_annotation() {
    let fx = setup();
    let u = add_user(&fx.store, "Una", "User");
    let viewer = add_user(&fx.store, "Vic", "Viewer");
    let shared = add_user(&fx.store, "Sam", "Shared");
    let other = add_user(&fx.store, "Oli", "Other");

    add_edge(&fx.store, u, shared, EdgeKind::Connected, 3).await;
    add_edge(&fx.store, u, other, EdgeKind::Connected, 2).await;
    add_edge(&fx.store, shared, viewer, EdgeKind::Connected, 1).await;
    add_edge(&fx.store, viewer, other, EdgeKind::Pending, 1).await;

    let mut query = ConnectionQuery::new(1, 10);
    query.viewer = Some(viewer);
    let page = fx.listing.list_connections(u, &query).await.unwrap();

    let flags: HashMap<UserId, Option<bool>> = page
        .items
        .iter()
        .map(|row| (row.user.user_id, row.viewer_connected))
        .collect();
    assert_eq!(flags[&shared], Some(true));
    assert_eq!(flags[&other], Some(false));
}

#[tokio::test]
async fn test_connections_skip_missing_profiles() {
    let fx = setup();
    let u = add_user(&fx.store, "Una", "User");
    let known = add_user(&fx.store, "Kim", "Known");
    let deleted = UserId::new();
    add_edge(&fx.store, u, known, EdgeKind::Connected, 2).await;
    add_edge(&fx.store, u, deleted, EdgeKind::Connected, 1).await;

    let page = fx
        .listing
        .list_connections(u, &ConnectionQuery::new(1, 10))
        .await
        .unwrap();
    assert_eq!(first_names(&page.items), vec!["Kim"]);
}

#[tokio::test]
async fn test_invalid_page_rejected_and_size_clamped() {
    let fx = setup();
    let u = add_user(&fx.store, "Una", "User");

    let result = fx
        .listing
        .list_connections(u, &ConnectionQuery::new(0, 10))
        .await;
    assert!(matches!(result, Err(TetherError::InvalidArgument(_))));

    let result = fx
        .listing
        .list_pending_requests(u, PageRequest::new(1, 0))
        .await;
    assert!(matches!(result, Err(TetherError::InvalidArgument(_))));

    let page = fx
        .listing
        .list_connections(u, &ConnectionQuery::new(1, 1_000))
        .await
        .unwrap();
    assert_eq!(page.page_size, 50);
    assert!(page.items.is_empty());

    let defaults = fx.listing.page_or_default(None, None);
    assert_eq!(defaults, PageRequest::new(1, 20));
}

// -----------------------------------------------------------------------
// 2. Requests and follows
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_pending_and_sent_requests() {
    let fx = setup();
    let u = add_user(&fx.store, "Una", "User");
    let asker_old = add_user(&fx.store, "Early", "Asker");
    let asker_new = add_user(&fx.store, "Late", "Asker");
    let asked = add_user(&fx.store, "Asked", "Person");
    let ignorer = add_user(&fx.store, "Ignoring", "Person");

    add_edge(&fx.store, asker_old, u, EdgeKind::Pending, 20).await;
    add_edge(&fx.store, asker_new, u, EdgeKind::Pending, 10).await;
    add_edge(&fx.store, u, asked, EdgeKind::Pending, 5).await;
    add_edge(&fx.store, u, ignorer, EdgeKind::Ignored, 1).await;

    let pending = fx
        .listing
        .list_pending_requests(u, PageRequest::new(1, 10))
        .await
        .unwrap();
    assert_eq!(first_names(&pending.items), vec!["Late", "Early"]);

    let sent = fx
        .listing
        .list_sent_requests(u, PageRequest::new(1, 10))
        .await
        .unwrap();
    assert_eq!(first_names(&sent.items), vec!["Asked"]);
    assert_eq!(sent.total, 1);

    let ignorer_inbox = fx
        .listing
        .list_pending_requests(ignorer, PageRequest::new(1, 10))
        .await
        .unwrap();
    assert!(ignorer_inbox.items.is_empty());
}

#[tokio::test]
async fn test_ignored_request_leaves_sent_list() {
    let fx = setup();
    let relationships = RelationshipService::new(fx.store.clone(), fx.store.clone());
    let a = add_user(&fx.store, "Ada", "Sender");
    let b = add_user(&fx.store, "Bea", "Receiver");

    relationships.request_connection(a, b).await.unwrap();
    let sent = fx
        .listing
        .list_sent_requests(a, PageRequest::new(1, 10))
        .await
        .unwrap();
    assert_eq!(first_names(&sent.items), vec!["Bea"]);

    relationships.accept_or_ignore(b, a, false).await.unwrap();
    let sent = fx
        .listing
        .list_sent_requests(a, PageRequest::new(1, 10))
        .await
        .unwrap();
    assert!(sent.items.is_empty());
    assert_eq!(sent.total, 0);

    let kinds: Vec<EdgeKind> = fx.store.edges().iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EdgeKind::Ignored]);
}

#[tokio::test]
async fn test_followers_and_following() {
    let fx = setup();
    let u = add_user(&fx.store, "Una", "User");
    let fan = add_user(&fx.store, "Fan", "One");
    let idol = add_user(&fx.store, "Idol", "One");

    add_edge(&fx.store, fan, u, EdgeKind::Following, 3).await;
    add_edge(&fx.store, u, idol, EdgeKind::Following, 2).await;
    add_edge(&fx.store, u, fan, EdgeKind::Following, 1).await;

    let followers = fx
        .listing
        .list_followers(u, PageRequest::new(1, 10))
        .await
        .unwrap();
    assert_eq!(first_names(&followers.items), vec!["Fan"]);

    let following = fx
        .listing
        .list_following(u, PageRequest::new(1, 10))
        .await
        .unwrap();
    assert_eq!(first_names(&following.items), vec!["Fan", "Idol"]);
}

// -----------------------------------------------------------------------
// 3. Candidate annotation
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_annotate_candidates() {
    let fx = setup();
    let u = add_user(&fx.store, "Una", "User");
    let friend = add_user(&fx.store, "Fred", "Friend");
    let stranger = add_user(&fx.store, "Sue", "Stranger");
    let unknown = UserId::new();
    add_edge(&fx.store, friend, u, EdgeKind::Connected, 1).await;

    let candidates = fx
        .listing
        .annotate_candidates(u, &[stranger, friend, u, stranger, unknown])
        .await
        .unwrap();

    let summary: Vec<(UserId, bool)> = candidates
        .iter()
        .map(|c| (c.user.user_id, c.connected))
        .collect();
    assert_eq!(summary, vec![(stranger, false), (friend, true)]);
    assert_eq!(fx.directory.calls(), 1);
}
