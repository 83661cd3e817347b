//! Paginated relationship listings.
//!
//! Every listing resolves display data for all rows with one
//! `batch_fetch_display_info` call and, when a viewer annotation is asked
//! for, one `connected_among` call. Nothing here issues a query per row.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use tether_common::config::ListingConfig;
use tether_common::types::{
    Candidate, ConnectionQuery, EdgeKind, ListedRelationship, Page, PageRequest,
    RelationshipEdge, SortDirection, SortKey,
};
use tether_common::{Result, TetherError, UserId};

use crate::identity::IdentityDirectory;
use crate::store::{EdgeScan, EdgeStore, ParticipantRole};

const CONNECTED: &[EdgeKind] = &[EdgeKind::Connected];
const PENDING: &[EdgeKind] = &[EdgeKind::Pending];
const FOLLOWING: &[EdgeKind] = &[EdgeKind::Following];

#[derive(Clone)]
pub struct ListingService {
    edges: Arc<dyn EdgeStore>,
    identities: Arc<dyn IdentityDirectory>,
    config: ListingConfig,
}

impl ListingService {
    pub fn new(
        edges: Arc<dyn EdgeStore>,
        identities: Arc<dyn IdentityDirectory>,
        config: ListingConfig,
    ) -> Self {
        Self {
            edges,
            identities,
            config,
        }
    }

    /// Page request with the configured defaults filled in for whatever the
    /// caller left out.
    pub fn page_or_default(&self, page: Option<u32>, page_size: Option<u32>) -> PageRequest {
        PageRequest::new(
            page.unwrap_or(1),
            page_size.unwrap_or(self.config.default_page_size),
        )
    }

    /// `subject`'s connections, sorted and paginated.
    ///
    /// Sorting by `created_at` without a name filter is pushed down to the
    /// store. Name sorts and name filters need display data for every row
    /// first, so those are sorted and sliced in memory.
    pub async fn list_connections(
        &self,
        subject: UserId,
        query: &ConnectionQuery,
    ) -> Result<Page<ListedRelationship>> {
        let start = std::time::Instant::now();
        let request = query.page.validated(self.config.max_page_size)?;
        let name_filter = query
            .name_filter
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty());

        let scan = EdgeScan::all(subject, ParticipantRole::Any, CONNECTED);

        let page = if query.sort_by == SortKey::CreatedAt && name_filter.is_none() {
            let scan = scan.paged(query.direction, request.offset(), request.limit());
            let total = self.edges.count(&scan).await?;
            let edges = self.edges.scan(&scan).await?;
            let items = self.enrich(subject, &edges, None).await?;
            Page {
                items,
                page: request.page,
                page_size: request.page_size,
                total,
            }
        } else {
            let edges = self.edges.scan(&scan).await?;
            let mut rows = self.enrich(subject, &edges, name_filter).await?;
            sort_rows(&mut rows, query.sort_by, query.direction);
            paginate(rows, request)
        };

        let page = match query.viewer {
            Some(viewer) => self.annotate_viewer(viewer, page).await?,
            None => page,
        };

        metrics::histogram!("listing.connections.latency").record(start.elapsed().as_secs_f64());
        tracing::debug!(
            subject = %subject,
            returned = page.items.len(),
            total = page.total,
            "Listed connections"
        );
        Ok(page)
    }

    /// Requests waiting on `subject`, newest first.
    pub async fn list_pending_requests(
        &self,
        subject: UserId,
        page: PageRequest,
    ) -> Result<Page<ListedRelationship>> {
        self.list_recent(subject, ParticipantRole::Target, PENDING, page)
            .await
    }

    /// Requests `subject` has sent that are still `Pending`, newest first.
    pub async fn list_sent_requests(
        &self,
        subject: UserId,
        page: PageRequest,
    ) -> Result<Page<ListedRelationship>> {
        self.list_recent(subject, ParticipantRole::Initiator, PENDING, page)
            .await
    }

    pub async fn list_followers(
        &self,
        subject: UserId,
        page: PageRequest,
    ) -> Result<Page<ListedRelationship>> {
        self.list_recent(subject, ParticipantRole::Target, FOLLOWING, page)
            .await
    }

    pub async fn list_following(
        &self,
        subject: UserId,
        page: PageRequest,
    ) -> Result<Page<ListedRelationship>> {
        self.list_recent(subject, ParticipantRole::Initiator, FOLLOWING, page)
            .await
    }

    /// Mark each candidate with whether `subject` is already connected to
    /// it. Input order is kept; duplicates, `subject` itself and unknown
    /// identities are dropped.
    pub async fn annotate_candidates(
        &self,
        subject: UserId,
        candidates: &[UserId],
    ) -> Result<Vec<Candidate>> {
        let mut seen = HashSet::new();
        let ids: Vec<UserId> = candidates
            .iter()
            .copied()
            .filter(|id| *id != subject && seen.insert(*id))
            .collect();

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let (display, connected) = tokio::try_join!(
            async {
                self.identities
                    .batch_fetch_display_info(&ids, None)
                    .await
                    .map_err(TetherError::from)
            },
            async {
                self.edges
                    .connected_among(subject, &ids)
                    .await
                    .map_err(TetherError::from)
            }
        )?;

        Ok(ids
            .iter()
            .filter_map(|id| {
                display.get(id).map(|user| Candidate {
                    user: user.clone(),
                    connected: connected.contains(id),
                })
            })
            .collect())
    }

    /// Store-paged listing of one role and kind set, `created_at` descending.
    async fn list_recent(
        &self,
        subject: UserId,
        role: ParticipantRole,
        kinds: &[EdgeKind],
        page: PageRequest,
    ) -> Result<Page<ListedRelationship>> {
        let request = page.validated(self.config.max_page_size)?;
        let scan = EdgeScan::all(subject, role, kinds).paged(
            SortDirection::Desc,
            request.offset(),
            request.limit(),
        );

        let total = self.edges.count(&scan).await?;
        if total == 0 {
            return Ok(Page::empty(request));
        }

        let edges = self.edges.scan(&scan).await?;
        let items = self.enrich(subject, &edges, None).await?;

        Ok(Page {
            items,
            page: request.page,
            page_size: request.page_size,
            total,
        })
    }

    /// Attach display data to each edge's other participant, keeping edge
    /// order. Rows whose profile is missing (or filtered out) are dropped.
    async fn enrich(
        &self,
        subject: UserId,
        edges: &[RelationshipEdge],
        name_filter: Option<&str>,
    ) -> Result<Vec<ListedRelationship>> {
        let others: Vec<UserId> = edges
            .iter()
            .filter_map(|edge| edge.other_party(subject))
            .collect();

        if others.is_empty() {
            return Ok(Vec::new());
        }

        let display = self
            .identities
            .batch_fetch_display_info(&others, name_filter)
            .await?;

        let rows: Vec<ListedRelationship> = edges
            .iter()
            .filter_map(|edge| {
                let other = edge.other_party(subject)?;
                let user = display.get(&other)?;
                Some(ListedRelationship {
                    edge_id: edge.id,
                    user: user.clone(),
                    since: edge.created_at,
                    viewer_connected: None,
                })
            })
            .collect();

        if name_filter.is_none() && rows.len() < edges.len() {
            tracing::warn!(
                subject = %subject,
                missing = edges.len() - rows.len(),
                "Dropped listing rows with no profile"
            );
        }
        Ok(rows)
    }

    async fn annotate_viewer(
        &self,
        viewer: UserId,
        mut page: Page<ListedRelationship>,
    ) -> Result<Page<ListedRelationship>> {
        let ids: Vec<UserId> = page.items.iter().map(|row| row.user.user_id).collect();
        let connected = self.edges.connected_among(viewer, &ids).await?;

        for row in &mut page.items {
            row.viewer_connected = Some(connected.contains(&row.user.user_id));
        }
        Ok(page)
    }
}

fn sort_rows(rows: &mut [ListedRelationship], key: SortKey, direction: SortDirection) {
    rows.sort_by(|a, b| {
        let ordering = match key {
            SortKey::CreatedAt => Ordering::Equal,
            SortKey::FirstName => compare_names(
                (&a.user.first_name, &a.user.last_name),
                (&b.user.first_name, &b.user.last_name),
            ),
            SortKey::LastName => compare_names(
                (&a.user.last_name, &a.user.first_name),
                (&b.user.last_name, &b.user.first_name),
            ),
        }
        .then_with(|| a.since.cmp(&b.since))
        .then_with(|| a.edge_id.cmp(&b.edge_id));

        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

fn compare_names(a: (&String, &String), b: (&String, &String)) -> Ordering {
    a.0.to_lowercase()
        .cmp(&b.0.to_lowercase())
        .then_with(|| a.1.to_lowercase().cmp(&b.1.to_lowercase()))
}

fn paginate(rows: Vec<ListedRelationship>, request: PageRequest) -> Page<ListedRelationship> {
    let total = rows.len() as u64;
    let items = rows
        .into_iter()
        .skip(request.offset())
        .take(request.limit())
        .collect();

    Page {
        items,
        page: request.page,
        page_size: request.page_size,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tether_common::types::DisplayInfo;
    use tether_common::EdgeId;

    fn row(first: &str, last: &str, minutes_ago: i64) -> ListedRelationship {
        ListedRelationship {
            edge_id: EdgeId::new(),
            user: DisplayInfo {
                user_id: UserId::new(),
                first_name: first.into(),
                last_name: last.into(),
                picture: None,
                headline: None,
            },
            since: Utc::now() - Duration::minutes(minutes_ago),
            viewer_connected: None,
        }
    }

    fn firsts(rows: &[ListedRelationship]) -> Vec<&str> {
        rows.iter().map(|r| r.user.first_name.as_str()).collect()
    }

    #[test]
    fn test_sort_by_first_name_is_case_insensitive() {
        let mut rows = vec![row("bob", "Z", 1), row("Alice", "Y", 2), row("carol", "X", 3)];
        sort_rows(&mut rows, SortKey::FirstName, SortDirection::Asc);
        assert_eq!(firsts(&rows), vec!["Alice", "bob", "carol"]);

        sort_rows(&mut rows, SortKey::FirstName, SortDirection::Desc);
        assert_eq!(firsts(&rows), vec!["carol", "bob", "Alice"]);
    }

    #[test]
    fn test_sort_by_last_name() {
        let mut rows = vec![row("A", "Smith", 1), row("B", "adams", 2), row("C", "Jones", 3)];
        sort_rows(&mut rows, SortKey::LastName, SortDirection::Asc);
        assert_eq!(firsts(&rows), vec!["B", "C", "A"]);
    }

    #[test]
    fn test_sort_by_created_at() {
        let mut rows = vec![row("new", "", 1), row("old", "", 30), row("mid", "", 10)];
        sort_rows(&mut rows, SortKey::CreatedAt, SortDirection::Desc);
        assert_eq!(firsts(&rows), vec!["new", "mid", "old"]);
    }

    #[test]
    fn test_equal_names_fall_back_to_created_at() {
        let mut rows = vec![row("Sam", "Lee", 1), row("Sam", "Lee", 5)];
        let older = rows[1].edge_id;
        sort_rows(&mut rows, SortKey::FirstName, SortDirection::Asc);
        assert_eq!(rows[0].edge_id, older);
    }

    #[test]
    fn test_paginate_past_end() {
        let rows = vec![row("a", "", 1), row("b", "", 2), row("c", "", 3)];
        let page = paginate(rows, PageRequest::new(3, 2));
        assert!(page.items.is_empty());
        assert_eq!(page.total, 3);
    }
}
