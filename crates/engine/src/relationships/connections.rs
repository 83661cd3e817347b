use std::sync::Arc;

use chrono::Utc;

use tether_common::types::{EdgeKind, RelationshipEdge};
use tether_common::{Result, TetherError, UserId};

use crate::store::InsertOutcome;

use super::{detached, partial, reject_self, RelationshipService};

const WITHDRAWABLE: &[EdgeKind] = &[EdgeKind::Pending, EdgeKind::Ignored];
const CONNECTED: &[EdgeKind] = &[EdgeKind::Connected];

impl RelationshipService {
    /// Create a `Pending` edge `initiator -> target`.
    ///
    /// Any existing connection-track edge between the pair, in either
    /// direction, rejects the request with `Conflict`. A block is reported
    /// as such rather than as a pending or accepted request.
    pub async fn request_connection(
        &self,
        initiator: UserId,
        target: UserId,
    ) -> Result<RelationshipEdge> {
        reject_self(initiator, target, "connect with")?;
        self.ensure_exists(target).await?;

        if let Some(existing) = self
            .edges
            .find_between(initiator, target, &EdgeKind::CONNECTION_TRACK)
            .await?
        {
            return Err(existing_edge_error(&existing, initiator));
        }

        let edge = RelationshipEdge::new(initiator, target, EdgeKind::Pending)?;
        match self.insert(edge).await? {
            InsertOutcome::Inserted(edge) => {
                tracing::info!(
                    edge_id = %edge.id,
                    initiator = %initiator,
                    target = %target,
                    "Connection requested"
                );
                metrics::counter!("relationships.connection.requested").increment(1);
                Ok(edge)
            }
            InsertOutcome::Duplicate => {
                metrics::counter!("relationships.conflicts").increment(1);
                tracing::debug!(initiator = %initiator, target = %target, "Request lost insert race");
                Err(TetherError::Conflict(format!(
                    "a relationship with {} already exists",
                    target
                )))
            }
        }
    }

    /// Delete the initiator's outstanding request. Ignored requests can be
    /// withdrawn too, since the initiator still sees them as pending.
    pub async fn withdraw_request(
        &self,
        initiator: UserId,
        target: UserId,
    ) -> Result<RelationshipEdge> {
        self.ensure_exists(target).await?;

        let not_found = || TetherError::NotFound(format!("no pending request to {}", target));

        let edge = self
            .edges
            .find_edge(initiator, target, WITHDRAWABLE)
            .await?
            .ok_or_else(not_found)?;
        let removed = self.delete(&edge, WITHDRAWABLE).await?.ok_or_else(not_found)?;

        tracing::info!(edge_id = %removed.id, initiator = %initiator, target = %target, "Request withdrawn");
        metrics::counter!("relationships.connection.withdrawn").increment(1);
        Ok(removed)
    }

    /// Resolve the request `requester -> accepter`.
    ///
    /// Ignoring is a single transition. Accepting transitions the edge to
    /// `Connected` (re-stamping `created_at`), then settles the follow-up
    /// effects. Once the transition lands the connection stands: a failure
    /// after that point returns `PartialSuccess` and is never rolled back.
    pub async fn accept_or_ignore(
        &self,
        accepter: UserId,
        requester: UserId,
        accept: bool,
    ) -> Result<RelationshipEdge> {
        self.ensure_exists(requester).await?;

        let (to, stamped_at) = if accept {
            (EdgeKind::Connected, Some(Utc::now()))
        } else {
            (EdgeKind::Ignored, None)
        };

        let edges = Arc::clone(&self.edges);
        let transitioned = detached(async move {
            edges
                .transition(requester, accepter, EdgeKind::Pending, to, stamped_at)
                .await
        })
        .await?
        .ok_or_else(|| TetherError::NotFound(format!("no pending request from {}", requester)))?;

        if !accept {
            tracing::info!(edge_id = %transitioned.id, accepter = %accepter, requester = %requester, "Request ignored");
            metrics::counter!("relationships.connection.ignored").increment(1);
            return Ok(transitioned);
        }

        tracing::info!(edge_id = %transitioned.id, accepter = %accepter, requester = %requester, "Request accepted");
        metrics::counter!("relationships.connection.accepted").increment(1);
        self.settle(transitioned).await
    }

    /// Re-run the post-accept effects for the connection between `accepter`
    /// and `requester`. Safe to call any number of times.
    pub async fn settle_connection(
        &self,
        accepter: UserId,
        requester: UserId,
    ) -> Result<RelationshipEdge> {
        self.ensure_exists(requester).await?;

        let edge = self
            .edges
            .find_edge(requester, accepter, CONNECTED)
            .await?
            .ok_or_else(|| {
                TetherError::NotFound(format!("no connection accepted from {}", requester))
            })?;

        self.settle(edge).await
    }

    /// Delete the `Connected` edge between `actor` and `other`, whichever way
    /// it points, and decrement both counters if the accept had applied them.
    pub async fn remove_connection(&self, actor: UserId, other: UserId) -> Result<RelationshipEdge> {
        self.ensure_exists(other).await?;

        let not_found = || TetherError::NotFound(format!("not connected with {}", other));

        let edge = self
            .edges
            .find_between(actor, other, CONNECTED)
            .await?
            .ok_or_else(not_found)?;
        let removed = self.delete(&edge, CONNECTED).await?.ok_or_else(not_found)?;

        tracing::info!(edge_id = %removed.id, actor = %actor, other = %other, "Connection removed");
        metrics::counter!("relationships.connection.removed").increment(1);

        if removed.counters_applied {
            self.adjust_both(&removed, -1)
                .await
                .map_err(|e| partial(&removed, "decrementing connection counters", e))?;
        }
        Ok(removed)
    }

    /// Follow-up effects of an accept, each idempotent:
    /// the accepter follows the requester, then the counter claim on the edge
    /// guards a single increment of both counters.
    async fn settle(&self, mut edge: RelationshipEdge) -> Result<RelationshipEdge> {
        let follow = RelationshipEdge::new(edge.target, edge.initiator, EdgeKind::Following)?;
        match self.insert(follow).await {
            Ok(InsertOutcome::Inserted(_)) | Ok(InsertOutcome::Duplicate) => {}
            Err(e) => return Err(partial(&edge, "creating follow edge", e)),
        }

        let edges = Arc::clone(&self.edges);
        let id = edge.id;
        let claimed = detached(async move { edges.claim_counters(id).await })
            .await
            .map_err(|e| partial(&edge, "claiming connection counters", e))?;

        if claimed {
            edge.counters_applied = true;
            self.adjust_both(&edge, 1)
                .await
                .map_err(|e| partial(&edge, "incrementing connection counters", e))?;
        }
        Ok(edge)
    }
}

/// Error for a request that collides with an existing connection-track edge.
/// An ignored request still reads as pending to the one who sent it.
fn existing_edge_error(existing: &RelationshipEdge, initiator: UserId) -> TetherError {
    let sent_by_caller = existing.initiator == initiator;
    match existing.kind {
        EdgeKind::Blocked => TetherError::Conflict("this pair is blocked".into()),
        EdgeKind::Connected => TetherError::Conflict("already connected".into()),
        EdgeKind::Pending | EdgeKind::Ignored if sent_by_caller => {
            TetherError::Conflict("a request is already pending".into())
        }
        _ => TetherError::Conflict("the other user has already sent you a request".into()),
    }
}
