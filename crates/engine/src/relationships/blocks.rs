use tether_common::types::{EdgeKind, RelationshipEdge};
use tether_common::{Result, TetherError, UserId};

use crate::store::InsertOutcome;

use super::{partial, reject_self, RelationshipService};

/// Rounds of "clear the slot, try again" before giving up on a pair that
/// keeps changing underneath the block.
const MAX_BLOCK_ATTEMPTS: usize = 3;

const BLOCKED: &[EdgeKind] = &[EdgeKind::Blocked];

impl RelationshipService {
    /// Put a `Blocked` edge `actor -> target` in the pair's connection slot.
    ///
    /// Whatever occupied the slot (request, ignored request or connection) is
    /// deleted first, releasing counters if it was a counted connection.
    /// Follows in both directions are dropped once the block is in place.
    ///
    /// Once the occupant is gone the block is always carried through. A failed
    /// counter release or follow cleanup is then reported as `PartialSuccess`
    /// on the block edge.
    pub async fn block(&self, actor: UserId, target: UserId) -> Result<RelationshipEdge> {
        reject_self(actor, target, "block")?;
        self.ensure_exists(target).await?;

        let mut release_failure: Option<(RelationshipEdge, TetherError)> = None;

        for attempt in 1..=MAX_BLOCK_ATTEMPTS {
            let edge = RelationshipEdge::new(actor, target, EdgeKind::Blocked)?;
            if let InsertOutcome::Inserted(edge) = self.insert(edge).await? {
                tracing::info!(edge_id = %edge.id, actor = %actor, target = %target, "Pair blocked");
                metrics::counter!("relationships.block.created").increment(1);

                self.sever_follows(actor, target)
                    .await
                    .map_err(|e| partial(&edge, "removing follows", e))?;
                if let Some((_, cause)) = release_failure {
                    return Err(partial(&edge, "decrementing connection counters", cause));
                }
                return Ok(edge);
            }

            let occupant = self
                .edges
                .find_between(actor, target, &EdgeKind::CONNECTION_TRACK)
                .await?;

            match occupant {
                // Freed between the insert and the read.
                None => continue,
                Some(existing) if existing.kind == EdgeKind::Blocked => {
                    return Err(TetherError::Conflict("this pair is already blocked".into()));
                }
                Some(existing) => {
                    tracing::debug!(
                        edge_id = %existing.id,
                        kind = ?existing.kind,
                        attempt,
                        "Clearing connection slot for block"
                    );
                    let removed = self.delete(&existing, &[existing.kind]).await?;
                    if let Some(removed) = removed.filter(|r| r.counters_applied) {
                        if let Err(e) = self.adjust_both(&removed, -1).await {
                            tracing::warn!(
                                edge_id = %removed.id,
                                error = %e,
                                "Counter release failed while clearing slot for block"
                            );
                            release_failure = Some((removed, e));
                        }
                    }
                }
            }
        }

        if let Some((removed, cause)) = release_failure {
            return Err(partial(&removed, "decrementing connection counters", cause));
        }
        metrics::counter!("relationships.conflicts").increment(1);
        Err(TetherError::Conflict(format!(
            "relationship with {} changed concurrently, retry",
            target
        )))
    }

    /// Remove the block `actor` placed on `target`. A block placed by the
    /// other side cannot be lifted from here.
    pub async fn unblock(&self, actor: UserId, target: UserId) -> Result<RelationshipEdge> {
        self.ensure_exists(target).await?;

        let not_found = || TetherError::NotFound(format!("no block on {}", target));

        let edge = self
            .edges
            .find_edge(actor, target, BLOCKED)
            .await?
            .ok_or_else(not_found)?;
        let removed = self.delete(&edge, BLOCKED).await?.ok_or_else(not_found)?;

        tracing::info!(edge_id = %removed.id, actor = %actor, target = %target, "Pair unblocked");
        metrics::counter!("relationships.block.removed").increment(1);
        Ok(removed)
    }
}
