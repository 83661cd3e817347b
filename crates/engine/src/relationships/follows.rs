use tether_common::types::{EdgeKind, RelationshipEdge};
use tether_common::{Result, TetherError, UserId};

use crate::store::InsertOutcome;

use super::{reject_self, RelationshipService};

const FOLLOWING: &[EdgeKind] = &[EdgeKind::Following];
const BLOCKED: &[EdgeKind] = &[EdgeKind::Blocked];

impl RelationshipService {
    /// Create a `Following` edge `initiator -> target`. Independent of the
    /// connection track, except that a block in either direction forbids it.
    pub async fn follow(&self, initiator: UserId, target: UserId) -> Result<RelationshipEdge> {
        reject_self(initiator, target, "follow")?;
        self.ensure_exists(target).await?;

        if self
            .edges
            .find_between(initiator, target, BLOCKED)
            .await?
            .is_some()
        {
            return Err(TetherError::Forbidden("this pair is blocked".into()));
        }

        let conflict = || TetherError::Conflict(format!("already following {}", target));

        if self
            .edges
            .find_edge(initiator, target, FOLLOWING)
            .await?
            .is_some()
        {
            return Err(conflict());
        }

        let edge = RelationshipEdge::new(initiator, target, EdgeKind::Following)?;
        match self.insert(edge).await? {
            InsertOutcome::Inserted(edge) => {
                // A block that landed after the check above severs follows
                // first; this one may have been inserted after that sweep.
                if self
                    .edges
                    .find_between(initiator, target, BLOCKED)
                    .await?
                    .is_some()
                {
                    self.delete(&edge, FOLLOWING).await?;
                    tracing::debug!(edge_id = %edge.id, "Follow withdrawn, pair blocked concurrently");
                    return Err(TetherError::Forbidden("this pair is blocked".into()));
                }

                tracing::info!(edge_id = %edge.id, initiator = %initiator, target = %target, "Follow created");
                metrics::counter!("relationships.follow.created").increment(1);
                Ok(edge)
            }
            InsertOutcome::Duplicate => {
                metrics::counter!("relationships.conflicts").increment(1);
                Err(conflict())
            }
        }
    }

    pub async fn unfollow(&self, initiator: UserId, target: UserId) -> Result<RelationshipEdge> {
        self.ensure_exists(target).await?;

        let not_found = || TetherError::NotFound(format!("not following {}", target));

        let edge = self
            .edges
            .find_edge(initiator, target, FOLLOWING)
            .await?
            .ok_or_else(not_found)?;
        let removed = self.delete(&edge, FOLLOWING).await?.ok_or_else(not_found)?;

        tracing::info!(edge_id = %removed.id, initiator = %initiator, target = %target, "Follow removed");
        metrics::counter!("relationships.follow.removed").increment(1);
        Ok(removed)
    }

    /// Drop follows in both directions between `a` and `b`.
    pub(super) async fn sever_follows(&self, a: UserId, b: UserId) -> Result<()> {
        for (initiator, target) in [(a, b), (b, a)] {
            if let Some(edge) = self.edges.find_edge(initiator, target, FOLLOWING).await? {
                self.delete(&edge, FOLLOWING).await?;
            }
        }
        Ok(())
    }
}
