//! Relationship state machine: connection requests, follows and blocks.
//!
//! Every state change is one conditional write against the [`EdgeStore`].
//! Uniqueness is never inferred from a prior read; the reads done here only
//! pick the error to report. A write that loses a race surfaces as
//! `Conflict` or `NotFound` and leaves the store untouched.

mod blocks;
mod connections;
mod follows;

use std::future::Future;
use std::sync::Arc;

use tether_common::types::{EdgeKind, RelationshipEdge};
use tether_common::{Result, TetherError, UserId};

use crate::identity::IdentityDirectory;
use crate::store::EdgeStore;

#[derive(Clone)]
pub struct RelationshipService {
    edges: Arc<dyn EdgeStore>,
    identities: Arc<dyn IdentityDirectory>,
}

impl RelationshipService {
    pub fn new(edges: Arc<dyn EdgeStore>, identities: Arc<dyn IdentityDirectory>) -> Self {
        Self { edges, identities }
    }

    async fn ensure_exists(&self, id: UserId) -> Result<()> {
        if self.identities.exists(id).await? {
            Ok(())
        } else {
            Err(TetherError::NotFound(format!("identity {}", id)))
        }
    }

    /// Insert `edge` on its own task so a dropped caller cannot cancel the
    /// write halfway.
    async fn insert(&self, edge: RelationshipEdge) -> Result<crate::store::InsertOutcome> {
        let edges = Arc::clone(&self.edges);
        detached(async move { edges.insert_if_absent(&edge).await }).await
    }

    async fn delete(
        &self,
        edge: &RelationshipEdge,
        kinds: &[EdgeKind],
    ) -> Result<Option<RelationshipEdge>> {
        let edges = Arc::clone(&self.edges);
        let id = edge.id;
        let kinds = kinds.to_vec();
        detached(async move { edges.delete_edge(id, &kinds).await }).await
    }

    async fn adjust_count(&self, id: UserId, delta: i64) -> Result<()> {
        let identities = Arc::clone(&self.identities);
        detached(async move { identities.increment_connection_count(id, delta).await }).await
    }

    /// Apply `delta` to both participants' connection counters.
    async fn adjust_both(&self, edge: &RelationshipEdge, delta: i64) -> Result<()> {
        self.adjust_count(edge.target, delta).await?;
        self.adjust_count(edge.initiator, delta).await
    }
}

/// Drive a single store write to completion on a spawned task.
///
/// Dropping the returned future does not cancel the write: it either lands
/// in full or not at all, and the caller simply never sees the outcome.
async fn detached<T, E, F>(write: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Into<TetherError> + Send + 'static,
{
    match tokio::spawn(write).await {
        Ok(outcome) => outcome.map_err(Into::into),
        Err(e) => {
            tracing::error!(error = %e, "Store write task failed");
            Err(TetherError::Internal(format!("write task failed: {}", e)))
        }
    }
}

/// Report a failure that happened after the authoritative write landed.
fn partial(edge: &RelationshipEdge, step: &str, cause: TetherError) -> TetherError {
    tracing::warn!(edge_id = %edge.id, step, error = %cause, "Relationship change partially applied");
    metrics::counter!("relationships.partial_success").increment(1);
    TetherError::PartialSuccess {
        edge_id: edge.id,
        detail: format!("{} failed: {}", step, cause),
    }
}

fn reject_self(actor: UserId, other: UserId, action: &str) -> Result<()> {
    if actor == other {
        return Err(TetherError::InvalidArgument(format!(
            "cannot {} yourself",
            action
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_detached_maps_error() {
        let result: Result<()> = detached(async {
            Err::<(), _>(crate::store::StoreError::Query("boom".into()))
        })
        .await;
        assert!(matches!(result, Err(TetherError::Store(_))));
    }

    #[tokio::test]
    async fn test_detached_write_survives_dropped_caller() {
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let caller = tokio::spawn(async move {
            detached(async move {
                let _ = started_tx.send(());
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                let _ = done_tx.send(());
                Ok::<(), TetherError>(())
            })
            .await
        });

        started_rx.await.unwrap();
        caller.abort();
        assert!(
            done_rx.await.is_ok(),
            "write should complete after caller abort"
        );
    }

    #[test]
    fn test_reject_self() {
        let a = UserId::new();
        assert!(matches!(
            reject_self(a, a, "follow"),
            Err(TetherError::InvalidArgument(_))
        ));
        assert!(reject_self(a, UserId::new(), "follow").is_ok());
    }
}
