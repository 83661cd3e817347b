//! Read-side relationship labels.
//!
//! [`StatusResolver::resolve`] walks a fixed precedence and stops at the first
//! rule that matches. The order is observable: if a bug ever leaves a stray
//! request next to a connection, the connection still wins, and an outbound
//! request still outranks an inbound one.

use std::sync::Arc;

use tether_common::types::{EdgeKind, RelationshipStatus, RelationshipView};
use tether_common::{Result, UserId};

use crate::store::EdgeStore;

const CONNECTED: &[EdgeKind] = &[EdgeKind::Connected];
/// An ignored request still reads as pending to whoever sent it.
const OUTBOUND: &[EdgeKind] = &[EdgeKind::Pending, EdgeKind::Ignored];
const INBOUND: &[EdgeKind] = &[EdgeKind::Pending];
const FOLLOWING: &[EdgeKind] = &[EdgeKind::Following];

#[derive(Clone)]
pub struct StatusResolver {
    edges: Arc<dyn EdgeStore>,
}

impl StatusResolver {
    pub fn new(edges: Arc<dyn EdgeStore>) -> Self {
        Self { edges }
    }

    /// Connection-track label for `viewer` looking at `subject`.
    pub async fn resolve(&self, viewer: UserId, subject: UserId) -> Result<RelationshipStatus> {
        if viewer == subject {
            return Ok(RelationshipStatus::Owner);
        }
        if self
            .edges
            .find_between(viewer, subject, CONNECTED)
            .await?
            .is_some()
        {
            return Ok(RelationshipStatus::Connected);
        }
        if self
            .edges
            .find_edge(viewer, subject, OUTBOUND)
            .await?
            .is_some()
        {
            return Ok(RelationshipStatus::Pending);
        }
        if self
            .edges
            .find_edge(subject, viewer, INBOUND)
            .await?
            .is_some()
        {
            return Ok(RelationshipStatus::Request);
        }
        Ok(RelationshipStatus::None)
    }

    /// Follow-track label: independent of the connection track.
    pub async fn resolve_follow(
        &self,
        viewer: UserId,
        subject: UserId,
    ) -> Result<RelationshipStatus> {
        if viewer == subject {
            return Ok(RelationshipStatus::Owner);
        }
        let following = self
            .edges
            .find_edge(viewer, subject, FOLLOWING)
            .await?
            .is_some();

        Ok(if following {
            RelationshipStatus::Following
        } else {
            RelationshipStatus::None
        })
    }

    /// Both labels, resolved concurrently.
    pub async fn view(&self, viewer: UserId, subject: UserId) -> Result<RelationshipView> {
        let (connection, follow) = tokio::try_join!(
            self.resolve(viewer, subject),
            self.resolve_follow(viewer, subject)
        )?;
        Ok(RelationshipView { connection, follow })
    }
}
