use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use tether_common::types::{EdgeKind, RelationshipEdge, SortDirection};
use tether_common::{EdgeId, UserId};

use super::{
    EdgeScan, EdgeStore, InsertOutcome, ParticipantRole, StoreClient, StoreError, StoreFuture,
};

const EDGE_COLUMNS: &str = "id, initiator_id, target_id, kind, created_at, counters_applied";

impl EdgeStore for StoreClient {
    fn find_edge<'a>(
        &'a self,
        initiator: UserId,
        target: UserId,
        kinds: &'a [EdgeKind],
    ) -> StoreFuture<'a, Option<RelationshipEdge>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {} FROM relationship_edges \
                 WHERE initiator_id = $1 AND target_id = $2 AND kind = ANY($3) \
                 LIMIT 1",
                EDGE_COLUMNS
            );

            let row = sqlx::query_as::<_, EdgeRow>(&sql)
                .bind(initiator.0)
                .bind(target.0)
                .bind(kind_params(kinds))
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?;

            row.map(RelationshipEdge::try_from).transpose()
        })
    }

    fn find_between<'a>(
        &'a self,
        a: UserId,
        b: UserId,
        kinds: &'a [EdgeKind],
    ) -> StoreFuture<'a, Option<RelationshipEdge>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {} FROM relationship_edges \
                 WHERE ((initiator_id = $1 AND target_id = $2) \
                        OR (initiator_id = $2 AND target_id = $1)) \
                   AND kind = ANY($3) \
                 ORDER BY created_at \
                 LIMIT 1",
                EDGE_COLUMNS
            );

            let row = sqlx::query_as::<_, EdgeRow>(&sql)
                .bind(a.0)
                .bind(b.0)
                .bind(kind_params(kinds))
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?;

            row.map(RelationshipEdge::try_from).transpose()
        })
    }

    fn insert_if_absent<'a>(
        &'a self,
        edge: &'a RelationshipEdge,
    ) -> StoreFuture<'a, InsertOutcome> {
        Box::pin(async move {
            let start = std::time::Instant::now();

            // The partial unique indexes on the connection and following slots
            // turn a violation into "no row returned".
            let sql = format!(
                "INSERT INTO relationship_edges \
                     (id, initiator_id, target_id, kind, track, created_at, counters_applied) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT DO NOTHING \
                 RETURNING {}",
                EDGE_COLUMNS
            );

            let row = sqlx::query_as::<_, EdgeRow>(&sql)
                .bind(edge.id.0)
                .bind(edge.initiator.0)
                .bind(edge.target.0)
                .bind(edge.kind.as_db_str())
                .bind(edge.track().as_db_str())
                .bind(edge.created_at)
                .bind(edge.counters_applied)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?;

            metrics::histogram!("store.edge.insert.latency").record(start.elapsed().as_secs_f64());

            match row {
                Some(row) => Ok(InsertOutcome::Inserted(row.try_into()?)),
                None => Ok(InsertOutcome::Duplicate),
            }
        })
    }

    fn transition<'a>(
        &'a self,
        initiator: UserId,
        target: UserId,
        from: EdgeKind,
        to: EdgeKind,
        stamped_at: Option<DateTime<Utc>>,
    ) -> StoreFuture<'a, Option<RelationshipEdge>> {
        Box::pin(async move {
            if !from.can_transition_to(to) {
                return Err(StoreError::IllegalTransition { from, to });
            }

            let start = std::time::Instant::now();

            let sql = format!(
                "UPDATE relationship_edges \
                 SET kind = $4, created_at = COALESCE($5, created_at) \
                 WHERE initiator_id = $1 AND target_id = $2 AND kind = $3 \
                 RETURNING {}",
                EDGE_COLUMNS
            );

            let row = sqlx::query_as::<_, EdgeRow>(&sql)
                .bind(initiator.0)
                .bind(target.0)
                .bind(from.as_db_str())
                .bind(to.as_db_str())
                .bind(stamped_at)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?;

            metrics::histogram!("store.edge.transition.latency")
                .record(start.elapsed().as_secs_f64());

            row.map(RelationshipEdge::try_from).transpose()
        })
    }

    fn delete_edge<'a>(
        &'a self,
        id: EdgeId,
        kinds: &'a [EdgeKind],
    ) -> StoreFuture<'a, Option<RelationshipEdge>> {
        Box::pin(async move {
            let sql = format!(
                "DELETE FROM relationship_edges \
                 WHERE id = $1 AND kind = ANY($2) \
                 RETURNING {}",
                EDGE_COLUMNS
            );

            let row = sqlx::query_as::<_, EdgeRow>(&sql)
                .bind(id.0)
                .bind(kind_params(kinds))
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?;

            row.map(RelationshipEdge::try_from).transpose()
        })
    }

    fn claim_counters<'a>(&'a self, id: EdgeId) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let result = sqlx::query(
                r#"
                UPDATE relationship_edges
                SET counters_applied = TRUE
                WHERE id = $1 AND kind = 'connected' AND NOT counters_applied
                "#,
            )
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

            Ok(result.rows_affected() == 1)
        })
    }

    fn scan<'a>(&'a self, scan: &'a EdgeScan) -> StoreFuture<'a, Vec<RelationshipEdge>> {
        Box::pin(async move {
            let start = std::time::Instant::now();

            let order = match scan.order {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            };

            // LIMIT NULL is "no limit" in PostgreSQL.
            let sql = format!(
                "SELECT {} FROM relationship_edges \
                 WHERE {} AND kind = ANY($2) \
                 ORDER BY created_at {}, id {} \
                 OFFSET $3 LIMIT $4",
                EDGE_COLUMNS,
                role_clause(scan.role),
                order,
                order
            );

            let rows = sqlx::query_as::<_, EdgeRow>(&sql)
                .bind(scan.participant.0)
                .bind(kind_params(&scan.kinds))
                .bind(scan.offset as i64)
                .bind(scan.limit.map(|l| l as i64))
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?;

            metrics::histogram!("store.edge.scan.latency").record(start.elapsed().as_secs_f64());

            rows.into_iter().map(RelationshipEdge::try_from).collect()
        })
    }

    fn count<'a>(&'a self, scan: &'a EdgeScan) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            let sql = format!(
                "SELECT COUNT(*) FROM relationship_edges WHERE {} AND kind = ANY($2)",
                role_clause(scan.role)
            );

            let count: i64 = sqlx::query_scalar(&sql)
                .bind(scan.participant.0)
                .bind(kind_params(&scan.kinds))
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?;

            Ok(count.max(0) as u64)
        })
    }

    fn connected_among<'a>(
        &'a self,
        subject: UserId,
        candidates: &'a [UserId],
    ) -> StoreFuture<'a, HashSet<UserId>> {
        Box::pin(async move {
            if candidates.is_empty() {
                return Ok(HashSet::new());
            }

            let candidate_ids: Vec<Uuid> = candidates.iter().map(|c| c.0).collect();

            let others: Vec<Uuid> = sqlx::query_scalar(
                r#"
                SELECT CASE WHEN initiator_id = $1 THEN target_id ELSE initiator_id END
                FROM relationship_edges
                WHERE kind = 'connected'
                  AND ((initiator_id = $1 AND target_id = ANY($2))
                       OR (target_id = $1 AND initiator_id = ANY($2)))
                "#,
            )
            .bind(subject.0)
            .bind(&candidate_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

            Ok(others.into_iter().map(UserId::from_uuid).collect())
        })
    }

    fn unclaimed_connections<'a>(
        &'a self,
        limit: u32,
    ) -> StoreFuture<'a, Vec<RelationshipEdge>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {} FROM relationship_edges \
                 WHERE kind = 'connected' AND NOT counters_applied \
                 ORDER BY created_at \
                 LIMIT $1",
                EDGE_COLUMNS
            );

            let rows = sqlx::query_as::<_, EdgeRow>(&sql)
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::Query(e.to_string()))?;

            rows.into_iter().map(RelationshipEdge::try_from).collect()
        })
    }
}

fn role_clause(role: ParticipantRole) -> &'static str {
    match role {
        ParticipantRole::Any => "(initiator_id = $1 OR target_id = $1)",
        ParticipantRole::Initiator => "initiator_id = $1",
        ParticipantRole::Target => "target_id = $1",
    }
}

fn kind_params(kinds: &[EdgeKind]) -> Vec<String> {
    kinds.iter().map(|k| k.as_db_str().to_string()).collect()
}

/// Internal row type for sqlx deserialization.
#[derive(sqlx::FromRow)]
struct EdgeRow {
    id: Uuid,
    initiator_id: Uuid,
    target_id: Uuid,
    kind: String,
    created_at: DateTime<Utc>,
    counters_applied: bool,
}

impl TryFrom<EdgeRow> for RelationshipEdge {
    type Error = StoreError;

    fn try_from(row: EdgeRow) -> Result<Self, Self::Error> {
        let kind = EdgeKind::from_db_str(&row.kind).ok_or_else(|| {
            tracing::warn!(edge_id = %row.id, kind = %row.kind, "Unknown edge kind in store");
            StoreError::Corrupt(format!("edge {} has unknown kind '{}'", row.id, row.kind))
        })?;

        Ok(Self {
            id: EdgeId::from_uuid(row.id),
            initiator: UserId::from_uuid(row.initiator_id),
            target: UserId::from_uuid(row.target_id),
            kind,
            created_at: row.created_at,
            counters_applied: row.counters_applied,
        })
    }
}
