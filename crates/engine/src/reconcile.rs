//! Connection counter repair.
//!
//! Counters are denormalized and updated after the edge write that justifies
//! them, so a crash or a failed increment can leave them off by one. The
//! repair pass recomputes them from the edges, which are authoritative.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;

use tether_common::types::EdgeKind;
use tether_common::Result;

use crate::identity::IdentityDirectory;
use crate::store::{EdgeScan, EdgeStore, ParticipantRole};

/// Outcome of one repair pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Connected edges whose counter claim was still open.
    pub edges_settled: u64,
    pub identities_scanned: u64,
    pub counters_corrected: u64,
}

/// Run one repair pass.
///
/// Open counter claims are closed first without touching any counter, so a
/// late settle cannot add on top of the recount. Then every identity's
/// stored `connection_count` is compared with its actual number of
/// `Connected` edges and overwritten where they differ.
pub async fn reconcile_connection_counts(
    edges: &dyn EdgeStore,
    identities: &dyn IdentityDirectory,
    batch_size: u32,
) -> Result<ReconcileReport> {
    let batch_size = batch_size.max(1);
    let mut report = ReconcileReport::default();

    loop {
        let unclaimed = edges.unclaimed_connections(batch_size).await?;
        if unclaimed.is_empty() {
            break;
        }
        let fetched = unclaimed.len();
        let mut claimed_any = false;
        for edge in unclaimed {
            if edges.claim_counters(edge.id).await? {
                report.edges_settled += 1;
                claimed_any = true;
            }
        }
        if fetched < batch_size as usize || !claimed_any {
            break;
        }
    }

    let mut after = None;
    loop {
        let batch = identities.list_identities(after, batch_size).await?;
        let Some(&(last, _)) = batch.last() else {
            break;
        };

        for &(id, stored) in &batch {
            report.identities_scanned += 1;
            let scan = EdgeScan::all(id, ParticipantRole::Any, &[EdgeKind::Connected]);
            let actual = edges.count(&scan).await? as i64;

            if actual != stored {
                tracing::warn!(
                    user_id = %id,
                    stored,
                    actual,
                    "Correcting connection count"
                );
                identities.set_connection_count(id, actual).await?;
                report.counters_corrected += 1;
            }
        }

        if batch.len() < batch_size as usize {
            break;
        }
        after = Some(last);
    }

    metrics::counter!("reconcile.edges_settled").increment(report.edges_settled);
    metrics::counter!("reconcile.counters_corrected").increment(report.counters_corrected);

    Ok(report)
}

/// Spawn a background task that runs the repair pass every
/// `interval_minutes`.
pub fn spawn_reconcile_task(
    edges: Arc<dyn EdgeStore>,
    identities: Arc<dyn IdentityDirectory>,
    interval_minutes: u32,
    batch_size: u32,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_minutes as u64 * 60);

    tokio::spawn(async move {
        tracing::info!(interval_minutes, batch_size, "Counter reconciliation task started");

        loop {
            tokio::time::sleep(interval).await;

            match reconcile_connection_counts(edges.as_ref(), identities.as_ref(), batch_size)
                .await
            {
                Ok(report) => tracing::info!(
                    edges_settled = report.edges_settled,
                    identities_scanned = report.identities_scanned,
                    counters_corrected = report.counters_corrected,
                    "Counter reconciliation cycle complete"
                ),
                Err(e) => tracing::error!(error = %e, "Counter reconciliation cycle failed"),
            }
        }
    })
}
