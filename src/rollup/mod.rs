// Tier cascade and retention.
// A delta lands in the finest tier; every coarser tier whose window boundary equals the delta's
// timestamp is rebuilt from the trailing window of the next finer tier. Each write is followed by
// a trim so row counts stay at or below the tier cap.

pub mod aggregation;

use tracing::debug;

use crate::delta::DeltaRecord;
use crate::error::StoreError;
use crate::models::{Tier, TierRow};
use crate::store::ReportTx;

/// What one delta did to the tiers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RollupOutcome {
    /// Coarser rows (re)built by this delta, finest-first.
    pub aggregated: Vec<(Tier, TierRow)>,
    pub rows_trimmed: u64,
}

/// Insert `delta` into the finest tier, trim it, then cascade into coarser tiers.
pub async fn apply_delta(
    tx: &mut dyn ReportTx,
    delta: &DeltaRecord,
) -> Result<RollupOutcome, StoreError> {
    let mut outcome = RollupOutcome::default();

    tx.upsert_row(Tier::FINEST, &delta.to_tier_row()).await?;
    outcome.rows_trimmed += trim(tx, Tier::FINEST, delta.client_id).await?;

    for tier in Tier::ALL {
        if tier == Tier::FINEST {
            continue;
        }
        if let Some((row, trimmed)) =
            cascade_into(tx, tier, delta.client_id, delta.timestamp).await?
        {
            outcome.rows_trimmed += trimmed;
            outcome.aggregated.push((tier, row));
        }
    }

    Ok(outcome)
}

/// Rebuild `tier`'s row for the window ending at `boundary` from the next finer tier.
///
/// No-op unless `boundary` is a multiple of the tier's window. Scans `(boundary - W, boundary]`;
/// an empty scan writes nothing. Re-running for the same boundary replaces the row in place.
/// Returns the written row and the number of rows trimmed afterwards.
pub async fn cascade_into(
    tx: &mut dyn ReportTx,
    tier: Tier,
    client_id: i64,
    boundary: i64,
) -> Result<Option<(TierRow, u64)>, StoreError> {
    let Some(source) = tier.finer() else {
        return Ok(None);
    };
    if !tier.is_boundary(boundary) {
        return Ok(None);
    }

    let rows = tx
        .scan(source, client_id, boundary - tier.window_secs(), boundary)
        .await?;
    let Some(row) = aggregation::aggregate_rows(&rows) else {
        return Ok(None);
    };

    tx.upsert_row(tier, &row).await?;
    let trimmed = trim(tx, tier, client_id).await?;
    debug!(
        client_id,
        tier = tier.name(),
        timestamp = row.timestamp,
        source_rows = rows.len(),
        "tier row aggregated"
    );
    Ok(Some((row, trimmed)))
}

/// Enforce the tier cap for one client. Idempotent; no-op when under cap.
pub async fn trim(tx: &mut dyn ReportTx, tier: Tier, client_id: i64) -> Result<u64, StoreError> {
    trim_to(tx, tier, client_id, tier.cap()).await
}

/// Delete the oldest rows until at most `cap` remain.
pub async fn trim_to(
    tx: &mut dyn ReportTx,
    tier: Tier,
    client_id: i64,
    cap: u64,
) -> Result<u64, StoreError> {
    let count = tx.count_rows(tier, client_id).await?;
    if count <= cap {
        return Ok(0);
    }
    let excess = count - cap;
    let Some(cutoff) = tx.timestamp_at(tier, client_id, excess - 1).await? else {
        return Ok(0);
    };
    tx.delete_through(tier, client_id, cutoff).await
}
