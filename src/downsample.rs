// History reads: pick a tier, scan oldest-first, project the requested fields, spot-sample.
// Sampling is index-stride selection. No averaging happens here; every returned point is a
// stored row.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::QueryError;
use crate::models::{Tier, TierRow, is_metric_field};
use crate::store::StatusStore;

pub const DEFAULT_TARGET_POINTS: usize = 60;

/// Label reported alongside every downsampled series.
pub const SAMPLING: &str = "index_stride";

/// Pick `target` rows at indices `floor(i * len / target)`.
///
/// Returns everything when `rows.len() <= target`, nothing when `target == 0`.
pub fn stride_sample<T: Clone>(rows: &[T], target: usize) -> Vec<T> {
    if target == 0 {
        return Vec::new();
    }
    if rows.len() <= target {
        return rows.to_vec();
    }
    let stride = rows.len() as f64 / target as f64;
    (0..target)
        .map(|i| {
            let idx = ((i as f64 * stride).floor() as usize).min(rows.len() - 1);
            rows[idx].clone()
        })
        .collect()
}

/// Source of a history query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryRange {
    /// Everything currently retained in one tier.
    Tier(Tier),
    /// Trailing window of `seconds` ending at the query's `now`.
    Window { seconds: i64 },
}

/// Finest tier whose retention span covers a trailing window.
pub fn tier_for_window(seconds: i64) -> Tier {
    Tier::ALL
        .into_iter()
        .find(|tier| seconds <= tier.retention_secs())
        .unwrap_or(Tier::Hours)
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryQuery {
    pub client_id: i64,
    pub range: HistoryRange,
    /// Metric columns to return. Empty means every column.
    pub fields: Vec<String>,
    pub target_points: usize,
}

impl HistoryQuery {
    pub fn new(client_id: i64, range: HistoryRange) -> Self {
        Self {
            client_id,
            range,
            fields: Vec::new(),
            target_points: DEFAULT_TARGET_POINTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistorySeries {
    pub tier: Tier,
    pub sampling: &'static str,
    /// Rows in range before sampling.
    pub source_rows: usize,
    /// Oldest first; each object holds `timestamp` plus the requested fields.
    pub points: Vec<Map<String, Value>>,
}

/// Run one downsampled history query. `now` anchors trailing windows.
pub async fn query_history(
    store: &dyn StatusStore,
    query: &HistoryQuery,
    now: i64,
) -> Result<HistorySeries, QueryError> {
    if let Some(bad) = query.fields.iter().find(|f| !is_metric_field(f)) {
        return Err(QueryError::UnknownField(bad.clone()));
    }
    if store.client(query.client_id).await?.is_none() {
        return Err(QueryError::UnknownClient(query.client_id));
    }

    let (tier, rows) = match query.range {
        HistoryRange::Tier(tier) => {
            let rows = store
                .rows_in_range(tier, query.client_id, i64::MIN, i64::MAX)
                .await?;
            (tier, rows)
        }
        HistoryRange::Window { seconds } => {
            if seconds <= 0 {
                return Err(QueryError::InvalidWindow(seconds));
            }
            let tier = tier_for_window(seconds);
            let rows = store
                .rows_in_range(tier, query.client_id, now.saturating_sub(seconds), now)
                .await?;
            (tier, rows)
        }
    };

    let points = stride_sample(&rows, query.target_points)
        .iter()
        .map(|row| project(row, &query.fields))
        .collect();

    Ok(HistorySeries {
        tier,
        sampling: SAMPLING,
        source_rows: rows.len(),
        points,
    })
}

fn project(row: &TierRow, fields: &[String]) -> Map<String, Value> {
    let Ok(Value::Object(mut all)) = serde_json::to_value(row) else {
        return Map::new();
    };
    all.remove("client_id");
    if fields.is_empty() {
        return all;
    }
    let mut out = Map::new();
    if let Some(ts) = all.remove("timestamp") {
        out.insert("timestamp".to_string(), ts);
    }
    for field in fields {
        if let Some(v) = all.remove(field.as_str()) {
            out.insert(field.clone(), v);
        }
    }
    out
}
