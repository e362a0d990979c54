// Window aggregation: pure logic, no store access.
// Counters are summed exactly (real-valued sums are not rounded); gauges are averaged and
// rounded to two decimals.

use crate::models::{Counters, Gauges, TierRow};

/// Round to two decimal places (half away from zero).
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Summarize finer-tier rows of one client into one coarser row.
///
/// Timestamp is the max timestamp of the input (not the window boundary), so a window whose
/// boundary report was missed still lands on a real sample time. Returns None for an empty slice.
pub fn aggregate_rows(rows: &[TierRow]) -> Option<TierRow> {
    let first = rows.first()?;

    let counters = rows
        .iter()
        .fold(Counters::default(), |acc, r| acc + r.counters);
    let n = rows.len() as f64;
    let gauges = rows
        .iter()
        .fold(Gauges::default(), |acc, r| acc + r.gauges)
        .map(|sum| round2(sum / n));
    let timestamp = rows.iter().map(|r| r.timestamp).max().unwrap_or(first.timestamp);

    Some(TierRow {
        client_id: first.client_id,
        timestamp,
        counters,
        gauges,
        counter_reset: rows.iter().any(|r| r.counter_reset),
    })
}
