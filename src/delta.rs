// Delta derivation between a client's consecutive snapshots.
// Counters: new - previous, clamped at zero on reset. Gauges: copied from the new snapshot.

use crate::error::IngestError;
use crate::models::{Counters, Gauges, Snapshot, TierRow};
use crate::store::ReportTx;

/// Per-interval record produced from two consecutive snapshots of one client.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaRecord {
    pub client_id: i64,
    pub timestamp: i64,
    pub counters: Counters,
    pub gauges: Gauges,
    /// Counter fields that went backwards (reboot / wrap) and were clamped to zero.
    pub reset_fields: Vec<&'static str>,
}

impl DeltaRecord {
    pub fn has_counter_reset(&self) -> bool {
        !self.reset_fields.is_empty()
    }

    /// Finest-tier row for this interval.
    pub fn to_tier_row(&self) -> TierRow {
        TierRow {
            client_id: self.client_id,
            timestamp: self.timestamp,
            counters: self.counters,
            gauges: self.gauges,
            counter_reset: self.has_counter_reset(),
        }
    }
}

fn diff_real(field: &'static str, new: f64, old: f64, resets: &mut Vec<&'static str>) -> f64 {
    let d = new - old;
    if d < 0.0 {
        resets.push(field);
        0.0
    } else {
        d
    }
}

fn diff_int(field: &'static str, new: i64, old: i64, resets: &mut Vec<&'static str>) -> i64 {
    let d = new.saturating_sub(old);
    if d < 0 {
        resets.push(field);
        0
    } else {
        d
    }
}

/// Pure delta between `previous` and `current` (same client, current strictly later).
pub fn derive_delta(previous: &Snapshot, current: &Snapshot) -> DeltaRecord {
    let (n, o) = (&current.counters, &previous.counters);
    let mut resets = Vec::new();
    let r = &mut resets;
    let counters = Counters {
        cpu_user: diff_real("cpu_user", n.cpu_user, o.cpu_user, r),
        cpu_system: diff_real("cpu_system", n.cpu_system, o.cpu_system, r),
        cpu_nice: diff_real("cpu_nice", n.cpu_nice, o.cpu_nice, r),
        cpu_idle: diff_real("cpu_idle", n.cpu_idle, o.cpu_idle, r),
        cpu_iowait: diff_real("cpu_iowait", n.cpu_iowait, o.cpu_iowait, r),
        cpu_irq: diff_real("cpu_irq", n.cpu_irq, o.cpu_irq, r),
        cpu_softirq: diff_real("cpu_softirq", n.cpu_softirq, o.cpu_softirq, r),
        cpu_steal: diff_real("cpu_steal", n.cpu_steal, o.cpu_steal, r),
        default_interface_net_rx_bytes: diff_int(
            "default_interface_net_rx_bytes",
            n.default_interface_net_rx_bytes,
            o.default_interface_net_rx_bytes,
            r,
        ),
        default_interface_net_tx_bytes: diff_int(
            "default_interface_net_tx_bytes",
            n.default_interface_net_tx_bytes,
            o.default_interface_net_tx_bytes,
            r,
        ),
        reads_completed: diff_int("reads_completed", n.reads_completed, o.reads_completed, r),
        writes_completed: diff_int("writes_completed", n.writes_completed, o.writes_completed, r),
        reading_ms: diff_int("reading_ms", n.reading_ms, o.reading_ms, r),
        writing_ms: diff_int("writing_ms", n.writing_ms, o.writing_ms, r),
        iotime_ms: diff_int("iotime_ms", n.iotime_ms, o.iotime_ms, r),
        weighted_io_time: diff_int("weighted_io_time", n.weighted_io_time, o.weighted_io_time, r),
    };
    DeltaRecord {
        client_id: current.client_id,
        timestamp: current.timestamp,
        counters,
        gauges: current.gauges,
        reset_fields: resets,
    }
}

/// Fetch the previous snapshot, overwrite it with `snapshot`, and derive the delta.
///
/// Returns `None` on first contact. Must run inside the client's serialized unit so the
/// read-modify-write of the latest snapshot cannot interleave with another report.
pub async fn compute_delta(
    tx: &mut dyn ReportTx,
    snapshot: &Snapshot,
) -> Result<Option<DeltaRecord>, IngestError> {
    let previous = tx.latest(snapshot.client_id).await?;
    if let Some(prev) = &previous
        && snapshot.timestamp <= prev.timestamp
    {
        return Err(IngestError::OutOfOrder {
            timestamp: snapshot.timestamp,
            previous: prev.timestamp,
        });
    }
    tx.put_latest(snapshot).await?;
    Ok(previous.map(|prev| derive_delta(&prev, snapshot)))
}
