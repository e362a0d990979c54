// Cascade, aggregation and retention against the in-memory store

use kunlun::memory_repo::MemoryRepo;
use kunlun::models::{Counters, Gauges, Tier, TierRow};
use kunlun::rollup::{self, aggregation};
use kunlun::store::StatusStore;

fn row(timestamp: i64, net_tx: i64, cpu_user: f64, load: f64) -> TierRow {
    TierRow {
        client_id: 1,
        timestamp,
        counters: Counters {
            default_interface_net_tx_bytes: net_tx,
            cpu_user,
            ..Counters::default()
        },
        gauges: Gauges {
            load_1min: load,
            mem_used_mib: 100.0 + timestamp as f64,
            ..Gauges::default()
        },
        counter_reset: false,
    }
}

#[test]
fn aggregate_sums_counters_and_averages_gauges() {
    let rows = vec![
        row(10, 100, 0.5, 1.0),
        row(20, 200, 1.25, 2.0),
        row(30, 300, 0.25, 2.0),
    ];
    let agg = aggregation::aggregate_rows(&rows).unwrap();
    assert_eq!(agg.timestamp, 30);
    assert_eq!(agg.counters.default_interface_net_tx_bytes, 600);
    assert_eq!(agg.counters.cpu_user, 2.0);
    // (1 + 2 + 2) / 3 = 1.666.. -> 1.67
    assert_eq!(agg.gauges.load_1min, 1.67);
    assert_eq!(agg.gauges.mem_used_mib, 120.0);
    assert!(!agg.counter_reset);
}

#[test]
fn aggregate_keeps_real_counter_sums_unrounded() {
    let rows = vec![row(10, 0, 0.1, 0.0), row(20, 0, 0.2, 0.0), row(30, 0, 0.005, 0.0)];
    let agg = aggregation::aggregate_rows(&rows).unwrap();
    assert_eq!(agg.counters.cpu_user, 0.0 + 0.1 + 0.2 + 0.005);
    assert_ne!(agg.counters.cpu_user, aggregation::round2(agg.counters.cpu_user));
}

#[test]
fn aggregate_timestamp_is_latest_input() {
    // Boundary row missing: the aggregate lands on the last real sample.
    let rows = vec![row(10, 1, 0.0, 0.0), row(40, 1, 0.0, 0.0)];
    assert_eq!(aggregation::aggregate_rows(&rows).unwrap().timestamp, 40);
}

#[test]
fn aggregate_propagates_reset_flag() {
    let mut flagged = row(20, 0, 0.0, 0.0);
    flagged.counter_reset = true;
    let agg = aggregation::aggregate_rows(&[row(10, 5, 0.0, 0.0), flagged]).unwrap();
    assert!(agg.counter_reset);
}

#[tokio::test]
async fn cascade_is_idempotent_per_boundary() {
    let repo = MemoryRepo::new();
    let mut tx = repo.begin(1).await.unwrap();
    for ts in (10..=60).step_by(10) {
        tx.upsert_row(Tier::Seconds, &row(ts, 1000, 0.0, 1.0)).await.unwrap();
    }

    let (first, _) = rollup::cascade_into(tx.as_mut(), Tier::Minutes, 1, 60)
        .await
        .unwrap()
        .unwrap();
    let (second, _) = rollup::cascade_into(tx.as_mut(), Tier::Minutes, 1, 60)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(first.counters.default_interface_net_tx_bytes, 6000);
    assert_eq!(tx.count_rows(Tier::Minutes, 1).await.unwrap(), 1);
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn cascade_skips_non_boundaries_and_empty_windows() {
    let repo = MemoryRepo::new();
    let mut tx = repo.begin(1).await.unwrap();
    tx.upsert_row(Tier::Seconds, &row(50, 1, 0.0, 0.0)).await.unwrap();

    assert!(rollup::cascade_into(tx.as_mut(), Tier::Minutes, 1, 50).await.unwrap().is_none());
    // (60, 120] is empty
    assert!(rollup::cascade_into(tx.as_mut(), Tier::Minutes, 1, 120).await.unwrap().is_none());
    // the finest tier has nothing finer to cascade from
    assert!(rollup::cascade_into(tx.as_mut(), Tier::Seconds, 1, 60).await.unwrap().is_none());
    assert_eq!(tx.count_rows(Tier::Minutes, 1).await.unwrap(), 0);
}

#[tokio::test]
async fn trim_keeps_the_newest_rows() {
    let repo = MemoryRepo::new();
    let mut tx = repo.begin(1).await.unwrap();
    for ts in (10..=100).step_by(10) {
        tx.upsert_row(Tier::Hours, &row(ts, 1, 0.0, 0.0)).await.unwrap();
    }

    assert_eq!(rollup::trim_to(tx.as_mut(), Tier::Hours, 1, 4).await.unwrap(), 6);
    // second call is a no-op
    assert_eq!(rollup::trim_to(tx.as_mut(), Tier::Hours, 1, 4).await.unwrap(), 0);
    assert_eq!(rollup::trim(tx.as_mut(), Tier::Hours, 1).await.unwrap(), 0);
    tx.commit().await.unwrap();

    let kept: Vec<i64> = repo
        .rows_in_range(Tier::Hours, 1, i64::MIN, i64::MAX)
        .await
        .unwrap()
        .iter()
        .map(|r| r.timestamp)
        .collect();
    assert_eq!(kept, vec![70, 80, 90, 100]);
}
