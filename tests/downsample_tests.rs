// History queries: tier selection, field projection, index-stride sampling

use kunlun::downsample::{HistoryQuery, HistoryRange, query_history};
use kunlun::error::QueryError;
use kunlun::memory_repo::MemoryRepo;
use kunlun::models::{Counters, Gauges, Tier, TierRow};
use kunlun::store::{ClientRegistry, StatusStore};

async fn repo_with_rows(tier: Tier, timestamps: impl IntoIterator<Item = i64>) -> MemoryRepo {
    let repo = MemoryRepo::new();
    let id = repo.resolve_client("m-1", "host").await.unwrap();
    let mut tx = repo.begin(id).await.unwrap();
    for ts in timestamps {
        let row = TierRow {
            client_id: id,
            timestamp: ts,
            counters: Counters {
                reads_completed: ts,
                ..Counters::default()
            },
            gauges: Gauges {
                load_1min: (ts % 7) as f64,
                ..Gauges::default()
            },
            counter_reset: false,
        };
        tx.upsert_row(tier, &row).await.unwrap();
    }
    tx.commit().await.unwrap();
    repo
}

fn timestamps(points: &[serde_json::Map<String, serde_json::Value>]) -> Vec<i64> {
    points
        .iter()
        .map(|p| p["timestamp"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn six_hundred_rows_become_sixty_real_points() {
    let source: Vec<i64> = (1..=600).map(|i| i * 10).collect();
    let repo = repo_with_rows(Tier::Seconds, source.clone()).await;

    let query = HistoryQuery::new(1, HistoryRange::Tier(Tier::Seconds));
    let series = query_history(&repo, &query, 0).await.unwrap();
    assert_eq!(series.source_rows, 600);
    assert_eq!(series.sampling, "index_stride");
    assert_eq!(series.points.len(), 60);

    let ts = timestamps(&series.points);
    assert!(ts.windows(2).all(|w| w[0] < w[1]));
    assert!(ts.iter().all(|t| source.contains(t)));
    // stride 10: indices 0, 10, 20, ...
    assert_eq!(ts[0], 10);
    assert_eq!(ts[1], 110);
    for p in &series.points {
        assert_eq!(p["reads_completed"], p["timestamp"]);
    }
}

#[tokio::test]
async fn short_series_is_returned_unchanged() {
    let repo = repo_with_rows(Tier::Minutes, (1..=40).map(|i| i * 60)).await;
    let query = HistoryQuery::new(1, HistoryRange::Tier(Tier::Minutes));
    let series = query_history(&repo, &query, 0).await.unwrap();
    assert_eq!(series.points.len(), 40);
    assert_eq!(timestamps(&series.points), (1..=40).map(|i| i * 60).collect::<Vec<_>>());
}

#[tokio::test]
async fn fields_are_projected() {
    let repo = repo_with_rows(Tier::Seconds, [10, 20]).await;
    let query = HistoryQuery {
        fields: vec!["load_1min".into()],
        ..HistoryQuery::new(1, HistoryRange::Tier(Tier::Seconds))
    };
    let series = query_history(&repo, &query, 0).await.unwrap();
    let keys: Vec<&String> = series.points[0].keys().collect();
    assert_eq!(keys.len(), 2);
    assert!(series.points[0].contains_key("timestamp"));
    assert_eq!(series.points[1]["load_1min"], 6.0);
}

#[tokio::test]
async fn unknown_field_and_client_are_rejected() {
    let repo = repo_with_rows(Tier::Seconds, [10]).await;

    let query = HistoryQuery {
        fields: vec!["load_1min".into(), "bogus".into()],
        ..HistoryQuery::new(1, HistoryRange::Tier(Tier::Seconds))
    };
    assert_eq!(
        query_history(&repo, &query, 0).await.unwrap_err(),
        QueryError::UnknownField("bogus".into())
    );

    let query = HistoryQuery::new(9, HistoryRange::Tier(Tier::Seconds));
    assert_eq!(
        query_history(&repo, &query, 0).await.unwrap_err(),
        QueryError::UnknownClient(9)
    );

    let query = HistoryQuery::new(1, HistoryRange::Window { seconds: 0 });
    assert_eq!(
        query_history(&repo, &query, 0).await.unwrap_err(),
        QueryError::InvalidWindow(0)
    );
}

#[tokio::test]
async fn window_picks_tier_and_trails_now() {
    let repo = repo_with_rows(Tier::Minutes, (1..=300).map(|i| i * 60)).await;
    let now = 300 * 60;

    // Two hours exceeds the finest tier's span.
    let query = HistoryQuery {
        target_points: 1000,
        ..HistoryQuery::new(1, HistoryRange::Window { seconds: 7200 })
    };
    let series = query_history(&repo, &query, now).await.unwrap();
    assert_eq!(series.tier, Tier::Minutes);
    assert_eq!(series.source_rows, 120);
    let ts = timestamps(&series.points);
    assert_eq!(ts.first(), Some(&(now - 7200 + 60)));
    assert_eq!(ts.last(), Some(&now));

    // One hour reads the finest tier, which is empty here.
    let query = HistoryQuery::new(1, HistoryRange::Window { seconds: 3600 });
    let series = query_history(&repo, &query, now).await.unwrap();
    assert_eq!(series.tier, Tier::Seconds);
    assert!(series.points.is_empty());
}
