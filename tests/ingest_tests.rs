// Report validation: rejected reports leave the store untouched

mod common;

use common::{ReportLine, feed, memory_service};
use kunlun::error::IngestError;
use kunlun::ingest::REPORT_FIELDS;
use kunlun::models::Tier;
use kunlun::store::{ClientRegistry, StatusStore};

#[tokio::test]
async fn missing_field_is_rejected_without_side_effects() {
    let (repo, service) = memory_service();
    feed(&service, "known", [10, 20], 10).await;

    let line = ReportLine::new("stranger", 30).truncated().line();
    let err = service.ingest_line(&line).await.unwrap_err();
    assert_eq!(
        err,
        IngestError::SchemaMismatch {
            expected: REPORT_FIELDS.len(),
            received: REPORT_FIELDS.len() - 1,
        }
    );

    let latest = repo.latest_all().await.unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].snapshot.timestamp, 20);
    assert!(repo.client(2).await.unwrap().is_none());
    assert_eq!(repo.recent_rows(Tier::Seconds, 1, 10).await.unwrap().len(), 1);
    assert_eq!(service.stats().snapshot().reports_rejected, 1);
}

#[tokio::test]
async fn bad_values_are_rejected_before_registration() {
    let (repo, service) = memory_service();

    let not_a_number = ReportLine::new("m-1", 10).set("reads_completed", "lots").line();
    assert!(matches!(
        service.ingest_line(&not_a_number).await,
        Err(IngestError::FieldTypeError { field: "reads_completed", .. })
    ));

    let fractional_counter = ReportLine::new("m-1", 10).set("writing_ms", "1.5").line();
    assert!(matches!(
        service.ingest_line(&fractional_counter).await,
        Err(IngestError::FieldTypeError { field: "writing_ms", .. })
    ));

    let unaligned = ReportLine::new("m-1", 15).line();
    assert_eq!(
        service.ingest_line(&unaligned).await.unwrap_err(),
        IngestError::UnalignedTimestamp {
            timestamp: 15,
            window: 10
        }
    );

    assert!(repo.client(1).await.unwrap().is_none());
    assert!(repo.latest_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn hostname_change_updates_the_registry() {
    let (repo, service) = memory_service();
    service
        .ingest_line(&ReportLine::new("m-1", 10).line())
        .await
        .unwrap();
    service
        .ingest_line(&ReportLine::new("m-1", 20).set("hostname", "renamed").line())
        .await
        .unwrap();

    let client = repo.client(1).await.unwrap().unwrap();
    assert_eq!(client.machine_id, "m-1");
    assert_eq!(client.hostname, "renamed");
}

#[tokio::test]
async fn rejected_report_leaves_the_hostname_alone() {
    let (repo, service) = memory_service();
    for ts in [10, 20] {
        service
            .ingest_line(&ReportLine::new("m-1", ts).line())
            .await
            .unwrap();
    }

    let err = service
        .ingest_line(&ReportLine::new("m-1", 20).set("hostname", "renamed").line())
        .await
        .unwrap_err();
    assert_eq!(err, IngestError::OutOfOrder { timestamp: 20, previous: 20 });
    assert_eq!(repo.client(1).await.unwrap().unwrap().hostname, "host-m-1");
}

#[tokio::test]
async fn field_list_form_matches_line_form() {
    let (repo, service) = memory_service();
    let line = ReportLine::new("m-1", 10).set("load_5min", 0.25).line();
    let fields: Vec<&str> = line.split(',').collect();
    service.ingest_fields(&fields).await.unwrap();

    let latest = repo.latest_all().await.unwrap();
    assert_eq!(latest[0].snapshot.gauges.load_5min, 0.25);
}
