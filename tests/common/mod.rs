// Shared test helpers
#![allow(dead_code)]

use std::sync::Arc;

use kunlun::ingest::REPORT_FIELDS;
use kunlun::memory_repo::MemoryRepo;
use kunlun::retry::RetryPolicy;
use kunlun::service::StatusService;
use kunlun::store::StatusStore;

/// Retry quickly in tests.
pub const FAST_RETRY: RetryPolicy = RetryPolicy {
    max_attempts: 4,
    base_delay_ms: 1,
};

/// One report in wire order; every metric starts at zero.
#[derive(Debug, Clone)]
pub struct ReportLine {
    values: Vec<String>,
}

impl ReportLine {
    pub fn new(machine_id: &str, timestamp: i64) -> Self {
        let mut values = vec!["0".to_string(); REPORT_FIELDS.len()];
        values[0] = timestamp.to_string();
        values[REPORT_FIELDS.len() - 2] = machine_id.to_string();
        values[REPORT_FIELDS.len() - 1] = format!("host-{}", machine_id);
        Self { values }
    }

    pub fn set(mut self, field: &str, value: impl ToString) -> Self {
        let idx = REPORT_FIELDS
            .iter()
            .position(|f| *f == field)
            .unwrap_or_else(|| panic!("unknown report field {field}"));
        self.values[idx] = value.to_string();
        self
    }

    /// Drop the last value (hostname) to produce a short report.
    pub fn truncated(mut self) -> Self {
        self.values.pop();
        self
    }

    pub fn line(&self) -> String {
        self.values.join(",")
    }
}

pub fn memory_service() -> (Arc<MemoryRepo>, StatusService) {
    let repo = Arc::new(MemoryRepo::new());
    let store: Arc<dyn StatusStore> = repo.clone();
    (repo, StatusService::new(store, FAST_RETRY))
}

/// Reports at `timestamps` with `net_tx` growing by `step` per 10 s and load alternating 1.0 / 2.0.
pub async fn feed(
    service: &StatusService,
    machine_id: &str,
    timestamps: impl IntoIterator<Item = i64>,
    step: i64,
) {
    for ts in timestamps {
        let load = if (ts / 10) % 2 == 0 { 1.0 } else { 2.0 };
        let line = ReportLine::new(machine_id, ts)
            .set("default_interface_net_tx_bytes", step * (ts / 10))
            .set("load_1min", load)
            .line();
        service.ingest_line(&line).await.unwrap();
    }
}
