// Ingest + query facade over a StatusStore.
// Each report runs as one unit under its client's lock: fetch previous, overwrite latest,
// update hostname, insert finest row, trim, cascade, trim, commit. Contention retries the
// whole unit.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::delta;
use crate::downsample::{self, HistoryQuery, HistorySeries};
use crate::error::{IngestError, QueryError};
use crate::ingest::{self, Report};
use crate::models::{LatestStatus, Snapshot, Tier, TierRow};
use crate::retry::{RetryPolicy, retry_transient};
use crate::rollup;
use crate::store::StatusStore;

/// Result of one accepted report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// No previous snapshot; latest stored, no tier row written.
    FirstContact,
    /// Delta stored in the finest tier and cascaded.
    Stored { counter_reset: bool },
}

impl IngestOutcome {
    /// Status code returned to reporting agents.
    pub fn code(self) -> u8 {
        match self {
            Self::FirstContact => 1,
            Self::Stored { .. } => 2,
        }
    }
}

/// Process-lifetime ingest counters.
#[derive(Debug, Default)]
pub struct IngestStats {
    pub reports_accepted: AtomicU64,
    pub reports_rejected: AtomicU64,
    pub first_contacts: AtomicU64,
    pub counter_resets: AtomicU64,
    pub contention_retries: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub reports_accepted: u64,
    pub reports_rejected: u64,
    pub first_contacts: u64,
    pub counter_resets: u64,
    pub contention_retries: u64,
}

impl IngestStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reports_accepted: self.reports_accepted.load(Ordering::Relaxed),
            reports_rejected: self.reports_rejected.load(Ordering::Relaxed),
            first_contacts: self.first_contacts.load(Ordering::Relaxed),
            counter_resets: self.counter_resets.load(Ordering::Relaxed),
            contention_retries: self.contention_retries.load(Ordering::Relaxed),
        }
    }
}

pub struct StatusService {
    store: Arc<dyn StatusStore>,
    locks: DashMap<i64, Arc<Mutex<()>>>,
    retry: RetryPolicy,
    stats: Arc<IngestStats>,
}

impl StatusService {
    pub fn new(store: Arc<dyn StatusStore>, retry: RetryPolicy) -> Self {
        Self {
            store,
            locks: DashMap::new(),
            retry,
            stats: Arc::new(IngestStats::default()),
        }
    }

    pub fn store(&self) -> &Arc<dyn StatusStore> {
        &self.store
    }

    pub fn stats(&self) -> Arc<IngestStats> {
        Arc::clone(&self.stats)
    }

    fn client_lock(&self, client_id: i64) -> Arc<Mutex<()>> {
        self.locks.entry(client_id).or_default().clone()
    }

    /// Parse and apply one comma-separated report.
    pub async fn ingest_line(&self, line: &str) -> Result<IngestOutcome, IngestError> {
        let report = self.reject_on_err(ingest::parse_line(line))?;
        self.ingest_report(report).await
    }

    /// Parse and apply one report given as an ordered field list.
    pub async fn ingest_fields(&self, values: &[&str]) -> Result<IngestOutcome, IngestError> {
        let report = self.reject_on_err(ingest::parse_fields(values))?;
        self.ingest_report(report).await
    }

    /// Resolve the client, then run the per-report unit with contention retries.
    pub async fn ingest_report(&self, report: Report) -> Result<IngestOutcome, IngestError> {
        let store = self.store.as_ref();
        let resolved = self
            .with_retry(|| {
                let report = report.clone();
                async move {
                    ingest::into_snapshot(store, report)
                        .await
                        .map_err(IngestError::from)
                }
            })
            .await;
        let snapshot = self.reject_on_err(resolved)?;

        let lock = self.client_lock(snapshot.client_id);
        let _guard = lock.lock().await;
        let result = self
            .with_retry(|| self.apply_report(&snapshot, &report.hostname))
            .await;
        let outcome = self.reject_on_err(result)?;

        self.stats.reports_accepted.fetch_add(1, Ordering::Relaxed);
        match outcome {
            IngestOutcome::FirstContact => {
                self.stats.first_contacts.fetch_add(1, Ordering::Relaxed);
            }
            IngestOutcome::Stored {
                counter_reset: true,
            } => {
                self.stats.counter_resets.fetch_add(1, Ordering::Relaxed);
            }
            IngestOutcome::Stored { .. } => {}
        }
        Ok(outcome)
    }

    /// One atomic unit. Any error drops the unit uncommitted, which rolls it back.
    async fn apply_report(
        &self,
        snapshot: &Snapshot,
        hostname: &str,
    ) -> Result<IngestOutcome, IngestError> {
        let mut tx = self.store.begin(snapshot.client_id).await?;

        let delta = delta::compute_delta(tx.as_mut(), snapshot).await?;
        tx.set_hostname(snapshot.client_id, hostname).await?;
        let Some(delta) = delta else {
            tx.commit().await?;
            return Ok(IngestOutcome::FirstContact);
        };

        if delta.has_counter_reset() {
            warn!(
                client_id = delta.client_id,
                timestamp = delta.timestamp,
                fields = ?delta.reset_fields,
                "Counter reset, delta clamped to zero"
            );
        }

        let outcome = rollup::apply_delta(tx.as_mut(), &delta).await?;
        tx.commit().await?;

        debug!(
            client_id = delta.client_id,
            timestamp = delta.timestamp,
            aggregated = outcome.aggregated.len(),
            trimmed = outcome.rows_trimmed,
            "report stored"
        );
        Ok(IngestOutcome::Stored {
            counter_reset: delta.has_counter_reset(),
        })
    }

    async fn with_retry<T, F, Fut>(&self, operation: F) -> Result<T, IngestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, IngestError>>,
    {
        match retry_transient(self.retry, operation).await {
            Ok((value, attempts)) => {
                self.count_retries(attempts);
                Ok(value)
            }
            Err((IngestError::StoreContention { reason, .. }, attempts)) => {
                self.count_retries(attempts);
                Err(IngestError::StoreContention { attempts, reason })
            }
            Err((e, attempts)) => {
                self.count_retries(attempts);
                Err(e)
            }
        }
    }

    fn count_retries(&self, attempts: u32) {
        if attempts > 1 {
            self.stats
                .contention_retries
                .fetch_add(u64::from(attempts - 1), Ordering::Relaxed);
        }
    }

    fn reject_on_err<T>(&self, result: Result<T, IngestError>) -> Result<T, IngestError> {
        if result.is_err() {
            self.stats.reports_rejected.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Every client's latest snapshot with its identity.
    pub async fn latest(&self) -> Result<Vec<LatestStatus>, QueryError> {
        Ok(self.store.latest_all().await?)
    }

    /// Newest-first rows of one tier. `limit` defaults to and is clamped at the tier cap.
    pub async fn tier_history(
        &self,
        tier: Tier,
        client_id: i64,
        limit: Option<u64>,
    ) -> Result<Vec<TierRow>, QueryError> {
        if self.store.client(client_id).await?.is_none() {
            return Err(QueryError::UnknownClient(client_id));
        }
        let limit = limit.unwrap_or(tier.cap()).min(tier.cap());
        Ok(self.store.recent_rows(tier, client_id, limit).await?)
    }

    /// Downsampled history anchored at the current wall clock.
    pub async fn history(&self, query: &HistoryQuery) -> Result<HistorySeries, QueryError> {
        let now = chrono::Utc::now().timestamp();
        downsample::query_history(self.store.as_ref(), query, now).await
    }
}
