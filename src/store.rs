//! Storage interfaces for client identity, latest snapshots and tier rows.
//!
//! Two backends implement these: `history_repo::HistoryRepo` (SQLite) and
//! `memory_repo::MemoryRepo` (ordered maps). Components receive the store explicitly;
//! the process entry point owns its lifecycle.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{Client, LatestStatus, Snapshot, Tier, TierRow};

/// Identity registry: opaque machine id <-> stable integer id <-> display name.
#[async_trait]
pub trait ClientRegistry: Send + Sync {
    /// Lookup-or-create. A new client is registered with `hostname`; an existing one keeps
    /// its name until a report unit commits a change through `ReportTx::set_hostname`.
    async fn resolve_client(&self, machine_id: &str, hostname: &str) -> Result<i64, StoreError>;

    async fn client(&self, client_id: i64) -> Result<Option<Client>, StoreError>;
}

/// Read side plus the entry point for per-report write units.
#[async_trait]
pub trait StatusStore: ClientRegistry {
    /// Open one atomic unit of work for `client_id`. Dropping it without `commit` rolls back.
    async fn begin(&self, client_id: i64) -> Result<Box<dyn ReportTx>, StoreError>;

    /// Every client's latest snapshot joined with its identity, ordered by client id.
    async fn latest_all(&self) -> Result<Vec<LatestStatus>, StoreError>;

    /// Up to `limit` rows, newest first.
    async fn recent_rows(
        &self,
        tier: Tier,
        client_id: i64,
        limit: u64,
    ) -> Result<Vec<TierRow>, StoreError>;

    /// Rows with `after < timestamp <= through`, oldest first.
    async fn rows_in_range(
        &self,
        tier: Tier,
        client_id: i64,
        after: i64,
        through: i64,
    ) -> Result<Vec<TierRow>, StoreError>;
}

/// Operations available inside one per-report unit. All reads observe the unit's own writes.
#[async_trait]
pub trait ReportTx: Send {
    async fn latest(&mut self, client_id: i64) -> Result<Option<Snapshot>, StoreError>;

    /// Rename the client if `hostname` differs. Applied only if the unit commits.
    async fn set_hostname(&mut self, client_id: i64, hostname: &str) -> Result<(), StoreError>;

    /// Overwrite the client's latest snapshot.
    async fn put_latest(&mut self, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Insert or replace the row at (client_id, timestamp).
    async fn upsert_row(&mut self, tier: Tier, row: &TierRow) -> Result<(), StoreError>;

    /// Rows with `after < timestamp <= through`, oldest first.
    async fn scan(
        &mut self,
        tier: Tier,
        client_id: i64,
        after: i64,
        through: i64,
    ) -> Result<Vec<TierRow>, StoreError>;

    async fn count_rows(&mut self, tier: Tier, client_id: i64) -> Result<u64, StoreError>;

    /// Timestamp of the row at `offset` in ascending timestamp order.
    async fn timestamp_at(
        &mut self,
        tier: Tier,
        client_id: i64,
        offset: u64,
    ) -> Result<Option<i64>, StoreError>;

    /// Delete rows with `timestamp <= through`. Returns rows removed.
    async fn delete_through(
        &mut self,
        tier: Tier,
        client_id: i64,
        through: i64,
    ) -> Result<u64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
