// SQLite store: client registry, latest snapshot per client, one table per tier.
// Uses sqlx for async + connection pooling. Each report runs in one transaction; dropping an
// uncommitted transaction rolls it back. Units open with BEGIN IMMEDIATE so the write lock is
// taken up front and waits on busy_timeout instead of failing a read-to-write upgrade.

mod schema;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::{Sqlite, Transaction};
use tracing::instrument;

use crate::error::StoreError;
use crate::models::{Client, Counters, Gauges, LatestStatus, Snapshot, Tier, TierRow};
use crate::store::{ClientRegistry, ReportTx, StatusStore};

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

pub struct HistoryRepo {
    pool: SqlitePool,
}

impl HistoryRepo {
    /// Connect to SQLite at `path`, create parent dir and DB if missing, enable WAL + pragmas.
    pub async fn connect(
        path: &str,
        max_pool_size: u32,
        busy_timeout: Duration,
    ) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(busy_timeout)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        schema::init_tables(&self.pool).await
    }

    /// Reclaim space after trims.
    #[instrument(skip(self), fields(repo = "history", operation = "vacuum"))]
    pub async fn vacuum(&self) -> anyhow::Result<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }
}

fn bind_metrics<'q>(q: SqliteQuery<'q>, counters: &Counters, gauges: &Gauges) -> SqliteQuery<'q> {
    // Order must match Counters::COLUMNS then Gauges::COLUMNS.
    q.bind(counters.cpu_user)
        .bind(counters.cpu_system)
        .bind(counters.cpu_nice)
        .bind(counters.cpu_idle)
        .bind(counters.cpu_iowait)
        .bind(counters.cpu_irq)
        .bind(counters.cpu_softirq)
        .bind(counters.cpu_steal)
        .bind(counters.default_interface_net_rx_bytes)
        .bind(counters.default_interface_net_tx_bytes)
        .bind(counters.reads_completed)
        .bind(counters.writes_completed)
        .bind(counters.reading_ms)
        .bind(counters.writing_ms)
        .bind(counters.iotime_ms)
        .bind(counters.weighted_io_time)
        .bind(gauges.uptime_s)
        .bind(gauges.load_1min)
        .bind(gauges.load_5min)
        .bind(gauges.load_15min)
        .bind(gauges.running_tasks)
        .bind(gauges.total_tasks)
        .bind(gauges.mem_total_mib)
        .bind(gauges.mem_free_mib)
        .bind(gauges.mem_used_mib)
        .bind(gauges.mem_buff_cache_mib)
        .bind(gauges.tcp_connections)
        .bind(gauges.udp_connections)
        .bind(gauges.cpu_num_cores)
        .bind(gauges.cpu_delay_us)
        .bind(gauges.disk_delay_us)
        .bind(gauges.root_disk_total_kb)
        .bind(gauges.root_disk_avail_kb)
        .bind(gauges.ios_in_progress)
}

fn range_sql(tier: Tier) -> String {
    format!(
        "SELECT * FROM {} WHERE client_id = ? AND timestamp > ? AND timestamp <= ? \
         ORDER BY timestamp ASC",
        tier.table()
    )
}

#[async_trait]
impl ClientRegistry for HistoryRepo {
    #[instrument(skip(self), fields(repo = "history", operation = "resolve_client"))]
    async fn resolve_client(&self, machine_id: &str, hostname: &str) -> Result<i64, StoreError> {
        let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM client WHERE machine_id = ?")
            .bind(machine_id)
            .fetch_optional(&self.pool)
            .await?;
        if let Some(id) = existing {
            return Ok(id);
        }

        let inserted = sqlx::query(
            "INSERT INTO client (machine_id, hostname) VALUES (?, ?) \
             ON CONFLICT(machine_id) DO NOTHING",
        )
        .bind(machine_id)
        .bind(hostname)
        .execute(&self.pool)
        .await?
        .rows_affected();
        let id: i64 = sqlx::query_scalar("SELECT id FROM client WHERE machine_id = ?")
            .bind(machine_id)
            .fetch_one(&self.pool)
            .await?;
        if inserted > 0 {
            tracing::info!(client_id = id, machine_id, "New client registered");
        }
        Ok(id)
    }

    async fn client(&self, client_id: i64) -> Result<Option<Client>, StoreError> {
        let client = sqlx::query_as("SELECT id, machine_id, hostname FROM client WHERE id = ?")
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(client)
    }
}

#[async_trait]
impl StatusStore for HistoryRepo {
    async fn begin(&self, _client_id: i64) -> Result<Box<dyn ReportTx>, StoreError> {
        let tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        Ok(Box::new(SqliteReportTx { tx }))
    }

    #[instrument(skip(self), fields(repo = "history", operation = "latest_all"))]
    async fn latest_all(&self) -> Result<Vec<LatestStatus>, StoreError> {
        let rows = sqlx::query_as(
            "SELECT sl.*, c.machine_id, c.hostname
             FROM status_latest sl JOIN client c ON sl.client_id = c.id
             ORDER BY sl.client_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    #[instrument(skip(self), fields(repo = "history", operation = "recent_rows"))]
    async fn recent_rows(
        &self,
        tier: Tier,
        client_id: i64,
        limit: u64,
    ) -> Result<Vec<TierRow>, StoreError> {
        let sql = format!(
            "SELECT * FROM {} WHERE client_id = ? ORDER BY timestamp DESC LIMIT ?",
            tier.table()
        );
        let rows = sqlx::query_as(&sql)
            .bind(client_id)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    #[instrument(skip(self), fields(repo = "history", operation = "rows_in_range"))]
    async fn rows_in_range(
        &self,
        tier: Tier,
        client_id: i64,
        after: i64,
        through: i64,
    ) -> Result<Vec<TierRow>, StoreError> {
        let sql = range_sql(tier);
        let rows = sqlx::query_as(&sql)
            .bind(client_id)
            .bind(after)
            .bind(through)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

/// One report's transaction.
struct SqliteReportTx {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl ReportTx for SqliteReportTx {
    async fn latest(&mut self, client_id: i64) -> Result<Option<Snapshot>, StoreError> {
        let snapshot = sqlx::query_as("SELECT * FROM status_latest WHERE client_id = ?")
            .bind(client_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(snapshot)
    }

    async fn set_hostname(&mut self, client_id: i64, hostname: &str) -> Result<(), StoreError> {
        let changed = sqlx::query("UPDATE client SET hostname = ? WHERE id = ? AND hostname <> ?")
            .bind(hostname)
            .bind(client_id)
            .bind(hostname)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();
        if changed > 0 {
            tracing::info!(client_id, hostname, "Hostname updated");
        }
        Ok(())
    }

    async fn put_latest(&mut self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let q = sqlx::query(schema::LATEST_UPSERT.as_str())
            .bind(snapshot.client_id)
            .bind(snapshot.timestamp);
        bind_metrics(q, &snapshot.counters, &snapshot.gauges)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn upsert_row(&mut self, tier: Tier, row: &TierRow) -> Result<(), StoreError> {
        let q = sqlx::query(schema::TIER_UPSERT[tier.index()].as_str())
            .bind(row.client_id)
            .bind(row.timestamp);
        bind_metrics(q, &row.counters, &row.gauges)
            .bind(row.counter_reset)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn scan(
        &mut self,
        tier: Tier,
        client_id: i64,
        after: i64,
        through: i64,
    ) -> Result<Vec<TierRow>, StoreError> {
        let sql = range_sql(tier);
        let rows = sqlx::query_as(&sql)
            .bind(client_id)
            .bind(after)
            .bind(through)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows)
    }

    async fn count_rows(&mut self, tier: Tier, client_id: i64) -> Result<u64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE client_id = ?", tier.table());
        let n: i64 = sqlx::query_scalar(&sql)
            .bind(client_id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(n.max(0) as u64)
    }

    async fn timestamp_at(
        &mut self,
        tier: Tier,
        client_id: i64,
        offset: u64,
    ) -> Result<Option<i64>, StoreError> {
        let sql = format!(
            "SELECT timestamp FROM {} WHERE client_id = ? ORDER BY timestamp ASC LIMIT 1 OFFSET ?",
            tier.table()
        );
        let ts = sqlx::query_scalar(&sql)
            .bind(client_id)
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(ts)
    }

    async fn delete_through(
        &mut self,
        tier: Tier,
        client_id: i64,
        through: i64,
    ) -> Result<u64, StoreError> {
        let sql = format!(
            "DELETE FROM {} WHERE client_id = ? AND timestamp <= ?",
            tier.table()
        );
        let r = sqlx::query(&sql)
            .bind(client_id)
            .bind(through)
            .execute(&mut *self.tx)
            .await?;
        Ok(r.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
