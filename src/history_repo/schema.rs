// Table layout: client registry, one latest row per client, one table per tier.
// Metric columns are shared by every status table; tier tables add counter_reset.

use std::sync::LazyLock;

use sqlx::SqlitePool;

use crate::models::{Counters, Gauges, Tier};

/// Column definitions in `Counters::COLUMNS` then `Gauges::COLUMNS` order.
const METRIC_COLUMNS_DDL: &str = r#"
    cpu_user REAL NOT NULL,
    cpu_system REAL NOT NULL,
    cpu_nice REAL NOT NULL,
    cpu_idle REAL NOT NULL,
    cpu_iowait REAL NOT NULL,
    cpu_irq REAL NOT NULL,
    cpu_softirq REAL NOT NULL,
    cpu_steal REAL NOT NULL,
    default_interface_net_rx_bytes INTEGER NOT NULL,
    default_interface_net_tx_bytes INTEGER NOT NULL,
    reads_completed INTEGER NOT NULL,
    writes_completed INTEGER NOT NULL,
    reading_ms INTEGER NOT NULL,
    writing_ms INTEGER NOT NULL,
    iotime_ms INTEGER NOT NULL,
    weighted_io_time INTEGER NOT NULL,
    uptime_s REAL NOT NULL,
    load_1min REAL NOT NULL,
    load_5min REAL NOT NULL,
    load_15min REAL NOT NULL,
    running_tasks REAL NOT NULL,
    total_tasks REAL NOT NULL,
    mem_total_mib REAL NOT NULL,
    mem_free_mib REAL NOT NULL,
    mem_used_mib REAL NOT NULL,
    mem_buff_cache_mib REAL NOT NULL,
    tcp_connections REAL NOT NULL,
    udp_connections REAL NOT NULL,
    cpu_num_cores REAL NOT NULL,
    cpu_delay_us REAL NOT NULL,
    disk_delay_us REAL NOT NULL,
    root_disk_total_kb REAL NOT NULL,
    root_disk_avail_kb REAL NOT NULL,
    ios_in_progress REAL NOT NULL
"#;

/// `INSERT OR REPLACE` for status_latest.
pub(super) static LATEST_UPSERT: LazyLock<String> =
    LazyLock::new(|| upsert_sql("status_latest", false));

/// `INSERT OR REPLACE` per tier, indexed by `Tier::index`.
pub(super) static TIER_UPSERT: LazyLock<[String; 3]> =
    LazyLock::new(|| Tier::ALL.map(|tier| upsert_sql(tier.table(), true)));

fn upsert_sql(table: &str, with_reset_flag: bool) -> String {
    let mut columns = vec!["client_id", "timestamp"];
    columns.extend(Counters::COLUMNS);
    columns.extend(Gauges::COLUMNS);
    if with_reset_flag {
        columns.push("counter_reset");
    }
    format!(
        "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        vec!["?"; columns.len()].join(", ")
    )
}

/// Create all tables if not present.
pub(super) async fn init_tables(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS client (
            id INTEGER PRIMARY KEY NOT NULL,
            machine_id TEXT UNIQUE NOT NULL,
            hostname TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let latest = format!(
        "CREATE TABLE IF NOT EXISTS status_latest (
            client_id INTEGER PRIMARY KEY NOT NULL,
            timestamp INTEGER NOT NULL,
            {METRIC_COLUMNS_DDL},
            FOREIGN KEY (client_id) REFERENCES client(id)
        )"
    );
    sqlx::query(&latest).execute(pool).await?;

    for tier in Tier::ALL {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                client_id INTEGER NOT NULL,
                timestamp INTEGER NOT NULL,
                {METRIC_COLUMNS_DDL},
                counter_reset INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (client_id, timestamp),
                FOREIGN KEY (client_id) REFERENCES client(id)
            )",
            tier.table()
        );
        sqlx::query(&ddl).execute(pool).await?;
    }

    Ok(())
}
