// Report schema: counter fields (monotonic, delta'd then summed) and gauge fields
// (copied then averaged).

use std::ops::Add;

use serde::{Deserialize, Serialize};

/// Monotonically non-decreasing host counters. In a Snapshot they are absolute values;
/// in a DeltaRecord or TierRow they are per-interval differences (or sums of them).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Counters {
    pub cpu_user: f64,
    pub cpu_system: f64,
    pub cpu_nice: f64,
    pub cpu_idle: f64,
    pub cpu_iowait: f64,
    pub cpu_irq: f64,
    pub cpu_softirq: f64,
    pub cpu_steal: f64,
    pub default_interface_net_rx_bytes: i64,
    pub default_interface_net_tx_bytes: i64,
    pub reads_completed: i64,
    pub writes_completed: i64,
    pub reading_ms: i64,
    pub writing_ms: i64,
    pub iotime_ms: i64,
    pub weighted_io_time: i64,
}

impl Counters {
    /// Column order used for SQL binds and field validation.
    pub const COLUMNS: [&'static str; 16] = [
        "cpu_user",
        "cpu_system",
        "cpu_nice",
        "cpu_idle",
        "cpu_iowait",
        "cpu_irq",
        "cpu_softirq",
        "cpu_steal",
        "default_interface_net_rx_bytes",
        "default_interface_net_tx_bytes",
        "reads_completed",
        "writes_completed",
        "reading_ms",
        "writing_ms",
        "iotime_ms",
        "weighted_io_time",
    ];
}

impl Add for Counters {
    type Output = Counters;

    fn add(self, rhs: Counters) -> Counters {
        Counters {
            cpu_user: self.cpu_user + rhs.cpu_user,
            cpu_system: self.cpu_system + rhs.cpu_system,
            cpu_nice: self.cpu_nice + rhs.cpu_nice,
            cpu_idle: self.cpu_idle + rhs.cpu_idle,
            cpu_iowait: self.cpu_iowait + rhs.cpu_iowait,
            cpu_irq: self.cpu_irq + rhs.cpu_irq,
            cpu_softirq: self.cpu_softirq + rhs.cpu_softirq,
            cpu_steal: self.cpu_steal + rhs.cpu_steal,
            default_interface_net_rx_bytes: self
                .default_interface_net_rx_bytes
                .saturating_add(rhs.default_interface_net_rx_bytes),
            default_interface_net_tx_bytes: self
                .default_interface_net_tx_bytes
                .saturating_add(rhs.default_interface_net_tx_bytes),
            reads_completed: self.reads_completed.saturating_add(rhs.reads_completed),
            writes_completed: self.writes_completed.saturating_add(rhs.writes_completed),
            reading_ms: self.reading_ms.saturating_add(rhs.reading_ms),
            writing_ms: self.writing_ms.saturating_add(rhs.writing_ms),
            iotime_ms: self.iotime_ms.saturating_add(rhs.iotime_ms),
            weighted_io_time: self.weighted_io_time.saturating_add(rhs.weighted_io_time),
        }
    }
}

/// Instantaneous host gauges. Integer-declared gauges (task counts, core count, ...) are
/// validated as integers on ingest but carried as f64 so tier averages share one type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Gauges {
    pub uptime_s: f64,
    pub load_1min: f64,
    pub load_5min: f64,
    pub load_15min: f64,
    pub running_tasks: f64,
    pub total_tasks: f64,
    pub mem_total_mib: f64,
    pub mem_free_mib: f64,
    pub mem_used_mib: f64,
    pub mem_buff_cache_mib: f64,
    pub tcp_connections: f64,
    pub udp_connections: f64,
    pub cpu_num_cores: f64,
    pub cpu_delay_us: f64,
    pub disk_delay_us: f64,
    pub root_disk_total_kb: f64,
    pub root_disk_avail_kb: f64,
    pub ios_in_progress: f64,
}

impl Gauges {
    pub const COLUMNS: [&'static str; 18] = [
        "uptime_s",
        "load_1min",
        "load_5min",
        "load_15min",
        "running_tasks",
        "total_tasks",
        "mem_total_mib",
        "mem_free_mib",
        "mem_used_mib",
        "mem_buff_cache_mib",
        "tcp_connections",
        "udp_connections",
        "cpu_num_cores",
        "cpu_delay_us",
        "disk_delay_us",
        "root_disk_total_kb",
        "root_disk_avail_kb",
        "ios_in_progress",
    ];

    /// Apply `f` to every gauge (e.g. divide-and-round for window averages).
    pub fn map(self, f: impl Fn(f64) -> f64) -> Gauges {
        Gauges {
            uptime_s: f(self.uptime_s),
            load_1min: f(self.load_1min),
            load_5min: f(self.load_5min),
            load_15min: f(self.load_15min),
            running_tasks: f(self.running_tasks),
            total_tasks: f(self.total_tasks),
            mem_total_mib: f(self.mem_total_mib),
            mem_free_mib: f(self.mem_free_mib),
            mem_used_mib: f(self.mem_used_mib),
            mem_buff_cache_mib: f(self.mem_buff_cache_mib),
            tcp_connections: f(self.tcp_connections),
            udp_connections: f(self.udp_connections),
            cpu_num_cores: f(self.cpu_num_cores),
            cpu_delay_us: f(self.cpu_delay_us),
            disk_delay_us: f(self.disk_delay_us),
            root_disk_total_kb: f(self.root_disk_total_kb),
            root_disk_avail_kb: f(self.root_disk_avail_kb),
            ios_in_progress: f(self.ios_in_progress),
        }
    }
}

impl Add for Gauges {
    type Output = Gauges;

    fn add(self, rhs: Gauges) -> Gauges {
        Gauges {
            uptime_s: self.uptime_s + rhs.uptime_s,
            load_1min: self.load_1min + rhs.load_1min,
            load_5min: self.load_5min + rhs.load_5min,
            load_15min: self.load_15min + rhs.load_15min,
            running_tasks: self.running_tasks + rhs.running_tasks,
            total_tasks: self.total_tasks + rhs.total_tasks,
            mem_total_mib: self.mem_total_mib + rhs.mem_total_mib,
            mem_free_mib: self.mem_free_mib + rhs.mem_free_mib,
            mem_used_mib: self.mem_used_mib + rhs.mem_used_mib,
            mem_buff_cache_mib: self.mem_buff_cache_mib + rhs.mem_buff_cache_mib,
            tcp_connections: self.tcp_connections + rhs.tcp_connections,
            udp_connections: self.udp_connections + rhs.udp_connections,
            cpu_num_cores: self.cpu_num_cores + rhs.cpu_num_cores,
            cpu_delay_us: self.cpu_delay_us + rhs.cpu_delay_us,
            disk_delay_us: self.disk_delay_us + rhs.disk_delay_us,
            root_disk_total_kb: self.root_disk_total_kb + rhs.root_disk_total_kb,
            root_disk_avail_kb: self.root_disk_avail_kb + rhs.root_disk_avail_kb,
            ios_in_progress: self.ios_in_progress + rhs.ios_in_progress,
        }
    }
}

/// One client's most recent raw report. Exactly one exists per client; overwritten,
/// never historized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Snapshot {
    pub client_id: i64,
    pub timestamp: i64,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub counters: Counters,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub gauges: Gauges,
}

/// True when `name` is a counter or gauge column.
pub fn is_metric_field(name: &str) -> bool {
    Counters::COLUMNS.contains(&name) || Gauges::COLUMNS.contains(&name)
}
