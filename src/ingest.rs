// Report validation: fixed-arity field list -> typed Report -> Snapshot (after identity lookup).
// Validation never touches the store; registration only happens for a fully valid report.

use crate::error::{IngestError, StoreError};
use crate::models::{Counters, Gauges, Snapshot, Tier};
use crate::store::ClientRegistry;

/// Wire order of one report line.
pub const REPORT_FIELDS: [&str; 37] = [
    "timestamp",
    "uptime_s",
    "load_1min",
    "load_5min",
    "load_15min",
    "running_tasks",
    "total_tasks",
    "cpu_user",
    "cpu_system",
    "cpu_nice",
    "cpu_idle",
    "cpu_iowait",
    "cpu_irq",
    "cpu_softirq",
    "cpu_steal",
    "mem_total_mib",
    "mem_free_mib",
    "mem_used_mib",
    "mem_buff_cache_mib",
    "tcp_connections",
    "udp_connections",
    "default_interface_net_rx_bytes",
    "default_interface_net_tx_bytes",
    "cpu_num_cores",
    "cpu_delay_us",
    "disk_delay_us",
    "root_disk_total_kb",
    "root_disk_avail_kb",
    "reads_completed",
    "writes_completed",
    "reading_ms",
    "writing_ms",
    "iotime_ms",
    "ios_in_progress",
    "weighted_io_time",
    "machine_id",
    "hostname",
];

const DEFAULT_HOSTNAME: &str = "unknown";

/// A validated report, not yet bound to a client id.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub machine_id: String,
    pub hostname: String,
    pub timestamp: i64,
    pub counters: Counters,
    pub gauges: Gauges,
}

impl Report {
    pub fn into_snapshot(self, client_id: i64) -> Snapshot {
        Snapshot {
            client_id,
            timestamp: self.timestamp,
            counters: self.counters,
            gauges: self.gauges,
        }
    }
}

/// Walks the values in REPORT_FIELDS order; errors carry the field name at the cursor.
struct FieldCursor<'a> {
    values: &'a [&'a str],
    pos: usize,
}

impl<'a> FieldCursor<'a> {
    fn next(&mut self) -> (&'static str, &'a str) {
        let field = REPORT_FIELDS[self.pos];
        let value = self.values[self.pos].trim();
        self.pos += 1;
        (field, value)
    }

    fn int(&mut self) -> Result<i64, IngestError> {
        let (field, value) = self.next();
        value.parse::<i64>().map_err(|_| IngestError::FieldTypeError {
            field,
            expected: "integer",
            value: value.to_string(),
        })
    }

    /// Integer-declared gauge, carried as f64.
    fn int_gauge(&mut self) -> Result<f64, IngestError> {
        self.int().map(|v| v as f64)
    }

    fn real(&mut self) -> Result<f64, IngestError> {
        let (field, value) = self.next();
        match value.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(IngestError::FieldTypeError {
                field,
                expected: "real",
                value: value.to_string(),
            }),
        }
    }

    fn text(&mut self) -> &'a str {
        self.next().1
    }
}

/// Split a comma-separated report line and validate it.
pub fn parse_line(line: &str) -> Result<Report, IngestError> {
    let values: Vec<&str> = line.split(',').collect();
    parse_fields(&values)
}

/// Validate arity, field types and timestamp alignment.
pub fn parse_fields(values: &[&str]) -> Result<Report, IngestError> {
    if values.len() != REPORT_FIELDS.len() {
        return Err(IngestError::SchemaMismatch {
            expected: REPORT_FIELDS.len(),
            received: values.len(),
        });
    }

    let mut f = FieldCursor { values, pos: 0 };
    let timestamp = f.int()?;
    let uptime_s = f.int_gauge()?;
    let load_1min = f.real()?;
    let load_5min = f.real()?;
    let load_15min = f.real()?;
    let running_tasks = f.int_gauge()?;
    let total_tasks = f.int_gauge()?;
    let cpu_user = f.real()?;
    let cpu_system = f.real()?;
    let cpu_nice = f.real()?;
    let cpu_idle = f.real()?;
    let cpu_iowait = f.real()?;
    let cpu_irq = f.real()?;
    let cpu_softirq = f.real()?;
    let cpu_steal = f.real()?;
    let mem_total_mib = f.real()?;
    let mem_free_mib = f.real()?;
    let mem_used_mib = f.real()?;
    let mem_buff_cache_mib = f.real()?;
    let tcp_connections = f.int_gauge()?;
    let udp_connections = f.int_gauge()?;
    let default_interface_net_rx_bytes = f.int()?;
    let default_interface_net_tx_bytes = f.int()?;
    let cpu_num_cores = f.int_gauge()?;
    let cpu_delay_us = f.int_gauge()?;
    let disk_delay_us = f.int_gauge()?;
    let root_disk_total_kb = f.int_gauge()?;
    let root_disk_avail_kb = f.int_gauge()?;
    let reads_completed = f.int()?;
    let writes_completed = f.int()?;
    let reading_ms = f.int()?;
    let writing_ms = f.int()?;
    let iotime_ms = f.int()?;
    let ios_in_progress = f.int_gauge()?;
    let weighted_io_time = f.int()?;
    let machine_id = f.text();
    let hostname = f.text();

    if machine_id.is_empty() {
        return Err(IngestError::FieldTypeError {
            field: "machine_id",
            expected: "non-empty string",
            value: String::new(),
        });
    }

    let window = Tier::FINEST.window_secs();
    if timestamp.rem_euclid(window) != 0 {
        return Err(IngestError::UnalignedTimestamp { timestamp, window });
    }

    Ok(Report {
        machine_id: machine_id.to_string(),
        hostname: if hostname.is_empty() {
            DEFAULT_HOSTNAME.to_string()
        } else {
            hostname.to_string()
        },
        timestamp,
        counters: Counters {
            cpu_user,
            cpu_system,
            cpu_nice,
            cpu_idle,
            cpu_iowait,
            cpu_irq,
            cpu_softirq,
            cpu_steal,
            default_interface_net_rx_bytes,
            default_interface_net_tx_bytes,
            reads_completed,
            writes_completed,
            reading_ms,
            writing_ms,
            iotime_ms,
            weighted_io_time,
        },
        gauges: Gauges {
            uptime_s,
            load_1min,
            load_5min,
            load_15min,
            running_tasks,
            total_tasks,
            mem_total_mib,
            mem_free_mib,
            mem_used_mib,
            mem_buff_cache_mib,
            tcp_connections,
            udp_connections,
            cpu_num_cores,
            cpu_delay_us,
            disk_delay_us,
            root_disk_total_kb,
            root_disk_avail_kb,
            ios_in_progress,
        },
    })
}

/// Resolve (or register) the reporting client and bind the report to it.
pub async fn into_snapshot(
    registry: &dyn ClientRegistry,
    report: Report,
) -> Result<Snapshot, StoreError> {
    let client_id = registry
        .resolve_client(&report.machine_id, &report.hostname)
        .await?;
    Ok(report.into_snapshot(client_id))
}
