// Background maintenance: periodic ingest stats log and SQLite VACUUM.
// VACUUM runs on a configurable schedule (cron expression or fixed interval); skipped for the
// in-memory store.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{info, warn};

use crate::history_repo::HistoryRepo;
use crate::service::IngestStats;

/// Config for the maintenance task.
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    pub stats_log_interval_secs: u64,
    /// Optional cron expression for VACUUM (e.g. "0 0 4 * * *" = 04:00 daily). Uses local time.
    pub vacuum_schedule: Option<String>,
    /// Run VACUUM every N seconds when vacuum_schedule is not set.
    pub vacuum_interval_secs: u64,
}

impl From<&crate::config::MaintenanceConfig> for MaintenanceConfig {
    fn from(c: &crate::config::MaintenanceConfig) -> Self {
        Self {
            stats_log_interval_secs: c.stats_log_interval_secs,
            vacuum_schedule: c.vacuum_schedule.clone(),
            vacuum_interval_secs: c.vacuum_interval_secs,
        }
    }
}

/// Shared state and shutdown for the maintenance task.
pub struct MaintenanceDeps {
    pub stats: Arc<IngestStats>,
    /// None for the in-memory store.
    pub history_repo: Option<Arc<HistoryRepo>>,
    pub shutdown_rx: oneshot::Receiver<()>,
}

pub fn spawn(deps: MaintenanceDeps, config: MaintenanceConfig) -> tokio::task::JoinHandle<()> {
    let MaintenanceDeps {
        stats,
        history_repo,
        mut shutdown_rx,
    } = deps;

    tokio::spawn(async move {
        let mut stats_log_tick = interval(Duration::from_secs(config.stats_log_interval_secs));
        stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick completes immediately; nothing to report yet.
        stats_log_tick.tick().await;

        let (vacuum_tx, mut vacuum_rx) = mpsc::channel::<()>(1);
        let scheduler = history_repo
            .is_some()
            .then(|| tokio::spawn(vacuum_scheduler(config.clone(), vacuum_tx)));

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    tracing::debug!("Maintenance shutting down");
                    break;
                }
                _ = stats_log_tick.tick() => {
                    let s = stats.snapshot();
                    info!(
                        reports_accepted = s.reports_accepted,
                        reports_rejected = s.reports_rejected,
                        first_contacts = s.first_contacts,
                        counter_resets = s.counter_resets,
                        contention_retries = s.contention_retries,
                        "ingest stats"
                    );
                }
                Some(()) = vacuum_rx.recv() => {
                    let Some(repo) = &history_repo else { continue };
                    if let Err(e) = repo.vacuum().await {
                        warn!(error = %e, operation = "vacuum", "vacuum failed");
                    } else {
                        info!("vacuum complete");
                    }
                }
            }
        }

        if let Some(handle) = scheduler {
            handle.abort();
        }
    })
}

/// Sends a message on `tx` at each VACUUM time (cron or fixed interval). Uses local time for cron.
async fn vacuum_scheduler(config: MaintenanceConfig, tx: mpsc::Sender<()>) {
    if let Some(ref cron_str) = config.vacuum_schedule {
        let Ok(schedule) = cron::Schedule::from_str(cron_str) else {
            warn!(cron = %cron_str, "invalid vacuum_schedule; VACUUM will not run");
            return;
        };
        loop {
            let now = chrono::Local::now();
            if let Some(next) = schedule.after(&now).next() {
                let delay = (next - now).to_std().unwrap_or(Duration::from_secs(1));
                tokio::time::sleep(delay).await;
                if tx.send(()).await.is_err() {
                    break;
                }
            } else {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    } else {
        let interval = Duration::from_secs(config.vacuum_interval_secs);
        loop {
            tokio::time::sleep(interval).await;
            if tx.send(()).await.is_err() {
                break;
            }
        }
    }
}
