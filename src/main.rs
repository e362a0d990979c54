use anyhow::Result;
use kunlun::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

use kunlun::config::Backend;
use kunlun::store::StatusStore;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;

    let (store, history_repo): (Arc<dyn StatusStore>, Option<Arc<history_repo::HistoryRepo>>) =
        match app_config.database.backend {
            Backend::Sqlite => {
                let repo = Arc::new(
                    history_repo::HistoryRepo::connect(
                        &app_config.database.path,
                        app_config.database.max_pool_size,
                        app_config.database.busy_timeout(),
                    )
                    .await?,
                );
                repo.init().await?;
                tracing::info!(path = %app_config.database.path, "SQLite store ready");
                let store: Arc<dyn StatusStore> = repo.clone();
                (store, Some(repo))
            }
            Backend::Memory => {
                tracing::warn!("Using in-memory store; history is lost on restart");
                let store: Arc<dyn StatusStore> = Arc::new(memory_repo::MemoryRepo::new());
                (store, None)
            }
        };

    let service = Arc::new(service::StatusService::new(
        store,
        app_config.retry_policy(),
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let maintenance_handle = maintenance::spawn(
        maintenance::MaintenanceDeps {
            stats: service.stats(),
            history_repo,
            shutdown_rx,
        },
        (&app_config.maintenance).into(),
    );

    let app = routes::app(service, app_config.history.default_points);
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(_) => {
                        let _ = tokio::signal::ctrl_c().await;
                        return;
                    }
                };
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            #[cfg(not(unix))]
            {
                let _ = tokio::signal::ctrl_c().await;
            }
        } => {
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
            let _ = maintenance_handle.await;
        }
    }

    Ok(())
}
