use anyhow::Result;
use apiwatch_alert::correlation::CorrelationEngine;
use apiwatch_alert::manager::AlertManager;
use apiwatch_alert::Notifier;
use apiwatch_analysis::analyzer::Analyzer;
use apiwatch_ingest::{Ingester, IngesterConfig};
use apiwatch_notify::manager::NotificationManager;
use apiwatch_probe::scheduler::ProbeScheduler;
use apiwatch_storage::engine::SqliteStorage;
use apiwatch_storage::TargetStore;
use chrono::Utc;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio::time::{interval, Duration};
use tracing_subscriber::EnvFilter;

use apiwatch_server::app;
use apiwatch_server::config::ServerConfig;
use apiwatch_server::metrics::Metrics;
use apiwatch_server::pipeline::{AnalysisAlertSink, ChannelNotifier, ProbeAlertSink};
use apiwatch_server::seed;
use apiwatch_server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    apiwatch_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("apiwatch=info".parse()?))
        .init();

    let config = ServerConfig::load()?;
    tracing::info!(
        host = %config.server_host,
        port = config.server_port,
        db = %config.db_path,
        "apiwatch-server starting"
    );

    if let Some(parent) = Path::new(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let storage = Arc::new(SqliteStorage::new(Path::new(&config.db_path))?);
    let metrics = Arc::new(Metrics::new()?);

    // Notification + correlation + alert manager
    let notifier = Arc::new(NotificationManager::new(config.notification_config())?);
    let correlation = Arc::new(CorrelationEngine::new(seed::default_correlation_rules()));
    let channel_notifier: Arc<dyn Notifier> = Arc::new(ChannelNotifier::new(
        notifier.clone(),
        config.default_channels(),
    ));
    let alert_manager = Arc::new(AlertManager::new(
        storage.clone(),
        vec![channel_notifier],
        correlation.clone(),
    ));
    seed::register_default_rules(&alert_manager).await;

    // Ingester
    let batch_size = config.ai_analysis_batch_size.max(1);
    let ingester = Ingester::new(
        storage.clone(),
        IngesterConfig {
            buffer_size: batch_size * 2,
            batch_size,
            flush_interval: Duration::from_secs(5),
        },
    );
    let ingester_handle = {
        let ingester = ingester.clone();
        tokio::spawn(async move { ingester.run().await })
    };

    // Analyzer
    let analysis_sink = Arc::new(AnalysisAlertSink::new(alert_manager.clone(), metrics.clone()));
    let analyzer = Arc::new(Analyzer::new(
        storage.clone(),
        storage.clone(),
        analysis_sink,
        config.analysis_interval(),
    ));
    let analyzer_handle = {
        let analyzer = analyzer.clone();
        tokio::spawn(async move { analyzer.run().await })
    };

    // Probe scheduler, bootstrapped from stored targets
    let probe_sink = Arc::new(ProbeAlertSink::new(alert_manager.clone(), metrics.clone()));
    let scheduler = Arc::new(ProbeScheduler::new(storage.clone(), probe_sink).await?);
    match storage.list_targets().await {
        Ok(targets) => {
            let count = targets.len();
            for mut target in targets {
                if target.frequency.is_empty() {
                    target.frequency = config.monitoring_default_frequency.clone();
                }
                if target.timeout.is_empty() {
                    target.timeout = config.monitoring_default_timeout.clone();
                }
                if let Err(e) = scheduler.add_target(target).await {
                    tracing::error!(error = %e, "Failed to schedule stored target");
                }
            }
            tracing::info!(count, "Monitoring targets loaded");
        }
        Err(e) => tracing::error!(error = %e, "Failed to load monitoring targets"),
    }
    scheduler.start().await?;

    // Correlation sweeper and retention cleanup
    let sweeper_handle = correlation.spawn_sweeper();
    let retention_days = config.log_retention_days;
    let cleanup_storage = storage.clone();
    let cleanup_handle = tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(3600));
        tick.tick().await;
        loop {
            tick.tick().await;
            match cleanup_storage.cleanup(retention_days) {
                Ok(removed) if removed > 0 => {
                    tracing::info!(removed, "Cleaned up expired rows");
                }
                Err(e) => tracing::error!(error = %e, "Retention cleanup failed"),
                _ => {}
            }
        }
    });

    let state = AppState {
        storage,
        ingester: ingester.clone(),
        analyzer,
        alert_manager,
        correlation,
        scheduler: scheduler.clone(),
        metrics,
        start_time: Utc::now(),
    };

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(http = %addr, "Server started");

    let server = axum::serve(listener, app::build_http_app(state))
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
        });
    if let Err(e) = server.await {
        tracing::error!(error = %e, "HTTP server error");
    }

    // Stop sequence: no new probe firings, then drain the ingester, then
    // stop the background loops.
    tracing::info!("Shutting down gracefully");
    if let Err(e) = scheduler.stop().await {
        tracing::error!(error = %e, "Probe scheduler shutdown failed");
    }
    ingester.stop();
    let _ = ingester_handle.await;
    analyzer_handle.abort();
    sweeper_handle.abort();
    cleanup_handle.abort();
    tracing::info!("Server stopped");

    Ok(())
}
