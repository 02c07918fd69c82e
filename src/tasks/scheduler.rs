use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, Duration};

use crate::core::state::AppState;
use crate::tasks::maintenance;

pub(crate) async fn run(state: AppState) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let maintenance_settings = state.settings().maintenance().clone();

    let handles = vec![
        tokio::spawn(cleanup_loop(
            state.clone(),
            Duration::from_secs(maintenance_settings.cleanup_interval_seconds),
            shutdown_rx.clone(),
        )),
        tokio::spawn(backfill_loop(
            state.clone(),
            Duration::from_secs(maintenance_settings.backfill_interval_seconds),
            shutdown_rx,
        )),
    ];

    tracing::info!(
        cleanup_interval_seconds = maintenance_settings.cleanup_interval_seconds,
        backfill_interval_seconds = maintenance_settings.backfill_interval_seconds,
        "Maintenance worker started"
    );

    crate::core::shutdown::shutdown_signal().await;
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to background tasks");
    }

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }

    Ok(())
}

async fn cleanup_loop(state: AppState, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut tick = interval(period);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = maintenance::deactivate_stale_executions(&state).await {
                    metrics::counter!("maintenance_failures_total", "job" => "cleanup").increment(1);
                    tracing::error!(error = %err, "deactivate_stale_executions failed");
                }
            }
        }
    }
}

async fn backfill_loop(state: AppState, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut tick = interval(period);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = maintenance::backfill_orphan_executions(&state).await {
                    metrics::counter!("maintenance_failures_total", "job" => "backfill").increment(1);
                    tracing::error!(error = %err, "backfill_orphan_executions failed");
                }
            }
        }
    }
}
