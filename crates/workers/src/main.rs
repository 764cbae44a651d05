use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hostwatch_workers::alert::{
    AlertEventStore, AlertLifecycle, BreachTracker, InMemoryAlertStore, InMemoryRuleStore,
};
use hostwatch_workers::api::{self, AppState};
use hostwatch_workers::config::{self, HostwatchConfig};
use hostwatch_workers::engine::AlertEngine;
use hostwatch_workers::metrics::EngineMetrics;
use hostwatch_workers::notifier::{
    EmailSender, HttpSmsSender, NotificationDispatcher, Senders, SmsSender, SmtpEmailSender,
    WsBroadcaster,
};
use hostwatch_workers::poller::{InfluxMetricSource, LastSeenIndex, LivenessPoller, MetricSource};
use hostwatch_workers::shutdown::wait_for_shutdown;
use hostwatch_workers::storage::{self, migrator, PgAlertStore};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let cfg = config::load()?;
    let rules = config::resolve_rules(&cfg)?;

    let metrics = EngineMetrics::new();
    let rule_store = Arc::new(InMemoryRuleStore::from_rules(rules));
    tracing::info!(rules = rule_store.count(), listen_addr = %cfg.listen_addr, "configuration loaded");
    let alert_store = open_alert_store(&cfg).await?;
    let tracker = restore_tracker(cfg.state_file.as_deref()).await;

    let ws = WsBroadcaster::new(256);
    let senders = build_senders(&cfg, ws.clone())?;
    let (dispatcher, dispatcher_handle) =
        NotificationDispatcher::spawn(senders, cfg.notifications.dispatch_config(), metrics.clone());

    let last_seen = LastSeenIndex::new();
    let lifecycle = AlertLifecycle::new(alert_store, dispatcher, metrics.clone());
    let engine = Arc::new(AlertEngine::new(
        rule_store,
        tracker.clone(),
        lifecycle,
        last_seen.clone(),
        metrics.clone(),
    ));

    let source: Arc<dyn MetricSource> = match &cfg.influx {
        Some(influx) => {
            tracing::info!(url = %influx.url, database = %influx.database, "liveness source: influxdb");
            Arc::new(InfluxMetricSource::new(
                influx.influx_config(cfg.notifications.send_timeout()),
            )?)
        }
        None => {
            tracing::info!("liveness source: ingestion last-seen index");
            Arc::new(last_seen)
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poller = Arc::new(LivenessPoller::new(
        engine.clone(),
        source,
        cfg.poller.poller_config(),
    ));
    let poller_handle = poller.spawn(shutdown_rx.clone());

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
    tracing::info!(addr = %cfg.listen_addr, "api listening");
    let state = AppState {
        engine: engine.clone(),
        ws,
        metrics,
    };
    let mut api_shutdown = shutdown_rx;
    let api_handle = tokio::spawn(api::serve(listener, state, async move {
        let _ = api_shutdown.wait_for(|stop| *stop).await;
    }));

    wait_for_shutdown().await;
    tracing::info!("shutting down");
    let _ = shutdown_tx.send(true);

    if let Err(e) = poller_handle.await {
        tracing::error!(error = %e, "poller task failed");
    }
    match api_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "api server failed"),
        Err(e) => tracing::error!(error = %e, "api task failed"),
    }

    if let Some(path) = &cfg.state_file {
        match tracker.save_to_file(Path::new(path)).await {
            Ok(n) => tracing::info!(path = %path, pairs = n, "breach state saved"),
            Err(e) => tracing::error!(path = %path, error = %e, "failed to save breach state"),
        }
    }

    drop(engine);
    if tokio::time::timeout(Duration::from_secs(15), dispatcher_handle)
        .await
        .is_err()
    {
        tracing::warn!("notification worker did not drain in time");
    }

    tracing::info!("stopped");
    Ok(())
}

async fn open_alert_store(cfg: &HostwatchConfig) -> Result<Arc<dyn AlertEventStore>, BoxError> {
    match &cfg.database_url {
        Some(url) => {
            let pool = storage::create_pool(url, 10).await?;
            let applied = migrator::run_migrations(&pool).await?;
            tracing::info!(applied = applied.len(), "alert store: postgres");
            Ok(Arc::new(PgAlertStore::new(pool)))
        }
        None => {
            tracing::warn!("no database_url, alert events are kept in memory");
            Ok(Arc::new(InMemoryAlertStore::new()))
        }
    }
}

async fn restore_tracker(state_file: Option<&str>) -> BreachTracker {
    let Some(path) = state_file.map(Path::new) else {
        return BreachTracker::new();
    };
    if !path.exists() {
        return BreachTracker::new();
    }
    match BreachTracker::load_from_file(path).await {
        Ok(tracker) => {
            tracing::info!(path = %path.display(), pairs = tracker.len(), "breach state restored");
            tracker
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to restore breach state, starting empty");
            BreachTracker::new()
        }
    }
}

fn build_senders(cfg: &HostwatchConfig, ws: WsBroadcaster) -> Result<Senders, BoxError> {
    let email: Option<Arc<dyn EmailSender>> = match &cfg.smtp {
        Some(smtp) => Some(Arc::new(SmtpEmailSender::new(
            &smtp.host,
            smtp.port,
            smtp.username.as_deref(),
            smtp.password.as_deref(),
            smtp.from.clone(),
        )?)),
        None => {
            tracing::warn!("smtp not configured, email notifications disabled");
            None
        }
    };

    let sms: Option<Arc<dyn SmsSender>> = match &cfg.sms {
        Some(sms) => Some(Arc::new(HttpSmsSender::new(
            sms.endpoint.clone(),
            sms.api_key.clone(),
            sms.sender.clone(),
            cfg.notifications.send_timeout(),
        )?)),
        None => {
            tracing::warn!("sms not configured, sms notifications disabled");
            None
        }
    };

    Ok(Senders {
        email,
        sms,
        broadcaster: Arc::new(ws),
    })
}
