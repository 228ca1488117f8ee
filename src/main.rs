use anyhow::Context;
use boqmate_shield::api::{self, app_state::AppState};
use boqmate_shield::config::config::{AppConfig, EventBackend};
use boqmate_shield::config::loader::ConfigLoader;
use boqmate_shield::observability::init_tracing;
use boqmate_shield::security::clock::{Clock, SystemClock};
use boqmate_shield::security::events::SecurityEventLog;
use boqmate_shield::security::pipeline::SecurityPipeline;
use boqmate_shield::storage::{
    MemoryEventStore, MemoryFileStore, SecurityEventRepository, SqliteEventStore,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 设置后打印该主体的令牌并退出
const ISSUE_TOKEN_ENV: &str = "BOQMATE_ISSUE_TOKEN";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::load().context("failed to load configuration")?;
    ConfigLoader::validate(&config).context("invalid configuration")?;

    let _log_guard = init_tracing(&config.logging)?;

    info!("Starting BOQMate Shield ({})...", config.environment);
    for warning in ConfigLoader::warnings(&config) {
        warn!("{}", warning);
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let repository = create_event_repository(&config)?;
    let events = SecurityEventLog::new(repository, Arc::clone(&clock));

    let pipeline = Arc::new(SecurityPipeline::from_config(
        &config,
        events.clone(),
        Arc::clone(&clock),
    )?);
    info!("Security pipeline initialized: {:?}", pipeline);

    if let Ok(subject) = std::env::var(ISSUE_TOKEN_ENV) {
        let token = pipeline.authenticator().issue_default(&subject)?;
        println!("{}", token);
        return Ok(());
    }

    if let Some(retention_days) = config.events.retention_days {
        spawn_retention_task(
            events,
            retention_days,
            Duration::from_secs(config.events.prune_interval_seconds.max(1)),
        );
    }

    let app_state = AppState::new(pipeline, Arc::new(MemoryFileStore::new()));
    let router = api::create_router(app_state, &config);
    info!("API router created");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on {}", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

fn create_event_repository(config: &AppConfig) -> anyhow::Result<Arc<dyn SecurityEventRepository>> {
    let repository: Arc<dyn SecurityEventRepository> = match config.events.backend {
        EventBackend::Memory => {
            info!("Security events kept in memory");
            Arc::new(MemoryEventStore::new())
        }
        EventBackend::Sqlite => {
            let path = &config.events.database_path;
            let store = SqliteEventStore::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            info!("Security events persisted to {}", path.display());
            Arc::new(store)
        }
    };
    Ok(repository)
}

/// 定期清理超过保留期的安全事件
fn spawn_retention_task(events: SecurityEventLog, retention_days: u32, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = events.prune_older_than(retention_days).await {
                warn!(error = %e, "security event retention prune failed");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
