use rootcause::prelude::Report;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tripwire_scheduler::{
    Dispatcher, EventPublisher, NatsEventPublisher, NatsEventSubscriber, TriggerRepository,
    TriggerScheduler,
};
use tripwire_server::auth::JwtAuthValidator;
use tripwire_server::config::ServerConfig;
use tripwire_server::db::PgTriggerRepository;
use tripwire_server::error::StartupError;
use tripwire_server::{AppState, router};

#[tokio::main]
async fn main() -> Result<(), Report<StartupError>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().map_err(|e| StartupError::Config {
        details: e.to_string(),
    })?;
    let retention = config
        .retention
        .policy()
        .map_err(|e| StartupError::Config {
            details: e.to_string(),
        })?;
    tracing::info!("Loaded configuration");

    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(config.database.acquire_timeout_seconds))
        .connect(&config.database_url)
        .await
        .map_err(|e| StartupError::Database {
            details: e.to_string(),
        })?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .map_err(|e| StartupError::Migrations {
            details: e.to_string(),
        })?;

    let repository: Arc<dyn TriggerRepository> = Arc::new(PgTriggerRepository::new(db_pool));
    let publisher: Arc<dyn EventPublisher> =
        Arc::new(NatsEventPublisher::new(config.nats.to_nats_config()));
    let auth = Arc::new(JwtAuthValidator::new(
        &config.auth.hs256_secret,
        config.auth.leeway_seconds,
    ));
    let state = AppState::new(repository.clone(), publisher.clone(), auth, retention);

    if config.scheduler.enabled {
        let scheduler = TriggerScheduler::new(repository, publisher, state.sweeper.clone());
        tokio::spawn(async move { scheduler.run().await });
    } else {
        tracing::info!("Trigger scheduler disabled");
    }

    if config.subscriber.enabled {
        let nats = config.nats.to_nats_config();
        let retry = config.subscriber.retry_policy();
        let dispatcher = Dispatcher::new(state.logger.clone(), retry);
        tokio::spawn(async move {
            let subscriber =
                match NatsEventSubscriber::connect(nats, dispatcher.retry_policy()).await {
                    Ok(subscriber) => subscriber,
                    Err(report) => {
                        tracing::error!(error = ?report, "Failed to start trigger subscriber");
                        return;
                    }
                };
            if let Err(e) = subscriber.run(&dispatcher).await {
                tracing::error!(error = %e, "Trigger subscriber stopped");
            }
        });
    } else {
        tracing::info!("Trigger subscriber disabled");
    }

    let app = router(state, Duration::from_secs(config.request_timeout_seconds));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .map_err(|e| StartupError::Bind {
            addr: config.listen_addr.clone(),
            details: e.to_string(),
        })?;

    tracing::info!("listening on http://{}", config.listen_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| StartupError::Serve {
            details: e.to_string(),
        })?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
