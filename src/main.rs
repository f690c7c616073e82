use actix_web::{web, App, HttpServer};
use std::io;
use std::sync::Arc;
use tokio::signal;

use bracket_engine::config::Config;
use bracket_engine::db::{create_pool, run_migrations};
use bracket_engine::http::{configure_routes, AppState};
use bracket_engine::service::{
    AchievementCatalog, EmailChannel, MatchCompletionService, NotificationService,
};
use bracket_engine::store::{MemoryStore, PgStore, Store};
use bracket_engine::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> io::Result<()> {
    // Load configuration
    let config = Config::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    // Initialize telemetry
    init_telemetry();

    let catalog = match &config.achievements.catalog_path {
        Some(path) => AchievementCatalog::from_json_file(path)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
        None => AchievementCatalog::builtin(),
    };

    match &config.database.url {
        Some(url) => {
            let pool = create_pool(url, config.database.max_connections)
                .await
                .map_err(io::Error::other)?;
            run_migrations(&pool).await.map_err(io::Error::other)?;
            serve(PgStore::new(pool), catalog, &config).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            serve(MemoryStore::new(), catalog, &config).await
        }
    }
}

async fn serve<S: Store>(store: S, catalog: AchievementCatalog, config: &Config) -> io::Result<()> {
    let email = EmailChannel::from_webhook_url(config.email.webhook_url.as_deref());
    let state = web::Data::new(AppState {
        notifications: NotificationService::new(store.clone()),
        completions: MatchCompletionService::new(
            store.clone(),
            email,
            Arc::new(catalog),
            config.standings.points_per_win,
        ),
        store,
        points_per_win: config.standings.points_per_win,
    });

    tracing::info!(
        "Starting bracket-engine server on {}:{}",
        config.server.host,
        config.server.port
    );

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(actix_web::middleware::Logger::default())
            .configure(configure_routes::<S>)
    })
    .bind((config.server.host.clone(), config.server.port))?
    .run();

    // Graceful shutdown
    let server_handle = server.handle();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    });

    server.await
}
