mod config;
mod credits;
mod db;
mod error;
mod event;
mod routes;
mod services;
mod state;

use std::time::Duration;

use config::{EconomyConfig, JournalConfig, ServerConfig};
use services::persistence::{self, Journal};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let server = ServerConfig::from_env();
    let economy = EconomyConfig::from_env();

    let (state, journal_worker) = if let Some(database_url) = server.database_url.as_deref() {
        let pool = db::init_pool(database_url, server.db_max_connections)
            .await
            .expect("database init failed");
        let snapshot = persistence::load_snapshot(&pool)
            .await
            .expect("state hydration failed");
        tracing::info!(
            users = snapshot.users.len(),
            sessions = snapshot.sessions.len(),
            entries = snapshot.entries.len(),
            "hydrated state from database"
        );

        let (journal, worker) = persistence::spawn_journal_worker(pool, JournalConfig::from_env());
        (state::AppState::hydrate(economy, journal, server.outbox_capacity, snapshot), Some(worker))
    } else {
        tracing::warn!("DATABASE_URL not set; running in memory only");
        (state::AppState::new(economy, Journal::disabled(), server.outbox_capacity), None)
    };

    let app = routes::app(state);
    let port = server.port;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "linklearn listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server failed");

    // Every journal handle is gone once the router is dropped; the worker
    // drains what is queued and exits.
    if let Some(worker) = journal_worker {
        if tokio::time::timeout(Duration::from_secs(10), worker).await.is_err() {
            tracing::error!("journal worker did not drain before shutdown timeout");
        }
    }
    tracing::info!("linklearn stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
