//! The nusoma API server: worker CRUD, graph persistence, schedule
//! reconciliation, deployment status, and the task queue consumer.

mod config;
mod db;
mod error;
mod executor;
mod reports;
mod routes;
mod state;

use crate::config::ServerConfig;
use crate::state::AppState;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env().expect("failed to load configuration");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to Postgres");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    let state = AppState::new(pool, &config).expect("failed to build application state");

    if config.queue.drain_loop_enabled {
        let consumer = state.consumer.clone();
        let interval = config.drain_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(err) = consumer.drain().await {
                    tracing::error!(error = %err, "queue drain failed");
                }
            }
        });
    }

    let registry = state.registry.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            registry.purge_expired();
        }
    });

    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("failed to bind listener");
    tracing::info!(addr = %config.listen_addr, "server listening");
    axum::serve(listener, app).await.expect("server error");
}
