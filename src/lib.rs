pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;

#[cfg(test)]
mod test_support;

use crate::core::config::{Settings, StorageBackend};
use crate::core::{state::AppState, telemetry};
use crate::repositories::{memory::MemoryStore, Repositories};

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;

    let backend = settings.storage().backend;
    let state = match backend {
        StorageBackend::Postgres => {
            let db_pool = db::init_pool(&settings).await?;
            db::run_migrations(&db_pool).await?;
            AppState::new(settings, Repositories::postgres(db_pool.clone()), Some(db_pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on shutdown");
            AppState::new(settings, Repositories::memory(MemoryStore::new()), None)
        }
    };

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        storage = %backend.as_str(),
        "Quizforge API listening"
    );

    axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await?;

    if let Some(pool) = state.db() {
        pool.close().await;
        tracing::info!("Database pool closed");
    }

    Ok(())
}
