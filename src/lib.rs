pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::{
    config::Settings,
    state::{AppState, Backends},
    telemetry,
    time::SystemClock,
};
use crate::repositories::PgRepository;
use crate::services::storage::{ImageStore, StorageService};

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = db::init_pool(&settings).await?;
    db::run_migrations(&db_pool).await?;

    let repository = Arc::new(PgRepository::new(db_pool.clone()));
    let images = StorageService::from_settings(&settings)
        .await?
        .map(|storage| Arc::new(storage) as Arc<dyn ImageStore>);
    if images.is_none() {
        tracing::warn!("Image storage not configured; written evaluation is unavailable");
    }

    let backends = Backends {
        exams: repository.clone(),
        submissions: repository,
        images,
        clock: Arc::new(SystemClock),
        db: Some(db_pool),
    };
    let state = AppState::new(settings, backends);

    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        "Exam evaluation API listening"
    );

    axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await?;

    tracing::info!("Server stopped");
    Ok(())
}
