pub mod config;
pub mod services;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use backend::services::SharedServices;
use crates::infra::db::postgres::postgres_connection;
use tracing::{error, info};

pub async fn run() -> Result<()> {
    let dotenvy_env = config::config_loader::load()?;
    info!(stage = %dotenvy_env.backend.stage, "ENV has been loaded");

    let backend_env = &dotenvy_env.backend;
    let postgres_pool = postgres_connection::establish_connection(
        &backend_env.database.url,
        backend_env.database.max_connections,
    )?;
    info!("Postgres connection has been established");

    let shared = SharedServices::from_config(backend_env)?;
    let publish_usecase = Arc::new(shared.publish_usecase(Arc::new(postgres_pool), backend_env));

    services::publish_loop::run_publish_loop(
        publish_usecase,
        Duration::from_secs(dotenvy_env.publish_loop.interval_secs),
        shutdown_signal(),
    )
    .await;

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received ctrl+C signal"),
        Err(err) => {
            error!(error = ?err, "Failed to install CTRL+C signal handler");
            std::future::pending::<()>().await;
        }
    }
}
