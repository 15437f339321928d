use crate::{
    axum_http::{default_routers, routers},
    config::config_model::DotEnvyConfig,
    services::SharedServices,
};
use anyhow::Result;
use axum::{
    Extension, Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE, RANGE},
    },
    routing::get,
};
use crates::infra::db::postgres::postgres_connection::PgPoolSquad;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info};

pub async fn start(config: Arc<DotEnvyConfig>, db_pool: Arc<PgPoolSquad>) -> Result<()> {
    let services = SharedServices::from_config(&config)?;
    let app = app(&config, db_pool, &services)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.backend_server.port));
    let listener = TcpListener::bind(addr).await?;

    info!("Server is running on port {}", config.backend_server.port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub fn app(
    config: &DotEnvyConfig,
    db_pool: Arc<PgPoolSquad>,
    services: &SharedServices,
) -> Result<Router> {
    let publish_usecase = Arc::new(services.publish_usecase(Arc::clone(&db_pool), config));

    // JSON endpoints share the request timeout and the small body limit.
    let api = Router::new()
        .nest("/api/v1/auth", routers::auth::routes(Arc::clone(&db_pool), services))
        .nest("/api/v1/admin", routers::admin::routes(Arc::clone(&db_pool)))
        .nest(
            "/api/v1/subscriptions",
            routers::subscriptions::routes(Arc::clone(&db_pool), services),
        )
        .nest(
            "/api/v1/social",
            routers::social_accounts::routes(
                Arc::clone(&db_pool),
                services,
                &config.backend_server.frontend_url,
            ),
        )
        .nest(
            "/api/v1/scheduled-posts",
            routers::scheduled_posts::routes(Arc::clone(&db_pool)),
        )
        .route("/api/v1/health-check", get(default_routers::health_check))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.backend_server.timeout,
        )))
        .layer(RequestBodyLimitLayer::new(
            (config.backend_server.body_limit * 1024 * 1024).try_into()?,
        ));

    // Uploads, file streams and publish passes run longer than the request timeout.
    // Uploads carry their own limit; the cron route takes no body.
    let long_running = Router::new()
        .nest(
            "/api/v1/cron",
            routers::cron::routes(publish_usecase, config.cron.api_key.clone()),
        )
        .nest(
            "/api/v1/videos",
            routers::videos::routes(Arc::clone(&db_pool), services, &config.storage),
        )
        .nest(
            "/api/v1/media",
            routers::media::routes(Arc::clone(&db_pool), services, &config.storage),
        );

    Ok(Router::new()
        .merge(api)
        .merge(long_running)
        .fallback(default_routers::not_found)
        .layer(Extension(Arc::clone(&services.session_keys)))
        .layer(
            CorsLayer::new()
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::PUT,
                    Method::DELETE,
                ])
                .allow_headers([AUTHORIZATION, CONTENT_TYPE, RANGE])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http()))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = ?err, "Failed to install CTRL+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = ?err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}
