use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};
use chrono::Utc;
use crates::domain::repositories::{
    scheduled_posts::ScheduledPostRepository, social_accounts::SocialAccountRepository,
    videos::VideoRepository,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{error, warn};

use crate::{
    axum_http::error_responses::error_response,
    usecases::publish_scheduled_posts::PublishScheduledPostsUseCase,
};

pub const API_KEY_HEADER: &str = "x-api-key";

type HmacSha256 = Hmac<Sha256>;

pub struct CronState<SP, V, A>
where
    SP: ScheduledPostRepository + Send + Sync + 'static,
    V: VideoRepository + Send + Sync + 'static,
    A: SocialAccountRepository + Send + Sync + 'static,
{
    pub publish_usecase: Arc<PublishScheduledPostsUseCase<SP, V, A>>,
    /// `None` keeps the endpoint disabled.
    pub api_key: Option<String>,
}

pub fn routes<SP, V, A>(
    publish_usecase: Arc<PublishScheduledPostsUseCase<SP, V, A>>,
    api_key: Option<String>,
) -> Router
where
    SP: ScheduledPostRepository + Send + Sync + 'static,
    V: VideoRepository + Send + Sync + 'static,
    A: SocialAccountRepository + Send + Sync + 'static,
{
    Router::new()
        .route("/publish-scheduled-posts", post(publish_scheduled_posts))
        .with_state(Arc::new(CronState {
            publish_usecase,
            api_key,
        }))
}

pub async fn publish_scheduled_posts<SP, V, A>(
    State(state): State<Arc<CronState<SP, V, A>>>,
    headers: HeaderMap,
) -> impl IntoResponse
where
    SP: ScheduledPostRepository + Send + Sync + 'static,
    V: VideoRepository + Send + Sync + 'static,
    A: SocialAccountRepository + Send + Sync + 'static,
{
    let Some(expected) = state.api_key.as_deref() else {
        error!("cron: CRON_API_KEY is not configured");
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "Cron endpoint is not configured");
    };

    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    match provided {
        Some(provided) if api_key_matches(provided, expected) => {}
        Some(_) => {
            warn!("cron: rejected request with wrong api key");
            return error_response(StatusCode::UNAUTHORIZED, "Invalid API key");
        }
        None => return error_response(StatusCode::UNAUTHORIZED, "Missing API key"),
    }

    // Claimed posts must reach a terminal status even if the caller goes away.
    let publish_usecase = Arc::clone(&state.publish_usecase);
    let pass = tokio::spawn(async move { publish_usecase.run_due_posts(Utc::now()).await });

    match pass.await {
        Ok(Ok(summary)) => (StatusCode::OK, Json(summary)).into_response(),
        Ok(Err(e)) => e.into_response(),
        Err(join_err) => {
            error!(error = ?join_err, "cron: publish pass panicked");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Publish pass failed")
        }
    }
}

/// Compares HMAC tags of both keys so timing reveals neither content nor length.
fn api_key_matches(provided: &str, expected: &str) -> bool {
    let mac_for = |value: &str| {
        HmacSha256::new_from_slice(API_KEY_HEADER.as_bytes()).map(|mut mac| {
            mac.update(value.as_bytes());
            mac
        })
    };

    match (mac_for(provided), mac_for(expected)) {
        (Ok(provided), Ok(expected)) => provided
            .verify_slice(&expected.finalize().into_bytes())
            .is_ok(),
        _ => false,
    }
}
