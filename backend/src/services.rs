use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use crates::{
    infra::{
        crypto::token_cipher::TokenCipher,
        db::{
            postgres::postgres_connection::PgPoolSquad,
            repositories::{
                scheduled_posts::ScheduledPostPostgres, social_accounts::SocialAccountPostgres,
                videos::VideoPostgres,
            },
        },
        ffmpeg::ffmpeg_processor::FfmpegProcessor,
        storage::local_storage::LocalVideoStorage,
    },
    payments::stripe_client::StripeClient,
    social::{
        facebook::FacebookClient,
        instagram::{ContainerPolling, InstagramClient},
        oauth_state::OAuthStateSigner,
        platform_client::PlatformRegistry,
        tiktok::TikTokClient,
        youtube::YouTubeClient,
    },
};
use tracing::info;

use crate::{
    auth::SessionKeys,
    config::config_model::{DotEnvyConfig, OAuth},
    usecases::{
        media_urls::MediaUrlSigner,
        publish_scheduled_posts::{PublishScheduledPostsUseCase, PublishSettings},
        social_tokens::SocialTokenService,
    },
};

pub type PostgresPublishUseCase =
    PublishScheduledPostsUseCase<ScheduledPostPostgres, VideoPostgres, SocialAccountPostgres>;

/// Process-wide clients and signers, built once from config and shared by every router.
#[derive(Clone)]
pub struct SharedServices {
    pub session_keys: Arc<SessionKeys>,
    pub stripe_client: Arc<StripeClient>,
    pub token_cipher: Arc<TokenCipher>,
    pub platforms: Arc<PlatformRegistry>,
    pub state_signer: OAuthStateSigner,
    pub media_urls: MediaUrlSigner,
    pub processor: Arc<FfmpegProcessor>,
    pub storage: LocalVideoStorage,
}

impl SharedServices {
    pub fn from_config(config: &DotEnvyConfig) -> Result<Self> {
        let token_cipher = TokenCipher::from_encoded_key(&config.oauth.token_encryption_key)
            .context("TOKEN_ENCRYPTION_KEY is invalid")?;
        let state_signer = OAuthStateSigner::new(&config.oauth.state_secret)
            .context("OAUTH_STATE_SECRET is invalid")?;

        let platforms = platform_registry(&config.oauth, reqwest::Client::new());
        info!(platforms = ?platforms.platforms(), "social: platforms configured");

        Ok(Self {
            session_keys: Arc::new(SessionKeys::new(
                &config.auth.jwt_secret,
                config.auth.session_ttl_hours,
                config.stage.secure_cookies(),
            )),
            stripe_client: Arc::new(StripeClient::new(config.stripe.clone())),
            token_cipher: Arc::new(token_cipher),
            platforms: Arc::new(platforms),
            state_signer,
            media_urls: MediaUrlSigner::new(
                config.media_url.clone(),
                &config.backend_server.public_base_url,
            ),
            processor: Arc::new(FfmpegProcessor::new(config.ffmpeg.clone())),
            storage: LocalVideoStorage::new(&config.storage.video_dir),
        })
    }

    pub fn publish_usecase(
        &self,
        db_pool: Arc<PgPoolSquad>,
        config: &DotEnvyConfig,
    ) -> PostgresPublishUseCase {
        let account_repo = Arc::new(SocialAccountPostgres::new(Arc::clone(&db_pool)));
        let token_service = SocialTokenService::new(
            Arc::clone(&account_repo),
            Arc::clone(&self.token_cipher),
            Arc::clone(&self.platforms),
        );

        PublishScheduledPostsUseCase::new(
            Arc::new(ScheduledPostPostgres::new(Arc::clone(&db_pool))),
            Arc::new(VideoPostgres::new(Arc::clone(&db_pool))),
            account_repo,
            Arc::new(token_service),
            Arc::clone(&self.platforms),
            self.media_urls.clone(),
            PublishSettings {
                batch_limit: config.cron.batch_limit,
                stale_after: chrono::Duration::minutes(config.cron.stale_after_minutes),
                video_stale_after: video_stale_after(config.ffmpeg.timeout_secs),
            },
        )
    }
}

/// A processing job runs at most three FFmpeg/ffprobe calls, each bounded by the timeout.
pub fn video_stale_after(ffmpeg_timeout_secs: u64) -> chrono::Duration {
    let timeout = i64::try_from(ffmpeg_timeout_secs).unwrap_or(i64::MAX / 4);
    chrono::Duration::seconds(timeout.saturating_mul(3).saturating_add(300))
}

/// Registers a client for every platform whose app credentials are configured.
pub fn platform_registry(oauth: &OAuth, http: reqwest::Client) -> PlatformRegistry {
    let mut registry = PlatformRegistry::new();

    if let Some(app) = oauth.youtube.clone() {
        registry = registry.register(Arc::new(YouTubeClient::new(
            http.clone(),
            app,
            oauth.youtube_privacy_status.clone(),
        )));
    }
    if let Some(app) = oauth.tiktok.clone() {
        registry = registry.register(Arc::new(TikTokClient::new(
            http.clone(),
            app,
            oauth.tiktok_privacy_level.clone(),
        )));
    }
    if let Some(app) = oauth.facebook.clone() {
        registry = registry.register(Arc::new(FacebookClient::new(http.clone(), app)));
    }
    if let Some(app) = oauth.instagram.clone() {
        registry = registry.register(Arc::new(InstagramClient::new(
            http,
            app,
            ContainerPolling {
                interval: Duration::from_secs(oauth.instagram_poll_interval_secs),
                max_attempts: oauth.instagram_poll_max_attempts,
            },
        )));
    }

    registry
}
