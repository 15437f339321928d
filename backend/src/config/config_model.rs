use crates::{
    infra::ffmpeg::ffmpeg_processor::FfmpegConfig, payments::stripe_client::StripeConfig,
    social::OAuthAppConfig,
};

use super::stage::Stage;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub stage: Stage,
    pub backend_server: BackendServer,
    pub database: Database,
    pub auth: Auth,
    pub stripe: StripeConfig,
    pub oauth: OAuth,
    pub storage: Storage,
    pub ffmpeg: FfmpegConfig,
    pub cron: Cron,
    pub media_url: MediaUrl,
}

#[derive(Debug, Clone)]
pub struct BackendServer {
    pub port: u16,
    /// Megabytes, for JSON bodies. Uploads use `Storage::max_upload_mb`.
    pub body_limit: u64,
    pub timeout: u64,
    /// Where OAuth callbacks send the browser back to.
    pub frontend_url: String,
    /// Externally reachable base of this API, used for signed media URLs.
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct Auth {
    pub jwt_secret: String,
    pub session_ttl_hours: i64,
}

#[derive(Debug, Clone)]
pub struct OAuth {
    pub state_secret: String,
    pub token_encryption_key: String,
    pub youtube: Option<OAuthAppConfig>,
    pub tiktok: Option<OAuthAppConfig>,
    pub facebook: Option<OAuthAppConfig>,
    pub instagram: Option<OAuthAppConfig>,
    pub youtube_privacy_status: String,
    pub tiktok_privacy_level: String,
    pub instagram_poll_interval_secs: u64,
    pub instagram_poll_max_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct Storage {
    pub video_dir: String,
    pub max_upload_mb: u64,
}

#[derive(Debug, Clone)]
pub struct Cron {
    /// Unset disables the cron endpoint.
    pub api_key: Option<String>,
    pub batch_limit: i64,
    pub stale_after_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct MediaUrl {
    pub jwt_secret: String,
    pub ttl_seconds: i64,
}
