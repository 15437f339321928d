use anyhow::{Context, Result};
use crates::{
    infra::ffmpeg::ffmpeg_processor::FfmpegConfig, payments::stripe_client::StripeConfig,
    social::OAuthAppConfig,
};

use super::{
    config_model::{Auth, BackendServer, Cron, Database, DotEnvyConfig, MediaUrl, OAuth, Storage},
    stage::Stage,
};

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let backend_server = BackendServer {
        port: parsed_or("SERVER_PORT_BACKEND", 8080)?,
        body_limit: parsed_or("SERVER_BODY_LIMIT", 10)?,
        timeout: parsed_or("SERVER_TIMEOUT", 30)?,
        frontend_url: required("FRONTEND_URL")?,
        public_base_url: required("PUBLIC_BASE_URL")?,
    };

    let database = Database {
        url: required("DATABASE_URL")?,
        max_connections: parsed_or("DATABASE_MAX_CONNECTIONS", 10)?,
    };

    let auth = Auth {
        jwt_secret: required("JWT_SECRET")?,
        session_ttl_hours: parsed_or("SESSION_TTL_HOURS", 24 * 7)?,
    };

    let stripe = StripeConfig {
        secret_key: required("STRIPE_SECRET_KEY")?,
        webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
        success_url: required("STRIPE_SUCCESS_URL")?,
        cancel_url: required("STRIPE_CANCEL_URL")?,
        portal_return_url: optional("STRIPE_PORTAL_RETURN_URL")
            .unwrap_or_else(|| backend_server.frontend_url.clone()),
    };

    let oauth = OAuth {
        state_secret: required("OAUTH_STATE_SECRET")?,
        token_encryption_key: required("TOKEN_ENCRYPTION_KEY")?,
        youtube: oauth_app("YOUTUBE")?,
        tiktok: oauth_app("TIKTOK")?,
        facebook: oauth_app("FACEBOOK")?,
        instagram: oauth_app("INSTAGRAM")?,
        youtube_privacy_status: optional("YOUTUBE_PRIVACY_STATUS")
            .unwrap_or_else(|| "private".to_string()),
        tiktok_privacy_level: optional("TIKTOK_PRIVACY_LEVEL")
            .unwrap_or_else(|| "SELF_ONLY".to_string()),
        instagram_poll_interval_secs: parsed_or("INSTAGRAM_POLL_INTERVAL_SECONDS", 5)?,
        instagram_poll_max_attempts: parsed_or("INSTAGRAM_POLL_MAX_ATTEMPTS", 60)?,
    };

    let storage = Storage {
        video_dir: optional("VIDEO_STORAGE_DIR").unwrap_or_else(|| "./data/videos".to_string()),
        max_upload_mb: parsed_or("MAX_UPLOAD_MB", 500)?,
    };

    let defaults = FfmpegConfig::default();
    let ffmpeg = FfmpegConfig {
        ffmpeg_bin: optional("FFMPEG_BIN").unwrap_or(defaults.ffmpeg_bin),
        ffprobe_bin: optional("FFPROBE_BIN").unwrap_or(defaults.ffprobe_bin),
        timeout_secs: parsed_or("FFMPEG_TIMEOUT_SECONDS", defaults.timeout_secs)?,
    };

    let cron = Cron {
        api_key: optional("CRON_API_KEY"),
        batch_limit: parsed_or("PUBLISH_BATCH_LIMIT", 25)?,
        stale_after_minutes: parsed_or("PUBLISH_STALE_AFTER_MINUTES", 30)?,
    };

    let media_url = MediaUrl {
        jwt_secret: optional("MEDIA_URL_SECRET").unwrap_or_else(|| auth.jwt_secret.clone()),
        ttl_seconds: parsed_or("MEDIA_URL_TTL_SECONDS", 3600)?,
    };

    Ok(DotEnvyConfig {
        stage: get_stage(),
        backend_server,
        database,
        auth,
        stripe,
        oauth,
        storage,
        ffmpeg,
        cron,
        media_url,
    })
}

pub fn get_stage() -> Stage {
    dotenvy::dotenv().ok();

    let stage_str = std::env::var("STAGE").unwrap_or_default();
    Stage::try_from(&stage_str).unwrap_or_default()
}

/// A platform is enabled only when its client id, secret and redirect URI are all set.
fn oauth_app(prefix: &str) -> Result<Option<OAuthAppConfig>> {
    let client_id = optional(&format!("{}_CLIENT_ID", prefix));
    let client_secret = optional(&format!("{}_CLIENT_SECRET", prefix));
    let redirect_uri = optional(&format!("{}_REDIRECT_URI", prefix));

    match (client_id, client_secret, redirect_uri) {
        (Some(client_id), Some(client_secret), Some(redirect_uri)) => Ok(Some(OAuthAppConfig {
            client_id,
            client_secret,
            redirect_uri,
        })),
        (None, None, None) => Ok(None),
        _ => anyhow::bail!(
            "{0}_CLIENT_ID, {0}_CLIENT_SECRET and {0}_REDIRECT_URI must be set together",
            prefix
        ),
    }
}

fn required(key: &str) -> Result<String> {
    optional(key).with_context(|| format!("{} is missing", key))
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{} is invalid: {:?}", key, raw)),
        None => Ok(default),
    }
}
