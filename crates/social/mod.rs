pub mod facebook;
pub mod http;
pub mod instagram;
pub mod oauth_state;
pub mod platform_client;
pub mod tiktok;
pub mod youtube;

/// App credentials registered with a provider.
#[derive(Debug, Clone)]
pub struct OAuthAppConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}
