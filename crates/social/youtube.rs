use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use serde::Deserialize;
use serde_json::json;
use tokio_util::io::ReaderStream;
use tracing::info;
use url::Url;

use super::{
    OAuthAppConfig,
    http::{TokenResponse, ensure_success},
    platform_client::SocialPlatformClient,
};
use crate::domain::value_objects::{
    enums::platforms::Platform,
    scheduled_posts::PublishRequest,
    social_accounts::{ConnectedAccount, OAuthTokens, PlatformIdentity},
};

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const CHANNELS_URL: &str = "https://www.googleapis.com/youtube/v3/channels";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/youtube/v3/videos";
const SCOPES: &str = "https://www.googleapis.com/auth/youtube.upload https://www.googleapis.com/auth/youtube.readonly";

/// YouTube titles are capped by the Data API.
pub const MAX_TITLE_CHARS: usize = 100;

pub struct YouTubeClient {
    http: reqwest::Client,
    app: OAuthAppConfig,
    privacy_status: String,
}

#[derive(Debug, Deserialize)]
struct ChannelList {
    #[serde(default)]
    items: Vec<Channel>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
    snippet: Option<ChannelSnippet>,
}

#[derive(Debug, Deserialize)]
struct ChannelSnippet {
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadedVideo {
    id: String,
}

impl YouTubeClient {
    pub fn new(http: reqwest::Client, app: OAuthAppConfig, privacy_status: String) -> Self {
        Self {
            http,
            app,
            privacy_status,
        }
    }

    async fn token_request(&self, form: &[(&str, &str)], context: &str) -> Result<OAuthTokens> {
        let resp = self
            .http
            .post(TOKEN_URL)
            .form(form)
            .send()
            .await
            .with_context(|| format!("failed to reach Google: {}", context))?;
        let resp = ensure_success(resp, Platform::YouTube, context).await?;

        let token: TokenResponse = resp.json().await?;
        Ok(token.into_tokens(Utc::now()))
    }

    async fn own_channel(&self, access_token: &str) -> Result<PlatformIdentity> {
        let resp = self
            .http
            .get(CHANNELS_URL)
            .query(&[("part", "snippet"), ("mine", "true")])
            .header(AUTHORIZATION, format!("Bearer {}", access_token))
            .send()
            .await
            .context("failed to reach YouTube: list channels")?;
        let resp = ensure_success(resp, Platform::YouTube, "list channels").await?;

        let channels: ChannelList = resp.json().await?;
        let channel = channels
            .items
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("the Google account has no YouTube channel"))?;

        Ok(PlatformIdentity {
            platform_account_id: channel.id,
            account_name: channel.snippet.and_then(|snippet| snippet.title),
        })
    }
}

#[async_trait]
impl SocialPlatformClient for YouTubeClient {
    fn platform(&self) -> Platform {
        Platform::YouTube
    }

    fn authorize_url(&self, state: &str) -> Result<String> {
        // offline + consent makes Google return a refresh token on every connect.
        let url = Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("client_id", self.app.client_id.as_str()),
                ("redirect_uri", self.app.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("include_granted_scopes", "true"),
                ("state", state),
            ],
        )?;
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> Result<ConnectedAccount> {
        let tokens = self
            .token_request(
                &[
                    ("code", code),
                    ("client_id", self.app.client_id.as_str()),
                    ("client_secret", self.app.client_secret.as_str()),
                    ("redirect_uri", self.app.redirect_uri.as_str()),
                    ("grant_type", "authorization_code"),
                ],
                "exchange code",
            )
            .await?;

        let identity = self.own_channel(&tokens.access_token).await?;
        Ok(ConnectedAccount { identity, tokens })
    }

    fn supports_refresh(&self) -> bool {
        true
    }

    async fn refresh_tokens(&self, refresh_token: &str) -> Result<OAuthTokens> {
        let mut tokens = self
            .token_request(
                &[
                    ("refresh_token", refresh_token),
                    ("client_id", self.app.client_id.as_str()),
                    ("client_secret", self.app.client_secret.as_str()),
                    ("grant_type", "refresh_token"),
                ],
                "refresh token",
            )
            .await?;

        // Google only sends a new refresh token when it rotates it.
        if tokens.refresh_token.is_none() {
            tokens.refresh_token = Some(refresh_token.to_string());
        }
        Ok(tokens)
    }

    async fn publish(
        &self,
        access_token: &str,
        platform_account_id: &str,
        request: PublishRequest,
    ) -> Result<String> {
        // https://developers.google.com/youtube/v3/guides/using_resumable_upload_protocol
        let file = tokio::fs::File::open(&request.file_path)
            .await
            .with_context(|| format!("failed to open {}", request.file_path))?;
        let size = file.metadata().await?.len();

        let metadata = json!({
            "snippet": {
                "title": request.title,
                "description": request.description.clone().unwrap_or_default(),
                "categoryId": "22",
            },
            "status": {
                "privacyStatus": self.privacy_status,
                "selfDeclaredMadeForKids": false,
            }
        });

        let resp = self
            .http
            .post(UPLOAD_URL)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .header(AUTHORIZATION, format!("Bearer {}", access_token))
            .header("X-Upload-Content-Type", request.mime_type.as_str())
            .header("X-Upload-Content-Length", size.to_string())
            .json(&metadata)
            .send()
            .await
            .context("failed to reach YouTube: start upload")?;
        let resp = ensure_success(resp, Platform::YouTube, "start resumable upload").await?;

        let upload_uri = resp
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string())
            .ok_or_else(|| anyhow!("YouTube did not return a resumable upload location"))?;

        let resp = self
            .http
            .put(&upload_uri)
            .header(AUTHORIZATION, format!("Bearer {}", access_token))
            .header(CONTENT_TYPE, request.mime_type.as_str())
            .header(CONTENT_LENGTH, size)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await
            .context("failed to reach YouTube: upload bytes")?;
        let resp = ensure_success(resp, Platform::YouTube, "upload video bytes").await?;

        let uploaded: UploadedVideo = resp.json().await?;
        if uploaded.id.is_empty() {
            bail!("YouTube upload returned an empty video id");
        }

        info!(
            channel_id = %platform_account_id,
            video_id = %uploaded.id,
            size_bytes = size,
            "youtube: upload complete"
        );
        Ok(uploaded.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> YouTubeClient {
        YouTubeClient::new(
            reqwest::Client::new(),
            OAuthAppConfig {
                client_id: "client-123".into(),
                client_secret: "secret".into(),
                redirect_uri: "https://app.example.com/api/v1/social/youtube/callback".into(),
            },
            "private".into(),
        )
    }

    #[test]
    fn authorize_url_requests_offline_upload_access() {
        let url = Url::parse(&client().authorize_url("st.ate").unwrap()).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(params["client_id"], "client-123");
        assert_eq!(params["state"], "st.ate");
        assert_eq!(params["access_type"], "offline");
        assert!(params["scope"].contains("youtube.upload"));
    }
}
