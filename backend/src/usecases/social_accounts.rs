use std::{str::FromStr, sync::Arc};

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use crates::{
    domain::{
        entities::social_accounts::UpsertSocialAccountEntity,
        repositories::{
            scheduled_posts::ScheduledPostRepository, social_accounts::SocialAccountRepository,
        },
        value_objects::{
            enums::platforms::Platform,
            social_accounts::{
                ConnectResponse, ConnectedAccount, OAuthCallbackQuery, SocialAccountDto,
            },
        },
    },
    infra::crypto::token_cipher::TokenCipher,
    social::{
        oauth_state::{OAuthStateError, OAuthStateSigner},
        platform_client::{PlatformRegistry, SharedPlatformClient},
    },
};
use thiserror::Error;
use tracing::{error, info, warn};
use url::form_urlencoded;
use uuid::Uuid;

use crate::axum_http::error_responses::impl_error_response;

/// Frontend page the OAuth callback returns the browser to.
const FRONTEND_RETURN_PATH: &str = "/dashboard/social";

#[derive(Debug, Error)]
pub enum SocialAccountError {
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
    #[error("{0} publishing is not configured on this server")]
    PlatformNotConfigured(Platform),
    #[error("social account not found")]
    AccountNotFound,
    #[error("account has scheduled posts; cancel them first")]
    HasScheduledPosts,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SocialAccountError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SocialAccountError::UnsupportedPlatform(_) => StatusCode::BAD_REQUEST,
            SocialAccountError::PlatformNotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            SocialAccountError::AccountNotFound => StatusCode::NOT_FOUND,
            SocialAccountError::HasScheduledPosts => StatusCode::CONFLICT,
            SocialAccountError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl_error_response!(SocialAccountError);

pub type UseCaseResult<T> = std::result::Result<T, SocialAccountError>;

pub struct SocialAccountUseCase<A, SP>
where
    A: SocialAccountRepository + Send + Sync + 'static,
    SP: ScheduledPostRepository + Send + Sync + 'static,
{
    account_repo: Arc<A>,
    scheduled_post_repo: Arc<SP>,
    cipher: Arc<TokenCipher>,
    platforms: Arc<PlatformRegistry>,
    state_signer: OAuthStateSigner,
    frontend_url: String,
}

impl<A, SP> SocialAccountUseCase<A, SP>
where
    A: SocialAccountRepository + Send + Sync + 'static,
    SP: ScheduledPostRepository + Send + Sync + 'static,
{
    pub fn new(
        account_repo: Arc<A>,
        scheduled_post_repo: Arc<SP>,
        cipher: Arc<TokenCipher>,
        platforms: Arc<PlatformRegistry>,
        state_signer: OAuthStateSigner,
        frontend_url: &str,
    ) -> Self {
        Self {
            account_repo,
            scheduled_post_repo,
            cipher,
            platforms,
            state_signer,
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn available_platforms(&self) -> Vec<Platform> {
        self.platforms.platforms()
    }

    /// Starts the OAuth dance: a signed state bound to the user and platform, and the provider URL.
    pub async fn connect(
        &self,
        user_id: Uuid,
        platform: &str,
        now: DateTime<Utc>,
    ) -> UseCaseResult<ConnectResponse> {
        let (platform, client) = self.client_for(platform)?;

        let state = self.state_signer.issue(user_id, platform, now)?;
        let authorize_url = client.authorize_url(&state).map_err(|err| {
            error!(%user_id, %platform, error = ?err, "social: failed to build authorize url");
            SocialAccountError::Internal(err)
        })?;

        info!(%user_id, %platform, "social: connect started");
        Ok(ConnectResponse {
            platform,
            authorize_url,
        })
    }

    /// Completes the OAuth dance and returns the frontend URL to redirect the browser to.
    /// Failures are reported through `?error=` rather than as an HTTP error.
    /// `session_user` is whoever is signed in on the browser that came back from the provider.
    /// It must be the user the state was issued to.
    pub async fn callback(
        &self,
        platform: &str,
        query: OAuthCallbackQuery,
        session_user: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> String {
        match self
            .complete_callback(platform, query, session_user, now)
            .await
        {
            Ok(platform) => self.frontend_redirect("connected", &platform.to_string()),
            Err(reason) => self.frontend_redirect("error", &reason),
        }
    }

    async fn complete_callback(
        &self,
        platform: &str,
        query: OAuthCallbackQuery,
        session_user: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Platform, String> {
        let (platform, client) = self.client_for(platform).map_err(|err| {
            warn!(platform, error = %err, "social: callback for unavailable platform");
            "unsupported_platform".to_string()
        })?;

        if let Some(provider_error) = query.error {
            warn!(
                %platform,
                provider_error = %provider_error,
                description = ?query.error_description,
                "social: provider returned an error"
            );
            return Err(provider_error);
        }

        let state = query.state.ok_or_else(|| "invalid_state".to_string())?;
        let payload = self
            .state_signer
            .verify(&state, platform, now)
            .map_err(|err| {
                warn!(%platform, reason = %err, "social: state rejected");
                match err {
                    OAuthStateError::Expired => "state_expired".to_string(),
                    _ => "invalid_state".to_string(),
                }
            })?;
        let user_id = payload.user_id;

        match session_user {
            Some(session_user) if session_user == user_id => {}
            Some(session_user) => {
                warn!(%user_id, %session_user, %platform, "social: callback from another user's session");
                return Err("session_mismatch".to_string());
            }
            None => {
                warn!(%user_id, %platform, "social: callback without a session");
                return Err("not_signed_in".to_string());
            }
        }

        let code = query
            .code
            .filter(|code| !code.is_empty())
            .ok_or_else(|| "missing_code".to_string())?;

        let connected = client.exchange_code(&code).await.map_err(|err| {
            error!(%user_id, %platform, error = ?err, "social: code exchange failed");
            "token_exchange_failed".to_string()
        })?;

        let account_id = self
            .store_account(user_id, platform, connected)
            .await
            .map_err(|err| {
                error!(%user_id, %platform, error = ?err, "social: failed to store account");
                "internal_error".to_string()
            })?;

        info!(%user_id, %platform, %account_id, "social: account connected");
        Ok(platform)
    }

    async fn store_account(
        &self,
        user_id: Uuid,
        platform: Platform,
        connected: ConnectedAccount,
    ) -> anyhow::Result<Uuid> {
        let tokens = connected.tokens;
        let account = self
            .account_repo
            .upsert(UpsertSocialAccountEntity {
                user_id,
                platform: platform.to_string(),
                platform_account_id: connected.identity.platform_account_id,
                account_name: connected.identity.account_name,
                access_token_encrypted: self.cipher.encrypt(&tokens.access_token)?,
                refresh_token_encrypted: self
                    .cipher
                    .encrypt_optional(tokens.refresh_token.as_deref())?,
                token_expires_at: tokens.expires_at,
                scopes: tokens.scopes,
            })
            .await?;
        Ok(account.id)
    }

    pub async fn list(&self, user_id: Uuid) -> UseCaseResult<Vec<SocialAccountDto>> {
        let accounts = self.account_repo.list_for_user(user_id).await.map_err(|err| {
            error!(%user_id, db_error = ?err, "social: failed to list accounts");
            SocialAccountError::Internal(err)
        })?;
        Ok(accounts.into_iter().map(SocialAccountDto::from).collect())
    }

    pub async fn disconnect(&self, user_id: Uuid, account_id: Uuid) -> UseCaseResult<()> {
        let account = self
            .account_repo
            .find_for_user(user_id, account_id)
            .await?
            .ok_or(SocialAccountError::AccountNotFound)?;

        if self
            .scheduled_post_repo
            .has_pending_for_account(account.id)
            .await?
        {
            warn!(%user_id, %account_id, "social: disconnect refused, posts pending");
            return Err(SocialAccountError::HasScheduledPosts);
        }

        self.account_repo.delete(account.id).await?;
        info!(%user_id, %account_id, platform = %account.platform, "social: account disconnected");
        Ok(())
    }

    fn client_for(&self, raw: &str) -> UseCaseResult<(Platform, SharedPlatformClient)> {
        let platform = Platform::from_str(raw)
            .map_err(|_| SocialAccountError::UnsupportedPlatform(raw.to_string()))?;
        let client = self
            .platforms
            .get(platform)
            .ok_or(SocialAccountError::PlatformNotConfigured(platform))?;
        Ok((platform, client))
    }

    fn frontend_redirect(&self, key: &str, value: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair(key, value)
            .finish();
        format!("{}{}?{}", self.frontend_url, FRONTEND_RETURN_PATH, query)
    }
}
