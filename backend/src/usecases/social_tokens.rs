use std::{str::FromStr, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use crates::{
    domain::{
        entities::social_accounts::SocialAccountEntity,
        repositories::social_accounts::SocialAccountRepository,
        value_objects::enums::platforms::Platform,
    },
    infra::crypto::token_cipher::TokenCipher,
    social::platform_client::PlatformRegistry,
};
use thiserror::Error;
use tracing::{error, info, warn};

/// Tokens expiring within this window are refreshed before use.
pub const REFRESH_MARGIN_MINUTES: i64 = 5;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("{0} account must be reconnected")]
    ReconnectRequired(Platform),
    #[error("{0} is not configured")]
    PlatformUnavailable(String),
    #[error("token refresh failed: {0:#}")]
    RefreshFailed(anyhow::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Hands out usable plaintext access tokens for stored accounts, refreshing them on demand.
pub struct SocialTokenService<A>
where
    A: SocialAccountRepository + Send + Sync + 'static,
{
    account_repo: Arc<A>,
    cipher: Arc<TokenCipher>,
    platforms: Arc<PlatformRegistry>,
}

impl<A> SocialTokenService<A>
where
    A: SocialAccountRepository + Send + Sync + 'static,
{
    pub fn new(
        account_repo: Arc<A>,
        cipher: Arc<TokenCipher>,
        platforms: Arc<PlatformRegistry>,
    ) -> Self {
        Self {
            account_repo,
            cipher,
            platforms,
        }
    }

    pub async fn valid_access_token(
        &self,
        account: &SocialAccountEntity,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let platform = Platform::from_str(&account.platform)
            .map_err(|_| TokenError::PlatformUnavailable(account.platform.clone()))?;

        let access_token = self.cipher.decrypt(&account.access_token_encrypted)?;

        let Some(expires_at) = account.token_expires_at else {
            return Ok(access_token);
        };
        if expires_at > now + Duration::minutes(REFRESH_MARGIN_MINUTES) {
            return Ok(access_token);
        }
        let still_valid = expires_at > now;

        let refresh_token = account
            .refresh_token_encrypted
            .as_deref()
            .map(|encrypted| self.cipher.decrypt(encrypted))
            .transpose()?;

        let client = self
            .platforms
            .get(platform)
            .ok_or_else(|| TokenError::PlatformUnavailable(platform.to_string()))?;

        let refresh_token = match refresh_token {
            Some(token) if client.supports_refresh() => token,
            _ if still_valid => return Ok(access_token),
            _ => {
                warn!(
                    account_id = %account.id,
                    %platform,
                    %expires_at,
                    "social_tokens: token expired and cannot be refreshed"
                );
                return Err(TokenError::ReconnectRequired(platform));
            }
        };

        let tokens = match client.refresh_tokens(&refresh_token).await {
            Ok(tokens) => tokens,
            Err(err) if still_valid => {
                warn!(
                    account_id = %account.id,
                    %platform,
                    error = ?err,
                    "social_tokens: refresh failed, using current token"
                );
                return Ok(access_token);
            }
            Err(err) => {
                error!(
                    account_id = %account.id,
                    %platform,
                    error = ?err,
                    "social_tokens: refresh failed"
                );
                return Err(TokenError::RefreshFailed(err));
            }
        };

        let access_token_encrypted = self.cipher.encrypt(&tokens.access_token)?;
        let refresh_token_encrypted = match tokens.refresh_token.as_deref() {
            Some(rotated) => Some(self.cipher.encrypt(rotated)?),
            None => account.refresh_token_encrypted.clone(),
        };

        self.account_repo
            .update_tokens(
                account.id,
                access_token_encrypted,
                refresh_token_encrypted,
                tokens.expires_at,
            )
            .await
            .map_err(|err| {
                error!(account_id = %account.id, db_error = ?err, "social_tokens: failed to persist refreshed tokens");
                TokenError::Internal(err)
            })?;

        info!(
            account_id = %account.id,
            %platform,
            expires_at = ?tokens.expires_at,
            "social_tokens: access token refreshed"
        );
        Ok(tokens.access_token)
    }
}
