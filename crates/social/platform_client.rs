use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::value_objects::{
    enums::platforms::Platform,
    scheduled_posts::PublishRequest,
    social_accounts::{ConnectedAccount, OAuthTokens},
};

/// One provider's OAuth flow plus its publish call.
#[automock]
#[async_trait]
pub trait SocialPlatformClient: Send + Sync {
    fn platform(&self) -> Platform;

    fn authorize_url(&self, state: &str) -> Result<String>;

    /// Trades an authorization code for tokens and resolves the account they belong to.
    async fn exchange_code(&self, code: &str) -> Result<ConnectedAccount>;

    /// Whether expired tokens can be renewed without sending the user through consent again.
    fn supports_refresh(&self) -> bool;

    async fn refresh_tokens(&self, refresh_token: &str) -> Result<OAuthTokens>;

    /// Publishes a video and returns the platform's id for the new post.
    async fn publish(
        &self,
        access_token: &str,
        platform_account_id: &str,
        request: PublishRequest,
    ) -> Result<String>;
}

pub type SharedPlatformClient = Arc<dyn SocialPlatformClient>;

/// Configured platforms. A platform without credentials is simply absent.
#[derive(Clone, Default)]
pub struct PlatformRegistry {
    clients: HashMap<Platform, SharedPlatformClient>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, client: SharedPlatformClient) -> Self {
        self.clients.insert(client.platform(), client);
        self
    }

    pub fn get(&self, platform: Platform) -> Option<SharedPlatformClient> {
        self.clients.get(&platform).cloned()
    }

    pub fn platforms(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|platform| self.clients.contains_key(platform))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_only_knows_registered_platforms() {
        let mut client = MockSocialPlatformClient::new();
        client.expect_platform().return_const(Platform::TikTok);

        let registry = PlatformRegistry::new().register(Arc::new(client));

        assert!(registry.get(Platform::TikTok).is_some());
        assert!(registry.get(Platform::YouTube).is_none());
        assert_eq!(registry.platforms(), vec![Platform::TikTok]);
    }
}
