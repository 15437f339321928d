pub mod admin;
pub mod auth;
pub mod media_urls;
pub mod publish_scheduled_posts;
pub mod scheduled_posts;
pub mod social_accounts;
pub mod social_tokens;
pub mod subscriptions;
pub mod videos;
