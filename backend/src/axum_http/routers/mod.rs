pub mod admin;
pub mod auth;
pub mod cron;
pub mod media;
pub mod scheduled_posts;
pub mod social_accounts;
pub mod subscriptions;
pub mod videos;
