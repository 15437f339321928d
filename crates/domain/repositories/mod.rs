pub mod plans;
pub mod scheduled_posts;
pub mod social_accounts;
pub mod subscriptions;
pub mod users;
pub mod video_processor;
pub mod videos;
