pub mod billing_intervals;
pub mod platforms;
pub mod post_statuses;
pub mod subscription_statuses;
pub mod user_roles;
pub mod video_statuses;
