use serde::{Deserialize, Serialize};

/// Limits and feature flags attached to a plan. Stored as JSONB in the database.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PlanFeatures {
    #[serde(default)]
    pub max_videos: Option<i64>,

    #[serde(default)]
    pub max_upload_mb: Option<i64>,

    #[serde(default)]
    pub social_publishing: Option<bool>,

    #[serde(default)]
    pub priority_support: Option<bool>,
}
