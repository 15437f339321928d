use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    #[default]
    Uploaded,
    Processing,
    Ready,
    Failed,
}

impl Display for VideoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            VideoStatus::Uploaded => "uploaded",
            VideoStatus::Processing => "processing",
            VideoStatus::Ready => "ready",
            VideoStatus::Failed => "failed",
        };
        write!(f, "{}", status)
    }
}

impl VideoStatus {
    pub fn from_str(value: &str) -> Self {
        match value {
            "uploaded" => VideoStatus::Uploaded,
            "processing" => VideoStatus::Processing,
            "ready" => VideoStatus::Ready,
            _ => VideoStatus::Failed,
        }
    }
}
