use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    entities::videos::VideoEntity, value_objects::enums::video_statuses::VideoStatus,
};

#[derive(Debug, Clone, Serialize)]
pub struct VideoDto {
    pub id: Uuid,
    pub title: String,
    pub original_filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub duration_seconds: Option<f64>,
    pub status: VideoStatus,
    pub job_id: Option<String>,
    pub has_thumbnail: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<VideoEntity> for VideoDto {
    fn from(value: VideoEntity) -> Self {
        Self {
            id: value.id,
            title: value.title,
            original_filename: value.original_filename,
            mime_type: value.mime_type,
            size_bytes: value.size_bytes,
            duration_seconds: value.duration_seconds,
            status: VideoStatus::from_str(&value.status),
            job_id: value.job_id,
            has_thumbnail: value.thumbnail_path.is_some(),
            error: value.error,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

/// Edit operations applied by a processing job. All fields are optional; an empty
/// request re-encodes the upload into a web-friendly MP4.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ProcessOptions {
    pub trim_start_seconds: Option<f64>,
    pub trim_end_seconds: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    #[serde(default)]
    pub mute: bool,
}

impl ProcessOptions {
    /// Length of the output given the source duration, honoring the trim window.
    pub fn output_duration(&self, source_duration: f64) -> f64 {
        let start = self.trim_start_seconds.unwrap_or(0.0).max(0.0);
        let end = self
            .trim_end_seconds
            .unwrap_or(source_duration)
            .min(source_duration);
        (end - start).max(0.0)
    }
}

/// Outcome of a successful FFmpeg run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedVideo {
    pub output_path: String,
    pub thumbnail_path: Option<String>,
    pub duration_seconds: f64,
}

#[derive(Debug, Serialize)]
pub struct ProcessAccepted {
    pub video_id: Uuid,
    pub job_id: String,
    pub status: VideoStatus,
}

#[derive(Debug, Serialize)]
pub struct MediaUrlResponse {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Billable minutes for a clip: any started minute counts.
pub fn billable_minutes(duration_seconds: f64) -> i32 {
    if duration_seconds <= 0.0 {
        return 0;
    }
    (duration_seconds / 60.0).ceil() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn billable_minutes_rounds_up_started_minutes() {
        assert_eq!(billable_minutes(0.0), 0);
        assert_eq!(billable_minutes(1.0), 1);
        assert_eq!(billable_minutes(60.0), 1);
        assert_eq!(billable_minutes(60.5), 2);
    }

    #[test]
    fn output_duration_clamps_trim_window() {
        let options = ProcessOptions {
            trim_start_seconds: Some(10.0),
            trim_end_seconds: Some(500.0),
            ..Default::default()
        };
        assert_eq!(options.output_duration(120.0), 110.0);

        let inverted = ProcessOptions {
            trim_start_seconds: Some(50.0),
            trim_end_seconds: Some(20.0),
            ..Default::default()
        };
        assert_eq!(inverted.output_duration(120.0), 0.0);
        assert_eq!(ProcessOptions::default().output_duration(42.0), 42.0);
    }
}
