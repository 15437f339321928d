use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::value_objects::videos::{ProcessOptions, ProcessedVideo};

#[automock]
#[async_trait]
pub trait VideoProcessor {
    /// Duration of a media file in seconds.
    async fn probe_duration(&self, path: &str) -> Result<f64>;

    async fn process(
        &self,
        input_path: &str,
        output_path: &str,
        thumbnail_path: &str,
        options: ProcessOptions,
    ) -> Result<ProcessedVideo>;
}
