use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use mime_guess::MimeGuess;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{info, warn};
use uuid::Uuid;

/// Disk layout for uploads and their derived files: `<root>/<user_id>/<video_id>[suffix].<ext>`.
#[derive(Debug, Clone)]
pub struct LocalVideoStorage {
    root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub path: String,
    pub size_bytes: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("file exceeds the {max_bytes} byte limit")]
    TooLarge { max_bytes: u64 },
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl LocalVideoStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn upload_path(&self, user_id: Uuid, video_id: Uuid, extension: &str) -> PathBuf {
        self.root
            .join(user_id.to_string())
            .join(format!("{}.{}", video_id, normalize_extension(extension)))
    }

    pub fn processed_path(&self, user_id: Uuid, video_id: Uuid) -> PathBuf {
        self.root
            .join(user_id.to_string())
            .join(format!("{}-processed.mp4", video_id))
    }

    pub fn thumbnail_path(&self, user_id: Uuid, video_id: Uuid) -> PathBuf {
        self.root
            .join(user_id.to_string())
            .join(format!("{}-thumb.jpg", video_id))
    }

    /// Writes a byte stream to `path`, aborting and removing the partial file once `max_bytes` is exceeded.
    pub async fn write_stream<S, E>(
        &self,
        path: &Path,
        mut stream: S,
        max_bytes: u64,
    ) -> Result<StoredFile, StoreError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: std::error::Error + Send + Sync + 'static,
    {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut file = fs::File::create(path)
            .await
            .with_context(|| format!("failed to create {}", path.display()))?;
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    drop(file);
                    self.remove_file(path).await;
                    return Err(StoreError::Io(
                        anyhow::Error::new(err).context("upload stream failed"),
                    ));
                }
            };

            written += chunk.len() as u64;
            if written > max_bytes {
                drop(file);
                self.remove_file(path).await;
                return Err(StoreError::TooLarge { max_bytes });
            }

            file.write_all(&chunk)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
        }

        file.flush()
            .await
            .with_context(|| format!("failed to flush {}", path.display()))?;

        let size_bytes = i64::try_from(written).context("upload size is too large")?;
        info!(path = %path.display(), size_bytes, "storage: stored upload");

        Ok(StoredFile {
            path: path.to_string_lossy().into_owned(),
            size_bytes,
        })
    }

    /// Best effort removal. Missing files are fine.
    pub async fn remove_file(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        match fs::remove_file(path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %path.display(), "storage: failed to remove file: {err:?}"),
        }
    }

    pub async fn remove_files<I, P>(&self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for path in paths {
            self.remove_file(path).await;
        }
    }
}

/// Extension for a stored upload, preferring the client filename and falling back to the MIME type.
pub fn extension_for(original_filename: &str, mime_type: &str) -> String {
    let from_name = Path::new(original_filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(normalize_extension)
        .filter(|ext| !ext.is_empty());

    if let Some(ext) = from_name {
        return ext;
    }

    mime_guess::get_mime_extensions_str(mime_type)
        .and_then(|exts| exts.first())
        .map(|ext| ext.to_string())
        .unwrap_or_else(|| "mp4".to_string())
}

pub fn content_type_for(path: &Path) -> String {
    MimeGuess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}

fn normalize_extension(extension: &str) -> String {
    extension
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect::<String>()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Unpin {
        stream::iter(
            parts
                .iter()
                .map(|part| Ok(Bytes::from_static(part)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn writes_stream_under_user_directory() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalVideoStorage::new(dir.path());
        let user_id = Uuid::new_v4();
        let video_id = Uuid::new_v4();
        let path = storage.upload_path(user_id, video_id, "MP4");

        let stored = storage
            .write_stream(&path, chunks(&[b"abc", b"def"]), 1024)
            .await
            .unwrap();

        assert_eq!(stored.size_bytes, 6);
        assert!(stored.path.ends_with(&format!("{}/{}.mp4", user_id, video_id)));
        assert_eq!(std::fs::read(&path).unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn oversized_stream_is_rejected_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalVideoStorage::new(dir.path());
        let path = storage.upload_path(Uuid::new_v4(), Uuid::new_v4(), "mp4");

        let result = storage
            .write_stream(&path, chunks(&[b"abcd", b"efgh"]), 5)
            .await;

        assert!(matches!(result, Err(StoreError::TooLarge { max_bytes: 5 })));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn removing_a_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalVideoStorage::new(dir.path());

        storage.remove_file(dir.path().join("nope.mp4")).await;
    }

    #[test]
    fn extension_prefers_filename_then_mime() {
        assert_eq!(extension_for("clip.MOV", "video/quicktime"), "mov");
        assert_eq!(extension_for("clip", "video/webm"), "webm");
        assert_eq!(extension_for("clip", "application/x-unknown"), "mp4");
    }
}
