use axum::{
    body::Body,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};
use tokio_util::io::ReaderStream;
use tracing::{error, warn};

use super::error_responses::error_response;
use crate::usecases::videos::ServableFile;

/// Streams a file from disk, answering `Range` requests with 206 or 416.
pub async fn serve_file(file: ServableFile, headers: &HeaderMap) -> Response {
    let mut handle = match File::open(&file.path).await {
        Ok(handle) => handle,
        Err(err) => {
            warn!(path = %file.path.display(), error = ?err, "files: failed to open file");
            return error_response(StatusCode::NOT_FOUND, "File not found");
        }
    };
    let size = match handle.metadata().await {
        Ok(metadata) => metadata.len(),
        Err(err) => {
            error!(path = %file.path.display(), error = ?err, "files: failed to stat file");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "");
        }
    };

    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
        .map(|value| parse_range_header(value, size));

    let base_headers = [
        (header::ACCEPT_RANGES, "bytes".to_string()),
        (header::CONTENT_TYPE, file.content_type.clone()),
    ];

    match range {
        Some(ByteRange::Satisfiable(start, end)) => {
            let length = end - start + 1;
            if let Err(err) = handle.seek(std::io::SeekFrom::Start(start)).await {
                error!(path = %file.path.display(), error = ?err, "files: failed to seek");
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, "");
            }

            let body = Body::from_stream(ReaderStream::new(handle.take(length)));
            (
                StatusCode::PARTIAL_CONTENT,
                base_headers,
                [
                    (header::CONTENT_RANGE, format!("bytes {}-{}/{}", start, end, size)),
                    (header::CONTENT_LENGTH, length.to_string()),
                ],
                body,
            )
                .into_response()
        }
        Some(ByteRange::Unsatisfiable) => (
            StatusCode::RANGE_NOT_SATISFIABLE,
            base_headers,
            [(header::CONTENT_RANGE, format!("bytes */{}", size))],
        )
            .into_response(),
        // Malformed or non-byte ranges are ignored and the whole file is sent.
        Some(ByteRange::Ignored) | None => (
            StatusCode::OK,
            base_headers,
            [(header::CONTENT_LENGTH, size.to_string())],
            Body::from_stream(ReaderStream::new(handle)),
        )
            .into_response(),
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ByteRange {
    /// Inclusive start and end offsets.
    Satisfiable(u64, u64),
    Unsatisfiable,
    Ignored,
}

/// Parses a single `bytes=` range against a file of `size` bytes.
pub fn parse_range_header(value: &str, size: u64) -> ByteRange {
    let Some(range) = value.trim().strip_prefix("bytes=") else {
        return ByteRange::Ignored;
    };
    let range = range.trim();
    // Multipart ranges are not supported.
    if range.is_empty() || range.contains(',') {
        return ByteRange::Ignored;
    }
    let Some((start_str, end_str)) = range.split_once('-') else {
        return ByteRange::Ignored;
    };

    if start_str.is_empty() {
        // Suffix range: "-N" means the last N bytes.
        return match end_str.parse::<u64>() {
            Ok(0) => ByteRange::Unsatisfiable,
            Ok(_) if size == 0 => ByteRange::Unsatisfiable,
            Ok(suffix_len) => ByteRange::Satisfiable(size.saturating_sub(suffix_len), size - 1),
            Err(_) => ByteRange::Ignored,
        };
    }

    let Ok(start) = start_str.parse::<u64>() else {
        return ByteRange::Ignored;
    };
    let end = if end_str.is_empty() {
        size.saturating_sub(1)
    } else {
        match end_str.parse::<u64>() {
            Ok(end) => end,
            Err(_) => return ByteRange::Ignored,
        }
    };

    if start >= size {
        return ByteRange::Unsatisfiable;
    }
    if end < start {
        return ByteRange::Ignored;
    }

    ByteRange::Satisfiable(start, end.min(size - 1))
}
