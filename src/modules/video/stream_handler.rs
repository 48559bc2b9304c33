use crate::common::response::{ApiError, ErrorBody};
use crate::modules::video::error::VideoError;
use crate::modules::video::model::JobState;
use crate::modules::video::store::parse_id;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::io::SeekFrom;
use std::path::{Path as FsPath, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, error};

const PLAYLIST_CACHE: &str = "no-cache";
const SEGMENT_CACHE: &str = "public, max-age=86400";

/// A servable file inside an asset's output directory.
#[derive(Debug)]
pub struct OutputFile {
    pub path: PathBuf,
    pub content_type: String,
    pub len: u64,
}

impl OutputFile {
    fn is_playlist(&self) -> bool {
        self.content_type == "application/vnd.apple.mpegurl"
    }
}

/// Looks up one file of an asset's HLS output.
///
/// Output of failed jobs is hidden. Queued and running jobs are served as
/// far as they have been written.
pub async fn fetch(state: &AppState, video_id: &str, filename: &str) -> Result<OutputFile, VideoError> {
    let id = parse_id(video_id)?;
    if let Ok(job) = state.jobs.status(id).await {
        if job.state == JobState::Failed {
            return Err(VideoError::NotFound(format!("video {}", id)));
        }
    }

    let path = state.assets.resolve_output(video_id, filename)?;
    let len = tokio::fs::metadata(&path).await?.len();

    Ok(OutputFile {
        content_type: content_type_for(&path),
        path,
        len,
    })
}

pub fn content_type_for(path: &FsPath) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("m3u8") => "application/vnd.apple.mpegurl".to_string(),
        Some("ts") => "video/mp2t".to_string(),
        Some("m4s") => "video/iso.segment".to_string(),
        Some("mp4") => "video/mp4".to_string(),
        _ => mime_guess::from_path(path)
            .first_or(mime::APPLICATION_OCTET_STREAM)
            .to_string(),
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ByteRange {
    Full,
    /// Inclusive bounds.
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

/// Interprets a `Range` header against a file of `len` bytes.
///
/// Only a single `bytes=` range is honored; anything else is served whole.
pub fn parse_range(header: Option<&str>, len: u64) -> ByteRange {
    let Some(range_set) = header.and_then(|h| h.trim().strip_prefix("bytes=")) else {
        return ByteRange::Full;
    };
    if range_set.contains(',') {
        return ByteRange::Full;
    }
    let Some((start, end)) = range_set.split_once('-') else {
        return ByteRange::Full;
    };
    let (start, end) = (start.trim(), end.trim());

    let (start, end) = if start.is_empty() {
        // Suffix form: the last `n` bytes.
        let Ok(suffix) = end.parse::<u64>() else {
            return ByteRange::Full;
        };
        if suffix == 0 || len == 0 {
            return ByteRange::Unsatisfiable;
        }
        (len.saturating_sub(suffix), len - 1)
    } else {
        let Ok(start) = start.parse::<u64>() else {
            return ByteRange::Full;
        };
        let end = if end.is_empty() {
            u64::MAX
        } else {
            match end.parse::<u64>() {
                Ok(end) if end >= start => end,
                _ => return ByteRange::Full,
            }
        };
        if start >= len {
            return ByteRange::Unsatisfiable;
        }
        (start, end.min(len - 1))
    };

    ByteRange::Partial { start, end }
}

/// Serve one file of an asset's HLS output
#[utoipa::path(
    get,
    path = "/video_stream/{video_id}/{filename}",
    params(
        ("video_id" = String, Path, description = "Video ID"),
        ("filename" = String, Path, description = "Path inside the output directory, e.g. stream.m3u8")
    ),
    responses(
        (status = 200, description = "File content"),
        (status = 206, description = "Partial content"),
        (status = 400, description = "Malformed ID or path outside the output directory", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody),
        (status = 416, description = "Range not satisfiable")
    ),
    tag = "Video"
)]
pub async fn stream_video(
    State(state): State<AppState>,
    Path((video_id, filename)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    // 1. Locate the file
    let file = fetch(&state, &video_id, &filename).await?;

    // 2. Parse Range header
    let range = parse_range(
        headers.get(header::RANGE).and_then(|h| h.to_str().ok()),
        file.len,
    );

    let cache = if file.is_playlist() { PLAYLIST_CACHE } else { SEGMENT_CACHE };
    let builder = Response::builder()
        .header(header::CONTENT_TYPE, &file.content_type)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CACHE_CONTROL, cache);

    // 3. Open and position the reader
    let mut handle = tokio::fs::File::open(&file.path).await.map_err(VideoError::from)?;
    let response = match range {
        ByteRange::Unsatisfiable => {
            return Ok((
                StatusCode::RANGE_NOT_SATISFIABLE,
                [(header::CONTENT_RANGE, format!("bytes */{}", file.len))],
            )
                .into_response());
        }
        ByteRange::Full => {
            debug!("Serving {} ({} bytes)", file.path.display(), file.len);
            builder
                .status(StatusCode::OK)
                .header(header::CONTENT_LENGTH, file.len)
                .body(Body::from_stream(ReaderStream::new(handle)))
        }
        ByteRange::Partial { start, end } => {
            let count = end - start + 1;
            handle.seek(SeekFrom::Start(start)).await.map_err(VideoError::from)?;
            debug!("Serving {} bytes {}-{}/{}", file.path.display(), start, end, file.len);
            builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_LENGTH, count)
                .header(header::CONTENT_RANGE, format!("bytes {}-{}/{}", start, end, file.len))
                .body(Body::from_stream(ReaderStream::new(handle.take(count))))
        }
    };

    response.map_err(|e| {
        error!("Failed to build stream response: {}", e);
        ApiError::new("Internal Server Error", StatusCode::INTERNAL_SERVER_ERROR)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hls_files_get_their_registered_types() {
        assert_eq!(content_type_for(FsPath::new("stream.m3u8")), "application/vnd.apple.mpegurl");
        assert_eq!(content_type_for(FsPath::new("stream0.ts")), "video/mp2t");
        assert_eq!(content_type_for(FsPath::new("init.M4S")), "video/iso.segment");
        assert_eq!(content_type_for(FsPath::new("poster.png")), "image/png");
        assert_eq!(content_type_for(FsPath::new("blob")), "application/octet-stream");
    }

    #[test]
    fn single_ranges_are_clamped_to_the_file() {
        assert_eq!(parse_range(Some("bytes=0-9"), 100), ByteRange::Partial { start: 0, end: 9 });
        assert_eq!(parse_range(Some("bytes=90-"), 100), ByteRange::Partial { start: 90, end: 99 });
        assert_eq!(parse_range(Some("bytes=90-500"), 100), ByteRange::Partial { start: 90, end: 99 });
        assert_eq!(parse_range(Some("bytes=-10"), 100), ByteRange::Partial { start: 90, end: 99 });
        assert_eq!(parse_range(Some("bytes=-500"), 100), ByteRange::Partial { start: 0, end: 99 });
    }

    #[test]
    fn out_of_bounds_ranges_are_unsatisfiable() {
        assert_eq!(parse_range(Some("bytes=100-"), 100), ByteRange::Unsatisfiable);
        assert_eq!(parse_range(Some("bytes=-0"), 100), ByteRange::Unsatisfiable);
        assert_eq!(parse_range(Some("bytes=0-"), 0), ByteRange::Unsatisfiable);
    }

    #[test]
    fn unsupported_or_malformed_ranges_fall_back_to_full() {
        assert_eq!(parse_range(None, 100), ByteRange::Full);
        assert_eq!(parse_range(Some("items=0-9"), 100), ByteRange::Full);
        assert_eq!(parse_range(Some("bytes=0-9,20-29"), 100), ByteRange::Full);
        assert_eq!(parse_range(Some("bytes=9-0"), 100), ByteRange::Full);
        assert_eq!(parse_range(Some("bytes=abc"), 100), ByteRange::Full);
    }
}
