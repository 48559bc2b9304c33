use crate::common::response::{ApiError, ApiSuccess, ErrorBody};
use crate::modules::video::dto::*;
use crate::modules::video::error::VideoError;
use crate::modules::video::model::JobState;
use crate::modules::video::store::parse_id;
use crate::state::AppState;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures_util::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::info;

/// Multipart field carrying the video.
pub const VIDEO_FIELD: &str = "videoFile";

/// Upload a video for HLS transcoding
///
/// Returns `202` as soon as the upload is stored and queued. With
/// `?wait=true` the request blocks until the transcode finishes.
#[utoipa::path(
    post,
    path = "/upload_video",
    params(UploadParams),
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 202, description = "Upload accepted", body = UploadAcceptedResponse),
        (status = 200, description = "Transcode finished (wait=true)", body = UploadCompletedResponse),
        (status = 400, description = "Missing file, empty name or disallowed type", body = ErrorBody),
        (status = 413, description = "Upload too large"),
        (status = 500, description = "Transcode failed (wait=true)", body = ErrorBody),
        (status = 503, description = "Transcode queue full", body = ErrorBody)
    ),
    tag = "Video"
)]
pub async fn upload_video(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    // 1. Find the video part
    let field = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some(VIDEO_FIELD) => break field,
            Ok(Some(_)) => continue,
            Ok(None) => return Err(VideoError::MissingFile.into()),
            Err(e) => return Err(ApiError::new(e.body_text(), e.status())),
        }
    };

    // 2. Store and queue it
    let filename = field.file_name().unwrap_or_default().to_string();
    info!("Receiving upload: {:?}", filename);
    let video_id = state.jobs.submit(field, &filename).await?;

    if !params.wait {
        return Ok(ApiSuccess(UploadAcceptedResponse::new(video_id), StatusCode::ACCEPTED).into_response());
    }

    // 3. Synchronous mode: report the outcome
    let job = state.jobs.wait_for_terminal(video_id).await?;
    match (job.state, job.hls_url) {
        (JobState::Succeeded, Some(hls_url)) => Ok(ApiSuccess(
            UploadCompletedResponse {
                message: "Video processed successfully!".to_string(),
                hls_url,
                video_id,
            },
            StatusCode::OK,
        )
        .into_response()),
        _ => Err(ApiError::new("FFmpeg processing failed.", StatusCode::INTERNAL_SERVER_ERROR)
            .with_details(job.stderr)),
    }
}

#[utoipa::path(
    get,
    path = "/status/{video_id}",
    params(
        ("video_id" = String, Path, description = "Video ID")
    ),
    responses(
        (status = 200, description = "Job status", body = JobStatusResponse),
        (status = 400, description = "Malformed video ID", body = ErrorBody),
        (status = 404, description = "Unknown video", body = ErrorBody)
    ),
    tag = "Video"
)]
pub async fn get_status(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<ApiSuccess<JobStatusResponse>, ApiError> {
    let id = parse_id(&video_id)?;
    let job = state.jobs.status(id).await?;
    Ok(ApiSuccess(job.into(), StatusCode::OK))
}

#[utoipa::path(
    get,
    path = "/status",
    responses(
        (status = 200, description = "All jobs, oldest first", body = Vec<JobStatusResponse>)
    ),
    tag = "Video"
)]
pub async fn list_jobs(State(state): State<AppState>) -> ApiSuccess<Vec<JobStatusResponse>> {
    let jobs = state.jobs.list().await.into_iter().map(JobStatusResponse::from).collect();
    ApiSuccess(jobs, StatusCode::OK)
}

#[utoipa::path(
    post,
    path = "/cancel/{video_id}",
    params(
        ("video_id" = String, Path, description = "Video ID")
    ),
    responses(
        (status = 200, description = "Cancellation accepted", body = JobStatusResponse),
        (status = 400, description = "Malformed video ID", body = ErrorBody),
        (status = 404, description = "Unknown video", body = ErrorBody),
        (status = 409, description = "Job already finished", body = ErrorBody)
    ),
    tag = "Video"
)]
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(video_id): Path<String>,
) -> Result<ApiSuccess<JobStatusResponse>, ApiError> {
    let id = parse_id(&video_id)?;
    let job = state.jobs.cancel(id).await?;
    Ok(ApiSuccess(job.into(), StatusCode::OK))
}

/// Server-sent stream of job state changes
#[utoipa::path(
    get,
    path = "/events",
    responses(
        (status = 200, description = "text/event-stream of JobEvent", body = crate::modules::video::events::JobEvent)
    ),
    tag = "Video"
)]
pub async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Ends with the server so graceful shutdown can drain.
    let shutdown = state.jobs.shutdown_token();
    let stream = BroadcastStream::new(state.jobs.subscribe())
        .filter_map(|result| result.ok())
        .map(|event| {
            let data = serde_json::to_string(&event).unwrap_or_else(|e| {
                format!(r#"{{"error": "serialization failed: {}"}}"#, e)
            });
            Ok(Event::default().event("job").data(data))
        });
    let stream = futures_util::StreamExt::take_until(stream, async move { shutdown.cancelled().await });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"))
}
