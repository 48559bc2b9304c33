use super::model::{self, FailureKind, Job, JobState};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UploadParams {
    /// Block until the transcode finishes.
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadAcceptedResponse {
    pub video_id: Uuid,
    pub status_url: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadCompletedResponse {
    pub message: String,
    pub hls_url: String,
    pub video_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobStatusResponse {
    pub video_id: Uuid,
    pub original_filename: String,
    pub state: JobState,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none", default)]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none", default)]
    pub finished_at: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hls_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Encoder stderr, kept only for failed jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        let details = (job.state == JobState::Failed).then_some(job.stderr);
        Self {
            video_id: job.asset.id,
            original_filename: job.asset.original_filename,
            state: job.state,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            hls_url: job.hls_url,
            failure: job.failure,
            exit_code: job.exit_code,
            details,
        }
    }
}

impl UploadAcceptedResponse {
    pub fn new(video_id: Uuid) -> Self {
        Self {
            video_id,
            status_url: model::status_url(video_id),
        }
    }
}
