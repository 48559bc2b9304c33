use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Playlist name written into every output directory.
pub const MANIFEST_NAME: &str = "stream.m3u8";

pub fn manifest_url(id: Uuid) -> String {
    format!("/video_stream/{}/{}", id, MANIFEST_NAME)
}

pub fn status_url(id: Uuid) -> String {
    format!("/status/{}", id)
}

/// One uploaded video and the locations of its source and derived output.
#[derive(Debug, Clone)]
pub struct Asset {
    pub id: Uuid,
    pub original_filename: String,
    pub source_path: PathBuf,
    pub output_dir: PathBuf,
}

impl Asset {
    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir.join(MANIFEST_NAME)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    pub fn can_transition_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Queued, JobState::Running)
                | (JobState::Queued, JobState::Failed)
                | (JobState::Running, JobState::Succeeded)
                | (JobState::Running, JobState::Failed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Diagnostic tag attached to a `Failed` job.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ExitCode,
    Timeout,
    Cancelled,
    Spawn,
    /// The encoder exited cleanly but left no playlist behind.
    MissingOutput,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub asset: Asset,
    pub state: JobState,
    pub created_at: OffsetDateTime,
    pub started_at: Option<OffsetDateTime>,
    pub finished_at: Option<OffsetDateTime>,
    pub exit_code: Option<i32>,
    pub failure: Option<FailureKind>,
    pub stdout: String,
    pub stderr: String,
    pub hls_url: Option<String>,
}

impl Job {
    pub fn queued(asset: Asset) -> Self {
        Self {
            asset,
            state: JobState::Queued,
            created_at: OffsetDateTime::now_utc(),
            started_at: None,
            finished_at: None,
            exit_code: None,
            failure: None,
            stdout: String::new(),
            stderr: String::new(),
            hls_url: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.asset.id
    }
}
