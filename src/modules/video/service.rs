use super::error::VideoError;
use super::events::{JobEvent, TranscodeJob};
use super::model::{self, Asset, FailureKind, Job, JobState};
use super::repository::{JobRepository, TransitionError};
use super::store::AssetStore;
use crate::common::upload::stream_to_file;
use crate::infrastructure::ffmpeg::{
    ExecutionResult, ExecutorError, ExitOutcome, TranscodeExecutor, TranscodeRequest,
};
use crate::infrastructure::queue::channel::{QueueError, TranscodeQueue};
use bytes::Bytes;
use futures_util::Stream;
use std::fmt::Display;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Owns the job table and drives every job through its lifecycle.
///
/// Cheap to clone; all clones share one table, one queue and one executor.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<Inner>,
}

struct Inner {
    store: AssetStore,
    jobs: JobRepository,
    queue: TranscodeQueue,
    executor: Arc<dyn TranscodeExecutor>,
    segment_seconds: u32,
    shutdown: CancellationToken,
}

impl JobManager {
    pub fn new(
        store: AssetStore,
        queue: TranscodeQueue,
        executor: Arc<dyn TranscodeExecutor>,
        segment_seconds: u32,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                jobs: JobRepository::new(),
                queue,
                executor,
                segment_seconds,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Stores an upload and queues it for transcoding.
    ///
    /// Returns as soon as the dispatch unit is on the queue. Nothing is left
    /// on disk when this fails.
    pub async fn submit<S, E>(&self, upload: S, original_filename: &str) -> Result<Uuid, VideoError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let store = &self.inner.store;

        // 1. Validate the name before touching the disk
        if original_filename.trim().is_empty() {
            return Err(VideoError::EmptyFilename);
        }
        if !store.extension_allowed(original_filename) {
            return Err(VideoError::UnsupportedType(original_filename.to_string()));
        }

        // 2. Reserve an id and its directories
        let asset = store.allocate(original_filename)?;
        let id = asset.id;

        // 3. Persist the source
        match stream_to_file(upload, &asset.source_path).await {
            Ok(bytes) => info!("📥 Stored {} ({} bytes) as {}", asset.original_filename, bytes, id),
            Err(e) => {
                self.discard(&asset);
                return Err(e);
            }
        }

        // 4. Register, then hand off to the workers
        let cancel = self.inner.shutdown.child_token();
        self.inner.jobs.insert(Job::queued(asset.clone()), cancel).await;

        if let Err(e) = self.inner.queue.publish(TranscodeJob { video_id: id }) {
            warn!(video_id = %id, "Rejecting upload: {}", e);
            self.inner.jobs.remove(id).await;
            self.discard(&asset);
            return Err(match e {
                QueueError::Full => VideoError::QueueFull,
                QueueError::Closed => VideoError::QueueClosed,
            });
        }

        Ok(id)
    }

    pub async fn status(&self, id: Uuid) -> Result<Job, VideoError> {
        self.inner
            .jobs
            .get(id)
            .await
            .ok_or_else(|| VideoError::NotFound(format!("video {}", id)))
    }

    pub async fn list(&self) -> Vec<Job> {
        self.inner.jobs.list().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.jobs.subscribe()
    }

    pub fn store(&self) -> &AssetStore {
        &self.inner.store
    }

    /// Cancels a job.
    ///
    /// A queued job fails immediately. A running job has its encoder killed
    /// and is finalized by its worker, so the returned job may still read
    /// `Running`.
    pub async fn cancel(&self, id: Uuid) -> Result<Job, VideoError> {
        let cancelled = self
            .inner
            .jobs
            .transition(id, JobState::Queued, JobState::Failed, |job| {
                job.failure = Some(FailureKind::Cancelled);
                job.finished_at = Some(OffsetDateTime::now_utc());
            })
            .await;

        match cancelled {
            Ok(job) => {
                self.remove_source(&job.asset);
                warn!(video_id = %id, "🚫 Cancelled queued job");
                Ok(job)
            }
            Err(TransitionError::Rejected(JobState::Running)) => {
                if let Some(token) = self.inner.jobs.cancel_token(id).await {
                    token.cancel();
                }
                warn!(video_id = %id, "🚫 Cancelling running job");
                self.status(id).await
            }
            Err(TransitionError::Rejected(_)) => Err(VideoError::AlreadyFinished(id.to_string())),
            Err(TransitionError::Unknown) => Err(VideoError::NotFound(format!("video {}", id))),
        }
    }

    /// Resolves once the job has reached `Succeeded` or `Failed`.
    pub async fn wait_for_terminal(&self, id: Uuid) -> Result<Job, VideoError> {
        // Subscribe before reading the state so no transition slips between.
        let mut events = self.subscribe();
        loop {
            let job = self.status(id).await?;
            if job.state.is_terminal() {
                return Ok(job);
            }

            loop {
                match events.recv().await {
                    Ok(event) if event.video_id == id && event.state.is_terminal() => break,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(_)) => break,
                    Err(RecvError::Closed) => return self.status(id).await,
                }
            }
        }
    }

    /// Stops accepting work, kills running encoders and fails queued jobs.
    pub async fn shutdown(&self) {
        self.inner.queue.close();
        self.inner.shutdown.cancel();

        for job in self.list().await {
            if job.state == JobState::Queued && self.cancel(job.id()).await.is_ok() {
                info!(video_id = %job.id(), "Dropped queued job on shutdown");
            }
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Claims a dequeued job for execution.
    ///
    /// `None` when the job was cancelled or rolled back while it sat on the
    /// queue.
    pub(crate) async fn start(&self, id: Uuid) -> Option<(Asset, CancellationToken)> {
        let started = self
            .inner
            .jobs
            .transition(id, JobState::Queued, JobState::Running, |job| {
                job.started_at = Some(OffsetDateTime::now_utc());
            })
            .await;

        match started {
            Ok(job) => {
                let cancel = self.inner.jobs.cancel_token(id).await?;
                Some((job.asset, cancel))
            }
            Err(TransitionError::Rejected(state)) => {
                info!(video_id = %id, "Skipping job already {}", state);
                None
            }
            Err(TransitionError::Unknown) => {
                warn!(video_id = %id, "Dequeued unknown job");
                None
            }
        }
    }

    pub(crate) fn executor(&self) -> &dyn TranscodeExecutor {
        self.inner.executor.as_ref()
    }

    pub(crate) fn request_for(&self, asset: &Asset) -> TranscodeRequest {
        TranscodeRequest {
            source_path: asset.source_path.clone(),
            manifest_path: asset.manifest_path(),
            segment_seconds: self.inner.segment_seconds,
        }
    }

    /// Records the outcome of a run and releases the source upload.
    pub(crate) async fn finish(
        &self,
        asset: &Asset,
        result: Result<ExecutionResult, ExecutorError>,
    ) -> Option<Job> {
        // The source goes before the terminal state is visible.
        self.remove_source(asset);

        let (failure, exit_code, stdout, stderr) = match result {
            Ok(run) => {
                let failure = match run.outcome {
                    ExitOutcome::Exited(0) if asset.manifest_path().is_file() => None,
                    ExitOutcome::Exited(0) => Some(FailureKind::MissingOutput),
                    ExitOutcome::Exited(_) => Some(FailureKind::ExitCode),
                    ExitOutcome::TimedOut => Some(FailureKind::Timeout),
                    ExitOutcome::Cancelled => Some(FailureKind::Cancelled),
                };
                let exit_code = run.exit_code();
                (failure, exit_code, run.stdout, run.stderr)
            }
            Err(e) => (Some(FailureKind::Spawn), None, String::new(), e.to_string()),
        };

        let state = if failure.is_none() { JobState::Succeeded } else { JobState::Failed };
        let hls_url = failure.is_none().then(|| model::manifest_url(asset.id));

        let finished = self
            .inner
            .jobs
            .transition(asset.id, JobState::Running, state, move |job| {
                job.finished_at = Some(OffsetDateTime::now_utc());
                job.exit_code = exit_code;
                job.failure = failure;
                job.stdout = stdout;
                job.stderr = stderr;
                job.hls_url = hls_url;
            })
            .await;

        let job = match finished {
            Ok(job) => job,
            Err(e) => {
                error!(video_id = %asset.id, "Could not record transcode outcome: {:?}", e);
                return None;
            }
        };

        match job.failure {
            None => info!(video_id = %asset.id, "✅ Transcode finished"),
            Some(FailureKind::Cancelled) => warn!(video_id = %asset.id, "🚫 Transcode cancelled"),
            Some(kind) => error!(
                video_id = %asset.id,
                failure = ?kind,
                exit_code = ?job.exit_code,
                "❌ Transcode failed: {}",
                last_line(&job.stderr)
            ),
        }
        Some(job)
    }

    fn remove_source(&self, asset: &Asset) {
        if let Err(e) = self.inner.store.remove_source(asset) {
            error!(video_id = %asset.id, "Failed to remove {}: {}", asset.source_path.display(), e);
        }
    }

    fn discard(&self, asset: &Asset) {
        if let Err(e) = self.inner.store.discard(asset) {
            error!(video_id = %asset.id, "Failed to roll back upload: {}", e);
        }
    }
}

fn last_line(text: &str) -> &str {
    text.lines().rev().find(|line| !line.trim().is_empty()).unwrap_or("")
}
