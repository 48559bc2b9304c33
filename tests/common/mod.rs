//! Shared test harness for integration tests.
//!
//! [`TestHarness`] builds a full [`AppState`] over a temporary media root,
//! driven by [`FakeExecutor`] instead of a real encoder.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use uuid::Uuid;
use vidstream::app::create_app;
use vidstream::config::settings::AppConfig;
use vidstream::infrastructure::ffmpeg::{
    ExecutionResult, ExecutorError, ExitOutcome, TranscodeExecutor, TranscodeRequest,
};
use vidstream::infrastructure::queue::channel::TranscodeConsumer;
use vidstream::modules::video::model::{Job, JobState};
use vidstream::state::AppState;
use vidstream::workers::transcoder::spawn_workers;

pub const BOUNDARY: &str = "vidstream-test-boundary";
pub const CORRUPT_STDERR: &str = "stream.mp4: Invalid data found when processing input";
pub const SLOW_STDERR: &str = "frame=  120 fps= 30 q=28.0 size=N/A time=00:00:04.00";
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Stands in for ffmpeg, choosing its behavior from the uploaded file name:
///
/// - `corrupt*` exits 1 with a diagnostic on stderr
/// - `hang*` blocks until cancelled
/// - `silent*` exits 0 without writing anything
/// - `slow*` reports that the encoder hit its time limit
/// - anything else writes a two-line playlist and one segment
pub struct FakeExecutor;

#[async_trait]
impl TranscodeExecutor for FakeExecutor {
    async fn run(
        &self,
        request: &TranscodeRequest,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, ExecutorError> {
        let stored = request
            .source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        // Sources are stored as `{id}_{name}`.
        let name = stored.split_once('_').map(|(_, n)| n.to_string()).unwrap_or(stored);

        // The worker must hand over a source that is still on disk.
        tokio::fs::metadata(&request.source_path).await?;

        if name.starts_with("corrupt") {
            return Ok(result(ExitOutcome::Exited(1), CORRUPT_STDERR));
        }
        if name.starts_with("hang") {
            cancel.cancelled().await;
            return Ok(result(ExitOutcome::Cancelled, ""));
        }
        if name.starts_with("silent") {
            return Ok(result(ExitOutcome::Exited(0), ""));
        }
        if name.starts_with("slow") {
            return Ok(result(ExitOutcome::TimedOut, SLOW_STDERR));
        }

        let output_dir = request.manifest_path.parent().unwrap_or(Path::new("."));
        tokio::fs::write(output_dir.join("stream0.ts"), vec![0x47u8; 188 * 4]).await?;
        tokio::fs::write(
            &request.manifest_path,
            format!(
                "#EXTM3U\n#EXT-X-TARGETDURATION:{0}\n#EXTINF:{0}.0,\nstream0.ts\n#EXT-X-ENDLIST\n",
                request.segment_seconds
            ),
        )
        .await?;
        Ok(result(ExitOutcome::Exited(0), ""))
    }
}

fn result(outcome: ExitOutcome, stderr: &str) -> ExecutionResult {
    ExecutionResult {
        outcome,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

pub struct TestHarness {
    pub state: AppState,
    pub router: Router,
    pub media: TempDir,
    workers: Vec<JoinHandle<()>>,
    // Holds the queue open when no worker is running.
    _consumer: TranscodeConsumer,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Builds the harness after letting `customize` adjust the defaults.
    pub fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let media = tempfile::tempdir().expect("failed to create media root");
        let mut config = AppConfig::with_media_root(media.path());
        customize(&mut config);

        let workers = config.transcode_workers;
        Self::build(media, config, Arc::new(FakeExecutor), workers)
    }

    /// Builds the harness around a caller-supplied executor.
    pub fn with_executor(executor: Arc<dyn TranscodeExecutor>) -> Self {
        let media = tempfile::tempdir().expect("failed to create media root");
        let config = AppConfig::with_media_root(media.path());
        Self::build(media, config, executor, 2)
    }

    /// Builds the harness without any worker; jobs stay queued.
    pub fn without_workers() -> Self {
        let media = tempfile::tempdir().expect("failed to create media root");
        let config = AppConfig::with_media_root(media.path());
        Self::build(media, config, Arc::new(FakeExecutor), 0)
    }

    fn build(
        media: TempDir,
        config: AppConfig,
        executor: Arc<dyn TranscodeExecutor>,
        workers: usize,
    ) -> Self {
        let (state, consumer) = AppState::new(config, executor).expect("failed to build state");
        let workers = spawn_workers(state.jobs.clone(), consumer.clone(), workers);
        let router = create_app(state.clone());
        Self {
            state,
            router,
            media,
            workers,
            _consumer: consumer,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.expect("router failed")
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post(&self, uri: &str) -> Response<Body> {
        self.send(Request::post(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn upload(&self, uri: &str, filename: &str, data: &[u8]) -> Response<Body> {
        self.send(upload_request(uri, "videoFile", filename, data)).await
    }

    pub async fn wait_for_terminal(&self, id: Uuid) -> Job {
        tokio::time::timeout(TEST_TIMEOUT, self.state.jobs.wait_for_terminal(id))
            .await
            .expect("job did not finish in time")
            .expect("job disappeared")
    }

    pub async fn wait_for_state(&self, id: Uuid, state: JobState) -> Job {
        let poll = async {
            loop {
                let job = self.state.jobs.status(id).await.expect("job disappeared");
                if job.state == state {
                    return job;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(TEST_TIMEOUT, poll)
            .await
            .expect("job never reached the expected state")
    }

    pub fn uploads(&self) -> usize {
        count_entries(self.state.assets.uploads_root())
    }

    pub fn outputs(&self) -> usize {
        count_entries(self.state.assets.outputs_root())
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}

fn count_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

pub fn multipart_body(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn upload_request(uri: &str, field: &str, filename: &str, data: &[u8]) -> Request<Body> {
    let body = multipart_body(field, filename, data);
    Request::post(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body")
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("body is not JSON")
}
