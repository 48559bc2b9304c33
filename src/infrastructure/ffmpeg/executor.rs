use crate::config::settings::AppConfig;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

// Pipes can outlive the encoder if it forked helpers; stop waiting after this.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    pub source_path: PathBuf,
    pub manifest_path: PathBuf,
    pub segment_seconds: u32,
}

/// Encoder settings that are fixed per process, not per job.
#[derive(Debug, Clone)]
pub struct HlsOptions {
    pub video_profile: String,
    pub video_level: String,
}

impl Default for HlsOptions {
    fn default() -> Self {
        Self {
            video_profile: "baseline".to_string(),
            video_level: "3.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The process exited on its own. Signal terminations report `-1`.
    Exited(i32),
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub outcome: ExitOutcome,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.outcome == ExitOutcome::Exited(0)
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.outcome {
            ExitOutcome::Exited(code) => Some(code),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed while waiting for the encoder: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs one transcode to completion.
///
/// Implementations never retry; the caller decides what a failure means.
#[async_trait]
pub trait TranscodeExecutor: Send + Sync {
    async fn run(
        &self,
        request: &TranscodeRequest,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, ExecutorError>;
}

/// Argument list for a single-rendition HLS encode.
///
/// Every path is its own argv element; nothing is ever handed to a shell.
pub fn build_hls_args(request: &TranscodeRequest, options: &HlsOptions) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::with_capacity(16);
    args.push("-i".into());
    args.push(request.source_path.clone().into_os_string());
    args.extend(
        [
            "-profile:v",
            options.video_profile.as_str(),
            "-level",
            options.video_level.as_str(),
            "-start_number",
            "0",
            "-hls_time",
        ]
        .map(OsString::from),
    );
    args.push(request.segment_seconds.to_string().into());
    args.extend(["-hls_list_size", "0", "-f", "hls"].map(OsString::from));
    args.push(request.manifest_path.clone().into_os_string());
    args
}

pub struct FfmpegExecutor {
    program: String,
    options: HlsOptions,
    timeout: Duration,
}

impl FfmpegExecutor {
    pub fn new(program: impl Into<String>, options: HlsOptions, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            options,
            timeout,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.ffmpeg_bin.clone(),
            HlsOptions {
                video_profile: config.hls_video_profile.clone(),
                video_level: config.hls_video_level.clone(),
            },
            config.transcode_timeout(),
        )
    }
}

#[async_trait]
impl TranscodeExecutor for FfmpegExecutor {
    async fn run(
        &self,
        request: &TranscodeRequest,
        cancel: CancellationToken,
    ) -> Result<ExecutionResult, ExecutorError> {
        let args = build_hls_args(request, &self.options);
        debug!(program = %self.program, ?args, "Executing FFmpeg");

        let mut command = Command::new(&self.program);
        command.args(&args);
        run_command(command, self.timeout, cancel).await
    }
}

enum Stop {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Spawns `command`, waits for it under `timeout` and `cancel`, and collects
/// everything it wrote to stdout and stderr.
pub async fn run_command(
    mut command: Command,
    timeout: Duration,
    cancel: CancellationToken,
) -> Result<ExecutionResult, ExecutorError> {
    let program = command.as_std().get_program().to_string_lossy().into_owned();
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|source| ExecutorError::Spawn { program: program.clone(), source })?;

    let stdout = tokio::spawn(read_all(child.stdout.take()));
    let stderr = tokio::spawn(read_all(child.stderr.take()));

    let stop = tokio::select! {
        status = child.wait() => Stop::Exited(status),
        _ = tokio::time::sleep(timeout) => Stop::TimedOut,
        _ = cancel.cancelled() => Stop::Cancelled,
    };

    let outcome = match stop {
        Stop::Exited(status) => ExitOutcome::Exited(status?.code().unwrap_or(-1)),
        Stop::TimedOut => {
            warn!("{} exceeded {:?}, killing it", program, timeout);
            kill(&mut child, &program).await;
            ExitOutcome::TimedOut
        }
        Stop::Cancelled => {
            kill(&mut child, &program).await;
            ExitOutcome::Cancelled
        }
    };

    Ok(ExecutionResult {
        outcome,
        stdout: drain(stdout).await,
        stderr: drain(stderr).await,
    })
}

async fn kill(child: &mut Child, program: &str) {
    if let Err(e) = child.kill().await {
        warn!("Failed to kill {}: {}", program, e);
    }
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        if let Err(e) = reader.read_to_end(&mut buf).await {
            debug!("Encoder output stream ended early: {}", e);
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn drain(mut handle: JoinHandle<String>) -> String {
    match tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut handle).await {
        Ok(Ok(text)) => text,
        Ok(Err(_)) => String::new(),
        Err(_) => {
            handle.abort();
            String::new()
        }
    }
}
