use crate::config::env::{self, EnvKey};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use validator::Validate;

pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("configuration rejected: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

impl From<(&'static str, String)> for ConfigError {
    fn from((key, value): (&'static str, String)) -> Self {
        ConfigError::Invalid { key, value }
    }
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(length(min = 1))]
    pub server_host: String,
    pub server_port: u16,
    pub upload_dir: PathBuf,
    pub hls_output_dir: PathBuf,
    #[validate(length(min = 1))]
    pub allowed_extensions: Vec<String>,
    #[validate(range(min = 1))]
    pub max_upload_bytes: usize,
    #[validate(length(min = 1))]
    pub ffmpeg_bin: String,
    #[validate(range(min = 1, max = 60))]
    pub hls_segment_seconds: u32,
    #[validate(length(min = 1))]
    pub hls_video_profile: String,
    #[validate(length(min = 1))]
    pub hls_video_level: String,
    #[validate(range(min = 1))]
    pub transcode_timeout_secs: u64,
    #[validate(range(min = 1, max = 64))]
    pub transcode_workers: usize,
    #[validate(range(min = 1))]
    pub transcode_queue_capacity: usize,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let media_root = PathBuf::from(env::get_or(EnvKey::MediaRoot, "media"));

        let config = Self {
            server_host: env::get_or(EnvKey::ServerHost, "0.0.0.0"),
            server_port: env::get_parsed(EnvKey::ServerPort, 8000)?,
            upload_dir: env::get(EnvKey::UploadDir)
                .map(PathBuf::from)
                .unwrap_or_else(|_| media_root.join("uploads")),
            hls_output_dir: env::get(EnvKey::HlsOutputDir)
                .map(PathBuf::from)
                .unwrap_or_else(|_| media_root.join("hls_outputs")),
            allowed_extensions: env::get_list(EnvKey::AllowedExtensions, DEFAULT_ALLOWED_EXTENSIONS),
            max_upload_bytes: env::get_parsed(EnvKey::MaxUploadBytes, 2 * 1024 * 1024 * 1024)?,
            ffmpeg_bin: env::get_or(EnvKey::FfmpegBin, "ffmpeg"),
            hls_segment_seconds: env::get_parsed(EnvKey::HlsSegmentSeconds, 10)?,
            hls_video_profile: env::get_or(EnvKey::HlsVideoProfile, "baseline"),
            hls_video_level: env::get_or(EnvKey::HlsVideoLevel, "3.0"),
            transcode_timeout_secs: env::get_parsed(EnvKey::TranscodeTimeoutSecs, 30 * 60)?,
            transcode_workers: env::get_parsed(EnvKey::TranscodeWorkers, 2)?,
            transcode_queue_capacity: env::get_parsed(EnvKey::TranscodeQueueCapacity, 64)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Defaults rooted at `media_root`, without consulting the environment.
    pub fn with_media_root(media_root: impl AsRef<Path>) -> Self {
        let media_root = media_root.as_ref();
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 8000,
            upload_dir: media_root.join("uploads"),
            hls_output_dir: media_root.join("hls_outputs"),
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            max_upload_bytes: 64 * 1024 * 1024,
            ffmpeg_bin: "ffmpeg".to_string(),
            hls_segment_seconds: 10,
            hls_video_profile: "baseline".to_string(),
            hls_video_level: "3.0".to_string(),
            transcode_timeout_secs: 30 * 60,
            transcode_workers: 2,
            transcode_queue_capacity: 64,
        }
    }

    pub fn transcode_timeout(&self) -> Duration {
        Duration::from_secs(self.transcode_timeout_secs)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
