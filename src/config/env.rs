use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerHost,
    ServerPort,
    MediaRoot,
    UploadDir,
    HlsOutputDir,
    AllowedExtensions,
    MaxUploadBytes,
    FfmpegBin,
    HlsSegmentSeconds,
    HlsVideoProfile,
    HlsVideoLevel,
    TranscodeTimeoutSecs,
    TranscodeWorkers,
    TranscodeQueueCapacity,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerHost => "APP_HOST",
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::MediaRoot => "MEDIA_ROOT",
            EnvKey::UploadDir => "UPLOAD_DIR",
            EnvKey::HlsOutputDir => "HLS_OUTPUT_DIR",
            EnvKey::AllowedExtensions => "ALLOWED_EXTENSIONS",
            EnvKey::MaxUploadBytes => "MAX_UPLOAD_BYTES",
            EnvKey::FfmpegBin => "FFMPEG_BIN",
            EnvKey::HlsSegmentSeconds => "HLS_SEGMENT_SECONDS",
            EnvKey::HlsVideoProfile => "HLS_VIDEO_PROFILE",
            EnvKey::HlsVideoLevel => "HLS_VIDEO_LEVEL",
            EnvKey::TranscodeTimeoutSecs => "TRANSCODE_TIMEOUT_SECS",
            EnvKey::TranscodeWorkers => "TRANSCODE_WORKERS",
            EnvKey::TranscodeQueueCapacity => "TRANSCODE_QUEUE_CAPACITY",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

/// Reads and parses `key`, falling back to `default` when the variable is unset.
///
/// A value that is set but does not parse is reported instead of silently
/// replaced, so a typo in `.env` fails startup.
pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> Result<T, (&'static str, String)> {
    let name = key.as_str();
    match env::var(name) {
        Ok(val) => val.trim().parse::<T>().map_err(|_| (name, val)),
        Err(_) => Ok(default),
    }
}

/// Splits a comma separated variable into trimmed, lowercased, non-empty items.
pub fn get_list(key: EnvKey, default: &[&str]) -> Vec<String> {
    match get(key) {
        Ok(val) => val
            .split(',')
            .map(|item| item.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|item| !item.is_empty())
            .collect(),
        Err(_) => default.iter().map(|item| item.to_string()).collect(),
    }
}
