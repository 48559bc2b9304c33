//! On-disk layout of uploaded sources and HLS outputs.
//!
//! ```text
//! uploads/{id}_{sanitized_name}   transient, removed when the job ends
//! hls_outputs/{id}/stream.m3u8    permanent
//! hls_outputs/{id}/stream{N}.ts
//! ```

use super::error::VideoError;
use super::model::Asset;
use crate::config::settings::AppConfig;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AssetStore {
    uploads_root: PathBuf,
    outputs_root: PathBuf,
    allowed_extensions: Arc<[String]>,
}

impl AssetStore {
    pub fn new(uploads_root: PathBuf, outputs_root: PathBuf, allowed_extensions: Vec<String>) -> Self {
        Self {
            uploads_root,
            outputs_root,
            allowed_extensions: allowed_extensions.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.upload_dir.clone(),
            config.hls_output_dir.clone(),
            config.allowed_extensions.clone(),
        )
    }

    pub fn uploads_root(&self) -> &Path {
        &self.uploads_root
    }

    pub fn outputs_root(&self) -> &Path {
        &self.outputs_root
    }

    pub fn ensure_roots(&self) -> io::Result<()> {
        fs::create_dir_all(&self.uploads_root)?;
        fs::create_dir_all(&self.outputs_root)?;
        Ok(())
    }

    /// Checks the extension of a client-supplied name against the allow-list.
    pub fn extension_allowed(&self, filename: &str) -> bool {
        match extension_of(filename) {
            Some(ext) => self.allowed_extensions.iter().any(|allowed| *allowed == ext),
            None => false,
        }
    }

    /// Mints a fresh id and lays out the paths for an upload.
    ///
    /// Creates the output directory; the source file is written by the caller.
    pub fn allocate(&self, original_filename: &str) -> Result<Asset, VideoError> {
        let sanitized = sanitize_filename(original_filename);
        if sanitized.is_empty() || !self.extension_allowed(&sanitized) {
            return Err(VideoError::InvalidName(original_filename.to_string()));
        }

        let id = Uuid::new_v4();
        let source_path = self.uploads_root.join(format!("{}_{}", id, sanitized));
        let output_dir = self.output_dir(id);
        fs::create_dir_all(&output_dir)?;

        Ok(Asset {
            id,
            original_filename: sanitized,
            source_path,
            output_dir,
        })
    }

    pub fn output_dir(&self, id: Uuid) -> PathBuf {
        self.outputs_root.join(id.to_string())
    }

    /// Resolves `relative_path` inside the output directory of `id`.
    ///
    /// Containment is checked twice: lexically on the request path, then on
    /// the canonicalized result so symlinks cannot point outside the directory.
    pub fn resolve_output(&self, id: &str, relative_path: &str) -> Result<PathBuf, VideoError> {
        let id = parse_id(id)?;
        check_relative(relative_path)?;

        let output_dir = match self.output_dir(id).canonicalize() {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(VideoError::NotFound(format!("video {}", id)));
            }
            Err(e) => return Err(e.into()),
        };

        let resolved = match output_dir.join(relative_path).canonicalize() {
            Ok(path) => path,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(VideoError::NotFound(relative_path.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        if !resolved.starts_with(&output_dir) {
            warn!(video_id = %id, path = relative_path, "resolved path escapes output directory");
            return Err(VideoError::PathTraversal(relative_path.to_string()));
        }

        if !resolved.is_file() {
            return Err(VideoError::NotFound(relative_path.to_string()));
        }

        Ok(resolved)
    }

    /// Deletes the uploaded source. Returns `false` when it was already gone.
    pub fn remove_source(&self, asset: &Asset) -> io::Result<bool> {
        match fs::remove_file(&asset.source_path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Rolls back an allocation that never became a job.
    pub fn discard(&self, asset: &Asset) -> io::Result<()> {
        self.remove_source(asset)?;
        match fs::remove_dir_all(&asset.output_dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Removes uploads left behind by a previous process.
    ///
    /// Only safe before any worker has started.
    pub fn sweep_orphaned_uploads(&self) -> io::Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.uploads_root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Removed {} orphaned upload(s) from {}", removed, self.uploads_root.display());
        }
        Ok(removed)
    }
}

/// Accepts only the canonical lowercase hyphenated form of a UUID.
pub fn parse_id(id: &str) -> Result<Uuid, VideoError> {
    match Uuid::try_parse(id) {
        Ok(parsed) if parsed.to_string() == id => Ok(parsed),
        _ => Err(VideoError::InvalidId),
    }
}

fn check_relative(relative_path: &str) -> Result<(), VideoError> {
    if relative_path.is_empty() {
        return Err(VideoError::NotFound(String::new()));
    }
    if relative_path.contains(['\\', '\0']) {
        return Err(VideoError::PathTraversal(relative_path.to_string()));
    }
    let escapes = Path::new(relative_path).components().any(|c| {
        matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_))
    });
    if escapes {
        return Err(VideoError::PathTraversal(relative_path.to_string()));
    }
    Ok(())
}

/// Lowercased text after the last `.`, if any.
pub fn extension_of(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Reduces a client file name to `[A-Za-z0-9_.-]`.
///
/// Compatibility decomposition runs first, so accented letters keep their
/// ASCII base. Path separators and whitespace runs become `_`; leading and
/// trailing dots and underscores are stripped, so the result never names a
/// parent directory or a hidden file.
pub fn sanitize_filename(name: &str) -> String {
    let separated: String = name
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = separated.split_whitespace().collect::<Vec<_>>().join("_");
    let filtered: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    filtered.trim_matches(|c| c == '.' || c == '_').to_string()
}
