use crate::modules::video::error::VideoError;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, error};

const WRITE_BUFFER_SIZE: usize = 1024 * 1024;

/// Writes an incoming body to disk chunk by chunk.
pub struct FileUploader {
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
}

impl FileUploader {
    pub async fn new(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = File::create(&path).await?;

        Ok(Self {
            path,
            writer: BufWriter::with_capacity(WRITE_BUFFER_SIZE, file),
            written: 0,
        })
    }

    pub async fn write_chunk(&mut self, chunk: Bytes) -> io::Result<()> {
        self.writer.write_all(&chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Flushes everything to disk and returns the number of bytes written.
    pub async fn finish(mut self) -> io::Result<u64> {
        self.writer.flush().await?;
        self.writer.get_ref().sync_all().await?;
        debug!("Wrote {} bytes to {}", self.written, self.path.display());
        Ok(self.written)
    }

    /// Drops the partial file.
    pub async fn abort(self) -> io::Result<()> {
        let Self { path, writer, .. } = self;
        drop(writer);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Streams `body` into a new file at `path`.
///
/// On any failure the partial file is removed before the error is returned.
pub async fn stream_to_file<S, E>(body: S, path: &Path) -> Result<u64, VideoError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    let mut body = std::pin::pin!(body);
    let mut uploader = FileUploader::new(path).await?;

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                error!("Stream error: {}", e);
                uploader.abort().await?;
                return Err(VideoError::Upload(e.to_string()));
            }
        };

        if let Err(e) = uploader.write_chunk(chunk).await {
            error!("Upload error: {}", e);
            uploader.abort().await?;
            return Err(e.into());
        }
    }

    Ok(uploader.finish().await?)
}
