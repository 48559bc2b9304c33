use crate::config::settings::AppConfig;
use crate::infrastructure::ffmpeg::TranscodeExecutor;
use crate::infrastructure::queue::channel::{self, TranscodeConsumer};
use crate::modules::video::service::JobManager;
use crate::modules::video::store::AssetStore;
use std::io;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub assets: AssetStore,
    pub jobs: JobManager,
}

impl AppState {
    /// Prepares the media roots and the job manager.
    ///
    /// The returned consumer feeds the worker pool.
    pub fn new(
        config: AppConfig,
        executor: Arc<dyn TranscodeExecutor>,
    ) -> io::Result<(Self, TranscodeConsumer)> {
        let assets = AssetStore::from_config(&config);
        assets.ensure_roots()?;
        assets.sweep_orphaned_uploads()?;

        let (queue, consumer) = channel::bounded(config.transcode_queue_capacity);
        let jobs = JobManager::new(assets.clone(), queue, executor, config.hls_segment_seconds);

        Ok((
            Self {
                config,
                assets,
                jobs,
            },
            consumer,
        ))
    }
}
