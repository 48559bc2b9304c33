use crate::infrastructure::queue::channel::TranscodeConsumer;
use crate::modules::video::events::TranscodeJob;
use crate::modules::video::model::Job;
use crate::modules::video::service::JobManager;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Starts `count` workers sharing one queue.
///
/// Each worker runs one encoder at a time, so `count` bounds the number of
/// concurrent transcodes.
pub fn spawn_workers(jobs: JobManager, consumer: TranscodeConsumer, count: usize) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|worker_id| tokio::spawn(start_transcoder_worker(worker_id, jobs.clone(), consumer.clone())))
        .collect()
}

pub async fn start_transcoder_worker(worker_id: usize, jobs: JobManager, consumer: TranscodeConsumer) {
    info!("🎥 Transcoder worker {} listening", worker_id);
    let shutdown = jobs.shutdown_token();

    loop {
        let unit = tokio::select! {
            _ = shutdown.cancelled() => break,
            unit = consumer.next() => match unit {
                Some(unit) => unit,
                None => break,
            },
        };

        info!("📦 Worker {} received {}", worker_id, unit.video_id);
        process_job(&jobs, &unit).await;
    }

    info!("🎥 Transcoder worker {} stopped", worker_id);
}

/// Runs one dispatch unit to a terminal state.
///
/// Returns `None` when the unit was stale (cancelled while queued).
pub async fn process_job(jobs: &JobManager, unit: &TranscodeJob) -> Option<Job> {
    // 1. Claim the job
    let (asset, cancel) = jobs.start(unit.video_id).await?;

    // 2. Transcode to HLS
    let request = jobs.request_for(&asset);
    info!("⚙️ Transcoding {} -> {}", asset.source_path.display(), request.manifest_path.display());
    let result = jobs.executor().run(&request, cancel).await;
    debug!(video_id = %asset.id, ?result, "Executor returned");

    // 3. Record the outcome and drop the source
    jobs.finish(&asset, result).await
}
