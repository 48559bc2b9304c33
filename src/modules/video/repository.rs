use super::events::JobEvent;
use super::model::{Job, JobState};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const EVENT_CAPACITY: usize = 256;

struct JobEntry {
    job: Job,
    /// Released once the job is terminal so it leaves the shutdown tree.
    cancel: Option<CancellationToken>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum TransitionError {
    Unknown,
    /// The job was not in the expected state; carries the state it was in.
    Rejected(JobState),
}

/// The job table.
///
/// Every state change happens under the write lock and is published on the
/// event channel before the lock is released, so subscribers observe each
/// job's transitions in order.
#[derive(Clone)]
pub struct JobRepository {
    jobs: Arc<RwLock<HashMap<Uuid, JobEntry>>>,
    events: broadcast::Sender<JobEvent>,
}

impl Default for JobRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRepository {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub async fn insert(&self, job: Job, cancel: CancellationToken) {
        let mut jobs = self.jobs.write().await;
        self.publish(&job);
        jobs.insert(
            job.id(),
            JobEntry {
                job,
                cancel: Some(cancel),
            },
        );
    }

    pub async fn remove(&self, id: Uuid) -> Option<Job> {
        self.jobs.write().await.remove(&id).map(|entry| entry.job)
    }

    pub async fn get(&self, id: Uuid) -> Option<Job> {
        self.jobs.read().await.get(&id).map(|entry| entry.job.clone())
    }

    /// All jobs, oldest first.
    pub async fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .await
            .values()
            .map(|entry| entry.job.clone())
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    pub async fn cancel_token(&self, id: Uuid) -> Option<CancellationToken> {
        self.jobs.read().await.get(&id).and_then(|entry| entry.cancel.clone())
    }

    /// Moves a job from `from` to `to` and applies `update` to it, atomically.
    pub async fn transition<F>(
        &self,
        id: Uuid,
        from: JobState,
        to: JobState,
        update: F,
    ) -> Result<Job, TransitionError>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.jobs.write().await;
        let entry = jobs.get_mut(&id).ok_or(TransitionError::Unknown)?;

        let current = entry.job.state;
        if current != from || !current.can_transition_to(to) {
            return Err(TransitionError::Rejected(current));
        }

        entry.job.state = to;
        update(&mut entry.job);
        if to.is_terminal() {
            entry.cancel = None;
        }
        self.publish(&entry.job);
        Ok(entry.job.clone())
    }

    fn publish(&self, job: &Job) {
        // No subscribers is the normal case.
        let _ = self.events.send(JobEvent {
            video_id: job.id(),
            state: job.state,
            failure: job.failure,
            hls_url: job.hls_url.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::video::model::{Asset, FailureKind};
    use std::path::PathBuf;

    fn job() -> Job {
        let id = Uuid::new_v4();
        Job::queued(Asset {
            id,
            original_filename: "clip.mp4".to_string(),
            source_path: PathBuf::from(format!("uploads/{}_clip.mp4", id)),
            output_dir: PathBuf::from(format!("hls_outputs/{}", id)),
        })
    }

    #[tokio::test]
    async fn transition_is_compare_and_set() {
        let repo = JobRepository::new();
        let job = job();
        let id = job.id();
        repo.insert(job, CancellationToken::new()).await;

        let running = repo
            .transition(id, JobState::Queued, JobState::Running, |_| {})
            .await
            .unwrap();
        assert_eq!(running.state, JobState::Running);

        assert_eq!(
            repo.transition(id, JobState::Queued, JobState::Failed, |_| {}).await.unwrap_err(),
            TransitionError::Rejected(JobState::Running)
        );

        repo.transition(id, JobState::Running, JobState::Failed, |job| {
            job.failure = Some(FailureKind::ExitCode);
        })
        .await
        .unwrap();

        let err = repo
            .transition(id, JobState::Failed, JobState::Running, |_| {})
            .await
            .unwrap_err();
        assert_eq!(err, TransitionError::Rejected(JobState::Failed));
        assert_eq!(repo.get(id).await.unwrap().failure, Some(FailureKind::ExitCode));
    }

    #[tokio::test]
    async fn terminal_jobs_release_their_cancel_token() {
        let repo = JobRepository::new();
        let root = CancellationToken::new();
        let job = job();
        let id = job.id();
        repo.insert(job, root.child_token()).await;

        repo.transition(id, JobState::Queued, JobState::Running, |_| {}).await.unwrap();
        let running = repo.cancel_token(id).await.unwrap();

        repo.transition(id, JobState::Running, JobState::Succeeded, |_| {}).await.unwrap();
        assert!(repo.cancel_token(id).await.is_none());

        // Outstanding clones keep working until dropped.
        root.cancel();
        assert!(running.is_cancelled());
    }

    #[tokio::test]
    async fn unknown_jobs_are_reported() {
        let repo = JobRepository::new();
        let err = repo
            .transition(Uuid::new_v4(), JobState::Queued, JobState::Running, |_| {})
            .await
            .unwrap_err();
        assert_eq!(err, TransitionError::Unknown);
    }

    #[tokio::test]
    async fn events_follow_transitions_in_order() {
        let repo = JobRepository::new();
        let mut rx = repo.subscribe();
        let job = job();
        let id = job.id();
        repo.insert(job, CancellationToken::new()).await;
        repo.transition(id, JobState::Queued, JobState::Running, |_| {}).await.unwrap();
        repo.transition(id, JobState::Running, JobState::Succeeded, |job| {
            job.hls_url = Some("/video_stream/x/stream.m3u8".to_string());
        })
        .await
        .unwrap();

        let states: Vec<JobState> = vec![
            rx.recv().await.unwrap().state,
            rx.recv().await.unwrap().state,
            rx.recv().await.unwrap().state,
        ];
        assert_eq!(states, vec![JobState::Queued, JobState::Running, JobState::Succeeded]);
    }

    #[tokio::test]
    async fn list_is_oldest_first() {
        let repo = JobRepository::new();
        let mut first = job();
        let mut second = job();
        first.created_at -= time::Duration::seconds(5);
        second.created_at += time::Duration::seconds(5);
        let (first_id, second_id) = (first.id(), second.id());
        repo.insert(second, CancellationToken::new()).await;
        repo.insert(first, CancellationToken::new()).await;

        let ids: Vec<Uuid> = repo.list().await.iter().map(Job::id).collect();
        assert_eq!(ids, vec![first_id, second_id]);
    }
}
