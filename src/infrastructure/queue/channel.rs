use crate::modules::video::events::TranscodeJob;
use async_channel::{Receiver, Sender, TrySendError};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("transcode queue is full")]
    Full,
    #[error("transcode queue is closed")]
    Closed,
}

/// Producer side of the bounded transcode queue.
#[derive(Clone)]
pub struct TranscodeQueue {
    tx: Sender<TranscodeJob>,
}

/// Consumer side, shared by every worker.
#[derive(Clone)]
pub struct TranscodeConsumer {
    rx: Receiver<TranscodeJob>,
}

pub fn bounded(capacity: usize) -> (TranscodeQueue, TranscodeConsumer) {
    let (tx, rx) = async_channel::bounded(capacity);
    info!("Transcode queue ready (capacity {})", capacity);
    (TranscodeQueue { tx }, TranscodeConsumer { rx })
}

impl TranscodeQueue {
    /// Enqueues without waiting; a full queue is reported to the caller.
    pub fn publish(&self, job: TranscodeJob) -> Result<(), QueueError> {
        let video_id = job.video_id;
        match self.tx.try_send(job) {
            Ok(()) => {
                debug!("Queued transcode for {} ({} pending)", video_id, self.len());
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(QueueError::Full),
            Err(TrySendError::Closed(_)) => Err(QueueError::Closed),
        }
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    /// Closes the queue for producers and consumers alike.
    pub fn close(&self) -> bool {
        self.tx.close()
    }
}

impl TranscodeConsumer {
    /// Waits for the next unit; `None` once the queue is closed and drained.
    pub async fn next(&self) -> Option<TranscodeJob> {
        self.rx.recv().await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn full_queue_rejects_without_blocking() {
        let (queue, consumer) = bounded(1);
        let first = Uuid::new_v4();
        queue.publish(TranscodeJob { video_id: first }).unwrap();
        assert_eq!(
            queue.publish(TranscodeJob { video_id: Uuid::new_v4() }),
            Err(QueueError::Full)
        );

        assert_eq!(consumer.next().await.unwrap().video_id, first);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn closing_drains_then_ends_consumers() {
        let (queue, consumer) = bounded(4);
        let id = Uuid::new_v4();
        queue.publish(TranscodeJob { video_id: id }).unwrap();
        assert!(queue.close());

        assert_eq!(
            queue.publish(TranscodeJob { video_id: Uuid::new_v4() }),
            Err(QueueError::Closed)
        );
        assert_eq!(consumer.next().await.unwrap().video_id, id);
        assert!(consumer.next().await.is_none());
    }

    #[tokio::test]
    async fn each_unit_reaches_exactly_one_consumer() {
        let (queue, consumer) = bounded(8);
        let other = consumer.clone();
        for _ in 0..4 {
            queue.publish(TranscodeJob { video_id: Uuid::new_v4() }).unwrap();
        }
        queue.close();

        let mut seen = 0;
        while consumer.next().await.is_some() {
            seen += 1;
        }
        assert_eq!(seen, 4);
        assert!(other.next().await.is_none());
    }
}
