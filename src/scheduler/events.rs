use tokio::sync::broadcast;

use crate::scheduler::job::Job;

/// Lifecycle notifications published by the download manager.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    JobStarted(Job),
    JobCompleted(Job),
    JobFailed { job: Job, error: String },
    QueueUpdated,
    AllComplete,
}

impl QueueEvent {
    pub fn name(&self) -> &'static str {
        match self {
            QueueEvent::JobStarted(_) => "job-started",
            QueueEvent::JobCompleted(_) => "job-completed",
            QueueEvent::JobFailed { .. } => "job-failed",
            QueueEvent::QueueUpdated => "queue-updated",
            QueueEvent::AllComplete => "all-complete",
        }
    }

    /// Job the event refers to, if any.
    pub fn job(&self) -> Option<&Job> {
        match self {
            QueueEvent::JobStarted(job)
            | QueueEvent::JobCompleted(job)
            | QueueEvent::JobFailed { job, .. } => Some(job),
            QueueEvent::QueueUpdated | QueueEvent::AllComplete => None,
        }
    }
}

/// Fan-out of [`QueueEvent`]s to any number of subscribers.
///
/// Publishing never blocks; slow subscribers observe `Lagged` and skip
/// ahead rather than holding back the scheduler.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<QueueEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: QueueEvent) {
        tracing::trace!(event = event.name(), "Publishing queue event");
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::job::ChapterRef;

    #[tokio::test]
    async fn subscribers_receive_in_publish_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let job = Job::new(
            "s",
            0,
            ChapterRef {
                url: "u".into(),
                title: "t".into(),
            },
        );

        bus.publish(QueueEvent::JobStarted(job.clone()));
        bus.publish(QueueEvent::JobCompleted(job));
        bus.publish(QueueEvent::AllComplete);

        assert_eq!(rx.recv().await.unwrap().name(), "job-started");
        let completed = rx.recv().await.unwrap();
        assert_eq!(completed.job().unwrap().id, "s:0");
        assert_eq!(rx.recv().await.unwrap().name(), "all-complete");
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new(0);
        bus.publish(QueueEvent::QueueUpdated);
    }
}
