//! Pipeline events: progress notifications for embedders.
//!
//! The orchestrator publishes an event when a run starts, when each stage
//! starts and finishes, and when the run completes or fails. Subscribers can
//! render progress without parsing logs.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::Stage;

/// Everything the orchestrator reports about a run.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    RunStarted {
        run_id: String,
        prompt: String,
        timestamp: DateTime<Utc>,
    },

    StageStarted {
        run_id: String,
        stage: Stage,
        timestamp: DateTime<Utc>,
    },

    /// `items` is the stage's output size (candidates, sources, fragments…)
    StageCompleted {
        run_id: String,
        stage: Stage,
        items: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    RunCompleted {
        run_id: String,
        fragments_placed: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    RunFailed {
        run_id: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for pipeline events.
pub struct EventBus {
    sender: broadcast::Sender<Arc<PipelineEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: PipelineEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<PipelineEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(PipelineEvent::StageCompleted {
            run_id: "r1".into(),
            stage: Stage::Analysis,
            items: 4,
            duration_ms: 12,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            PipelineEvent::StageCompleted { stage, items, .. } => {
                assert_eq!(*stage, Stage::Analysis);
                assert_eq!(*items, 4);
            }
            _ => panic!("Expected StageCompleted event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(PipelineEvent::RunFailed {
            run_id: "r1".into(),
            error_message: "no subscribers".into(),
            timestamp: Utc::now(),
        });
    }
}
