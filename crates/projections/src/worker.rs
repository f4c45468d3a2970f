//! Background projection worker fed through a channel.

use std::sync::Arc;

use async_trait::async_trait;
use domain::EventPublisher;
use event_store::{EventEnvelope, EventStore};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::processor::ProjectionProcessor;
use crate::store::ProjectionStore;

/// Publisher that hands committed events to a [`ProjectionWorker`].
///
/// Sending never blocks the writer. If the worker has stopped, the events
/// are dropped and left for the next catch-up.
#[derive(Clone)]
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<Vec<EventEnvelope>>,
}

#[async_trait]
impl EventPublisher for ChannelPublisher {
    async fn publish(&self, events: &[EventEnvelope]) {
        if self.tx.send(events.to_vec()).is_err() {
            tracing::warn!(count = events.len(), "projection worker stopped, events not delivered");
            metrics::counter!("projection_events_dropped_total").increment(events.len() as u64);
        }
    }
}

/// Runs a [`ProjectionProcessor`] on its own task, retrying transient
/// failures away from the writer.
pub struct ProjectionWorker;

impl ProjectionWorker {
    /// Spawns the worker and returns the publisher that feeds it.
    ///
    /// The worker stops once every clone of the publisher is dropped and the
    /// queued batches are processed.
    pub fn spawn<S, P>(
        processor: Arc<ProjectionProcessor<S, P>>,
    ) -> (ChannelPublisher, JoinHandle<()>)
    where
        S: EventStore + 'static,
        P: ProjectionStore + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<EventEnvelope>>();

        let handle = tokio::spawn(async move {
            while let Some(batch) = rx.recv().await {
                processor.process_batch(&batch).await;
            }
            tracing::info!("projection worker stopped");
        });

        (ChannelPublisher { tx }, handle)
    }
}
