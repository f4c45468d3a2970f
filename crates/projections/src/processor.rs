//! Projection processor: feeds committed events to the dispatcher in
//! per-aggregate version order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use domain::EventPublisher;
use event_store::{EventEnvelope, EventStore, Version};
use futures_util::StreamExt;
use tokio::sync::Mutex;

use crate::config::ProjectionConfig;
use crate::dispatcher::{DispatchOutcome, EventDispatcher};
use crate::store::ProjectionStore;
use crate::{ProjectionError, Result};

/// Last applied version of one stream. Held across the store I/O for that
/// stream only.
type Checkpoint = Arc<Mutex<Version>>;

/// Applies events to the read model exactly once per aggregate version.
///
/// The processor supports:
/// - Live delivery: [`process_event`](Self::process_event) and
///   [`process_batch`](Self::process_batch), with retries
/// - Inline delivery as an [`EventPublisher`]: one attempt per event, so the
///   writer never waits on retry backoff
/// - Catch-up: replays every stored event, skipping what was already applied
/// - Rebuild: clears the read model and replays from scratch
///
/// A checkpoint per aggregate records the last applied version. Redelivered
/// events are skipped and gaps are filled from the event store, so the read
/// model always sees each stream in order. Streams are locked independently;
/// a slow or failing stream does not hold up the others.
pub struct ProjectionProcessor<S: EventStore, P: ProjectionStore> {
    events: S,
    dispatcher: EventDispatcher<P>,
    config: ProjectionConfig,
    checkpoints: Mutex<HashMap<AggregateId, Checkpoint>>,
}

impl<S: EventStore, P: ProjectionStore> ProjectionProcessor<S, P> {
    pub fn new(events: S, dispatcher: EventDispatcher<P>) -> Self {
        Self {
            events,
            dispatcher,
            config: ProjectionConfig::default(),
            checkpoints: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_config(mut self, config: ProjectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Last version applied for `aggregate_id`, if any.
    pub async fn checkpoint(&self, aggregate_id: AggregateId) -> Option<Version> {
        let checkpoint = self.checkpoints.lock().await.get(&aggregate_id).cloned()?;
        let version = *checkpoint.lock().await;
        (version > Version::initial()).then_some(version)
    }

    /// Applies `event`, and any earlier events of its stream not yet applied.
    ///
    /// Transient failures are retried per [`ProjectionConfig`]. Returns how
    /// many events were applied. On failure the checkpoint stays at the last
    /// applied version, so the next delivery retries the event.
    pub async fn process_event(&self, event: &EventEnvelope) -> Result<usize> {
        self.process(event, self.config.max_attempts).await
    }

    /// Processes a committed batch, logging failures instead of returning them.
    pub async fn process_batch(&self, events: &[EventEnvelope]) {
        self.process_logged(events, self.config.max_attempts).await;
    }

    /// Processes every stored event in commit order.
    ///
    /// Returns the number of events applied by this run; a second run over an
    /// unchanged store returns 0.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<usize> {
        let mut stream = self.events.stream_all().await?;
        let mut applied = 0;

        while let Some(event) = stream.next().await {
            applied += self.process_event(&event?).await?;
        }

        tracing::info!(events_applied = applied, "catch-up complete");
        Ok(applied)
    }

    /// Clears the read model and all checkpoints, then catches up.
    ///
    /// Meant to run while no live delivery is in flight.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild(&self) -> Result<usize> {
        {
            let mut checkpoints = self.checkpoints.lock().await;
            self.dispatcher.store().clear().await?;
            checkpoints.clear();
        }
        self.run_catch_up().await
    }

    async fn stream_checkpoint(&self, aggregate_id: AggregateId) -> Checkpoint {
        self.checkpoints
            .lock()
            .await
            .entry(aggregate_id)
            .or_insert_with(|| Arc::new(Mutex::new(Version::initial())))
            .clone()
    }

    #[tracing::instrument(
        skip(self, event),
        fields(event_type = %event.event_type, aggregate_id = %event.aggregate_id, version = %event.version)
    )]
    async fn process(&self, event: &EventEnvelope, attempts: u32) -> Result<usize> {
        let checkpoint = self.stream_checkpoint(event.aggregate_id).await;
        let mut applied_to = checkpoint.lock().await;

        if event.version <= *applied_to {
            tracing::debug!(checkpoint = %*applied_to, "event already applied, skipping");
            metrics::counter!("projection_events_skipped_total").increment(1);
            return Ok(0);
        }

        let pending = if event.version == applied_to.next() {
            vec![event.clone()]
        } else {
            self.fill_gap(event, *applied_to, attempts).await?
        };

        let mut applied = 0;
        for pending_event in &pending {
            self.apply(pending_event, attempts).await?;
            *applied_to = pending_event.version;
            applied += 1;
        }
        Ok(applied)
    }

    async fn process_logged(&self, events: &[EventEnvelope], attempts: u32) {
        for event in events {
            if let Err(err) = self.process(event, attempts).await {
                tracing::error!(
                    error = %err,
                    event_type = %event.event_type,
                    aggregate_id = %event.aggregate_id,
                    version = %event.version,
                    "failed to project event"
                );
            }
        }
    }

    async fn fill_gap(
        &self,
        event: &EventEnvelope,
        applied_to: Version,
        attempts: u32,
    ) -> Result<Vec<EventEnvelope>> {
        let from = applied_to.next();
        tracing::info!(%from, to = %event.version, "missing events, loading from store");

        let events = &self.events;
        let aggregate_id = event.aggregate_id;
        let loaded = self
            .with_retry(attempts, move || async move {
                events
                    .load_from(aggregate_id, from)
                    .await
                    .map_err(ProjectionError::from)
            })
            .await?;

        let mut pending: Vec<EventEnvelope> = loaded
            .into_iter()
            .take_while(|e| e.version < event.version)
            .collect();
        pending.push(event.clone());
        Ok(pending)
    }

    async fn apply(&self, event: &EventEnvelope, attempts: u32) -> Result<DispatchOutcome> {
        let dispatcher = &self.dispatcher;
        match self.with_retry(attempts, move || dispatcher.dispatch(event)).await {
            Ok(outcome) => {
                metrics::counter!(
                    "projection_events_processed_total",
                    "event_type" => event.event_type.clone()
                )
                .increment(1);
                Ok(outcome)
            }
            Err(source) => {
                metrics::counter!(
                    "projection_failures_total",
                    "event_type" => event.event_type.clone()
                )
                .increment(1);
                Err(ProjectionError::Apply {
                    event_type: event.event_type.clone(),
                    aggregate_id: event.aggregate_id,
                    version: event.version,
                    source: Box::new(source),
                })
            }
        }
    }

    async fn with_retry<T, F, Fut>(&self, attempts: u32, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(err) if err.is_transient() && attempt < attempts => {
                    tracing::warn!(attempt, error = %err, "transient projection failure, retrying");
                    metrics::counter!("projection_retries_total").increment(1);
                    tokio::time::sleep(self.config.backoff_for(attempt)).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

/// Inline delivery from the command handler.
///
/// Each event gets a single attempt; anything that fails is picked up by the
/// next delivery for that stream or by catch-up.
#[async_trait]
impl<S: EventStore, P: ProjectionStore> EventPublisher for ProjectionProcessor<S, P> {
    async fn publish(&self, events: &[EventEnvelope]) {
        self.process_logged(events, 1).await;
    }
}
