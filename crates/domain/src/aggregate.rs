//! Core aggregate and domain event traits.

use common::AggregateId;
use event_store::{EventEnvelope, Version};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::ReplayError;

/// Trait for domain events.
///
/// Each variant is stored as an envelope whose `event_type` is the variant's
/// tag and whose `data` is the variant's payload alone, so the read side can
/// route on the tag without knowing the enum.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name.
    fn event_type(&self) -> &'static str;

    /// Every tag this event type can produce.
    fn event_types() -> &'static [&'static str];

    /// Serializes the payload of this event (without the tag).
    fn to_data(&self) -> Result<serde_json::Value, serde_json::Error>;

    /// Decodes a payload for `event_type`.
    ///
    /// Returns `Ok(None)` when the tag does not belong to this event type.
    fn decode(event_type: &str, data: serde_json::Value)
    -> Result<Option<Self>, serde_json::Error>;
}

/// Trait for aggregates in an event-sourced system.
///
/// State is only ever changed through `apply`, either while replaying
/// committed events or when a mutator raises a new one. Mutators validate
/// first and call `raise_event` only when the business rule holds.
pub trait Aggregate: Default + Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Business-rule violations returned by mutators.
    type Error: std::error::Error + Send + Sync + 'static;

    fn aggregate_type() -> &'static str;

    /// Returns None for a new, uninitialized aggregate.
    fn id(&self) -> Option<AggregateId>;

    /// Version of the last event applied (committed or raised).
    fn version(&self) -> Version;

    fn set_version(&mut self, version: Version);

    /// Applies an event to the aggregate.
    ///
    /// Must be pure and infallible: events are facts that already happened.
    fn apply(&mut self, event: &Self::Event);

    /// Events raised since the aggregate was loaded, oldest first.
    fn uncommitted_events(&self) -> &[Self::Event];

    fn uncommitted_events_mut(&mut self) -> &mut Vec<Self::Event>;

    /// Applies a new event and records it as uncommitted.
    fn raise_event(&mut self, event: Self::Event) {
        self.apply(&event);
        self.set_version(self.version().next());
        self.uncommitted_events_mut().push(event);
    }

    /// Drains the uncommitted list, e.g. once the events are persisted.
    fn take_uncommitted_events(&mut self) -> Vec<Self::Event> {
        std::mem::take(self.uncommitted_events_mut())
    }

    /// Applies committed events in order, advancing the version to each.
    fn replay(&mut self, envelopes: &[EventEnvelope]) -> Result<(), ReplayError> {
        for envelope in envelopes {
            let expected = self.version().next();
            if envelope.version != expected {
                return Err(ReplayError::VersionGap {
                    expected,
                    found: envelope.version,
                });
            }

            let event = Self::Event::decode(&envelope.event_type, envelope.data.clone())
                .map_err(|source| ReplayError::Decode {
                    event_type: envelope.event_type.clone(),
                    version: envelope.version,
                    source,
                })?
                .ok_or_else(|| ReplayError::UnknownEventType {
                    event_type: envelope.event_type.clone(),
                    version: envelope.version,
                })?;

            self.apply(&event);
            self.set_version(envelope.version);
        }
        Ok(())
    }

    /// Builds a fresh aggregate from its full history.
    fn from_history(envelopes: &[EventEnvelope]) -> Result<Self, ReplayError> {
        let mut aggregate = Self::default();
        aggregate.replay(envelopes)?;
        Ok(aggregate)
    }
}
