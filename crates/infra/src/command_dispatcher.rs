//! Command execution pipeline (application-level orchestration).
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store (organization-scoped)
//!   ↓
//! 2. Rehydrate aggregate (apply historical events to rebuild state)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Persist events to store (append-only, optimistic concurrency check)
//!   ↓
//! 5. Publish events to bus
//! ```
//!
//! Invoices and phase checklists both go through this pipeline. The module
//! contains no IO itself; it composes the `EventStore` and `EventBus` traits.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use stagebill_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, OrganizationId};
use stagebill_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The aggregate rejected the command (deterministic).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Optimistic concurrency failure (another command committed first).
    #[error("concurrent modification: {0}")]
    Concurrency(String),

    /// Organization isolation violation (cross-organization or cross-aggregate stream mixing).
    #[error("organization isolation violation: {0}")]
    TenantIsolation(String),

    /// Failed to deserialize historical event payloads into the aggregate event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    #[error("event store failure: {0}")]
    Store(EventStoreError),

    /// Publication failed after a successful append (at-least-once; retry may duplicate).
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl DispatchError {
    /// The domain error behind this failure, if the aggregate produced it.
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            DispatchError::Domain(e) => Some(e),
            _ => None,
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// - Events are persisted before publication; if append fails nothing is published.
/// - Each command operates on exactly one aggregate stream, appended with
///   `ExpectedVersion::Exact(loaded_version)`. Two interleaved commands on the
///   same invoice cannot both commit: the loser gets `DispatchError::Concurrency`.
/// - If publication fails after a successful append the error is returned; the
///   events are already stored.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a command through the full event-sourcing pipeline.
    ///
    /// `make_aggregate` builds the empty aggregate history is applied to (e.g.
    /// `Invoice::empty`). Returns the committed events, which is empty when the
    /// aggregate decided there was nothing to do.
    pub fn dispatch<A>(
        &self,
        organization_id: OrganizationId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: stagebill_events::Event + Serialize + DeserializeOwned,
    {
        self.run(organization_id, aggregate_id, aggregate_type, None, command, make_aggregate)
    }

    /// Like [`dispatch`](Self::dispatch), but only against the stream at
    /// `version`. A stream that has moved on fails with
    /// `DispatchError::Concurrency` before the command is handled.
    pub fn dispatch_at<A>(
        &self,
        organization_id: OrganizationId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        version: u64,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: stagebill_events::Event + Serialize + DeserializeOwned,
    {
        self.run(
            organization_id,
            aggregate_id,
            aggregate_type,
            Some(version),
            command,
            make_aggregate,
        )
    }

    fn run<A>(
        &self,
        organization_id: OrganizationId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        pinned: Option<u64>,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: stagebill_events::Event + Serialize + DeserializeOwned,
    {
        // 1) Load history (organization-scoped)
        let history = self.store.load_stream(organization_id, aggregate_id)?;
        validate_loaded_stream(organization_id, aggregate_id, aggregate_type, &history)?;
        let current = stream_version(&history);
        if let Some(pinned) = pinned.filter(|&v| v != current) {
            return Err(DispatchError::Concurrency(format!(
                "expected version {pinned}, stream is at {current}"
            )));
        }
        let expected = ExpectedVersion::Exact(current);

        // 2) Rehydrate
        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        // 3) Decide (no mutation)
        let decided = aggregate.handle(&command)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 4) Persist
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    organization_id,
                    aggregate_id,
                    aggregate_type.to_string(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        // 5) Publish (after append)
        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }

    /// Rehydrate an aggregate without handling a command.
    ///
    /// A stream stored under another aggregate type is reported as not found.
    pub fn load<A>(
        &self,
        organization_id: OrganizationId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(organization_id, aggregate_id)?;
        validate_loaded_stream(organization_id, aggregate_id, aggregate_type, &history)?;

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;
        Ok(aggregate)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    organization_id: OrganizationId,
    aggregate_id: AggregateId,
    aggregate_type: &str,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.organization_id != organization_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong organization_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.aggregate_type != aggregate_type {
            return Err(DispatchError::Domain(DomainError::not_found(format!(
                "{aggregate_type} {aggregate_id}"
            ))));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

pub(crate) fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::InMemoryEventStore;
    use chrono::{TimeZone, Utc};
    use stagebill_core::{AggregateRoot, UserId};
    use stagebill_events::InMemoryEventBus;
    use stagebill_projects::{
        ChecklistCommand, EnsureDefaultDeliverables, PhaseChecklist, PhaseId,
    };
    use std::sync::Arc;

    const CHECKLIST: &str = "projects.phase_checklist";

    fn ensure_defaults(org: OrganizationId, phase: PhaseId) -> ChecklistCommand {
        ChecklistCommand::EnsureDefaultDeliverables(EnsureDefaultDeliverables {
            organization_id: org,
            phase_id: phase,
            names: vec!["Scope".to_string(), "Sign-off".to_string()],
            occurred_at: Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap(),
        })
    }

    fn dispatcher() -> CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>> {
        CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()))
    }

    #[test]
    fn dispatch_persists_then_publishes() {
        let d = dispatcher();
        let sub = d.bus().subscribe();
        let (org, phase) = (OrganizationId::new(), PhaseId::new(AggregateId::new()));

        let committed = d
            .dispatch(org, phase.0, CHECKLIST, ensure_defaults(org, phase), |id| {
                PhaseChecklist::empty(PhaseId::new(id))
            })
            .unwrap();

        assert_eq!(committed.len(), 1);
        assert_eq!(d.store().load_stream(org, phase.0).unwrap().len(), 1);
        let envelope = sub.try_recv().unwrap();
        assert_eq!(envelope.sequence_number(), 1);
        assert_eq!(envelope.organization_id(), org);
    }

    #[test]
    fn no_op_commands_commit_nothing() {
        let d = dispatcher();
        let (org, phase) = (OrganizationId::new(), PhaseId::new(AggregateId::new()));
        let make = |id| PhaseChecklist::empty(PhaseId::new(id));

        d.dispatch(org, phase.0, CHECKLIST, ensure_defaults(org, phase), make).unwrap();
        let again = d
            .dispatch(org, phase.0, CHECKLIST, ensure_defaults(org, phase), make)
            .unwrap();

        assert!(again.is_empty());
        let loaded = d.load(org, phase.0, CHECKLIST, make).unwrap();
        assert_eq!(loaded.version(), 1);
        assert_eq!(loaded.deliverables().len(), 2);
    }

    #[test]
    fn domain_errors_pass_through_untouched() {
        let d = dispatcher();
        let (org, phase) = (OrganizationId::new(), PhaseId::new(AggregateId::new()));
        let cmd = ChecklistCommand::ToggleDeliverable(stagebill_projects::ToggleDeliverable {
            organization_id: org,
            phase_id: phase,
            deliverable_id: stagebill_projects::DeliverableId::for_position(phase, 0),
            actor_id: UserId::new(),
            occurred_at: Utc::now(),
        });

        let err = d
            .dispatch(org, phase.0, CHECKLIST, cmd, |id| PhaseChecklist::empty(PhaseId::new(id)))
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::NotFound(_))));
    }

    #[test]
    fn foreign_events_in_a_stream_are_rejected() {
        let history = vec![StoredEvent {
            event_id: Uuid::now_v7(),
            organization_id: OrganizationId::new(),
            aggregate_id: AggregateId::new(),
            aggregate_type: CHECKLIST.to_string(),
            sequence_number: 1,
            event_type: "x".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: serde_json::json!({}),
        }];

        let err = validate_loaded_stream(
            OrganizationId::new(),
            history[0].aggregate_id,
            CHECKLIST,
            &history,
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::TenantIsolation(_)));
    }

    #[test]
    fn streams_of_another_type_are_not_found() {
        let d = dispatcher();
        let (org, phase) = (OrganizationId::new(), PhaseId::new(AggregateId::new()));
        let make = |id| PhaseChecklist::empty(PhaseId::new(id));
        d.dispatch(org, phase.0, CHECKLIST, ensure_defaults(org, phase), make).unwrap();

        let err = d.load(org, phase.0, "invoicing.invoice", make).unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::NotFound(_))));

        let err = d
            .dispatch(org, phase.0, "invoicing.invoice", ensure_defaults(org, phase), make)
            .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::NotFound(_))));
        assert_eq!(d.store().load_stream(org, phase.0).unwrap().len(), 1);
    }

    #[test]
    fn pinned_dispatch_rejects_a_stream_that_moved_on() {
        let d = dispatcher();
        let sub = d.bus().subscribe();
        let (org, phase) = (OrganizationId::new(), PhaseId::new(AggregateId::new()));
        let make = |id| PhaseChecklist::empty(PhaseId::new(id));
        let cmd = ensure_defaults(org, phase);

        let err = d.dispatch_at(org, phase.0, CHECKLIST, 3, cmd.clone(), make).unwrap_err();
        assert!(matches!(err, DispatchError::Concurrency(_)));
        assert!(sub.try_recv().is_err());

        let committed = d.dispatch_at(org, phase.0, CHECKLIST, 0, cmd, make).unwrap();
        assert_eq!(committed.len(), 1);
    }
}
