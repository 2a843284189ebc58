use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stagebill_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, Entity, OrganizationId, UserId,
};
use stagebill_events::Event;

use crate::summary::PhaseCompletionSummary;

/// Project identifier. Projects themselves are managed outside this crate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub AggregateId);

impl ProjectId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Phase identifier; also the id of the phase's checklist stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhaseId(pub AggregateId);

impl PhaseId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PhaseId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Deliverable identifier, derived from the owning phase and the deliverable's
/// position so that replays always produce the same ids.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliverableId(Uuid);

impl DeliverableId {
    pub fn for_position(phase_id: PhaseId, position: u32) -> Self {
        Self(Uuid::new_v5(phase_id.0.as_uuid(), &position.to_be_bytes()))
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl core::fmt::Display for DeliverableId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for DeliverableId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::from_str(s)
            .map(Self)
            .map_err(|e| DomainError::invalid_id(format!("DeliverableId: {e}")))
    }
}

/// A checklist item ("substage") of a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deliverable {
    pub id: DeliverableId,
    pub phase_id: PhaseId,
    pub position: u32,
    pub name: String,
    pub is_completed: bool,
    pub completed_by: Option<UserId>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Entity for Deliverable {
    type Id = DeliverableId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Where a phase's checklist came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistSource {
    Default,
    Custom,
}

/// Aggregate root: the deliverable checklist of one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseChecklist {
    id: PhaseId,
    organization_id: Option<OrganizationId>,
    deliverables: Vec<Deliverable>,
    version: u64,
}

impl PhaseChecklist {
    /// Create an empty instance for rehydration.
    pub fn empty(id: PhaseId) -> Self {
        Self {
            id,
            organization_id: None,
            deliverables: Vec::new(),
            version: 0,
        }
    }

    pub fn id_typed(&self) -> PhaseId {
        self.id
    }

    pub fn organization_id(&self) -> Option<OrganizationId> {
        self.organization_id
    }

    pub fn deliverables(&self) -> &[Deliverable] {
        &self.deliverables
    }

    pub fn deliverable(&self, id: DeliverableId) -> Option<&Deliverable> {
        self.deliverables.iter().find(|d| d.id == id)
    }

    pub fn has_checklist(&self) -> bool {
        !self.deliverables.is_empty()
    }

    /// Completion summary over the current (fully rehydrated) state.
    pub fn summary(&self) -> PhaseCompletionSummary {
        PhaseCompletionSummary::from_deliverables(&self.deliverables)
    }
}

impl AggregateRoot for PhaseChecklist {
    type Id = PhaseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: create the standard checklist if the phase has none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnsureDefaultDeliverables {
    pub organization_id: OrganizationId,
    pub phase_id: PhaseId,
    /// The organization's standard checklist.
    pub names: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: adopt a named checklist on a phase that has none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdoptChecklist {
    pub organization_id: OrganizationId,
    pub phase_id: PhaseId,
    pub names: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: flip a deliverable's completion flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleDeliverable {
    pub organization_id: OrganizationId,
    pub phase_id: PhaseId,
    pub deliverable_id: DeliverableId,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChecklistCommand {
    EnsureDefaultDeliverables(EnsureDefaultDeliverables),
    AdoptChecklist(AdoptChecklist),
    ToggleDeliverable(ToggleDeliverable),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverableSeed {
    pub id: DeliverableId,
    pub position: u32,
    pub name: String,
}

/// Event: ChecklistAdopted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistAdopted {
    pub organization_id: OrganizationId,
    pub phase_id: PhaseId,
    pub source: ChecklistSource,
    pub deliverables: Vec<DeliverableSeed>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DeliverableCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverableCompleted {
    pub organization_id: OrganizationId,
    pub phase_id: PhaseId,
    pub deliverable_id: DeliverableId,
    pub completed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DeliverableReopened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverableReopened {
    pub organization_id: OrganizationId,
    pub phase_id: PhaseId,
    pub deliverable_id: DeliverableId,
    pub reopened_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChecklistEvent {
    ChecklistAdopted(ChecklistAdopted),
    DeliverableCompleted(DeliverableCompleted),
    DeliverableReopened(DeliverableReopened),
}

impl Event for ChecklistEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ChecklistEvent::ChecklistAdopted(_) => "projects.checklist.adopted",
            ChecklistEvent::DeliverableCompleted(_) => "projects.checklist.deliverable_completed",
            ChecklistEvent::DeliverableReopened(_) => "projects.checklist.deliverable_reopened",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ChecklistEvent::ChecklistAdopted(e) => e.occurred_at,
            ChecklistEvent::DeliverableCompleted(e) => e.occurred_at,
            ChecklistEvent::DeliverableReopened(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PhaseChecklist {
    type Command = ChecklistCommand;
    type Event = ChecklistEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ChecklistEvent::ChecklistAdopted(e) => {
                self.id = e.phase_id;
                self.organization_id = Some(e.organization_id);
                self.deliverables = e
                    .deliverables
                    .iter()
                    .map(|seed| Deliverable {
                        id: seed.id,
                        phase_id: e.phase_id,
                        position: seed.position,
                        name: seed.name.clone(),
                        is_completed: false,
                        completed_by: None,
                        completed_at: None,
                    })
                    .collect();
            }
            ChecklistEvent::DeliverableCompleted(e) => {
                if let Some(d) = self.deliverables.iter_mut().find(|d| d.id == e.deliverable_id) {
                    d.is_completed = true;
                    d.completed_by = Some(e.completed_by);
                    d.completed_at = Some(e.occurred_at);
                }
            }
            ChecklistEvent::DeliverableReopened(e) => {
                if let Some(d) = self.deliverables.iter_mut().find(|d| d.id == e.deliverable_id) {
                    d.is_completed = false;
                    d.completed_by = None;
                    d.completed_at = None;
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ChecklistCommand::EnsureDefaultDeliverables(cmd) => self.handle_ensure_defaults(cmd),
            ChecklistCommand::AdoptChecklist(cmd) => self.handle_adopt(cmd),
            ChecklistCommand::ToggleDeliverable(cmd) => self.handle_toggle(cmd),
        }
    }
}

impl PhaseChecklist {
    fn ensure_organization(&self, organization_id: OrganizationId) -> Result<(), DomainError> {
        match self.organization_id {
            Some(owner) if owner != organization_id => {
                Err(DomainError::not_found(format!("phase {}", self.id)))
            }
            _ => Ok(()),
        }
    }

    fn ensure_phase_id(&self, phase_id: PhaseId) -> Result<(), DomainError> {
        if self.id != phase_id {
            return Err(DomainError::conflict("phase_id does not match checklist stream"));
        }
        Ok(())
    }

    fn seeds(&self, names: &[String]) -> Result<Vec<DeliverableSeed>, DomainError> {
        if names.is_empty() {
            return Err(DomainError::validation("checklist must name at least one deliverable"));
        }

        let mut seen = HashSet::new();
        let mut seeds = Vec::with_capacity(names.len());
        for (idx, raw) in names.iter().enumerate() {
            let name = raw.trim();
            if name.is_empty() {
                return Err(DomainError::validation(format!(
                    "deliverable #{} has an empty name",
                    idx + 1
                )));
            }
            if !seen.insert(name.to_lowercase()) {
                return Err(DomainError::validation(format!(
                    "duplicate deliverable name '{name}'"
                )));
            }
            let position = idx as u32 + 1;
            seeds.push(DeliverableSeed {
                id: DeliverableId::for_position(self.id, position),
                position,
                name: name.to_string(),
            });
        }
        Ok(seeds)
    }

    fn handle_ensure_defaults(
        &self,
        cmd: &EnsureDefaultDeliverables,
    ) -> Result<Vec<ChecklistEvent>, DomainError> {
        self.ensure_organization(cmd.organization_id)?;
        self.ensure_phase_id(cmd.phase_id)?;

        if self.has_checklist() {
            return Ok(vec![]);
        }

        Ok(vec![ChecklistEvent::ChecklistAdopted(ChecklistAdopted {
            organization_id: cmd.organization_id,
            phase_id: cmd.phase_id,
            source: ChecklistSource::Default,
            deliverables: self.seeds(&cmd.names)?,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adopt(&self, cmd: &AdoptChecklist) -> Result<Vec<ChecklistEvent>, DomainError> {
        self.ensure_organization(cmd.organization_id)?;
        self.ensure_phase_id(cmd.phase_id)?;

        if self.has_checklist() {
            return Err(DomainError::invalid_state(
                "phase already has a deliverable checklist",
            ));
        }

        Ok(vec![ChecklistEvent::ChecklistAdopted(ChecklistAdopted {
            organization_id: cmd.organization_id,
            phase_id: cmd.phase_id,
            source: ChecklistSource::Custom,
            deliverables: self.seeds(&cmd.names)?,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_toggle(&self, cmd: &ToggleDeliverable) -> Result<Vec<ChecklistEvent>, DomainError> {
        self.ensure_organization(cmd.organization_id)?;
        self.ensure_phase_id(cmd.phase_id)?;

        let deliverable = self.deliverable(cmd.deliverable_id).ok_or_else(|| {
            DomainError::not_found(format!(
                "deliverable {} in phase {}",
                cmd.deliverable_id, cmd.phase_id
            ))
        })?;

        let event = if deliverable.is_completed {
            ChecklistEvent::DeliverableReopened(DeliverableReopened {
                organization_id: cmd.organization_id,
                phase_id: cmd.phase_id,
                deliverable_id: cmd.deliverable_id,
                reopened_by: cmd.actor_id,
                occurred_at: cmd.occurred_at,
            })
        } else {
            ChecklistEvent::DeliverableCompleted(DeliverableCompleted {
                organization_id: cmd.organization_id,
                phase_id: cmd.phase_id,
                deliverable_id: cmd.deliverable_id,
                completed_by: cmd.actor_id,
                occurred_at: cmd.occurred_at,
            })
        };

        Ok(vec![event])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::DEFAULT_DELIVERABLES;
    use crate::eligibility::can_invoice;
    use proptest::prelude::*;

    fn test_org() -> OrganizationId {
        OrganizationId::new()
    }

    fn test_phase_id() -> PhaseId {
        PhaseId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn default_names() -> Vec<String> {
        DEFAULT_DELIVERABLES.iter().map(|s| s.to_string()).collect()
    }

    fn run(checklist: &mut PhaseChecklist, cmd: ChecklistCommand) -> Vec<ChecklistEvent> {
        let events = checklist.handle(&cmd).unwrap();
        for e in &events {
            checklist.apply(e);
        }
        events
    }

    fn adopt(checklist: &mut PhaseChecklist, org: OrganizationId, names: &[&str]) {
        let phase_id = checklist.id_typed();
        run(
            checklist,
            ChecklistCommand::AdoptChecklist(AdoptChecklist {
                organization_id: org,
                phase_id,
                names: names.iter().map(|s| s.to_string()).collect(),
                occurred_at: test_time(),
            }),
        );
    }

    fn toggle(
        checklist: &mut PhaseChecklist,
        org: OrganizationId,
        deliverable_id: DeliverableId,
        actor: UserId,
    ) -> Vec<ChecklistEvent> {
        let phase_id = checklist.id_typed();
        run(
            checklist,
            ChecklistCommand::ToggleDeliverable(ToggleDeliverable {
                organization_id: org,
                phase_id,
                deliverable_id,
                actor_id: actor,
                occurred_at: test_time(),
            }),
        )
    }

    #[test]
    fn ensure_defaults_creates_standard_set_once() {
        let org = test_org();
        let phase_id = test_phase_id();
        let mut checklist = PhaseChecklist::empty(phase_id);

        let cmd = ChecklistCommand::EnsureDefaultDeliverables(EnsureDefaultDeliverables {
            organization_id: org,
            phase_id,
            names: default_names(),
            occurred_at: test_time(),
        });

        let first = run(&mut checklist, cmd.clone());
        assert_eq!(first.len(), 1);
        let after_first = checklist.deliverables().to_vec();
        assert_eq!(after_first.len(), DEFAULT_DELIVERABLES.len());

        let second = run(&mut checklist, cmd);
        assert!(second.is_empty());
        assert_eq!(checklist.deliverables(), after_first.as_slice());
        assert_eq!(checklist.version(), 1);
    }

    #[test]
    fn ensure_defaults_keeps_an_adopted_checklist() {
        let org = test_org();
        let phase_id = test_phase_id();
        let mut checklist = PhaseChecklist::empty(phase_id);
        adopt(&mut checklist, org, &["Survey", "Report"]);

        let events = checklist
            .handle(&ChecklistCommand::EnsureDefaultDeliverables(EnsureDefaultDeliverables {
                organization_id: org,
                phase_id,
                names: default_names(),
                occurred_at: test_time(),
            }))
            .unwrap();

        assert!(events.is_empty());
        assert_eq!(checklist.deliverables().len(), 2);
    }

    #[test]
    fn deliverable_ids_are_stable_across_replays() {
        let phase_id = test_phase_id();
        let a = DeliverableId::for_position(phase_id, 1);
        let b = DeliverableId::for_position(phase_id, 1);
        let c = DeliverableId::for_position(phase_id, 2);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn cannot_adopt_over_existing_checklist() {
        let org = test_org();
        let phase_id = test_phase_id();
        let mut checklist = PhaseChecklist::empty(phase_id);
        adopt(&mut checklist, org, &["Survey"]);

        let err = checklist
            .handle(&ChecklistCommand::AdoptChecklist(AdoptChecklist {
                organization_id: org,
                phase_id,
                names: vec!["Other".to_string()],
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState(_)));
    }

    #[test]
    fn adopt_rejects_blank_and_duplicate_names() {
        let org = test_org();
        let phase_id = test_phase_id();
        let checklist = PhaseChecklist::empty(phase_id);

        for names in [vec![], vec!["  ".to_string()], vec!["A".to_string(), "a".to_string()]] {
            let err = checklist
                .handle(&ChecklistCommand::AdoptChecklist(AdoptChecklist {
                    organization_id: org,
                    phase_id,
                    names,
                    occurred_at: test_time(),
                }))
                .unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }

    #[test]
    fn toggle_stamps_and_clears_completion() {
        let org = test_org();
        let actor = UserId::new();
        let mut checklist = PhaseChecklist::empty(test_phase_id());
        adopt(&mut checklist, org, &["Survey"]);
        let id = checklist.deliverables()[0].id;

        let events = toggle(&mut checklist, org, id, actor);
        assert!(matches!(events[0], ChecklistEvent::DeliverableCompleted(_)));
        let d = checklist.deliverable(id).unwrap();
        assert!(d.is_completed);
        assert_eq!(d.completed_by, Some(actor));
        assert!(d.completed_at.is_some());

        let events = toggle(&mut checklist, org, id, actor);
        assert!(matches!(events[0], ChecklistEvent::DeliverableReopened(_)));
        let d = checklist.deliverable(id).unwrap();
        assert!(!d.is_completed);
        assert_eq!(d.completed_by, None);
        assert_eq!(d.completed_at, None);
    }

    #[test]
    fn toggling_a_deliverable_of_another_phase_is_not_found() {
        let org = test_org();
        let mut checklist = PhaseChecklist::empty(test_phase_id());
        adopt(&mut checklist, org, &["Survey"]);

        let foreign = DeliverableId::for_position(test_phase_id(), 1);
        let err = checklist
            .handle(&ChecklistCommand::ToggleDeliverable(ToggleDeliverable {
                organization_id: org,
                phase_id: checklist.id_typed(),
                deliverable_id: foreign,
                actor_id: UserId::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn other_organizations_cannot_see_the_checklist() {
        let mut checklist = PhaseChecklist::empty(test_phase_id());
        adopt(&mut checklist, test_org(), &["Survey"]);
        let id = checklist.deliverables()[0].id;

        let err = checklist
            .handle(&ChecklistCommand::ToggleDeliverable(ToggleDeliverable {
                organization_id: test_org(),
                phase_id: checklist.id_typed(),
                deliverable_id: id,
                actor_id: UserId::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn phase_becomes_billable_when_last_deliverable_completes() {
        let org = test_org();
        let actor = UserId::new();
        let mut checklist = PhaseChecklist::empty(test_phase_id());
        adopt(&mut checklist, org, &["Survey", "Design", "Handover"]);
        let ids: Vec<_> = checklist.deliverables().iter().map(|d| d.id).collect();

        toggle(&mut checklist, org, ids[0], actor);
        toggle(&mut checklist, org, ids[1], actor);
        let summary = checklist.summary();
        assert_eq!((summary.complete, summary.total), (2, 3));
        assert!(!can_invoice(&summary));

        toggle(&mut checklist, org, ids[2], actor);
        assert!(can_invoice(&checklist.summary()));
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let org = test_org();
        let mut checklist = PhaseChecklist::empty(test_phase_id());
        adopt(&mut checklist, org, &["Survey"]);
        let before = checklist.clone();

        let _ = checklist.handle(&ChecklistCommand::ToggleDeliverable(ToggleDeliverable {
            organization_id: org,
            phase_id: checklist.id_typed(),
            deliverable_id: checklist.deliverables()[0].id,
            actor_id: UserId::new(),
            occurred_at: test_time(),
        }));

        assert_eq!(checklist, before);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: the summary always counts deliverables toggled an odd
        /// number of times as complete.
        #[test]
        fn summary_tracks_toggle_parity(toggles in prop::collection::vec(0usize..4, 0..40)) {
            let org = test_org();
            let actor = UserId::new();
            let mut checklist = PhaseChecklist::empty(test_phase_id());
            adopt(&mut checklist, org, &["A", "B", "C", "D"]);
            let ids: Vec<_> = checklist.deliverables().iter().map(|d| d.id).collect();

            let mut counts = [0usize; 4];
            for idx in toggles {
                toggle(&mut checklist, org, ids[idx], actor);
                counts[idx] += 1;
            }

            let expected = counts.iter().filter(|c| *c % 2 == 1).count() as u32;
            let summary = checklist.summary();
            prop_assert_eq!(summary.complete, expected);
            prop_assert_eq!(summary.total, 4);
            prop_assert_eq!(summary.all_complete, expected == 4);
        }
    }
}
