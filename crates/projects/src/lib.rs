//! Project phase domain module (event-sourced).
//!
//! Tracks the deliverable checklist of each project phase and decides whether
//! the phase is ready to be billed. Pure domain logic: no IO, no storage.

pub mod checklist;
pub mod defaults;
pub mod eligibility;
pub mod summary;

pub use checklist::{
    AdoptChecklist, ChecklistAdopted, ChecklistCommand, ChecklistEvent, ChecklistSource,
    Deliverable, DeliverableCompleted, DeliverableId, DeliverableReopened, DeliverableSeed,
    EnsureDefaultDeliverables, PhaseChecklist, PhaseId, ProjectId, ToggleDeliverable,
};
pub use defaults::DEFAULT_DELIVERABLES;
pub use eligibility::{can_invoice, ensure_invoiceable};
pub use summary::PhaseCompletionSummary;
