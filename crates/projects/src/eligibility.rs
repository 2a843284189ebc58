//! Billing readiness gate.
//!
//! A phase may be invoiced once every deliverable on its checklist is complete.
//! Phases without a checklist are billable: requiring one is an onboarding
//! decision made elsewhere.

use stagebill_core::{DomainError, DomainResult};

use crate::summary::PhaseCompletionSummary;

pub fn can_invoice(summary: &PhaseCompletionSummary) -> bool {
    summary.total == 0 || summary.all_complete
}

/// `can_invoice` as a precondition, for command paths that create invoices.
pub fn ensure_invoiceable(summary: &PhaseCompletionSummary) -> DomainResult<()> {
    if can_invoice(summary) {
        Ok(())
    } else {
        Err(DomainError::invalid_state(format!(
            "phase is not ready for invoicing ({} of {} deliverables complete)",
            summary.complete, summary.total
        )))
    }
}
