use serde::{Deserialize, Serialize};

use stagebill_core::ValueObject;

use crate::checklist::Deliverable;

/// Completion figures for one phase, derived on demand and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseCompletionSummary {
    pub complete: u32,
    pub total: u32,
    /// 0-100. A phase without deliverables counts as 100% complete.
    pub percentage: f64,
    pub all_complete: bool,
}

impl ValueObject for PhaseCompletionSummary {}

impl PhaseCompletionSummary {
    pub fn new(complete: u32, total: u32) -> Self {
        let complete = complete.min(total);
        let percentage = if total == 0 {
            100.0
        } else {
            f64::from(complete) / f64::from(total) * 100.0
        };

        Self {
            complete,
            total,
            percentage,
            all_complete: total == 0 || complete == total,
        }
    }

    pub fn from_deliverables(deliverables: &[Deliverable]) -> Self {
        let total = deliverables.len() as u32;
        let complete = deliverables.iter().filter(|d| d.is_completed).count() as u32;
        Self::new(complete, total)
    }
}
