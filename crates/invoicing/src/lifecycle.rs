//! Invoice status lifecycle.
//!
//! `TRANSITIONS` is the only description of which status changes are legal.
//! Command handlers, the API's `allowed_transitions` field and the tests all
//! read from it.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use stagebill_core::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Viewed,
    Overdue,
    Paid,
    Cancelled,
}

/// Every legal `(from, to)` pair.
pub const TRANSITIONS: &[(InvoiceStatus, InvoiceStatus)] = &[
    (InvoiceStatus::Draft, InvoiceStatus::Sent),
    (InvoiceStatus::Draft, InvoiceStatus::Cancelled),
    (InvoiceStatus::Sent, InvoiceStatus::Viewed),
    (InvoiceStatus::Sent, InvoiceStatus::Overdue),
    (InvoiceStatus::Sent, InvoiceStatus::Cancelled),
    (InvoiceStatus::Sent, InvoiceStatus::Paid),
    (InvoiceStatus::Viewed, InvoiceStatus::Overdue),
    (InvoiceStatus::Viewed, InvoiceStatus::Cancelled),
    (InvoiceStatus::Viewed, InvoiceStatus::Paid),
    (InvoiceStatus::Overdue, InvoiceStatus::Cancelled),
    (InvoiceStatus::Overdue, InvoiceStatus::Paid),
];

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 6] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Sent,
        InvoiceStatus::Viewed,
        InvoiceStatus::Overdue,
        InvoiceStatus::Paid,
        InvoiceStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Viewed => "viewed",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(self, to: InvoiceStatus) -> bool {
        TRANSITIONS.iter().any(|&(f, t)| f == self && t == to)
    }

    /// Targets reachable from this status, in table order.
    pub fn allowed_transitions(self) -> Vec<InvoiceStatus> {
        TRANSITIONS
            .iter()
            .filter(|(f, _)| *f == self)
            .map(|(_, t)| *t)
            .collect()
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Sent or viewed: the statuses an overdue sweep looks at.
    pub fn is_awaiting_payment(self) -> bool {
        self.can_transition_to(InvoiceStatus::Overdue)
    }
}

impl core::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InvoiceStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::validation(format!("unknown invoice status '{s}'")))
    }
}

/// Validate `from -> to` against the table.
pub fn transition(from: InvoiceStatus, to: InvoiceStatus) -> DomainResult<InvoiceStatus> {
    if from.can_transition_to(to) {
        Ok(to)
    } else {
        Err(DomainError::invalid_transition(from, to))
    }
}
