//! Invoice number issuance.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

use stagebill_core::OrganizationId;
use stagebill_invoicing::InvoiceNumber;

#[derive(Debug, Error)]
pub enum NumberingError {
    #[error("invoice number sequence unavailable: {0}")]
    Unavailable(String),
}

/// Issues organization-scoped, strictly increasing invoice numbers.
///
/// A number handed out is never handed out again, even if the invoice it was
/// meant for fails to be created.
pub trait InvoiceNumberAllocator: Send + Sync {
    fn allocate(&self, organization_id: OrganizationId) -> Result<InvoiceNumber, NumberingError>;

    /// Record a number issued elsewhere (e.g. found in the event store) so it
    /// is never allocated again.
    fn observe(
        &self,
        organization_id: OrganizationId,
        number: &InvoiceNumber,
    ) -> Result<(), NumberingError>;
}

/// Per-organization counters held in memory, formatted `{prefix}-{seq:05}`.
#[derive(Debug)]
pub struct InMemoryInvoiceNumberAllocator {
    prefix: String,
    counters: Mutex<HashMap<OrganizationId, u64>>,
}

impl InMemoryInvoiceNumberAllocator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl InMemoryInvoiceNumberAllocator {
    fn counters(&self) -> Result<MutexGuard<'_, HashMap<OrganizationId, u64>>, NumberingError> {
        self.counters
            .lock()
            .map_err(|_| NumberingError::Unavailable("lock poisoned".to_string()))
    }
}

impl InvoiceNumberAllocator for InMemoryInvoiceNumberAllocator {
    fn allocate(&self, organization_id: OrganizationId) -> Result<InvoiceNumber, NumberingError> {
        let mut counters = self.counters()?;
        let next = counters.entry(organization_id).or_insert(0);
        *next = next
            .checked_add(1)
            .ok_or_else(|| NumberingError::Unavailable("sequence exhausted".to_string()))?;
        Ok(InvoiceNumber::format(&self.prefix, *next))
    }

    /// Only numbers carrying this allocator's prefix move the counter.
    fn observe(
        &self,
        organization_id: OrganizationId,
        number: &InvoiceNumber,
    ) -> Result<(), NumberingError> {
        let Some(sequence) = number.sequence() else {
            return Ok(());
        };
        if InvoiceNumber::format(&self.prefix, sequence) != *number {
            return Ok(());
        }
        let mut counters = self.counters()?;
        let last = counters.entry(organization_id).or_insert(0);
        *last = (*last).max(sequence);
        Ok(())
    }
}
