use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use stagebill_core::{Aggregate, AggregateId, OrganizationId};
use stagebill_events::EventEnvelope;
use stagebill_invoicing::{Invoice, InvoiceEvent, InvoiceId, InvoiceNumber, InvoiceSnapshot};

use crate::read_model::TenantStore;

/// Stream type invoices are stored under.
pub const INVOICE_AGGREGATE_TYPE: &str = "invoicing.invoice";

/// Organization + aggregate cursor for at-least-once delivery.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    organization_id: OrganizationId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum InvoiceProjectionError {
    #[error("failed to deserialize invoice event: {0}")]
    Deserialize(String),

    #[error("organization isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Per-organization directory of invoices, folded from the invoice streams.
///
/// Holds the rehydrated aggregate of every invoice so listing, reporting and
/// the overdue sweep never need to replay streams. Disposable: it can always
/// be rebuilt from the event store.
#[derive(Debug)]
pub struct InvoiceDirectoryProjection<S>
where
    S: TenantStore<InvoiceId, Invoice>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> InvoiceDirectoryProjection<S>
where
    S: TenantStore<InvoiceId, Invoice>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    fn get_cursor(&self, organization_id: OrganizationId, aggregate_id: AggregateId) -> u64 {
        match self.cursors.read() {
            Ok(cursors) => *cursors
                .get(&CursorKey {
                    organization_id,
                    aggregate_id,
                })
                .unwrap_or(&0),
            Err(_) => 0,
        }
    }

    fn update_cursor(&self, organization_id: OrganizationId, aggregate_id: AggregateId, seq: u64) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(
                CursorKey {
                    organization_id,
                    aggregate_id,
                },
                seq,
            );
        }
    }

    fn clear_cursors(&self, organization_id: OrganizationId) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.retain(|k, _| k.organization_id != organization_id);
        }
    }

    pub fn get(&self, organization_id: OrganizationId, invoice_id: &InvoiceId) -> Option<Invoice> {
        self.store.get(organization_id, invoice_id)
    }

    /// Snapshots of every invoice of an organization, ordered by invoice number.
    pub fn list(&self, organization_id: OrganizationId) -> Vec<InvoiceSnapshot> {
        let mut snapshots: Vec<_> = self
            .store
            .list(organization_id)
            .iter()
            .filter_map(|invoice| invoice.snapshot().ok())
            .collect();
        snapshots.sort_by(|a, b| a.invoice_number.issue_order(&b.invoice_number));
        snapshots
    }

    /// Every invoice number the directory holds for the organization, in no
    /// particular order.
    pub fn invoice_numbers(&self, organization_id: OrganizationId) -> Vec<InvoiceNumber> {
        self.store
            .list(organization_id)
            .iter()
            .filter_map(|invoice| invoice.invoice_number().cloned())
            .collect()
    }

    pub fn organizations(&self) -> Vec<OrganizationId> {
        self.store.organizations()
    }

    /// Fold one committed invoice event into the directory.
    ///
    /// Redelivered envelopes (sequence at or below the cursor) are ignored;
    /// gaps are an error.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), InvoiceProjectionError> {
        if envelope.aggregate_type() != INVOICE_AGGREGATE_TYPE {
            return Ok(());
        }

        let organization_id = envelope.organization_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let last = self.get_cursor(organization_id, aggregate_id);

        if seq == 0 {
            return Err(InvoiceProjectionError::NonMonotonicSequence { last, found: seq });
        }

        if seq <= last {
            return Ok(());
        }

        if seq != last + 1 {
            return Err(InvoiceProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let ev: InvoiceEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| InvoiceProjectionError::Deserialize(e.to_string()))?;

        if ev.organization_id() != organization_id {
            return Err(InvoiceProjectionError::TenantIsolation(
                "event organization_id does not match envelope organization_id".to_string(),
            ));
        }

        let invoice_id = ev.invoice_id();
        if invoice_id.0 != aggregate_id {
            return Err(InvoiceProjectionError::TenantIsolation(
                "event invoice_id does not match envelope aggregate_id".to_string(),
            ));
        }

        let mut invoice = self
            .store
            .get(organization_id, &invoice_id)
            .unwrap_or_else(|| Invoice::empty(invoice_id));
        invoice.apply(&ev);
        self.store.upsert(organization_id, invoice_id, invoice);

        self.update_cursor(organization_id, aggregate_id, seq);
        Ok(())
    }

    /// Rebuild the directory from scratch by replaying envelopes.
    ///
    /// Only the organizations present in `envelopes` are cleared.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), InvoiceProjectionError> {
        let mut envs: Vec<_> = envelopes.into_iter().collect();

        let mut organizations: Vec<_> = envs.iter().map(|e| e.organization_id()).collect();
        organizations.sort();
        organizations.dedup();
        for organization_id in organizations {
            self.store.clear_tenant(organization_id);
            self.clear_cursors(organization_id);
        }

        envs.sort_by_key(|e| (e.organization_id(), e.aggregate_id(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}
