use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stagebill_core::{AggregateRoot, DomainError, DomainResult, OrganizationId, UserId};
use stagebill_projects::{PhaseId, ProjectId};

use crate::invoice::{ClientId, Invoice, InvoiceId};
use crate::ledger::{ItemType, LineItem};
use crate::lifecycle::InvoiceStatus;
use crate::number::InvoiceNumber;

/// Serializable read view of an invoice.
///
/// This is what leaves the domain: HTTP responses, rendered documents, emails
/// and reports are all built from snapshots, never from the aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSnapshot {
    pub id: InvoiceId,
    pub organization_id: OrganizationId,
    pub invoice_number: InvoiceNumber,
    pub project_id: ProjectId,
    pub phase_id: Option<PhaseId>,
    pub client_id: ClientId,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: InvoiceStatus,
    pub allowed_transitions: Vec<InvoiceStatus>,
    pub items: Vec<LineItemView>,
    pub tax_rate: Decimal,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub balance_amount: Decimal,
    pub created_by: UserId,
    pub last_payment_date: Option<NaiveDate>,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemView {
    pub line_no: u32,
    pub description: String,
    pub item_type: ItemType,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub amount: Decimal,
}

impl From<&LineItem> for LineItemView {
    fn from(item: &LineItem) -> Self {
        Self {
            line_no: item.line_no(),
            description: item.description().to_string(),
            item_type: item.item_type(),
            quantity: item.quantity(),
            unit_price: item.unit_price(),
            amount: item.amount(),
        }
    }
}

impl InvoiceSnapshot {
    pub fn from_invoice(invoice: &Invoice) -> DomainResult<Self> {
        let (
            Some(organization_id),
            Some(invoice_number),
            Some(project_id),
            Some(client_id),
            Some(issue_date),
            Some(due_date),
            Some(created_by),
        ) = (
            invoice.organization_id(),
            invoice.invoice_number(),
            invoice.project_id(),
            invoice.client_id(),
            invoice.issue_date(),
            invoice.due_date(),
            invoice.created_by(),
        )
        else {
            return Err(DomainError::not_found(format!("invoice {}", invoice.id_typed())));
        };

        let totals = invoice.totals();
        let status = invoice.status();

        Ok(Self {
            id: invoice.id_typed(),
            organization_id,
            invoice_number: invoice_number.clone(),
            project_id,
            phase_id: invoice.phase_id(),
            client_id,
            issue_date,
            due_date,
            status,
            allowed_transitions: status.allowed_transitions(),
            items: invoice.items().iter().map(LineItemView::from).collect(),
            tax_rate: invoice.tax_rate(),
            subtotal: totals.subtotal,
            tax_amount: totals.tax_amount,
            total_amount: totals.total_amount,
            paid_amount: totals.paid_amount,
            balance_amount: totals.balance_amount,
            created_by,
            last_payment_date: invoice.last_payment_date(),
            version: invoice.version(),
        })
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == InvoiceStatus::Cancelled
    }

    pub fn is_paid(&self) -> bool {
        self.status == InvoiceStatus::Paid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{draft_with_items, standard_items};

    #[test]
    fn snapshot_carries_derived_amounts() {
        let invoice = draft_with_items(standard_items(), Decimal::from(10));
        let snapshot = invoice.snapshot().unwrap();

        assert_eq!(snapshot.total_amount, Decimal::from(275));
        assert_eq!(snapshot.items[0].amount, Decimal::from(200));
        assert_eq!(
            snapshot.allowed_transitions,
            vec![InvoiceStatus::Sent, InvoiceStatus::Cancelled]
        );
    }

    #[test]
    fn snapshot_serializes_statuses_and_item_types_in_snake_case() {
        let invoice = draft_with_items(standard_items(), Decimal::ZERO);
        let json = serde_json::to_value(invoice.snapshot().unwrap()).unwrap();

        assert_eq!(json["status"], "draft");
        assert_eq!(json["items"][0]["item_type"], "fixed_fee");
        assert_eq!(json["invoice_number"], "INV-00001");
    }
}
