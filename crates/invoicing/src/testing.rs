//! Shared fixtures for the unit tests of this crate.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;

use stagebill_core::{Aggregate, AggregateId, OrganizationId, UserId};
use stagebill_projects::ProjectId;

use crate::invoice::{ClientId, CreateInvoice, Invoice, InvoiceCommand, InvoiceEvent, InvoiceId, MarkSent};
use crate::ledger::{ItemType, LineItemDraft};
use crate::number::InvoiceNumber;

pub fn test_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 1, 9, 0, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn org_of(invoice: &Invoice) -> OrganizationId {
    invoice.organization_id().expect("invoice is created")
}

/// `2 × 100` fixed fee plus `1 × 50` expense.
pub fn standard_items() -> Vec<LineItemDraft> {
    vec![
        LineItemDraft::new("Design", ItemType::FixedFee, Decimal::from(2), Decimal::from(100)),
        LineItemDraft::new("Travel", ItemType::Expense, Decimal::ONE, Decimal::from(50)),
    ]
}

pub fn create_command(invoice_id: InvoiceId, items: Vec<LineItemDraft>, tax_rate: Decimal) -> CreateInvoice {
    CreateInvoice {
        organization_id: OrganizationId::new(),
        invoice_id,
        invoice_number: InvoiceNumber::format("INV", 1),
        project_id: ProjectId::new(AggregateId::new()),
        phase_id: None,
        client_id: ClientId::new(AggregateId::new()),
        issue_date: date(2025, 2, 1),
        due_date: date(2025, 3, 3),
        tax_rate,
        items,
        created_by: UserId::new(),
        occurred_at: test_time(),
    }
}

pub fn run(invoice: &mut Invoice, cmd: InvoiceCommand) -> Vec<InvoiceEvent> {
    let events = invoice.handle(&cmd).unwrap();
    for e in &events {
        invoice.apply(e);
    }
    events
}

pub fn draft_with_items(items: Vec<LineItemDraft>, tax_rate: Decimal) -> Invoice {
    let mut invoice = Invoice::empty(InvoiceId::new(AggregateId::new()));
    let cmd = create_command(invoice.id_typed(), items, tax_rate);
    run(&mut invoice, InvoiceCommand::CreateInvoice(cmd));
    invoice
}

pub fn mark_sent(invoice: &mut Invoice) {
    let cmd = InvoiceCommand::MarkSent(MarkSent {
        organization_id: org_of(invoice),
        invoice_id: invoice.id_typed(),
        actor_id: UserId::new(),
        occurred_at: test_time(),
    });
    run(invoice, cmd);
}
