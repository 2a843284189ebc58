//! Invoicing domain module (event-sourced).
//!
//! Invoices, their line items and derived totals, the status lifecycle and the
//! full-payment rule. Deterministic domain logic only: no IO, no HTTP, no storage.

pub mod invoice;
pub mod ledger;
pub mod lifecycle;
pub mod number;
pub mod payment;
pub mod snapshot;

pub use invoice::{
    AddLineItem, ApplyPayment, CancelInvoice, ClientId, CreateInvoice, Invoice, InvoiceCancelled,
    InvoiceCommand, InvoiceCreated, InvoiceEvent, InvoiceId, InvoiceMarkedOverdue, InvoiceSent,
    InvoiceViewed, LineItemAdded, LineItemRemoved, LineItemUpdated, MarkSent, MarkViewed,
    PaymentApplied, RemoveLineItem, SetTaxRate, SweepOverdue, TaxRateChanged, UpdateLineItem,
};
pub use ledger::{InvoiceTotals, ItemType, LineItem, LineItemDraft, recompute_totals};
pub use lifecycle::{InvoiceStatus, TRANSITIONS, transition};
pub use number::InvoiceNumber;
pub use payment::{Payment, check_payment};
pub use snapshot::{InvoiceSnapshot, LineItemView};

#[cfg(test)]
mod testing;
