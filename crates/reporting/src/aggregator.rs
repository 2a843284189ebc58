//! Rollups of invoice snapshots.
//!
//! Cancelled invoices are not money owed, so every view except `by_status`
//! leaves them out. `by_group` folds exactly what it is given. Every fold
//! uses checked arithmetic: a sum outside the `Decimal` range is a
//! `DomainError::Validation`, never a panic.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use stagebill_core::DomainResult;
use stagebill_invoicing::{InvoiceSnapshot, InvoiceStatus, ItemType};
use stagebill_projects::{PhaseId, ProjectId};

use crate::summary::{FinancialSummary, GroupSummary, out_of_range};

fn billable(invoices: &[InvoiceSnapshot]) -> impl Iterator<Item = &InvoiceSnapshot> {
    invoices.iter().filter(|i| !i.is_cancelled())
}

fn record_invoice(summary: &mut FinancialSummary, invoice: &InvoiceSnapshot) -> DomainResult<()> {
    summary.record(
        invoice.total_amount,
        invoice.paid_amount,
        invoice.balance_amount,
    )
}

fn finish_groups<K>(groups: BTreeMap<K, FinancialSummary>) -> DomainResult<Vec<GroupSummary<K>>> {
    groups
        .into_iter()
        .map(|(key, summary)| {
            Ok(GroupSummary {
                key,
                summary: summary.finish()?,
            })
        })
        .collect()
}

/// Totals across all non-cancelled invoices.
pub fn by_overall(invoices: &[InvoiceSnapshot]) -> DomainResult<FinancialSummary> {
    let mut summary = FinancialSummary::default();
    for invoice in billable(invoices) {
        record_invoice(&mut summary, invoice)?;
    }
    summary.finish()
}

/// Group `invoices` by `key_fn`, one summary per distinct key, keys ascending.
pub fn by_group<'a, K, F, I>(invoices: I, key_fn: F) -> DomainResult<Vec<GroupSummary<K>>>
where
    K: Ord,
    F: Fn(&InvoiceSnapshot) -> K,
    I: IntoIterator<Item = &'a InvoiceSnapshot>,
{
    let mut groups: BTreeMap<K, FinancialSummary> = BTreeMap::new();
    for invoice in invoices {
        record_invoice(groups.entry(key_fn(invoice)).or_default(), invoice)?;
    }
    finish_groups(groups)
}

/// One group per status, cancelled included.
pub fn by_status(invoices: &[InvoiceSnapshot]) -> DomainResult<Vec<GroupSummary<InvoiceStatus>>> {
    by_group(invoices, |i| i.status)
}

/// One group per project phase; invoices not tied to a phase share the `None` group.
pub fn by_phase(invoices: &[InvoiceSnapshot]) -> DomainResult<Vec<GroupSummary<Option<PhaseId>>>> {
    by_group(billable(invoices), |i| i.phase_id)
}

pub fn by_project(invoices: &[InvoiceSnapshot]) -> DomainResult<Vec<GroupSummary<ProjectId>>> {
    by_group(billable(invoices), |i| i.project_id)
}

/// Line-level allocation by charge type.
///
/// Each line contributes its share of the invoice total,
/// `amount × (1 + tax_rate / 100)`, and counts as paid when its invoice is
/// paid. `count` is the number of lines folded into each group.
pub fn by_charge_type(invoices: &[InvoiceSnapshot]) -> DomainResult<Vec<GroupSummary<ItemType>>> {
    let mut groups: BTreeMap<ItemType, FinancialSummary> = BTreeMap::new();

    for invoice in billable(invoices) {
        let tax_factor = invoice
            .tax_rate
            .checked_div(Decimal::ONE_HUNDRED)
            .and_then(|rate| Decimal::ONE.checked_add(rate))
            .ok_or_else(out_of_range)?;
        for item in &invoice.items {
            let share = item.amount.checked_mul(tax_factor).ok_or_else(out_of_range)?;
            let (paid, outstanding) = if invoice.is_paid() {
                (share, Decimal::ZERO)
            } else {
                (Decimal::ZERO, share)
            };
            groups
                .entry(item.item_type)
                .or_default()
                .record(share, paid, outstanding)?;
        }
    }

    finish_groups(groups)
}
