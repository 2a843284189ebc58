//! Full-payment rule.
//!
//! An invoice is settled by exactly one payment equal to its total. Partial and
//! over-payments are rejected with `AmountMismatch`.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stagebill_core::{DomainError, DomainResult};

use crate::invoice::{Invoice, InvoiceId};
use crate::lifecycle::InvoiceStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub invoice_id: InvoiceId,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
}

/// Preconditions for settling `invoice` with `payment`, checked in order:
/// status, amount, payment date, invoice reference.
pub fn check_payment(invoice: &Invoice, payment: &Payment, today: NaiveDate) -> DomainResult<()> {
    let status = invoice.status();
    if !status.can_transition_to(InvoiceStatus::Paid) {
        return Err(DomainError::invalid_state(format!(
            "invoice in status {status} cannot accept payment"
        )));
    }

    let expected = invoice.totals().total_amount;
    if payment.amount != expected {
        return Err(DomainError::amount_mismatch(expected, payment.amount));
    }

    if payment.payment_date > today {
        return Err(DomainError::validation(format!(
            "payment date {} is after today ({today})",
            payment.payment_date
        )));
    }

    if payment.invoice_id != invoice.id_typed() {
        return Err(DomainError::validation(format!(
            "payment references invoice {}, not {}",
            payment.invoice_id,
            invoice.id_typed()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{date, draft_with_items, mark_sent, standard_items};
    use stagebill_core::AggregateId;

    fn payment_for(invoice: &Invoice, amount: Decimal, payment_date: NaiveDate) -> Payment {
        Payment {
            invoice_id: invoice.id_typed(),
            amount,
            payment_date,
        }
    }

    #[test]
    fn exact_total_is_accepted() {
        let mut invoice = draft_with_items(standard_items(), Decimal::from(10));
        mark_sent(&mut invoice);

        let payment = payment_for(&invoice, Decimal::from(275), date(2025, 3, 1));
        assert!(check_payment(&invoice, &payment, date(2025, 3, 1)).is_ok());
    }

    #[test]
    fn scale_differences_do_not_matter() {
        let mut invoice = draft_with_items(standard_items(), Decimal::from(10));
        mark_sent(&mut invoice);

        let payment = payment_for(&invoice, Decimal::new(27500, 2), date(2025, 3, 1));
        assert!(check_payment(&invoice, &payment, date(2025, 3, 1)).is_ok());
    }

    #[test]
    fn one_off_either_side_is_a_mismatch() {
        let mut invoice = draft_with_items(standard_items(), Decimal::from(10));
        mark_sent(&mut invoice);

        for amount in [274, 276] {
            let payment = payment_for(&invoice, Decimal::from(amount), date(2025, 3, 1));
            assert_eq!(
                check_payment(&invoice, &payment, date(2025, 3, 1)),
                Err(DomainError::AmountMismatch {
                    expected: Decimal::from(275),
                    actual: Decimal::from(amount),
                })
            );
        }
    }

    #[test]
    fn draft_invoices_cannot_be_paid() {
        let invoice = draft_with_items(standard_items(), Decimal::from(10));
        let payment = payment_for(&invoice, Decimal::from(275), date(2025, 3, 1));
        assert!(matches!(
            check_payment(&invoice, &payment, date(2025, 3, 1)),
            Err(DomainError::InvalidState(_))
        ));
    }

    #[test]
    fn status_is_checked_before_amount() {
        let invoice = draft_with_items(standard_items(), Decimal::from(10));
        let payment = payment_for(&invoice, Decimal::ONE, date(2025, 3, 1));
        assert!(matches!(
            check_payment(&invoice, &payment, date(2025, 3, 1)),
            Err(DomainError::InvalidState(_))
        ));
    }

    #[test]
    fn future_payment_dates_are_rejected() {
        let mut invoice = draft_with_items(standard_items(), Decimal::from(10));
        mark_sent(&mut invoice);

        let payment = payment_for(&invoice, Decimal::from(275), date(2025, 3, 2));
        assert!(matches!(
            check_payment(&invoice, &payment, date(2025, 3, 1)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn payment_for_another_invoice_is_rejected() {
        let mut invoice = draft_with_items(standard_items(), Decimal::from(10));
        mark_sent(&mut invoice);

        let payment = Payment {
            invoice_id: InvoiceId::new(AggregateId::new()),
            amount: Decimal::from(275),
            payment_date: date(2025, 3, 1),
        };
        assert!(matches!(
            check_payment(&invoice, &payment, date(2025, 3, 1)),
            Err(DomainError::Validation(_))
        ));
    }
}
