use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stagebill_core::{DomainError, DomainResult, ValueObject};

/// Money totals over a set of invoices (or, for charge-type views, line items).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FinancialSummary {
    pub total_invoiced: Decimal,
    pub total_paid: Decimal,
    pub total_outstanding: Decimal,
    /// `total_paid / total_invoiced × 100`, two decimal places; zero when
    /// nothing was invoiced.
    pub collection_rate: Decimal,
    pub count: usize,
}

impl ValueObject for FinancialSummary {}

impl FinancialSummary {
    /// Add one invoice (or line share). Sums that leave the `Decimal` range
    /// are rejected rather than wrapped or panicking.
    pub(crate) fn record(
        &mut self,
        invoiced: Decimal,
        paid: Decimal,
        outstanding: Decimal,
    ) -> DomainResult<()> {
        self.total_invoiced = checked_sum(self.total_invoiced, invoiced)?;
        self.total_paid = checked_sum(self.total_paid, paid)?;
        self.total_outstanding = checked_sum(self.total_outstanding, outstanding)?;
        self.count += 1;
        Ok(())
    }

    pub(crate) fn finish(mut self) -> DomainResult<Self> {
        self.collection_rate = if self.total_invoiced.is_zero() {
            Decimal::ZERO
        } else {
            self.total_paid
                .checked_div(self.total_invoiced)
                .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
                .ok_or_else(out_of_range)?
                .round_dp(2)
        };
        Ok(self)
    }
}

pub(crate) fn out_of_range() -> DomainError {
    DomainError::validation("report totals are out of range")
}

fn checked_sum(acc: Decimal, amount: Decimal) -> DomainResult<Decimal> {
    acc.checked_add(amount).ok_or_else(out_of_range)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary<K> {
    pub key: K,
    #[serde(flatten)]
    pub summary: FinancialSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_rate_is_zero_without_invoiced_amounts() {
        let summary = FinancialSummary::default().finish().unwrap();
        assert_eq!(summary.collection_rate, Decimal::ZERO);
        assert_eq!(summary.count, 0);
    }

    #[test]
    fn collection_rate_is_a_rounded_percentage() {
        let mut summary = FinancialSummary::default();
        summary.record(Decimal::from(300), Decimal::from(100), Decimal::from(200)).unwrap();
        let summary = summary.finish().unwrap();

        assert_eq!(summary.collection_rate, Decimal::new(3333, 2));
        assert_eq!(summary.total_outstanding, Decimal::from(200));
    }
}
