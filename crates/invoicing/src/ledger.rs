//! Line items and invoice totals.
//!
//! `recompute_totals` is the single producer of `InvoiceTotals`; the invoice
//! aggregate calls it after every change to items, tax rate or paid amount.
//! Money is exact `Decimal` arithmetic and is never rounded here.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stagebill_core::{DomainError, DomainResult, ValueObject};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    FixedFee,
    TimeBased,
    Expense,
    Other,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::FixedFee => "fixed_fee",
            ItemType::TimeBased => "time_based",
            ItemType::Expense => "expense",
            ItemType::Other => "other",
        }
    }
}

impl core::fmt::Display for ItemType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied content of a line item. The amount is not part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemDraft {
    pub description: String,
    pub item_type: ItemType,
    pub quantity: Decimal,
    pub unit_price: Decimal,
}

impl LineItemDraft {
    pub fn new(
        description: impl Into<String>,
        item_type: ItemType,
        quantity: Decimal,
        unit_price: Decimal,
    ) -> Self {
        Self {
            description: description.into(),
            item_type,
            quantity,
            unit_price,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.description.trim().is_empty() {
            return Err(DomainError::validation("line item description must not be empty"));
        }
        if self.quantity < Decimal::ZERO {
            return Err(DomainError::validation("line item quantity must not be negative"));
        }
        if self.unit_price < Decimal::ZERO {
            return Err(DomainError::validation("line item unit_price must not be negative"));
        }
        if self.quantity.checked_mul(self.unit_price).is_none() {
            return Err(DomainError::validation("line item amount is out of range"));
        }
        Ok(())
    }
}

/// A line on an invoice. `amount` is always `quantity × unit_price`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineItem {
    line_no: u32,
    description: String,
    item_type: ItemType,
    quantity: Decimal,
    unit_price: Decimal,
    amount: Decimal,
}

impl LineItem {
    pub fn from_draft(line_no: u32, draft: &LineItemDraft) -> Self {
        Self {
            line_no,
            description: draft.description.trim().to_string(),
            item_type: draft.item_type,
            quantity: draft.quantity,
            unit_price: draft.unit_price,
            amount: draft.quantity * draft.unit_price,
        }
    }

    pub fn line_no(&self) -> u32 {
        self.line_no
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn item_type(&self) -> ItemType {
        self.item_type
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }
}

/// Derived money figures of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub balance_amount: Decimal,
}

impl ValueObject for InvoiceTotals {}

pub fn recompute_totals(items: &[LineItem], tax_rate: Decimal, paid_amount: Decimal) -> InvoiceTotals {
    let subtotal: Decimal = items.iter().map(LineItem::amount).sum();
    let tax_amount = subtotal * tax_rate / Decimal::ONE_HUNDRED;
    let total_amount = subtotal + tax_amount;

    InvoiceTotals {
        subtotal,
        tax_amount,
        total_amount,
        paid_amount,
        balance_amount: total_amount - paid_amount,
    }
}

pub fn validate_tax_rate(tax_rate: Decimal) -> DomainResult<()> {
    if tax_rate < Decimal::ZERO {
        return Err(DomainError::validation("tax_rate must not be negative"));
    }
    Ok(())
}

/// Checked variant of the totals arithmetic, run before a change is accepted
/// so that `recompute_totals` never overflows when the change is applied.
pub fn ensure_representable(
    amounts: impl IntoIterator<Item = Decimal>,
    tax_rate: Decimal,
) -> DomainResult<()> {
    let overflow = || DomainError::validation("invoice total is out of range");

    let subtotal = amounts
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, amount| acc.checked_add(amount))
        .ok_or_else(overflow)?;
    let tax_amount = subtotal
        .checked_mul(tax_rate)
        .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
        .ok_or_else(overflow)?;
    subtotal.checked_add(tax_amount).ok_or_else(overflow)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn item(line_no: u32, quantity: i64, unit_price: i64) -> LineItem {
        LineItem::from_draft(
            line_no,
            &LineItemDraft::new(
                format!("line {line_no}"),
                ItemType::FixedFee,
                Decimal::from(quantity),
                Decimal::from(unit_price),
            ),
        )
    }

    #[test]
    fn totals_for_two_items_with_ten_percent_tax() {
        let items = vec![item(1, 2, 100), item(2, 1, 50)];
        let totals = recompute_totals(&items, Decimal::from(10), Decimal::ZERO);

        assert_eq!(totals.subtotal, Decimal::from(250));
        assert_eq!(totals.tax_amount, Decimal::from(25));
        assert_eq!(totals.total_amount, Decimal::from(275));
        assert_eq!(totals.balance_amount, Decimal::from(275));
    }

    #[test]
    fn empty_invoice_totals_are_zero() {
        let totals = recompute_totals(&[], Decimal::from(20), Decimal::ZERO);
        assert_eq!(totals, InvoiceTotals::default());
    }

    #[test]
    fn fractional_amounts_are_exact() {
        let draft = LineItemDraft::new(
            "Consulting",
            ItemType::TimeBased,
            Decimal::new(15, 1),
            Decimal::new(3333, 2),
        );
        let totals = recompute_totals(
            &[LineItem::from_draft(1, &draft)],
            Decimal::new(75, 1),
            Decimal::ZERO,
        );

        // 1.5 × 33.33 = 49.995; 7.5% of that = 3.749625
        assert_eq!(totals.subtotal, Decimal::new(49995, 3));
        assert_eq!(totals.tax_amount, Decimal::new(3749625, 6));
        assert_eq!(totals.total_amount, Decimal::new(53744625, 6));
    }

    #[test]
    fn drafts_are_validated() {
        let ok = LineItemDraft::new("Design", ItemType::FixedFee, Decimal::ONE, Decimal::ZERO);
        assert!(ok.validate().is_ok());

        let blank = LineItemDraft { description: "   ".into(), ..ok.clone() };
        let negative_qty = LineItemDraft { quantity: Decimal::NEGATIVE_ONE, ..ok.clone() };
        let negative_price = LineItemDraft { unit_price: Decimal::new(-1, 2), ..ok.clone() };

        for draft in [blank, negative_qty, negative_price] {
            assert!(matches!(draft.validate(), Err(DomainError::Validation(_))));
        }
    }

    #[test]
    fn oversized_amounts_are_rejected() {
        let huge = LineItemDraft::new("Huge", ItemType::Other, Decimal::MAX, Decimal::from(2));
        assert!(matches!(huge.validate(), Err(DomainError::Validation(_))));

        assert!(ensure_representable([Decimal::MAX, Decimal::MAX], Decimal::ZERO).is_err());
        assert!(ensure_representable([Decimal::from(10)], Decimal::from(5)).is_ok());
    }

    #[test]
    fn negative_tax_rate_is_rejected() {
        assert!(validate_tax_rate(Decimal::new(-5, 1)).is_err());
        assert!(validate_tax_rate(Decimal::ZERO).is_ok());
    }

    fn money() -> impl Strategy<Value = Decimal> {
        (0i64..10_000_000).prop_map(|cents| Decimal::new(cents, 2))
    }

    fn quantity() -> impl Strategy<Value = Decimal> {
        (0i64..100_000).prop_map(|milli| Decimal::new(milli, 3))
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: totals are always consistent with their inputs.
        #[test]
        fn totals_are_consistent(
            lines in prop::collection::vec((quantity(), money()), 0..12),
            tax_cents in 0i64..5_000,
            paid_share in 0u32..=100,
        ) {
            let tax_rate = Decimal::new(tax_cents, 2);
            let items: Vec<LineItem> = lines
                .iter()
                .enumerate()
                .map(|(i, (q, p))| {
                    LineItem::from_draft(
                        i as u32 + 1,
                        &LineItemDraft::new("x", ItemType::Expense, *q, *p),
                    )
                })
                .collect();

            let unpaid = recompute_totals(&items, tax_rate, Decimal::ZERO);
            let paid = unpaid.total_amount * Decimal::from(paid_share) / Decimal::ONE_HUNDRED;
            let totals = recompute_totals(&items, tax_rate, paid);

            let expected_subtotal: Decimal = lines.iter().map(|(q, p)| q * p).sum();
            prop_assert_eq!(totals.subtotal, expected_subtotal);
            prop_assert_eq!(totals.total_amount, totals.subtotal + totals.tax_amount);
            prop_assert_eq!(totals.balance_amount, totals.total_amount - totals.paid_amount);
            prop_assert!(totals.paid_amount >= Decimal::ZERO);
            prop_assert!(totals.paid_amount <= totals.total_amount);
            prop_assert!(totals.balance_amount >= Decimal::ZERO);
        }
    }
}
