//! Document-level aggregation and round-off

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::config::RoundingPolicy;
use crate::tax::line::ComputedLine;

/// Aggregated amounts for a document's lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTotals {
    /// Sum of taxable amounts
    pub subtotal: BigDecimal,
    pub total_discount: BigDecimal,
    pub cgst_total: BigDecimal,
    pub sgst_total: BigDecimal,
    pub igst_total: BigDecimal,
    pub cess_total: BigDecimal,
    pub tax_total: BigDecimal,
    /// `grand_total - (subtotal + tax_total)`
    pub round_off: BigDecimal,
    /// Amount actually invoiced, after rounding
    pub grand_total: BigDecimal,
}

impl DocumentTotals {
    /// Aggregate lines and round the grand total under `policy`
    pub fn from_lines(lines: &[ComputedLine], policy: &RoundingPolicy) -> Self {
        let subtotal: BigDecimal = lines.iter().map(|line| &line.taxable_amount).sum();
        let total_discount: BigDecimal = lines.iter().map(|line| &line.discount_amount).sum();
        let cgst_total: BigDecimal = lines.iter().map(|line| &line.cgst_amount).sum();
        let sgst_total: BigDecimal = lines.iter().map(|line| &line.sgst_amount).sum();
        let igst_total: BigDecimal = lines.iter().map(|line| &line.igst_amount).sum();
        let cess_total: BigDecimal = lines.iter().map(|line| &line.cess_amount).sum();

        let tax_total = &cgst_total + &sgst_total + &igst_total + &cess_total;
        let unrounded = &subtotal + &tax_total;
        let grand_total = policy.round(&unrounded);
        let round_off = &grand_total - &unrounded;

        Self {
            subtotal,
            total_discount,
            cgst_total,
            sgst_total,
            igst_total,
            cess_total,
            tax_total,
            round_off,
            grand_total,
        }
    }

    /// Grand total before round-off was applied
    pub fn unrounded_total(&self) -> BigDecimal {
        &self.grand_total - &self.round_off
    }

    /// True when the document carries no tax at all
    pub fn is_tax_free(&self) -> bool {
        self.tax_total == BigDecimal::from(0)
    }
}
