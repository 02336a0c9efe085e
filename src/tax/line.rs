//! Per-line taxable amount and tax component calculation

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::tax::gst::{ResolvedTaxRate, TaxRate};
use crate::types::{EngineError, EngineResult};
use crate::utils::validation::{validate_non_negative_amount, validate_percentage};

/// Primitive line input as entered on a document form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineInput {
    /// Catalog item reference
    pub item_id: String,
    pub description: String,
    pub quantity: BigDecimal,
    /// Unit price before discount and tax
    pub rate: BigDecimal,
    pub discount_percentage: BigDecimal,
    /// Rate record, resolved against the document's jurisdictions at build time
    pub tax_rate: TaxRate,
}

impl LineInput {
    pub fn new(
        item_id: impl Into<String>,
        description: impl Into<String>,
        quantity: BigDecimal,
        rate: BigDecimal,
        tax_rate: TaxRate,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            description: description.into(),
            quantity,
            rate,
            discount_percentage: BigDecimal::from(0),
            tax_rate,
        }
    }

    pub fn with_discount(mut self, discount_percentage: BigDecimal) -> Self {
        self.discount_percentage = discount_percentage;
        self
    }
}

/// A line with every derived amount filled in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedLine {
    pub item_id: String,
    pub description: String,
    pub quantity: BigDecimal,
    pub rate: BigDecimal,
    pub discount_percentage: BigDecimal,
    /// Component rates frozen at the time the line was computed
    pub tax: ResolvedTaxRate,
    pub line_amount: BigDecimal,
    pub discount_amount: BigDecimal,
    pub taxable_amount: BigDecimal,
    pub cgst_amount: BigDecimal,
    pub sgst_amount: BigDecimal,
    pub igst_amount: BigDecimal,
    pub cess_amount: BigDecimal,
    pub line_total: BigDecimal,
}

impl ComputedLine {
    /// Sum of all tax components on this line
    pub fn tax_amount(&self) -> BigDecimal {
        &self.cgst_amount + &self.sgst_amount + &self.igst_amount + &self.cess_amount
    }

    /// Re-price this line for a different quantity on its original terms
    pub fn with_quantity(&self, quantity: BigDecimal) -> EngineResult<ComputedLine> {
        LineItemCalculator::calculate(
            &self.item_id,
            &self.description,
            quantity,
            self.rate.clone(),
            self.discount_percentage.clone(),
            &self.tax,
        )
    }
}

/// The one place line-level tax math lives
pub struct LineItemCalculator;

impl LineItemCalculator {
    /// Compute a line from its primitive input and resolved component rates
    pub fn compute(input: &LineInput, tax: &ResolvedTaxRate) -> EngineResult<ComputedLine> {
        Self::calculate(
            &input.item_id,
            &input.description,
            input.quantity.clone(),
            input.rate.clone(),
            input.discount_percentage.clone(),
            tax,
        )
    }

    /// Apply the line formula:
    ///
    /// ```text
    /// line_amount     = quantity * rate
    /// discount_amount = line_amount * discount_percentage / 100
    /// taxable_amount  = line_amount - discount_amount
    /// <component>     = taxable_amount * <component_rate> / 100
    /// line_total      = taxable_amount + cgst + sgst + igst + cess
    /// ```
    pub fn calculate(
        item_id: &str,
        description: &str,
        quantity: BigDecimal,
        rate: BigDecimal,
        discount_percentage: BigDecimal,
        tax: &ResolvedTaxRate,
    ) -> EngineResult<ComputedLine> {
        if item_id.trim().is_empty() {
            return Err(EngineError::validation("line.item_id", "cannot be empty"));
        }
        if quantity <= BigDecimal::from(0) {
            return Err(EngineError::validation(
                format!("line[{}].quantity", item_id),
                format!("must be greater than zero, got {}", quantity),
            ));
        }
        validate_non_negative_amount(&format!("line[{}].rate", item_id), &rate)?;
        validate_percentage(
            &format!("line[{}].discount_percentage", item_id),
            &discount_percentage,
        )?;

        let hundred = BigDecimal::from(100);
        let line_amount = &quantity * &rate;
        let discount_amount = &line_amount * &discount_percentage / &hundred;
        let taxable_amount = &line_amount - &discount_amount;
        let cgst_amount = &taxable_amount * &tax.cgst_rate / &hundred;
        let sgst_amount = &taxable_amount * &tax.sgst_rate / &hundred;
        let igst_amount = &taxable_amount * &tax.igst_rate / &hundred;
        let cess_amount = &taxable_amount * &tax.cess_rate / &hundred;
        let line_total =
            &taxable_amount + &cgst_amount + &sgst_amount + &igst_amount + &cess_amount;

        Ok(ComputedLine {
            item_id: item_id.to_string(),
            description: description.to_string(),
            quantity,
            rate,
            discount_percentage,
            tax: tax.clone(),
            line_amount,
            discount_amount,
            taxable_amount,
            cgst_amount,
            sgst_amount,
            igst_amount,
            cess_amount,
            line_total,
        })
    }
}
