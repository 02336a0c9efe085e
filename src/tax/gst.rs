//! GST rate records and jurisdiction-based rate resolution

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::types::{EngineError, EngineResult};
use crate::utils::validation::validate_state_code;

/// A named GST rate as configured by the user.
///
/// A record normally carries both splits: `cgst + sgst == total` for
/// intrastate supply and `igst == total` for interstate supply. Components
/// left at zero are treated as not configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxRate {
    /// Display name, e.g. "GST 18%"
    pub name: String,
    /// Total GST rate percentage (e.g., 18 for 18%)
    pub total_rate: BigDecimal,
    /// CGST rate percentage (Central GST)
    pub cgst_rate: BigDecimal,
    /// SGST rate percentage (State GST)
    pub sgst_rate: BigDecimal,
    /// IGST rate percentage (Integrated GST)
    pub igst_rate: BigDecimal,
    /// Compensation cess percentage, charged in both regimes
    pub cess_rate: BigDecimal,
}

impl TaxRate {
    /// Create a fully populated rate record from its total
    pub fn new(name: impl Into<String>, total_rate: BigDecimal) -> Self {
        let half_rate = &total_rate / BigDecimal::from(2);
        Self {
            name: name.into(),
            cgst_rate: half_rate.clone(),
            sgst_rate: half_rate,
            igst_rate: total_rate.clone(),
            total_rate,
            cess_rate: BigDecimal::from(0),
        }
    }

    pub fn with_cess(mut self, cess_rate: BigDecimal) -> Self {
        self.cess_rate = cess_rate;
        self
    }

    /// Check the record is internally consistent within `tolerance`
    /// percentage points
    pub fn validate(&self, tolerance: &BigDecimal) -> EngineResult<()> {
        let zero = BigDecimal::from(0);

        for (label, value) in [
            ("total", &self.total_rate),
            ("cgst", &self.cgst_rate),
            ("sgst", &self.sgst_rate),
            ("igst", &self.igst_rate),
            ("cess", &self.cess_rate),
        ] {
            if *value < zero || *value > BigDecimal::from(100) {
                return Err(EngineError::configuration(
                    &self.name,
                    format!("{} rate {} is outside 0..=100", label, value),
                ));
            }
        }

        if self.cgst_rate != zero || self.sgst_rate != zero {
            let intrastate_total = &self.cgst_rate + &self.sgst_rate;
            if (&intrastate_total - &self.total_rate).abs() > *tolerance {
                return Err(EngineError::configuration(
                    &self.name,
                    format!(
                        "CGST + SGST = {} does not match total rate {}",
                        intrastate_total, self.total_rate
                    ),
                ));
            }
            if (&self.cgst_rate - &self.sgst_rate).abs() > *tolerance {
                return Err(EngineError::configuration(
                    &self.name,
                    format!(
                        "CGST {} and SGST {} must be equal",
                        self.cgst_rate, self.sgst_rate
                    ),
                ));
            }
        }

        if self.igst_rate != zero && (&self.igst_rate - &self.total_rate).abs() > *tolerance {
            return Err(EngineError::configuration(
                &self.name,
                format!(
                    "IGST {} does not match total rate {}",
                    self.igst_rate, self.total_rate
                ),
            ));
        }

        Ok(())
    }
}

/// Standard GST slabs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GstCategory {
    /// Essential items (food, medicines, etc.) - 0%
    Essential,
    /// Reduced rate items - 5%
    Reduced,
    /// Standard rate items - 12%
    Standard,
    /// Higher rate items - 18%
    Higher,
    /// Luxury/Sin goods - 28%
    Luxury,
}

impl GstCategory {
    /// Get the standard GST rate for this category
    pub fn rate(&self) -> BigDecimal {
        match self {
            GstCategory::Essential => BigDecimal::from(0),
            GstCategory::Reduced => BigDecimal::from(5),
            GstCategory::Standard => BigDecimal::from(12),
            GstCategory::Higher => BigDecimal::from(18),
            GstCategory::Luxury => BigDecimal::from(28),
        }
    }

    /// A consistent rate record for this slab
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::new(format!("GST {}%", self.rate()), self.rate())
    }
}

/// Whether a supply stays within one state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplyType {
    /// Seller and buyer share a state: CGST + SGST
    Intrastate,
    /// Different states: IGST
    Interstate,
}

/// Component rates that apply to one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTaxRate {
    /// Name of the record this was resolved from
    pub rate_name: String,
    pub supply_type: SupplyType,
    pub total_rate: BigDecimal,
    pub cgst_rate: BigDecimal,
    pub sgst_rate: BigDecimal,
    pub igst_rate: BigDecimal,
    pub cess_rate: BigDecimal,
}

impl ResolvedTaxRate {
    /// Sum of all component rates
    pub fn effective_rate(&self) -> BigDecimal {
        &self.cgst_rate + &self.sgst_rate + &self.igst_rate + &self.cess_rate
    }
}

/// Decides the intrastate/interstate split for a transaction
#[derive(Debug, Clone)]
pub struct TaxRateResolver {
    tolerance: BigDecimal,
}

impl Default for TaxRateResolver {
    fn default() -> Self {
        Self::new(BigDecimal::new(1.into(), 2))
    }
}

impl TaxRateResolver {
    /// Create a resolver that accepts rate records within `tolerance`
    pub fn new(tolerance: BigDecimal) -> Self {
        Self { tolerance }
    }

    /// Classify a supply by the two parties' state codes
    pub fn supply_type(&self, seller_state: &str, buyer_state: &str) -> EngineResult<SupplyType> {
        validate_jurisdiction("seller_state", seller_state)?;
        validate_jurisdiction("buyer_state", buyer_state)?;

        if seller_state == buyer_state {
            Ok(SupplyType::Intrastate)
        } else {
            Ok(SupplyType::Interstate)
        }
    }

    /// Resolve the component rates for a supply between two states
    pub fn resolve(
        &self,
        seller_state: &str,
        buyer_state: &str,
        tax_rate: &TaxRate,
    ) -> EngineResult<ResolvedTaxRate> {
        tax_rate.validate(&self.tolerance)?;
        let supply_type = self.supply_type(seller_state, buyer_state)?;
        Ok(Self::split(tax_rate, supply_type))
    }

    /// Split a validated rate for a known supply type
    pub fn split(tax_rate: &TaxRate, supply_type: SupplyType) -> ResolvedTaxRate {
        let zero = BigDecimal::from(0);
        let (cgst_rate, sgst_rate, igst_rate) = match supply_type {
            SupplyType::Intrastate => {
                let half_rate = &tax_rate.total_rate / BigDecimal::from(2);
                (half_rate.clone(), half_rate, zero)
            }
            SupplyType::Interstate => (zero.clone(), zero, tax_rate.total_rate.clone()),
        };

        ResolvedTaxRate {
            rate_name: tax_rate.name.clone(),
            supply_type,
            total_rate: tax_rate.total_rate.clone(),
            cgst_rate,
            sgst_rate,
            igst_rate,
            cess_rate: tax_rate.cess_rate.clone(),
        }
    }
}

fn validate_jurisdiction(field: &str, state_code: &str) -> EngineResult<()> {
    if state_code.trim().is_empty() {
        return Err(EngineError::validation(field, "jurisdiction is missing"));
    }
    validate_state_code(state_code).map_err(|_| {
        EngineError::validation(field, format!("'{}' is not a GST state code", state_code))
    })
}
