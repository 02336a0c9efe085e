//! Return reconciliation against an originating bill or invoice
//!
//! A return is priced from the origin's own finalized lines: the rate,
//! discount and resolved component rates of each origin line are reused
//! and only the quantity changes. Remaining returnable quantities are
//! checked against a versioned snapshot of what has already been returned,
//! and the snapshot version travels with the result so the store can refuse
//! a commit made from a stale snapshot.

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::config::{EngineConfig, RoundingPolicy};
use crate::document::{Document, DocumentStatus, DocumentType};
use crate::tax::ComputedLine;
use crate::types::*;

/// Quantities already returned against one origin document, per item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnedQuantities {
    pub origin_id: String,
    /// Bumped on every committed return against the origin
    pub version: u64,
    pub quantities: BTreeMap<String, BigDecimal>,
    /// Grand total of every committed return against the origin
    #[serde(default)]
    pub amount: BigDecimal,
}

impl ReturnedQuantities {
    /// Snapshot for an origin nothing has been returned against
    pub fn empty(origin_id: impl Into<String>) -> Self {
        Self {
            origin_id: origin_id.into(),
            version: 0,
            quantities: BTreeMap::new(),
            amount: BigDecimal::from(0),
        }
    }

    pub fn returned(&self, item_id: &str) -> BigDecimal {
        self.quantities
            .get(item_id)
            .cloned()
            .unwrap_or_else(|| BigDecimal::from(0))
    }

    /// Next snapshot after committing a return of `lines` worth `amount`
    pub fn with_returned(&self, lines: &[ComputedLine], amount: &BigDecimal) -> Self {
        let mut next = self.clone();
        next.amount += amount;
        for line in lines {
            *next
                .quantities
                .entry(line.item_id.clone())
                .or_insert_with(|| BigDecimal::from(0)) += &line.quantity;
        }
        next.version = self.version + 1;
        next
    }
}

/// A request to return items from a posted bill or invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnRequest {
    /// Id of the return document to create
    pub document_id: String,
    pub date: NaiveDate,
    /// Defaults to the origin's first allowed return type
    pub document_type: Option<DocumentType>,
    /// Item id to quantity being returned
    pub quantities: BTreeMap<String, BigDecimal>,
    pub reference: Option<String>,
}

impl ReturnRequest {
    pub fn new(document_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            document_id: document_id.into(),
            date,
            document_type: None,
            quantities: BTreeMap::new(),
            reference: None,
        }
    }

    pub fn item(mut self, item_id: impl Into<String>, quantity: BigDecimal) -> Self {
        self.quantities.insert(item_id.into(), quantity);
        self
    }

    pub fn as_type(mut self, document_type: DocumentType) -> Self {
        self.document_type = Some(document_type);
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// Result of a successful reconciliation, ready to be committed
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnOutcome {
    /// Posted return document
    pub document: Document,
    /// Snapshot to store once the return is committed
    pub returned: ReturnedQuantities,
    /// Version the snapshot was computed from
    pub expected_version: u64,
}

/// Validates and prices returns
#[derive(Debug, Clone)]
pub struct ReturnReconciler {
    rounding: RoundingPolicy,
    allow_settled: bool,
}

impl Default for ReturnReconciler {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl ReturnReconciler {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            rounding: config.rounding,
            allow_settled: config.allow_returns_on_settled_documents,
        }
    }

    /// Quantity still returnable for every item on the origin
    pub fn remaining_quantities(
        origin: &Document,
        already: &ReturnedQuantities,
    ) -> BTreeMap<String, BigDecimal> {
        origin
            .lines
            .iter()
            .map(|line| {
                let remaining = &line.quantity - already.returned(&line.item_id);
                (line.item_id.clone(), remaining)
            })
            .collect()
    }

    /// Validate `request` against `origin` and build the return document.
    ///
    /// `outstanding` is the origin's unsettled balance on the party ledger
    /// and `already` the snapshot of quantities returned so far; both must
    /// come from the same consistent read.
    pub fn reconcile(
        &self,
        origin: &Document,
        outstanding: &BigDecimal,
        already: &ReturnedQuantities,
        request: &ReturnRequest,
    ) -> EngineResult<ReturnOutcome> {
        let document_type = self.check_origin(origin, outstanding, already, request)?;

        let mut origin_lines: HashMap<&str, &ComputedLine> = HashMap::new();
        for line in &origin.lines {
            if origin_lines.insert(line.item_id.as_str(), line).is_some() {
                return Err(EngineError::validation(
                    "return.origin_id",
                    format!(
                        "origin {} has more than one line for item '{}'",
                        origin.id, line.item_id
                    ),
                ));
            }
        }

        let zero = BigDecimal::from(0);
        let mut lines = Vec::new();
        for (item_id, requested) in &request.quantities {
            let origin_line = origin_lines.get(item_id.as_str()).ok_or_else(|| {
                EngineError::validation(
                    format!("return.quantities[{}]", item_id),
                    format!("origin {} has no line for this item", origin.id),
                )
            })?;

            if *requested < zero {
                return Err(EngineError::validation(
                    format!("return.quantities[{}]", item_id),
                    format!("must not be negative, got {}", requested),
                ));
            }
            if *requested == zero {
                continue;
            }

            let max_returnable = &origin_line.quantity - already.returned(item_id);
            if *requested > max_returnable {
                return Err(EngineError::OverReturn {
                    origin_id: origin.id.clone(),
                    item_id: item_id.clone(),
                    requested: requested.clone(),
                    max_returnable: if max_returnable < zero {
                        zero.clone()
                    } else {
                        max_returnable
                    },
                });
            }

            lines.push(origin_line.with_quantity(requested.clone())?);
        }

        if lines.is_empty() {
            return Err(EngineError::validation(
                "return.quantities",
                "nothing to return",
            ));
        }

        let mut document = Document::new(
            request.document_id.clone(),
            document_type,
            origin.party_id.clone(),
            request.date,
        );
        document.origin_id = Some(origin.id.clone());
        document.reference = request.reference.clone();
        document.lines = lines;
        document.finalize(&self.rounding)?;
        cap_to_origin(origin, already, &mut document);

        let return_total = document.ledger_amount().unwrap_or_default();
        let returned = already.with_returned(&document.lines, &return_total);
        debug!(
            origin_id = %origin.id,
            document_id = %document.id,
            grand_total = ?document.ledger_amount(),
            version = returned.version,
            "Return reconciled"
        );

        Ok(ReturnOutcome {
            document,
            returned,
            expected_version: already.version,
        })
    }

    fn check_origin(
        &self,
        origin: &Document,
        outstanding: &BigDecimal,
        already: &ReturnedQuantities,
        request: &ReturnRequest,
    ) -> EngineResult<DocumentType> {
        let allowed = origin.document_type.return_types();
        let document_type = match request.document_type {
            Some(requested) if allowed.contains(&requested) => requested,
            Some(requested) => {
                return Err(EngineError::validation(
                    "return.document_type",
                    format!("a {} cannot be raised against a {}", requested, origin.document_type),
                ))
            }
            None => *allowed.first().ok_or_else(|| {
                EngineError::validation(
                    "return.origin_id",
                    format!("returns cannot be raised against a {}", origin.document_type),
                )
            })?,
        };

        if origin.status != DocumentStatus::Posted {
            return Err(EngineError::validation(
                "return.origin_id",
                format!("origin {} is {:?}, not posted", origin.id, origin.status),
            ));
        }
        if already.origin_id != origin.id {
            return Err(EngineError::validation(
                "return.origin_id",
                format!(
                    "returned-quantity snapshot belongs to {}, not {}",
                    already.origin_id, origin.id
                ),
            ));
        }
        if *outstanding <= BigDecimal::from(0) && !self.allow_settled {
            return Err(EngineError::validation(
                "return.origin_id",
                format!("origin {} is fully settled", origin.id),
            ));
        }
        if request.date < origin.date {
            return Err(EngineError::validation(
                "return.date",
                format!("{} is before the origin date {}", request.date, origin.date),
            ));
        }

        Ok(document_type)
    }
}

/// Rounding each return on its own can add up to more than the origin's
/// rounded grand total. A return is held to what is left of that total and
/// the difference goes into its round-off.
fn cap_to_origin(origin: &Document, already: &ReturnedQuantities, document: &mut Document) {
    let (Some(origin_total), Some(totals)) = (origin.ledger_amount(), document.totals.as_mut())
    else {
        return;
    };
    let remaining = origin_total - &already.amount;
    if remaining >= BigDecimal::from(0) && totals.grand_total > remaining {
        totals.round_off += &remaining - &totals.grand_total;
        totals.grand_total = remaining;
    }
}
