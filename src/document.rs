//! Business documents and their lifecycle

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::{EngineConfig, RoundingPolicy};
use crate::tax::{ComputedLine, DocumentTotals, LineInput, LineItemCalculator, TaxRateResolver};
use crate::types::*;
use crate::utils::validation::validate_positive_amount;

/// Kinds of document the engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    PurchaseOrder,
    Bill,
    PurchaseReturn,
    Payment,
    Invoice,
    SalesReturn,
    CreditNote,
}

impl DocumentType {
    /// The party kind this document is raised against; `None` for either
    pub fn party_kind(&self) -> Option<PartyKind> {
        match self {
            DocumentType::PurchaseOrder | DocumentType::Bill | DocumentType::PurchaseReturn => {
                Some(PartyKind::Vendor)
            }
            DocumentType::Invoice | DocumentType::SalesReturn | DocumentType::CreditNote => {
                Some(PartyKind::Customer)
            }
            DocumentType::Payment => None,
        }
    }

    pub fn has_lines(&self) -> bool {
        !matches!(self, DocumentType::Payment)
    }

    /// Bills and invoices open an item that payments and returns settle
    pub fn is_billing(&self) -> bool {
        matches!(self, DocumentType::Bill | DocumentType::Invoice)
    }

    pub fn is_return(&self) -> bool {
        matches!(
            self,
            DocumentType::PurchaseReturn | DocumentType::SalesReturn | DocumentType::CreditNote
        )
    }

    /// Whether the document changes a party's balance at all
    pub fn affects_ledger(&self) -> bool {
        !matches!(self, DocumentType::PurchaseOrder)
    }

    /// Side of the party's ledger this document posts to
    pub fn ledger_side(&self, kind: PartyKind) -> EntryType {
        if self.is_billing() {
            kind.normal_balance()
        } else {
            kind.normal_balance().opposite()
        }
    }

    /// Return document types allowed against this origin type
    pub fn return_types(&self) -> &'static [DocumentType] {
        match self {
            DocumentType::Bill => &[DocumentType::PurchaseReturn],
            DocumentType::Invoice => &[DocumentType::SalesReturn, DocumentType::CreditNote],
            _ => &[],
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DocumentType::PurchaseOrder => "purchase_order",
            DocumentType::Bill => "bill",
            DocumentType::PurchaseReturn => "purchase_return",
            DocumentType::Payment => "payment",
            DocumentType::Invoice => "invoice",
            DocumentType::SalesReturn => "sales_return",
            DocumentType::CreditNote => "credit_note",
        };
        write!(f, "{}", name)
    }
}

/// Where a document is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Editable; totals may still change
    Draft,
    /// Finalized (received/issued); totals are frozen
    Posted,
    Cancelled,
}

/// Jurisdictions and policies used to price a document's lines
#[derive(Debug, Clone)]
pub struct TaxContext {
    pub seller_state: String,
    pub buyer_state: String,
    pub resolver: TaxRateResolver,
    pub rounding: RoundingPolicy,
}

impl TaxContext {
    pub fn new(
        seller_state: impl Into<String>,
        buyer_state: impl Into<String>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            seller_state: seller_state.into(),
            buyer_state: buyer_state.into(),
            resolver: TaxRateResolver::new(config.rate_tolerance.clone()),
            rounding: config.rounding,
        }
    }

    /// Context for trading with `party`: vendors sell to the business,
    /// the business sells to customers
    pub fn for_party(config: &EngineConfig, party: &Party) -> EngineResult<Self> {
        let home = config.home_state_code.as_deref().ok_or_else(|| {
            EngineError::validation(
                "home_state_code",
                "the business jurisdiction is not configured",
            )
        })?;

        Ok(match party.kind {
            PartyKind::Vendor => Self::new(party.state_code.clone(), home, config),
            PartyKind::Customer => Self::new(home, party.state_code.clone(), config),
        })
    }

    /// Price one line input
    pub fn compute_line(&self, input: &LineInput) -> EngineResult<ComputedLine> {
        let resolved = self
            .resolver
            .resolve(&self.seller_state, &self.buyer_state, &input.tax_rate)?;
        LineItemCalculator::compute(input, &resolved)
    }
}

/// A business document affecting (or, for purchase orders, anticipating)
/// a party's balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub document_type: DocumentType,
    pub party_id: String,
    pub date: NaiveDate,
    /// Explicit due date; falls back to the party's payment terms
    pub due_date: Option<NaiveDate>,
    pub status: DocumentStatus,
    pub lines: Vec<ComputedLine>,
    /// Cached aggregate of `lines`, always recomputed by the engine
    pub totals: Option<DocumentTotals>,
    /// Amount paid, for payments only
    pub amount: Option<BigDecimal>,
    /// Bills or invoices a payment explicitly settles
    pub allocations: Vec<PaymentAllocation>,
    /// Bill or invoice a return is raised against
    pub origin_id: Option<String>,
    /// Free-form reference (vendor bill number, cheque number, ...)
    pub reference: Option<String>,
    pub created_at: NaiveDateTime,
}

impl Document {
    /// Create an empty draft
    pub fn new(id: String, document_type: DocumentType, party_id: String, date: NaiveDate) -> Self {
        Self {
            id,
            document_type,
            party_id,
            date,
            due_date: None,
            status: DocumentStatus::Draft,
            lines: Vec::new(),
            totals: None,
            amount: None,
            allocations: Vec::new(),
            origin_id: None,
            reference: None,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    /// Create a draft payment
    pub fn payment(id: String, party_id: String, date: NaiveDate, amount: BigDecimal) -> Self {
        let mut document = Self::new(id, DocumentType::Payment, party_id, date);
        document.amount = Some(amount);
        document
    }

    /// Earmark part of a payment for one bill or invoice
    pub fn with_allocation(mut self, document_id: impl Into<String>, amount: BigDecimal) -> Self {
        self.allocations
            .push(PaymentAllocation::new(document_id.into(), amount));
        self
    }

    pub fn is_draft(&self) -> bool {
        self.status == DocumentStatus::Draft
    }

    pub fn is_posted(&self) -> bool {
        self.status == DocumentStatus::Posted
    }

    /// Amount this document moves on the party's ledger, once known
    pub fn ledger_amount(&self) -> Option<BigDecimal> {
        if self.document_type.has_lines() {
            self.totals.as_ref().map(|t| t.grand_total.clone())
        } else {
            self.amount.clone()
        }
    }

    /// Due date given the party's payment terms
    pub fn effective_due_date(&self, payment_terms_days: u32) -> EngineResult<NaiveDate> {
        if let Some(due) = self.due_date {
            return Ok(due);
        }
        self.date
            .checked_add_days(chrono::Days::new(u64::from(payment_terms_days)))
            .ok_or_else(|| {
                EngineError::validation(
                    "document.due_date",
                    format!("payment terms of {} days overflow the calendar", payment_terms_days),
                )
            })
    }

    /// Price and append a line; drafts only
    pub fn add_line(&mut self, input: &LineInput, ctx: &TaxContext) -> EngineResult<()> {
        self.ensure_editable()?;
        if self.lines.iter().any(|line| line.item_id == input.item_id) {
            return Err(EngineError::validation(
                "document.lines",
                format!("item '{}' already has a line", input.item_id),
            ));
        }
        let line = ctx.compute_line(input)?;
        self.lines.push(line);
        self.totals = Some(DocumentTotals::from_lines(&self.lines, &ctx.rounding));
        Ok(())
    }

    /// Remove the line for `item_id`; drafts only
    pub fn remove_line(&mut self, item_id: &str, rounding: &RoundingPolicy) -> EngineResult<()> {
        self.ensure_editable()?;
        let before = self.lines.len();
        self.lines.retain(|line| line.item_id != item_id);
        if self.lines.len() == before {
            return Err(EngineError::validation(
                "document.lines",
                format!("no line for item '{}'", item_id),
            ));
        }
        self.totals = Some(DocumentTotals::from_lines(&self.lines, rounding));
        Ok(())
    }

    /// Recompute every line from its own terms and freeze the totals
    pub fn finalize(&mut self, rounding: &RoundingPolicy) -> EngineResult<()> {
        if !self.is_draft() {
            return Err(EngineError::validation(
                "document.status",
                format!("document {} is {:?}; only drafts can be finalized", self.id, self.status),
            ));
        }

        if self.document_type.has_lines() {
            let lines = self
                .lines
                .iter()
                .map(|line| line.with_quantity(line.quantity.clone()))
                .collect::<EngineResult<Vec<_>>>()?;
            self.totals = Some(DocumentTotals::from_lines(&lines, rounding));
            self.lines = lines;
        }

        self.validate()?;
        self.status = DocumentStatus::Posted;
        Ok(())
    }

    /// Cancel a draft
    pub fn cancel(&mut self) -> EngineResult<()> {
        self.ensure_editable()?;
        self.status = DocumentStatus::Cancelled;
        Ok(())
    }

    /// Structural checks that hold for drafts and posted documents alike
    pub fn validate(&self) -> EngineResult<()> {
        if self.id.trim().is_empty() {
            return Err(EngineError::validation("document.id", "cannot be empty"));
        }
        if self.party_id.trim().is_empty() {
            return Err(EngineError::validation("document.party_id", "cannot be empty"));
        }
        if let Some(due) = self.due_date {
            if due < self.date {
                return Err(EngineError::validation(
                    "document.due_date",
                    format!("{} is before the document date {}", due, self.date),
                ));
            }
        }

        if self.document_type.has_lines() {
            if self.amount.is_some() || !self.allocations.is_empty() {
                return Err(EngineError::validation(
                    "document.amount",
                    format!("a {} is priced from its lines", self.document_type),
                ));
            }
            if !self.is_draft() && self.lines.is_empty() {
                return Err(EngineError::validation(
                    "document.lines",
                    format!("a {} needs at least one line", self.document_type),
                ));
            }
            // Returns are keyed by item_id
            let mut items = HashSet::new();
            for line in &self.lines {
                if !items.insert(line.item_id.as_str()) {
                    return Err(EngineError::validation(
                        "document.lines",
                        format!("item '{}' appears on more than one line", line.item_id),
                    ));
                }
            }
        } else {
            if !self.lines.is_empty() {
                return Err(EngineError::validation(
                    "document.lines",
                    "a payment has no lines",
                ));
            }
            let amount = self
                .amount
                .as_ref()
                .ok_or_else(|| {
                    EngineError::validation("document.amount", "a payment needs an amount")
                })?;
            validate_positive_amount("document.amount", amount)?;

            let mut allocated = BigDecimal::from(0);
            for allocation in &self.allocations {
                validate_positive_amount("document.allocations", &allocation.amount)?;
                allocated += &allocation.amount;
            }
            if allocated > *amount {
                return Err(EngineError::validation(
                    "document.allocations",
                    format!("allocations of {} exceed the payment of {}", allocated, amount),
                ));
            }
        }

        match self.document_type {
            DocumentType::PurchaseReturn | DocumentType::SalesReturn
                if self.origin_id.is_none() =>
            {
                Err(EngineError::validation(
                    "document.origin_id",
                    format!("a {} must reference its origin", self.document_type),
                ))
            }
            DocumentType::CreditNote | DocumentType::PurchaseReturn | DocumentType::SalesReturn => {
                Ok(())
            }
            _ if self.origin_id.is_some() => Err(EngineError::validation(
                "document.origin_id",
                format!("a {} cannot reference an origin", self.document_type),
            )),
            _ => Ok(()),
        }
    }

    fn ensure_editable(&self) -> EngineResult<()> {
        if self.is_draft() {
            Ok(())
        } else {
            Err(EngineError::validation(
                "document.status",
                format!("document {} is {:?} and can no longer change", self.id, self.status),
            ))
        }
    }
}

/// Builder for line-bearing documents
#[derive(Debug)]
pub struct DocumentBuilder {
    document: Document,
    inputs: Vec<LineInput>,
}

impl DocumentBuilder {
    pub fn new(id: String, document_type: DocumentType, party_id: String, date: NaiveDate) -> Self {
        Self {
            document: Document::new(id, document_type, party_id, date),
            inputs: Vec::new(),
        }
    }

    pub fn due_date(mut self, due_date: NaiveDate) -> Self {
        self.document.due_date = Some(due_date);
        self
    }

    pub fn reference(mut self, reference: String) -> Self {
        self.document.reference = Some(reference);
        self
    }

    pub fn origin(mut self, origin_id: String) -> Self {
        self.document.origin_id = Some(origin_id);
        self
    }

    pub fn line(mut self, input: LineInput) -> Self {
        self.inputs.push(input);
        self
    }

    /// Price every line and return the draft
    pub fn build(self, ctx: &TaxContext) -> EngineResult<Document> {
        let mut document = self.document;
        if !document.document_type.has_lines() {
            return Err(EngineError::validation(
                "document.document_type",
                "payments are created with Document::payment",
            ));
        }
        for input in &self.inputs {
            document.add_line(input, ctx)?;
        }
        if document.totals.is_none() {
            document.totals = Some(DocumentTotals::from_lines(&[], &ctx.rounding));
        }
        document.validate()?;
        Ok(document)
    }

    /// Price every line and finalize in one step
    pub fn build_posted(self, ctx: &TaxContext) -> EngineResult<Document> {
        let rounding = ctx.rounding;
        let mut document = self.build(ctx)?;
        document.finalize(&rounding)?;
        Ok(document)
    }
}
