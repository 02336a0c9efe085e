//! Core types shared by the tax, document and ledger modules

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::utils::validation::{state_code_from_gstin, validate_gstin, validate_state_code};

/// The two kinds of business party tracked in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyKind {
    /// Supplier - the business owes them (accounts payable)
    Vendor,
    /// Buyer - they owe the business (accounts receivable)
    Customer,
}

impl PartyKind {
    /// Returns the side on which this party's balance owed grows.
    ///
    /// A vendor ledger behaves like a liability (credit-normal), a customer
    /// ledger like an asset (debit-normal).
    pub fn normal_balance(&self) -> EntryType {
        match self {
            PartyKind::Vendor => EntryType::Credit,
            PartyKind::Customer => EntryType::Debit,
        }
    }
}

impl std::fmt::Display for PartyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartyKind::Vendor => write!(f, "vendor"),
            PartyKind::Customer => write!(f, "customer"),
        }
    }
}

/// Debit or credit side of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Debit,
    Credit,
}

impl EntryType {
    /// The opposite side
    pub fn opposite(&self) -> EntryType {
        match self {
            EntryType::Debit => EntryType::Credit,
            EntryType::Credit => EntryType::Debit,
        }
    }
}

/// A vendor or customer whose balance is tracked in its own ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    /// Unique identifier for the party
    pub id: String,
    /// Display name
    pub name: String,
    /// Vendor or customer; fixed for the life of the ledger
    pub kind: PartyKind,
    /// Two-digit GST state code of the party's registered place of business
    pub state_code: String,
    /// Optional GSTIN; its first two digits must agree with `state_code`
    pub gstin: Option<String>,
    /// Balance carried in when the ledger was opened (unsigned)
    pub opening_balance: BigDecimal,
    /// Side of the opening balance. The normal side means the party is owed
    /// (vendor) or owes (customer); the opposite side is an advance.
    pub opening_side: EntryType,
    /// Date of the opening balance; no entry may be dated before it
    pub opening_date: NaiveDate,
    /// Maximum balance owed before postings are flagged
    pub credit_limit: Option<BigDecimal>,
    /// Days after the document date a bill or invoice falls due
    pub payment_terms_days: u32,
    /// When the party was created
    pub created_at: NaiveDateTime,
}

impl Party {
    /// Create a party with a zero opening balance on its normal side
    pub fn new(
        id: String,
        name: String,
        kind: PartyKind,
        state_code: String,
        opening_date: NaiveDate,
    ) -> Self {
        Self {
            id,
            name,
            kind,
            state_code,
            gstin: None,
            opening_balance: BigDecimal::from(0),
            opening_side: kind.normal_balance(),
            opening_date,
            credit_limit: None,
            payment_terms_days: 0,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    /// Create a party whose jurisdiction comes from its GSTIN
    pub fn from_gstin(
        id: String,
        name: String,
        kind: PartyKind,
        gstin: String,
        opening_date: NaiveDate,
    ) -> EngineResult<Self> {
        validate_gstin(&gstin)?;
        let state_code = state_code_from_gstin(&gstin)?;
        let mut party = Self::new(id, name, kind, state_code, opening_date);
        party.gstin = Some(gstin);
        Ok(party)
    }

    pub fn with_opening_balance(mut self, amount: BigDecimal, side: EntryType) -> Self {
        self.opening_balance = amount;
        self.opening_side = side;
        self
    }

    pub fn with_credit_limit(mut self, limit: BigDecimal) -> Self {
        self.credit_limit = Some(limit);
        self
    }

    pub fn with_payment_terms(mut self, days: u32) -> Self {
        self.payment_terms_days = days;
        self
    }

    /// Signed opening balance: positive when owed on the normal side
    pub fn signed_opening_balance(&self) -> BigDecimal {
        signed_amount(self.kind, self.opening_side, &self.opening_balance)
    }

    /// Check the party's jurisdiction and balances
    pub fn validate(&self) -> EngineResult<()> {
        if self.id.trim().is_empty() {
            return Err(EngineError::validation("party.id", "cannot be empty"));
        }
        if self.state_code.trim().is_empty() {
            return Err(EngineError::validation(
                "party.state_code",
                format!("party '{}' has no jurisdiction", self.id),
            ));
        }
        validate_state_code(&self.state_code)?;

        if let Some(gstin) = &self.gstin {
            validate_gstin(gstin)?;
            let gstin_state = state_code_from_gstin(gstin)?;
            if gstin_state != self.state_code {
                return Err(EngineError::validation(
                    "party.gstin",
                    format!(
                        "GSTIN state {} does not match party state {}",
                        gstin_state, self.state_code
                    ),
                ));
            }
        }

        if self.opening_balance < BigDecimal::from(0) {
            return Err(EngineError::validation(
                "party.opening_balance",
                "must not be negative; use opening_side for advances",
            ));
        }

        if let Some(limit) = &self.credit_limit {
            if *limit < BigDecimal::from(0) {
                return Err(EngineError::validation(
                    "party.credit_limit",
                    "must not be negative",
                ));
            }
        }

        Ok(())
    }
}

/// Turn an unsigned amount on one side into a signed change in balance owed
pub fn signed_amount(kind: PartyKind, side: EntryType, amount: &BigDecimal) -> BigDecimal {
    if kind.normal_balance() == side {
        amount.clone()
    } else {
        -amount.clone()
    }
}

/// Part of a payment or return applied against one bill or invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAllocation {
    /// Bill or invoice being settled
    pub document_id: String,
    pub amount: BigDecimal,
}

impl PaymentAllocation {
    pub fn new(document_id: String, amount: BigDecimal) -> Self {
        Self {
            document_id,
            amount,
        }
    }
}

/// Errors raised by the engine. Every variant is recoverable by the caller.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Validation error on {field}: {reason}")]
    Validation { field: String, reason: String },
    #[error("Configuration error in {subject}: {reason}")]
    Configuration { subject: String, reason: String },
    #[error(
        "Over-return on {origin_id} for item {item_id}: requested {requested}, \
         at most {max_returnable} can still be returned"
    )]
    OverReturn {
        origin_id: String,
        item_id: String,
        requested: BigDecimal,
        max_returnable: BigDecimal,
    },
    #[error("Document {document_id} cannot be posted: {reason}")]
    NotPostable { document_id: String, reason: String },
    #[error("Concurrent modification of {scope}: expected version {expected}, found {actual}")]
    ConcurrentModification {
        scope: String,
        expected: u64,
        actual: u64,
    },
    #[error("Ledger integrity violation for party {party_id} at entry {sequence}: {reason}")]
    LedgerIntegrity {
        party_id: String,
        sequence: u64,
        reason: String,
    },
    #[error("Party not found: {0}")]
    PartyNotFound(String),
    #[error("Document not found: {0}")]
    DocumentNotFound(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl EngineError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::Configuration {
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    pub fn not_postable(document_id: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::NotPostable {
            document_id: document_id.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
