//! Document posting and posting management

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::document::{Document, DocumentStatus, DocumentType};
use crate::ledger::book::{EntryKind, LedgerEntry, PartyLedger};
use crate::reconciliation::{ReturnOutcome, ReturnReconciler, ReturnRequest};
use crate::traits::*;
use crate::types::*;

/// A document's effect on one party's ledger, before it is sequenced
#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub party_id: String,
    pub kind: EntryKind,
    pub document_id: Option<String>,
    pub origin_id: Option<String>,
    pub date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub entry_type: EntryType,
    pub amount: BigDecimal,
    /// Explicit allocations requested by a payment
    pub allocations: Vec<PaymentAllocation>,
}

impl Posting {
    /// Derive the posting for a finalized document
    pub fn from_document(document: &Document, party: &Party) -> EngineResult<Self> {
        if document.party_id != party.id {
            return Err(EngineError::validation(
                "document.party_id",
                format!(
                    "document {} belongs to {}, not {}",
                    document.id, document.party_id, party.id
                ),
            ));
        }
        if !document.document_type.affects_ledger() {
            return Err(EngineError::not_postable(
                document.id.clone(),
                format!("a {} does not affect a party's balance", document.document_type),
            ));
        }
        if let Some(kind) = document.document_type.party_kind() {
            if kind != party.kind {
                return Err(EngineError::validation(
                    "document.document_type",
                    format!(
                        "a {} cannot be raised against {} {}",
                        document.document_type, party.kind, party.id
                    ),
                ));
            }
        }

        match document.status {
            DocumentStatus::Posted => {}
            DocumentStatus::Draft => {
                return Err(EngineError::not_postable(
                    document.id.clone(),
                    "totals are not finalized",
                ))
            }
            DocumentStatus::Cancelled => {
                return Err(EngineError::not_postable(
                    document.id.clone(),
                    "document is cancelled",
                ))
            }
        }
        document.validate()?;

        let amount = document
            .ledger_amount()
            .ok_or_else(|| {
                EngineError::not_postable(document.id.clone(), "document has no totals")
            })?;
        let due_date = if document.document_type.is_billing() {
            Some(document.effective_due_date(party.payment_terms_days)?)
        } else {
            None
        };

        Ok(Self {
            party_id: party.id.clone(),
            kind: EntryKind::Document(document.document_type),
            document_id: Some(document.id.clone()),
            origin_id: document.origin_id.clone(),
            date: document.date,
            due_date,
            entry_type: document.document_type.ledger_side(party.kind),
            amount,
            allocations: document.allocations.clone(),
        })
    }

    /// Signed change in the balance owed by or to a party of `kind`
    pub fn delta(&self, kind: PartyKind) -> BigDecimal {
        signed_amount(kind, self.entry_type, &self.amount)
    }
}

/// A posting computed against a ledger snapshot, waiting to be committed
#[derive(Debug, Clone)]
pub struct PreparedPosting {
    pub document: Document,
    pub entry: LedgerEntry,
    /// Ledger version the entry was computed from
    pub expected_sequence: u64,
}

/// A reconciled return computed against a ledger snapshot
#[derive(Debug, Clone)]
pub struct PreparedReturn {
    pub outcome: ReturnOutcome,
    pub entry: LedgerEntry,
    pub expected_sequence: u64,
}

/// Posting manager for moving documents onto party ledgers
pub struct PostingManager<S: LedgerStorage> {
    pub(crate) storage: S,
    validator: Box<dyn DocumentValidator>,
    config: EngineConfig,
}

impl<S: LedgerStorage> PostingManager<S> {
    /// Create a new posting manager
    pub fn new(storage: S, config: EngineConfig) -> Self {
        Self {
            storage,
            validator: Box::new(DefaultDocumentValidator),
            config,
        }
    }

    /// Create a new posting manager with custom validator
    pub fn with_validator(
        storage: S,
        config: EngineConfig,
        validator: Box<dyn DocumentValidator>,
    ) -> Self {
        Self {
            storage,
            validator,
            config,
        }
    }

    /// Rebuild a party's ledger from storage
    pub async fn load_ledger(&self, party: &Party) -> EngineResult<PartyLedger> {
        let entries = self.storage.get_party_entries(&party.id).await?;
        Ok(PartyLedger::from_entries(party.clone(), entries)?
            .with_credit_limit_enforcement(self.config.enforce_credit_limit))
    }

    /// Save a draft or cancelled document
    pub async fn save_draft(&mut self, party: &Party, document: &Document) -> EngineResult<()> {
        if document.is_posted() {
            return Err(EngineError::validation(
                "document.status",
                format!("document {} is posted; post it instead of saving", document.id),
            ));
        }
        check_party(document, party)?;
        self.validator.validate_document(document)?;
        self.storage.save_document(document).await
    }

    /// Compute the entry `document` would append, without storing it
    pub async fn prepare(
        &self,
        party: &Party,
        document: &Document,
    ) -> EngineResult<PreparedPosting> {
        let linked_return = match document.document_type {
            DocumentType::PurchaseReturn | DocumentType::SalesReturn => true,
            DocumentType::CreditNote => document.origin_id.is_some(),
            _ => false,
        };
        if linked_return {
            return Err(EngineError::not_postable(
                document.id.clone(),
                "returns against a bill or invoice are created through return reconciliation",
            ));
        }
        self.validator.validate_document(document)?;

        let mut ledger = self.load_ledger(party).await?;
        let expected_sequence = ledger.version();
        ledger.append_entry(document)?;
        let entry = last_entry(&ledger)?;

        Ok(PreparedPosting {
            document: document.clone(),
            entry,
            expected_sequence,
        })
    }

    /// Store a prepared posting, provided the ledger has not moved
    pub async fn commit(&mut self, prepared: &PreparedPosting) -> EngineResult<LedgerEntry> {
        let result = self
            .storage
            .post_document(&prepared.document, &prepared.entry, prepared.expected_sequence)
            .await;
        log_conflict(&result, &prepared.entry);
        result?;

        info!(
            party_id = %prepared.entry.party_id,
            document_id = %prepared.document.id,
            amount = %prepared.entry.amount,
            balance = %prepared.entry.running_balance,
            "Document posted"
        );
        Ok(prepared.entry.clone())
    }

    /// Post a finalized document
    pub async fn post(&mut self, party: &Party, document: &Document) -> EngineResult<LedgerEntry> {
        let prepared = self.prepare(party, document).await?;
        self.commit(&prepared).await
    }

    /// Reconcile a return against `origin_id` and compute its entry
    #[instrument(skip(self, party, request), fields(party_id = %party.id))]
    pub async fn prepare_return(
        &self,
        party: &Party,
        origin_id: &str,
        request: &ReturnRequest,
    ) -> EngineResult<PreparedReturn> {
        let origin = self
            .storage
            .get_document(origin_id)
            .await?
            .ok_or_else(|| EngineError::DocumentNotFound(origin_id.to_string()))?;
        check_party(&origin, party)?;

        let mut ledger = self.load_ledger(party).await?;
        let outstanding = ledger
            .open_item(origin_id)
            .map(|item| item.balance_amount())
            .ok_or_else(|| {
                EngineError::validation(
                    "return.origin_id",
                    format!("{} is not posted to the ledger of {}", origin_id, party.id),
                )
            })?;
        let already = self.storage.get_returned_quantities(origin_id).await?;

        let outcome = ReturnReconciler::new(&self.config).reconcile(
            &origin,
            &outstanding,
            &already,
            request,
        )?;
        self.validator.validate_document(&outcome.document)?;

        let expected_sequence = ledger.version();
        ledger.append_entry(&outcome.document)?;
        let entry = last_entry(&ledger)?;
        debug!(
            origin_id,
            document_id = %outcome.document.id,
            delta = %entry.delta,
            "Return prepared"
        );

        Ok(PreparedReturn {
            outcome,
            entry,
            expected_sequence,
        })
    }

    /// Store a prepared return, provided neither the ledger nor the origin's
    /// returned quantities have moved
    pub async fn commit_return(&mut self, prepared: &PreparedReturn) -> EngineResult<Document> {
        let outcome = &prepared.outcome;
        let result = self
            .storage
            .commit_return(
                &outcome.document,
                &prepared.entry,
                prepared.expected_sequence,
                &outcome.returned,
                outcome.expected_version,
            )
            .await;
        log_conflict(&result, &prepared.entry);
        result?;

        info!(
            party_id = %prepared.entry.party_id,
            document_id = %outcome.document.id,
            origin_id = %outcome.returned.origin_id,
            amount = %prepared.entry.amount,
            balance = %prepared.entry.running_balance,
            "Return committed"
        );
        Ok(outcome.document.clone())
    }

    /// Append a compensating entry for entry `sequence`
    pub async fn compensate(
        &mut self,
        party: &Party,
        sequence: u64,
        date: NaiveDate,
        reason: &str,
    ) -> EngineResult<LedgerEntry> {
        let mut ledger = self.load_ledger(party).await?;
        let expected_sequence = ledger.version();
        ledger.append_compensating_entry(sequence, date, reason)?;
        let entry = last_entry(&ledger)?;

        let result = self.storage.append_entry(&entry, expected_sequence).await;
        log_conflict(&result, &entry);
        result?;

        info!(
            party_id = %party.id,
            reverses = sequence,
            balance = %entry.running_balance,
            "Compensating entry recorded"
        );
        Ok(entry)
    }
}

fn check_party(document: &Document, party: &Party) -> EngineResult<()> {
    if document.party_id != party.id {
        return Err(EngineError::validation(
            "document.party_id",
            format!("document {} belongs to {}, not {}", document.id, document.party_id, party.id),
        ));
    }
    match document.document_type.party_kind() {
        Some(kind) if kind != party.kind => Err(EngineError::validation(
            "document.document_type",
            format!(
                "a {} cannot be raised against {} {}",
                document.document_type, party.kind, party.id
            ),
        )),
        _ => Ok(()),
    }
}

fn last_entry(ledger: &PartyLedger) -> EngineResult<LedgerEntry> {
    ledger.last_entry().cloned().ok_or_else(|| EngineError::LedgerIntegrity {
        party_id: ledger.party().id.clone(),
        sequence: 0,
        reason: "ledger has no entries".to_string(),
    })
}

fn log_conflict<T>(result: &EngineResult<T>, entry: &LedgerEntry) {
    if let Err(EngineError::ConcurrentModification {
        scope,
        expected,
        actual,
    }) = result
    {
        warn!(
            party_id = %entry.party_id,
            scope = %scope,
            expected,
            actual,
            "Commit rejected by concurrent writer"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoundingPolicy;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn customer() -> Party {
        Party::new(
            "c1".to_string(),
            "Retail Co".to_string(),
            PartyKind::Customer,
            "29".to_string(),
            date(1),
        )
    }

    fn posted_payment(party_id: &str) -> Document {
        let mut doc = Document::payment(
            "PAY-1".to_string(),
            party_id.to_string(),
            date(2),
            BigDecimal::from(500),
        );
        doc.finalize(&RoundingPolicy::default()).unwrap();
        doc
    }

    #[test]
    fn test_payment_from_customer_is_a_credit() {
        let posting = Posting::from_document(&posted_payment("c1"), &customer()).unwrap();
        assert_eq!(posting.entry_type, EntryType::Credit);
        assert_eq!(posting.delta(PartyKind::Customer), BigDecimal::from(-500));
        assert_eq!(posting.due_date, None);
    }

    #[test]
    fn test_purchase_order_is_not_postable() {
        let vendor = Party::new(
            "v1".to_string(),
            "Acme".to_string(),
            PartyKind::Vendor,
            "27".to_string(),
            date(1),
        );
        let mut po = Document::new(
            "PO-1".to_string(),
            DocumentType::PurchaseOrder,
            "v1".to_string(),
            date(2),
        );
        po.status = DocumentStatus::Posted;
        assert!(matches!(
            Posting::from_document(&po, &vendor),
            Err(EngineError::NotPostable { .. })
        ));
    }

    #[test]
    fn test_document_must_match_party() {
        assert!(Posting::from_document(&posted_payment("c2"), &customer()).is_err());

        let mut bill =
            Document::new("B-1".to_string(), DocumentType::Bill, "c1".to_string(), date(2));
        bill.status = DocumentStatus::Posted;
        assert!(matches!(
            Posting::from_document(&bill, &customer()),
            Err(EngineError::Validation { ref field, .. }) if field == "document.document_type"
        ));
    }

    #[test]
    fn test_cancelled_document_is_not_postable() {
        let mut doc = Document::payment(
            "PAY-1".to_string(),
            "c1".to_string(),
            date(2),
            BigDecimal::from(500),
        );
        doc.cancel().unwrap();
        assert!(matches!(
            Posting::from_document(&doc, &customer()),
            Err(EngineError::NotPostable { .. })
        ));
    }
}
