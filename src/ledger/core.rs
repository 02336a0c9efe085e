//! Main engine that coordinates parties, documents and their ledgers

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::instrument;

use crate::config::EngineConfig;
use crate::document::{Document, TaxContext};
use crate::ledger::aging::{AgingBuckets, OverdueExposure};
use crate::ledger::book::{BalanceSummary, LedgerEntry, PartyLedger, PeriodSummary};
use crate::ledger::posting::{PostingManager, PreparedPosting, PreparedReturn};
use crate::ledger::PartyManager;
use crate::reconciliation::{ReturnReconciler, ReturnRequest};
use crate::traits::*;
use crate::types::*;

/// Ledger engine that orchestrates tax, posting and reconciliation over a
/// storage backend
pub struct LedgerEngine<S: LedgerStorage> {
    party_manager: PartyManager<S>,
    posting_manager: PostingManager<S>,
    config: EngineConfig,
    buckets: AgingBuckets,
}

impl<S: LedgerStorage + Clone> LedgerEngine<S> {
    /// Create a new engine with the given storage backend
    pub fn new(storage: S, config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            party_manager: PartyManager::new(storage.clone()),
            posting_manager: PostingManager::new(storage, config.clone()),
            buckets: AgingBuckets::from_config(&config)?,
            config,
        })
    }

    /// Create a new engine with custom validators
    pub fn with_validators(
        storage: S,
        config: EngineConfig,
        party_validator: Box<dyn PartyValidator>,
        document_validator: Box<dyn DocumentValidator>,
    ) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            party_manager: PartyManager::with_validator(storage.clone(), party_validator),
            posting_manager: PostingManager::with_validator(
                storage,
                config.clone(),
                document_validator,
            ),
            buckets: AgingBuckets::from_config(&config)?,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // Party operations
    /// Register a party; its opening balance becomes ledger entry 1
    #[instrument(skip(self, party), fields(party_id = %party.id))]
    pub async fn register_party(&mut self, party: Party) -> EngineResult<PartyLedger> {
        self.party_manager.register_party(party).await
    }

    /// Get a party by ID
    pub async fn get_party(&self, party_id: &str) -> EngineResult<Option<Party>> {
        self.party_manager.get_party(party_id).await
    }

    /// List parties, optionally only one kind
    pub async fn list_parties(&self, kind: Option<PartyKind>) -> EngineResult<Vec<Party>> {
        self.party_manager.list_parties(kind).await
    }

    /// Tax context for documents exchanged with `party_id`
    pub async fn tax_context(&self, party_id: &str) -> EngineResult<TaxContext> {
        let party = self.party_manager.get_party_required(party_id).await?;
        TaxContext::for_party(&self.config, &party)
    }

    // Document operations
    /// Save a draft (or cancelled) document
    #[instrument(skip(self, document), fields(document_id = %document.id))]
    pub async fn save_draft(&mut self, document: &Document) -> EngineResult<()> {
        let party = self
            .party_manager
            .get_party_required(&document.party_id)
            .await?;
        self.posting_manager.save_draft(&party, document).await
    }

    /// Get a document by ID
    pub async fn get_document(&self, document_id: &str) -> EngineResult<Option<Document>> {
        self.posting_manager.storage.get_document(document_id).await
    }

    /// A party's documents within a date range
    pub async fn get_party_documents(
        &self,
        party_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> EngineResult<Vec<Document>> {
        self.posting_manager
            .storage
            .get_party_documents(party_id, start_date, end_date)
            .await
    }

    /// Finalize a stored draft and post it
    #[instrument(skip(self))]
    pub async fn finalize_and_post(&mut self, document_id: &str) -> EngineResult<LedgerEntry> {
        let mut document = self
            .get_document(document_id)
            .await?
            .ok_or_else(|| EngineError::DocumentNotFound(document_id.to_string()))?;
        document.finalize(&self.config.rounding)?;
        self.post_document(&document).await
    }

    /// Post a finalized document to its party's ledger
    #[instrument(skip(self, document), fields(document_id = %document.id))]
    pub async fn post_document(&mut self, document: &Document) -> EngineResult<LedgerEntry> {
        let prepared = self.prepare_posting(document).await?;
        self.posting_manager.commit(&prepared).await
    }

    /// First half of [`post_document`](Self::post_document): compute the
    /// entry against the current ledger without storing anything
    pub async fn prepare_posting(&self, document: &Document) -> EngineResult<PreparedPosting> {
        let party = self
            .party_manager
            .get_party_required(&document.party_id)
            .await?;
        self.posting_manager.prepare(&party, document).await
    }

    /// Second half of [`post_document`](Self::post_document); fails with
    /// `ConcurrentModification` when another writer got there first
    pub async fn commit_posting(
        &mut self,
        prepared: &PreparedPosting,
    ) -> EngineResult<LedgerEntry> {
        self.posting_manager.commit(prepared).await
    }

    // Return operations
    /// Create and post a return against a posted bill or invoice
    #[instrument(skip(self, request), fields(document_id = %request.document_id))]
    pub async fn create_return(
        &mut self,
        origin_id: &str,
        request: &ReturnRequest,
    ) -> EngineResult<Document> {
        let prepared = self.prepare_return(origin_id, request).await?;
        self.posting_manager.commit_return(&prepared).await
    }

    /// Reconcile a return without storing it
    pub async fn prepare_return(
        &self,
        origin_id: &str,
        request: &ReturnRequest,
    ) -> EngineResult<PreparedReturn> {
        let origin = self
            .get_document(origin_id)
            .await?
            .ok_or_else(|| EngineError::DocumentNotFound(origin_id.to_string()))?;
        let party = self
            .party_manager
            .get_party_required(&origin.party_id)
            .await?;
        self.posting_manager
            .prepare_return(&party, origin_id, request)
            .await
    }

    /// Store a prepared return
    pub async fn commit_return(&mut self, prepared: &PreparedReturn) -> EngineResult<Document> {
        self.posting_manager.commit_return(prepared).await
    }

    /// Quantities still returnable per item of a posted bill or invoice
    pub async fn returnable_quantities(
        &self,
        origin_id: &str,
    ) -> EngineResult<BTreeMap<String, BigDecimal>> {
        let origin = self
            .get_document(origin_id)
            .await?
            .ok_or_else(|| EngineError::DocumentNotFound(origin_id.to_string()))?;
        let already = self
            .posting_manager
            .storage
            .get_returned_quantities(origin_id)
            .await?;
        Ok(ReturnReconciler::remaining_quantities(&origin, &already))
    }

    /// Negate an earlier entry with a compensating entry
    #[instrument(skip(self, reason))]
    pub async fn compensate(
        &mut self,
        party_id: &str,
        sequence: u64,
        date: NaiveDate,
        reason: &str,
    ) -> EngineResult<LedgerEntry> {
        let party = self.party_manager.get_party_required(party_id).await?;
        self.posting_manager
            .compensate(&party, sequence, date, reason)
            .await
    }

    // Balance and reporting operations
    /// Rebuild a party's ledger from storage
    pub async fn ledger(&self, party_id: &str) -> EngineResult<PartyLedger> {
        let party = self.party_manager.get_party_required(party_id).await?;
        self.posting_manager.load_ledger(&party).await
    }

    /// Current balance of a party
    pub async fn balance(&self, party_id: &str) -> EngineResult<BigDecimal> {
        Ok(self.ledger(party_id).await?.balance())
    }

    /// Replay a party's ledger up to `as_of`
    pub async fn recompute_balance(
        &self,
        party_id: &str,
        as_of: Option<NaiveDate>,
    ) -> EngineResult<BalanceSummary> {
        Ok(self.ledger(party_id).await?.recompute_balance(as_of))
    }

    /// Overdue bills or invoices of a party, bucketed by age
    pub async fn overdue_exposure(
        &self,
        party_id: &str,
        today: NaiveDate,
    ) -> EngineResult<OverdueExposure> {
        Ok(self
            .ledger(party_id)
            .await?
            .overdue_exposure(today, &self.buckets))
    }

    /// Statement of a party's ledger for `from..=to`
    pub async fn period_summary(
        &self,
        party_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> EngineResult<PeriodSummary> {
        self.ledger(party_id).await?.period_summary(from, to)
    }

    /// Check a party's stored ledger replays to its own running balances
    pub async fn verify_party(&self, party_id: &str) -> EngineResult<()> {
        self.ledger(party_id).await?.verify()
    }
}
