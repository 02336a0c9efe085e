//! Traits for storage abstraction and extensibility

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::document::Document;
use crate::ledger::book::LedgerEntry;
use crate::reconciliation::returns::ReturnedQuantities;
use crate::types::*;

/// Storage abstraction for parties, documents and their ledgers
///
/// Ledger entries are append-only. Every append carries the sequence number
/// of the last entry the caller saw; a backend must refuse the write with
/// [`EngineError::ConcurrentModification`] when the party's ledger has moved
/// on since, so that only one writer at a time extends a party's ledger.
#[async_trait]
pub trait LedgerStorage: Send + Sync {
    /// Save a party to storage
    async fn save_party(&mut self, party: &Party) -> EngineResult<()>;

    /// Store a new party together with its opening entry, atomically.
    /// Fails when the party id is taken or the party already has entries.
    async fn register_party(&mut self, party: &Party, opening: &LedgerEntry) -> EngineResult<()>;

    /// Get a party by ID
    async fn get_party(&self, party_id: &str) -> EngineResult<Option<Party>>;

    /// List all parties, optionally filtered by kind
    async fn list_parties(&self, kind: Option<PartyKind>) -> EngineResult<Vec<Party>>;

    /// Save a draft or cancelled document. Posted documents are immutable
    /// and must be refused.
    async fn save_document(&mut self, document: &Document) -> EngineResult<()>;

    /// Get a document by ID
    async fn get_document(&self, document_id: &str) -> EngineResult<Option<Document>>;

    /// List a party's documents within a date range
    async fn get_party_documents(
        &self,
        party_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> EngineResult<Vec<Document>>;

    /// All ledger entries of a party in sequence order
    async fn get_party_entries(&self, party_id: &str) -> EngineResult<Vec<LedgerEntry>>;

    /// Append an entry that has no document of its own (opening balance,
    /// compensating entries)
    async fn append_entry(&mut self, entry: &LedgerEntry, expected_sequence: u64)
        -> EngineResult<()>;

    /// Store a posted document together with its ledger entry, atomically
    async fn post_document(
        &mut self,
        document: &Document,
        entry: &LedgerEntry,
        expected_sequence: u64,
    ) -> EngineResult<()>;

    /// Snapshot of quantities already returned against an origin document
    async fn get_returned_quantities(&self, origin_id: &str) -> EngineResult<ReturnedQuantities>;

    /// Store a posted return, its ledger entry and the origin's new
    /// returned-quantity snapshot, atomically. Fails when either the party
    /// sequence or the snapshot version has moved.
    async fn commit_return(
        &mut self,
        document: &Document,
        entry: &LedgerEntry,
        expected_sequence: u64,
        returned: &ReturnedQuantities,
        expected_version: u64,
    ) -> EngineResult<()>;
}

/// Trait for implementing custom party validation rules
pub trait PartyValidator: Send + Sync {
    /// Validate a party before it is registered
    fn validate_party(&self, party: &Party) -> EngineResult<()>;
}

/// Trait for implementing custom document validation rules
pub trait DocumentValidator: Send + Sync {
    /// Validate a document before it is saved or posted
    fn validate_document(&self, document: &Document) -> EngineResult<()>;
}

/// Default party validator with basic rules
pub struct DefaultPartyValidator;

impl PartyValidator for DefaultPartyValidator {
    fn validate_party(&self, party: &Party) -> EngineResult<()> {
        if party.name.trim().is_empty() {
            return Err(EngineError::validation("party.name", "cannot be empty"));
        }

        party.validate()
    }
}

/// Default document validator with structural rules only
pub struct DefaultDocumentValidator;

impl DocumentValidator for DefaultDocumentValidator {
    fn validate_document(&self, document: &Document) -> EngineResult<()> {
        document.validate()
    }
}
