//! In-memory storage implementation for testing

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::document::Document;
use crate::ledger::book::LedgerEntry;
use crate::reconciliation::returns::ReturnedQuantities;
use crate::traits::*;
use crate::types::*;

/// In-memory storage implementation for testing and development
///
/// Clones share the same underlying maps, so several engines built over
/// clones of one store contend for the same ledgers.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    parties: Arc<RwLock<HashMap<String, Party>>>,
    documents: Arc<RwLock<HashMap<String, Document>>>,
    entries: Arc<RwLock<HashMap<String, Vec<LedgerEntry>>>>,
    returns: Arc<RwLock<HashMap<String, ReturnedQuantities>>>,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self {
            parties: Arc::new(RwLock::new(HashMap::new())),
            documents: Arc::new(RwLock::new(HashMap::new())),
            entries: Arc::new(RwLock::new(HashMap::new())),
            returns: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) -> EngineResult<()> {
        write(&self.parties)?.clear();
        write(&self.documents)?.clear();
        write(&self.entries)?.clear();
        write(&self.returns)?.clear();
        Ok(())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> EngineResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| EngineError::Storage("memory store lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> EngineResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| EngineError::Storage("memory store lock poisoned".to_string()))
}

/// Compare-and-swap check on a party's last sequence
fn check_sequence(
    entries: &HashMap<String, Vec<LedgerEntry>>,
    entry: &LedgerEntry,
    expected_sequence: u64,
) -> EngineResult<()> {
    let actual = entries
        .get(&entry.party_id)
        .and_then(|party_entries| party_entries.last())
        .map(|last| last.sequence)
        .unwrap_or(0);

    if actual != expected_sequence {
        return Err(EngineError::ConcurrentModification {
            scope: format!("party {}", entry.party_id),
            expected: expected_sequence,
            actual,
        });
    }
    if entry.sequence != expected_sequence + 1 {
        return Err(EngineError::validation(
            "entry.sequence",
            format!(
                "entry {} does not follow {}",
                entry.sequence, expected_sequence
            ),
        ));
    }
    Ok(())
}

/// Posted documents are never overwritten
fn check_overwrite(documents: &HashMap<String, Document>, document: &Document) -> EngineResult<()> {
    match documents.get(&document.id) {
        Some(existing) if existing.is_posted() => Err(EngineError::validation(
            "document.id",
            format!("document {} is already posted", document.id),
        )),
        _ => Ok(()),
    }
}

#[async_trait]
impl LedgerStorage for MemoryStorage {
    async fn save_party(&mut self, party: &Party) -> EngineResult<()> {
        write(&self.parties)?.insert(party.id.clone(), party.clone());
        Ok(())
    }

    async fn register_party(&mut self, party: &Party, opening: &LedgerEntry) -> EngineResult<()> {
        if opening.party_id != party.id {
            return Err(EngineError::validation(
                "entry.party_id",
                format!("opening entry belongs to {}, not {}", opening.party_id, party.id),
            ));
        }

        let mut parties = write(&self.parties)?;
        let mut entries = write(&self.entries)?;
        if parties.contains_key(&party.id) {
            return Err(EngineError::validation(
                "party.id",
                format!("party '{}' already exists", party.id),
            ));
        }
        check_sequence(&entries, opening, 0)?;

        parties.insert(party.id.clone(), party.clone());
        entries.insert(party.id.clone(), vec![opening.clone()]);
        Ok(())
    }

    async fn get_party(&self, party_id: &str) -> EngineResult<Option<Party>> {
        Ok(read(&self.parties)?.get(party_id).cloned())
    }

    async fn list_parties(&self, kind: Option<PartyKind>) -> EngineResult<Vec<Party>> {
        let parties = read(&self.parties)?;
        let mut filtered: Vec<Party> = parties
            .values()
            .filter(|party| kind.is_none_or(|k| party.kind == k))
            .cloned()
            .collect();
        filtered.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(filtered)
    }

    async fn save_document(&mut self, document: &Document) -> EngineResult<()> {
        if document.is_posted() {
            return Err(EngineError::validation(
                "document.status",
                "posted documents are stored with their ledger entry",
            ));
        }
        let mut documents = write(&self.documents)?;
        check_overwrite(&documents, document)?;
        documents.insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn get_document(&self, document_id: &str) -> EngineResult<Option<Document>> {
        Ok(read(&self.documents)?.get(document_id).cloned())
    }

    async fn get_party_documents(
        &self,
        party_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> EngineResult<Vec<Document>> {
        let documents = read(&self.documents)?;
        let mut filtered: Vec<Document> = documents
            .values()
            .filter(|doc| {
                doc.party_id == party_id
                    && start_date.is_none_or(|start| doc.date >= start)
                    && end_date.is_none_or(|end| doc.date <= end)
            })
            .cloned()
            .collect();
        filtered.sort_by(|a, b| (a.date, a.created_at).cmp(&(b.date, b.created_at)));
        Ok(filtered)
    }

    async fn get_party_entries(&self, party_id: &str) -> EngineResult<Vec<LedgerEntry>> {
        Ok(read(&self.entries)?
            .get(party_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_entry(
        &mut self,
        entry: &LedgerEntry,
        expected_sequence: u64,
    ) -> EngineResult<()> {
        let mut entries = write(&self.entries)?;
        check_sequence(&entries, entry, expected_sequence)?;
        entries
            .entry(entry.party_id.clone())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn post_document(
        &mut self,
        document: &Document,
        entry: &LedgerEntry,
        expected_sequence: u64,
    ) -> EngineResult<()> {
        if !document.is_posted() || document.party_id != entry.party_id {
            return Err(EngineError::not_postable(
                document.id.clone(),
                "only a posted document can be stored with its party's entry",
            ));
        }

        let mut documents = write(&self.documents)?;
        let mut entries = write(&self.entries)?;
        check_overwrite(&documents, document)?;
        check_sequence(&entries, entry, expected_sequence)?;

        documents.insert(document.id.clone(), document.clone());
        entries
            .entry(entry.party_id.clone())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn get_returned_quantities(&self, origin_id: &str) -> EngineResult<ReturnedQuantities> {
        Ok(read(&self.returns)?
            .get(origin_id)
            .cloned()
            .unwrap_or_else(|| ReturnedQuantities::empty(origin_id)))
    }

    async fn commit_return(
        &mut self,
        document: &Document,
        entry: &LedgerEntry,
        expected_sequence: u64,
        returned: &ReturnedQuantities,
        expected_version: u64,
    ) -> EngineResult<()> {
        if !document.is_posted()
            || document.origin_id.as_deref() != Some(returned.origin_id.as_str())
        {
            return Err(EngineError::not_postable(
                document.id.clone(),
                "a return is stored posted, against the origin of its snapshot",
            ));
        }

        let mut documents = write(&self.documents)?;
        let mut entries = write(&self.entries)?;
        let mut returns = write(&self.returns)?;

        let actual_version = returns
            .get(&returned.origin_id)
            .map(|snapshot| snapshot.version)
            .unwrap_or(0);
        if actual_version != expected_version {
            return Err(EngineError::ConcurrentModification {
                scope: format!("returns against {}", returned.origin_id),
                expected: expected_version,
                actual: actual_version,
            });
        }
        if returned.version != expected_version + 1 {
            return Err(EngineError::validation(
                "returned.version",
                format!("snapshot {} does not follow {}", returned.version, expected_version),
            ));
        }
        check_overwrite(&documents, document)?;
        check_sequence(&entries, entry, expected_sequence)?;

        documents.insert(document.id.clone(), document.clone());
        entries
            .entry(entry.party_id.clone())
            .or_default()
            .push(entry.clone());
        returns.insert(returned.origin_id.clone(), returned.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::book::PartyLedger;
    use bigdecimal::BigDecimal;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn vendor() -> Party {
        Party::new(
            "v1".to_string(),
            "Acme".to_string(),
            PartyKind::Vendor,
            "27".to_string(),
            date(1),
        )
    }

    #[tokio::test]
    async fn test_append_requires_current_sequence() {
        let mut storage = MemoryStorage::new();
        let ledger = PartyLedger::open(vendor()).unwrap();
        let opening = ledger.entries()[0].clone();

        storage.append_entry(&opening, 0).await.unwrap();
        let err = storage.append_entry(&opening, 0).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::ConcurrentModification { expected: 0, actual: 1, .. }
        ));
        assert_eq!(storage.get_party_entries("v1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_register_party_is_all_or_nothing() {
        let mut first = MemoryStorage::new();
        let mut second = first.clone();

        let credit = vendor().with_opening_balance(BigDecimal::from(500), EntryType::Credit);
        let debit = vendor().with_opening_balance(BigDecimal::from(300), EntryType::Debit);
        let credit_ledger = PartyLedger::open(credit.clone()).unwrap();
        let debit_ledger = PartyLedger::open(debit).unwrap();

        first
            .register_party(credit_ledger.party(), &credit_ledger.entries()[0])
            .await
            .unwrap();
        assert!(matches!(
            second
                .register_party(debit_ledger.party(), &debit_ledger.entries()[0])
                .await,
            Err(EngineError::Validation { ref field, .. }) if field == "party.id"
        ));

        assert_eq!(second.get_party("v1").await.unwrap(), Some(credit));
        let entries = second.get_party_entries("v1").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0], credit_ledger.entries()[0]);

        // Entries left behind without a party still block registration
        let mut orphaned = MemoryStorage::new();
        orphaned.append_entry(&debit_ledger.entries()[0], 0).await.unwrap();
        assert!(matches!(
            orphaned
                .register_party(credit_ledger.party(), &credit_ledger.entries()[0])
                .await,
            Err(EngineError::ConcurrentModification { .. })
        ));
        assert!(orphaned.get_party("v1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_posted_documents_are_not_overwritten() {
        let mut storage = MemoryStorage::new();
        let mut payment = Document::payment(
            "PAY-1".to_string(),
            "v1".to_string(),
            date(2),
            BigDecimal::from(10),
        );
        storage.save_document(&payment).await.unwrap();

        payment.finalize(&Default::default()).unwrap();
        assert!(storage.save_document(&payment).await.is_err());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let mut storage = MemoryStorage::new();
        let other = storage.clone();
        storage.save_party(&vendor()).await.unwrap();

        assert!(other.get_party("v1").await.unwrap().is_some());
        assert_eq!(
            other.list_parties(Some(PartyKind::Customer)).await.unwrap().len(),
            0
        );

        other.clear().unwrap();
        assert!(storage.get_party("v1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_origin_has_empty_snapshot() {
        let storage = MemoryStorage::new();
        let snapshot = storage.get_returned_quantities("BILL-9").await.unwrap();
        assert_eq!(snapshot.version, 0);
        assert!(snapshot.quantities.is_empty());
    }
}
