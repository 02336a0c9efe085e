//! Append-only ledger of one party's balance
//!
//! A [`PartyLedger`] is a pure, in-memory state machine. It is rebuilt from
//! stored entries with [`PartyLedger::from_entries`], extended with
//! [`PartyLedger::append_entry`] and never mutates an entry once appended:
//! corrections are new, compensating entries.
//!
//! Balances are signed from the party's point of view: positive means the
//! business owes a vendor, or a customer owes the business.

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::document::{Document, DocumentType};
use crate::ledger::aging::{AgingBuckets, OverdueExposure};
use crate::ledger::posting::Posting;
use crate::types::*;

/// What caused a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    OpeningBalance,
    Document(DocumentType),
    /// Exact negation of an earlier entry
    Compensation,
}

/// One immutable row of a party's ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub party_id: String,
    /// 1 for the opening entry, then contiguous
    pub sequence: u64,
    pub kind: EntryKind,
    pub document_id: Option<String>,
    /// Bill or invoice a return was raised against
    pub origin_id: Option<String>,
    pub date: NaiveDate,
    /// Set on bills and invoices
    pub due_date: Option<NaiveDate>,
    pub entry_type: EntryType,
    /// Unsigned amount on `entry_type`'s side
    pub amount: BigDecimal,
    /// Signed change in the balance owed
    pub delta: BigDecimal,
    pub running_balance: BigDecimal,
    /// Bills and invoices this entry settled, resolved at append time
    pub allocations: Vec<PaymentAllocation>,
    /// Sequence of the entry a compensation negates
    pub reverses: Option<u64>,
    pub reason: Option<String>,
    pub recorded_at: NaiveDateTime,
}

impl LedgerEntry {
    pub fn is_compensation(&self) -> bool {
        self.kind == EntryKind::Compensation
    }
}

/// Settlement state of one bill or invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenItem {
    pub document_id: String,
    pub document_type: DocumentType,
    pub date: NaiveDate,
    pub due_date: NaiveDate,
    pub total: BigDecimal,
    pub paid_amount: BigDecimal,
    pub returned_amount: BigDecimal,
    /// Return value beyond the balance left when the return was posted;
    /// settles the item again if a payment on it is reversed
    #[serde(default)]
    pub excess_returned: BigDecimal,
    /// Set when the posting was reversed
    pub voided: bool,
}

impl OpenItem {
    /// `total - paid - returned`; zero once voided
    pub fn balance_amount(&self) -> BigDecimal {
        if self.voided {
            BigDecimal::from(0)
        } else {
            &self.total - &self.paid_amount - &self.returned_amount
        }
    }

    pub fn is_settled(&self) -> bool {
        self.balance_amount() <= BigDecimal::from(0)
    }

    fn has_settlements(&self) -> bool {
        self.paid_amount > BigDecimal::from(0) || self.returned_amount > BigDecimal::from(0)
    }
}

/// Result of replaying a ledger up to a date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSummary {
    pub as_of: Option<NaiveDate>,
    pub opening_balance: BigDecimal,
    pub total_billed: BigDecimal,
    pub total_paid: BigDecimal,
    pub total_returned: BigDecimal,
    /// Net effect of compensating entries
    pub total_adjusted: BigDecimal,
    pub balance: BigDecimal,
    pub entry_count: usize,
}

impl BalanceSummary {
    fn empty(as_of: Option<NaiveDate>) -> Self {
        Self {
            as_of,
            opening_balance: BigDecimal::from(0),
            total_billed: BigDecimal::from(0),
            total_paid: BigDecimal::from(0),
            total_returned: BigDecimal::from(0),
            total_adjusted: BigDecimal::from(0),
            balance: BigDecimal::from(0),
            entry_count: 0,
        }
    }

    fn record(&mut self, entry: &LedgerEntry) {
        match entry.kind {
            EntryKind::OpeningBalance => self.opening_balance += &entry.delta,
            EntryKind::Document(t) if t.is_billing() => self.total_billed += &entry.amount,
            EntryKind::Document(DocumentType::Payment) => self.total_paid += &entry.amount,
            EntryKind::Document(_) => self.total_returned += &entry.amount,
            EntryKind::Compensation => self.total_adjusted += &entry.delta,
        }
        self.balance += &entry.delta;
        self.entry_count += 1;
    }
}

/// Statement of a party's ledger over a date range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub party_id: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Balance before `from`, including the opening entry
    pub opening_balance: BigDecimal,
    pub total_billed: BigDecimal,
    pub total_paid: BigDecimal,
    pub total_returned: BigDecimal,
    pub total_adjusted: BigDecimal,
    pub closing_balance: BigDecimal,
    pub entries: Vec<LedgerEntry>,
}

/// The per-party ledger state machine
#[derive(Debug, Clone)]
pub struct PartyLedger {
    party: Party,
    entries: Vec<LedgerEntry>,
    open_items: Vec<OpenItem>,
    reversed: HashSet<u64>,
    posted_documents: HashSet<String>,
    enforce_credit_limit: bool,
}

impl PartyLedger {
    /// Start a ledger with the party's opening entry
    pub fn open(party: Party) -> EngineResult<Self> {
        party.validate()?;

        let delta = party.signed_opening_balance();
        let opening = LedgerEntry {
            id: Uuid::new_v4(),
            party_id: party.id.clone(),
            sequence: 1,
            kind: EntryKind::OpeningBalance,
            document_id: None,
            origin_id: None,
            date: party.opening_date,
            due_date: None,
            entry_type: party.opening_side,
            amount: party.opening_balance.clone(),
            delta: delta.clone(),
            running_balance: delta,
            allocations: Vec::new(),
            reverses: None,
            reason: None,
            recorded_at: chrono::Utc::now().naive_utc(),
        };

        Ok(Self {
            party,
            entries: vec![opening],
            open_items: Vec::new(),
            reversed: HashSet::new(),
            posted_documents: HashSet::new(),
            enforce_credit_limit: false,
        })
    }

    /// Rebuild a ledger from stored entries, checking every running balance
    pub fn from_entries(party: Party, entries: Vec<LedgerEntry>) -> EngineResult<Self> {
        let mut entries = entries.into_iter();
        let opening = entries.next().ok_or_else(|| EngineError::LedgerIntegrity {
            party_id: party.id.clone(),
            sequence: 0,
            reason: "ledger has no opening entry".to_string(),
        })?;

        let integrity = |sequence: u64, reason: String| EngineError::LedgerIntegrity {
            party_id: party.id.clone(),
            sequence,
            reason,
        };
        if opening.kind != EntryKind::OpeningBalance || opening.sequence != 1 {
            return Err(integrity(
                opening.sequence,
                "first entry is not the opening balance".to_string(),
            ));
        }
        if opening.party_id != party.id {
            return Err(integrity(1, format!("entry belongs to party {}", opening.party_id)));
        }
        let expected = signed_amount(party.kind, opening.entry_type, &opening.amount);
        if opening.delta != expected || opening.running_balance != expected {
            return Err(integrity(
                1,
                format!(
                    "opening balance {} does not match its amount {}",
                    opening.running_balance, expected
                ),
            ));
        }

        let mut ledger = Self {
            party,
            entries: vec![opening],
            open_items: Vec::new(),
            reversed: HashSet::new(),
            posted_documents: HashSet::new(),
            enforce_credit_limit: false,
        };
        for entry in entries {
            ledger.replay_entry(entry)?;
        }

        debug!(
            party_id = %ledger.party.id,
            entries = ledger.entries.len(),
            balance = %ledger.balance(),
            "Ledger replayed"
        );
        Ok(ledger)
    }

    /// Reject, rather than warn about, postings beyond the credit limit
    pub fn with_credit_limit_enforcement(mut self, enforce: bool) -> Self {
        self.enforce_credit_limit = enforce;
        self
    }

    pub fn party(&self) -> &Party {
        &self.party
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn last_entry(&self) -> Option<&LedgerEntry> {
        self.entries.last()
    }

    /// Current running balance
    pub fn balance(&self) -> BigDecimal {
        self.entries
            .last()
            .map(|e| e.running_balance.clone())
            .unwrap_or_else(|| BigDecimal::from(0))
    }

    /// Sequence of the last entry; stores compare against it before appending
    pub fn version(&self) -> u64 {
        self.entries.last().map(|e| e.sequence).unwrap_or(0)
    }

    pub fn open_items(&self) -> &[OpenItem] {
        &self.open_items
    }

    pub fn open_item(&self, document_id: &str) -> Option<&OpenItem> {
        self.open_items
            .iter()
            .find(|item| item.document_id == document_id)
    }

    /// Unsettled items, oldest due first
    pub fn outstanding_items(&self) -> Vec<&OpenItem> {
        let mut items: Vec<&OpenItem> = self
            .open_items
            .iter()
            .filter(|item| !item.is_settled())
            .collect();
        items.sort_by_key(|item| item.due_date);
        items
    }

    /// Headroom under the party's credit limit, if it has one
    pub fn available_credit(&self) -> Option<BigDecimal> {
        self.party
            .credit_limit
            .as_ref()
            .map(|limit| limit - self.balance())
    }

    /// Post a finalized document and return the new balance
    pub fn append_entry(&mut self, document: &Document) -> EngineResult<BigDecimal> {
        let posting = Posting::from_document(document, &self.party)?;
        self.append_posting(posting)
    }

    /// [`append_entry`](Self::append_entry), provided the ledger is still at
    /// `expected_sequence`
    pub fn append_entry_checked(
        &mut self,
        document: &Document,
        expected_sequence: u64,
    ) -> EngineResult<BigDecimal> {
        let actual = self.version();
        if actual != expected_sequence {
            warn!(
                party_id = %self.party.id,
                expected = expected_sequence,
                actual,
                "Stale ledger version"
            );
            return Err(EngineError::ConcurrentModification {
                scope: format!("party {}", self.party.id),
                expected: expected_sequence,
                actual,
            });
        }
        self.append_entry(document)
    }

    /// Append the exact negation of entry `sequence`
    pub fn append_compensating_entry(
        &mut self,
        sequence: u64,
        date: NaiveDate,
        reason: impl Into<String>,
    ) -> EngineResult<BigDecimal> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(EngineError::validation("entry.reason", "a reason is required"));
        }

        let original = self
            .entries
            .iter()
            .find(|e| e.sequence == sequence)
            .cloned()
            .ok_or_else(|| {
                EngineError::validation("entry.sequence", format!("no entry {}", sequence))
            })?;

        match original.kind {
            EntryKind::OpeningBalance => {
                return Err(EngineError::validation(
                    "entry.sequence",
                    "the opening entry cannot be reversed",
                ))
            }
            EntryKind::Compensation => {
                return Err(EngineError::validation(
                    "entry.sequence",
                    "a compensating entry cannot itself be reversed",
                ))
            }
            EntryKind::Document(t) if t.is_return() => {
                return Err(EngineError::validation(
                    "entry.sequence",
                    "returns are corrected with a new bill or invoice, not reversed",
                ))
            }
            EntryKind::Document(_) => {}
        }

        if self.reversed.contains(&sequence) {
            return Err(EngineError::validation(
                "entry.sequence",
                format!("entry {} is already reversed", sequence),
            ));
        }
        if let Some(item) = original
            .document_id
            .as_deref()
            .and_then(|id| self.open_item(id))
        {
            if matches!(original.kind, EntryKind::Document(t) if t.is_billing())
                && item.has_settlements()
            {
                return Err(EngineError::validation(
                    "entry.sequence",
                    format!(
                        "{} has payments or returns applied; reverse those first",
                        item.document_id
                    ),
                ));
            }
        }
        self.check_date(date)?;

        let delta = -original.delta.clone();
        let running_balance = self.balance() + &delta;
        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            party_id: self.party.id.clone(),
            sequence: self.version() + 1,
            kind: EntryKind::Compensation,
            document_id: original.document_id.clone(),
            origin_id: original.origin_id.clone(),
            date,
            due_date: None,
            entry_type: original.entry_type.opposite(),
            amount: original.amount.clone(),
            delta,
            running_balance: running_balance.clone(),
            allocations: original.allocations.clone(),
            reverses: Some(sequence),
            reason: Some(reason),
            recorded_at: chrono::Utc::now().naive_utc(),
        };
        self.commit(entry)?;

        debug!(
            party_id = %self.party.id,
            reverses = sequence,
            balance = %running_balance,
            "Compensating entry appended"
        );
        Ok(running_balance)
    }

    /// Replay every entry dated on or before `as_of` (all when `None`)
    pub fn recompute_balance(&self, as_of: Option<NaiveDate>) -> BalanceSummary {
        let mut summary = BalanceSummary::empty(as_of);
        for entry in self
            .entries
            .iter()
            .filter(|e| as_of.is_none_or(|date| e.date <= date))
        {
            summary.record(entry);
        }
        summary
    }

    /// Statement for `from..=to`
    pub fn period_summary(&self, from: NaiveDate, to: NaiveDate) -> EngineResult<PeriodSummary> {
        if from > to {
            return Err(EngineError::validation(
                "period",
                format!("{} is after {}", from, to),
            ));
        }

        let mut prior = BalanceSummary::empty(Some(from));
        let mut movement = BalanceSummary::empty(Some(to));
        let mut entries = Vec::new();
        for entry in &self.entries {
            if entry.date > to {
                break;
            }
            if entry.date >= from {
                entries.push(entry.clone());
            }
            if entry.date < from || entry.kind == EntryKind::OpeningBalance {
                prior.record(entry);
            } else {
                movement.record(entry);
            }
        }

        Ok(PeriodSummary {
            party_id: self.party.id.clone(),
            from,
            to,
            closing_balance: &prior.balance + &movement.balance,
            opening_balance: prior.balance,
            total_billed: movement.total_billed,
            total_paid: movement.total_paid,
            total_returned: movement.total_returned,
            total_adjusted: movement.total_adjusted,
            entries,
        })
    }

    /// Overdue bills and invoices as of `today`, bucketed by age
    pub fn overdue_exposure(&self, today: NaiveDate, buckets: &AgingBuckets) -> OverdueExposure {
        buckets.classify(&self.party.id, today, &self.open_items)
    }

    /// Replay the ledger from scratch and compare it with the live state
    pub fn verify(&self) -> EngineResult<()> {
        let replayed = Self::from_entries(self.party.clone(), self.entries.clone())?;
        if replayed.balance() != self.balance() || replayed.open_items != self.open_items {
            return Err(EngineError::LedgerIntegrity {
                party_id: self.party.id.clone(),
                sequence: self.version(),
                reason: format!(
                    "replayed balance {} differs from live balance {}",
                    replayed.balance(),
                    self.balance()
                ),
            });
        }
        Ok(())
    }

    fn append_posting(&mut self, posting: Posting) -> EngineResult<BigDecimal> {
        if let Some(document_id) = &posting.document_id {
            if self.posted_documents.contains(document_id) {
                return Err(EngineError::not_postable(
                    document_id.clone(),
                    "already posted to this ledger",
                ));
            }
        }
        self.check_date(posting.date)?;

        let delta = posting.delta(self.party.kind);
        let allocations = self.resolve_allocations(&posting)?;
        let running_balance = self.balance() + &delta;
        self.check_credit_limit(&posting, &delta, &running_balance)?;

        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            party_id: self.party.id.clone(),
            sequence: self.version() + 1,
            kind: posting.kind,
            document_id: posting.document_id,
            origin_id: posting.origin_id,
            date: posting.date,
            due_date: posting.due_date,
            entry_type: posting.entry_type,
            amount: posting.amount,
            delta,
            running_balance: running_balance.clone(),
            allocations,
            reverses: None,
            reason: None,
            recorded_at: chrono::Utc::now().naive_utc(),
        };

        debug!(
            party_id = %entry.party_id,
            sequence = entry.sequence,
            document_id = ?entry.document_id,
            delta = %entry.delta,
            balance = %running_balance,
            "Ledger entry appended"
        );
        self.commit(entry)?;
        Ok(running_balance)
    }

    /// Work out which open items a payment or return settles
    fn resolve_allocations(&self, posting: &Posting) -> EngineResult<Vec<PaymentAllocation>> {
        let zero = BigDecimal::from(0);
        match posting.kind {
            EntryKind::Document(DocumentType::Payment) => {
                let mut planned: HashMap<&str, BigDecimal> = HashMap::new();
                let mut resolved = Vec::new();
                let mut remaining = posting.amount.clone();

                for allocation in &posting.allocations {
                    let item = self
                        .open_item(&allocation.document_id)
                        .filter(|item| !item.voided)
                        .ok_or_else(|| {
                            EngineError::validation(
                                "payment.allocations",
                                format!(
                                    "{} is not an open bill or invoice of party {}",
                                    allocation.document_id, self.party.id
                                ),
                            )
                        })?;
                    let applied = planned
                        .entry(item.document_id.as_str())
                        .or_insert_with(|| zero.clone());
                    *applied += &allocation.amount;
                    if *applied > item.balance_amount() {
                        return Err(EngineError::validation(
                            "payment.allocations",
                            format!(
                                "{} allocated to {} exceeds its balance of {}",
                                applied,
                                item.document_id,
                                item.balance_amount()
                            ),
                        ));
                    }
                    remaining -= &allocation.amount;
                    resolved.push(allocation.clone());
                }

                for item in self.outstanding_items() {
                    if remaining <= zero {
                        break;
                    }
                    let already = planned
                        .get(item.document_id.as_str())
                        .cloned()
                        .unwrap_or_else(|| zero.clone());
                    let available = item.balance_amount() - already;
                    if available <= zero {
                        continue;
                    }
                    let applied = if available < remaining { available } else { remaining.clone() };
                    remaining -= &applied;
                    resolved.push(PaymentAllocation::new(item.document_id.clone(), applied));
                }

                Ok(resolved)
            }
            EntryKind::Document(t) if t.is_return() => match &posting.origin_id {
                Some(origin_id) => {
                    let item = self
                        .open_item(origin_id)
                        .filter(|item| !item.voided)
                        .ok_or_else(|| {
                            EngineError::validation(
                                "document.origin_id",
                                format!(
                                    "{} is not on the ledger of party {}",
                                    origin_id, self.party.id
                                ),
                            )
                        })?;
                    let balance = item.balance_amount();
                    let applied = if balance < posting.amount {
                        balance
                    } else {
                        posting.amount.clone()
                    };
                    if applied > zero {
                        Ok(vec![PaymentAllocation::new(origin_id.clone(), applied)])
                    } else {
                        Ok(Vec::new())
                    }
                }
                None => Ok(Vec::new()),
            },
            _ => Ok(Vec::new()),
        }
    }

    fn check_credit_limit(
        &self,
        posting: &Posting,
        delta: &BigDecimal,
        running_balance: &BigDecimal,
    ) -> EngineResult<()> {
        let Some(limit) = &self.party.credit_limit else {
            return Ok(());
        };
        if *delta <= BigDecimal::from(0) || running_balance <= limit {
            return Ok(());
        }

        if self.enforce_credit_limit {
            return Err(EngineError::validation(
                "party.credit_limit",
                format!(
                    "posting {} would raise the balance of {} to {}, above its limit of {}",
                    posting.document_id.as_deref().unwrap_or("-"),
                    self.party.id,
                    running_balance,
                    limit
                ),
            ));
        }

        warn!(
            party_id = %self.party.id,
            document_id = ?posting.document_id,
            balance = %running_balance,
            limit = %limit,
            "Credit limit exceeded"
        );
        Ok(())
    }

    fn check_date(&self, date: NaiveDate) -> EngineResult<()> {
        match self.entries.last() {
            Some(last) if date < last.date => Err(EngineError::validation(
                "entry.date",
                format!(
                    "{} is before the last entry of party {} dated {}",
                    date, self.party.id, last.date
                ),
            )),
            _ => Ok(()),
        }
    }

    fn replay_entry(&mut self, entry: LedgerEntry) -> EngineResult<()> {
        let sequence = entry.sequence;
        let integrity = |reason: String| EngineError::LedgerIntegrity {
            party_id: self.party.id.clone(),
            sequence,
            reason,
        };

        if sequence != self.version() + 1 {
            return Err(integrity(format!("expected sequence {}", self.version() + 1)));
        }
        if entry.party_id != self.party.id {
            return Err(integrity(format!("entry belongs to party {}", entry.party_id)));
        }
        if entry.kind == EntryKind::OpeningBalance {
            return Err(integrity("second opening entry".to_string()));
        }
        if let Some(last) = self.entries.last() {
            if entry.date < last.date {
                return Err(integrity(format!(
                    "dated {} after an entry dated {}",
                    entry.date, last.date
                )));
            }
        }
        if entry.delta != signed_amount(self.party.kind, entry.entry_type, &entry.amount) {
            return Err(integrity(format!(
                "delta {} does not match {:?} {}",
                entry.delta, entry.entry_type, entry.amount
            )));
        }
        let expected = self.balance() + &entry.delta;
        if entry.running_balance != expected {
            return Err(integrity(format!(
                "stored running balance {} but replay gives {}",
                entry.running_balance, expected
            )));
        }

        self.commit(entry)
    }

    /// Apply an entry's effect on open items and append it
    fn commit(&mut self, entry: LedgerEntry) -> EngineResult<()> {
        let mut items = self.open_items.clone();
        self.apply_effects(&mut items, &entry)
            .map_err(|reason| EngineError::LedgerIntegrity {
                party_id: self.party.id.clone(),
                sequence: entry.sequence,
                reason,
            })?;

        self.open_items = items;
        if let EntryKind::Document(_) = entry.kind {
            if let Some(document_id) = &entry.document_id {
                self.posted_documents.insert(document_id.clone());
            }
        }
        if let Some(reversed) = entry.reverses {
            self.reversed.insert(reversed);
        }
        self.entries.push(entry);
        Ok(())
    }

    fn apply_effects(&self, items: &mut Vec<OpenItem>, entry: &LedgerEntry) -> Result<(), String> {
        match entry.kind {
            EntryKind::OpeningBalance => Ok(()),
            EntryKind::Document(DocumentType::PurchaseOrder) => {
                Err("purchase orders do not post".to_string())
            }
            EntryKind::Document(t) if t.is_billing() => {
                let document_id = entry
                    .document_id
                    .as_ref()
                    .ok_or_else(|| format!("{} entry without a document", t))?;
                if self.posted_documents.contains(document_id) {
                    return Err(format!("{} is posted twice", document_id));
                }
                items.push(OpenItem {
                    document_id: document_id.clone(),
                    document_type: t,
                    date: entry.date,
                    due_date: entry.due_date.unwrap_or(entry.date),
                    total: entry.amount.clone(),
                    paid_amount: BigDecimal::from(0),
                    returned_amount: BigDecimal::from(0),
                    excess_returned: BigDecimal::from(0),
                    voided: false,
                });
                Ok(())
            }
            EntryKind::Document(t) => {
                for allocation in &entry.allocations {
                    settle(items, allocation, t, false)?;
                }
                if let Some(origin_id) = entry.origin_id.as_deref() {
                    let applied: BigDecimal = entry.allocations.iter().map(|a| &a.amount).sum();
                    let excess = &entry.amount - applied;
                    if excess > BigDecimal::from(0) {
                        let item = items
                            .iter_mut()
                            .find(|item| item.document_id == origin_id && !item.voided)
                            .ok_or_else(|| format!("no open item for {}", origin_id))?;
                        item.excess_returned += excess;
                    }
                }
                Ok(())
            }
            EntryKind::Compensation => {
                let sequence = entry
                    .reverses
                    .ok_or_else(|| "compensation without a reversed entry".to_string())?;
                if self.reversed.contains(&sequence) {
                    return Err(format!("entry {} reversed twice", sequence));
                }
                let original = self
                    .entries
                    .iter()
                    .find(|e| e.sequence == sequence)
                    .ok_or_else(|| format!("reversed entry {} does not exist", sequence))?;
                if original.delta != -entry.delta.clone() {
                    return Err(format!("compensation does not negate entry {}", sequence));
                }

                match original.kind {
                    EntryKind::Document(t) if t.is_billing() => {
                        let document_id = original.document_id.as_deref().unwrap_or_default();
                        let item = items
                            .iter_mut()
                            .find(|item| item.document_id == document_id)
                            .ok_or_else(|| format!("no open item for {}", document_id))?;
                        if item.has_settlements() {
                            return Err(format!("{} still has settlements", document_id));
                        }
                        item.voided = true;
                        Ok(())
                    }
                    EntryKind::Document(DocumentType::Payment) => {
                        for allocation in &original.allocations {
                            settle(items, allocation, DocumentType::Payment, true)?;
                        }
                        Ok(())
                    }
                    _ => Err(format!("entry {} cannot be reversed", sequence)),
                }
            }
        }
    }
}

/// Apply (or undo) one allocation of a payment or return
fn settle(
    items: &mut [OpenItem],
    allocation: &PaymentAllocation,
    document_type: DocumentType,
    undo: bool,
) -> Result<(), String> {
    let item = items
        .iter_mut()
        .find(|item| item.document_id == allocation.document_id && !item.voided)
        .ok_or_else(|| format!("no open item for {}", allocation.document_id))?;

    let settled = if document_type == DocumentType::Payment {
        &mut item.paid_amount
    } else {
        &mut item.returned_amount
    };

    if undo {
        if *settled < allocation.amount {
            return Err(format!("cannot undo more than was settled on {}", allocation.document_id));
        }
        *settled -= &allocation.amount;
        if document_type == DocumentType::Payment {
            // Return value held back while the item was fully paid
            let balance = item.balance_amount();
            let reapplied = if item.excess_returned < balance {
                item.excess_returned.clone()
            } else {
                balance
            };
            if reapplied > BigDecimal::from(0) {
                item.excess_returned -= &reapplied;
                item.returned_amount += reapplied;
            }
        }
    } else {
        *settled += &allocation.amount;
        if item.balance_amount() < BigDecimal::from(0) {
            return Err(format!("{} settled beyond its total", allocation.document_id));
        }
    }
    Ok(())
}
