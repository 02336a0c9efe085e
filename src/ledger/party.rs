//! Party registration and lookup

use tracing::info;

use crate::ledger::book::PartyLedger;
use crate::traits::*;
use crate::types::*;

/// Party manager for registering vendors and customers
pub struct PartyManager<S: LedgerStorage> {
    pub(crate) storage: S,
    validator: Box<dyn PartyValidator>,
}

impl<S: LedgerStorage> PartyManager<S> {
    /// Create a new party manager
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            validator: Box::new(DefaultPartyValidator),
        }
    }

    /// Create a new party manager with custom validator
    pub fn with_validator(storage: S, validator: Box<dyn PartyValidator>) -> Self {
        Self { storage, validator }
    }

    /// Register a party and write its opening entry; a concurrent
    /// registration of the same id fails in storage
    pub async fn register_party(&mut self, party: Party) -> EngineResult<PartyLedger> {
        self.validator.validate_party(&party)?;

        if self.storage.get_party(&party.id).await?.is_some() {
            return Err(EngineError::validation(
                "party.id",
                format!("party '{}' already exists", party.id),
            ));
        }

        let ledger = PartyLedger::open(party)?;
        let opening = ledger
            .entries()
            .first()
            .cloned()
            .ok_or_else(|| EngineError::LedgerIntegrity {
                party_id: ledger.party().id.clone(),
                sequence: 1,
                reason: "opening entry missing".to_string(),
            })?;

        self.storage.register_party(ledger.party(), &opening).await?;

        info!(
            party_id = %ledger.party().id,
            kind = %ledger.party().kind,
            opening_balance = %ledger.balance(),
            "Party registered"
        );
        Ok(ledger)
    }

    /// Get a party by ID
    pub async fn get_party(&self, party_id: &str) -> EngineResult<Option<Party>> {
        self.storage.get_party(party_id).await
    }

    /// Get a party by ID, returning an error if not found
    pub async fn get_party_required(&self, party_id: &str) -> EngineResult<Party> {
        self.storage
            .get_party(party_id)
            .await?
            .ok_or_else(|| EngineError::PartyNotFound(party_id.to_string()))
    }

    /// List parties, optionally only one kind
    pub async fn list_parties(&self, kind: Option<PartyKind>) -> EngineResult<Vec<Party>> {
        self.storage.list_parties(kind).await
    }
}
