//! Overdue exposure and aging buckets

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::document::DocumentType;
use crate::ledger::book::OpenItem;
use crate::types::*;

/// Age ranges, in days overdue, that exposure is reported in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgingBuckets {
    /// Inclusive upper bounds; the last bucket is open-ended
    bounds: Vec<i64>,
}

impl Default for AgingBuckets {
    fn default() -> Self {
        Self {
            bounds: vec![7, 30, 60],
        }
    }
}

impl AgingBuckets {
    pub fn new(bounds: Vec<i64>) -> EngineResult<Self> {
        if bounds.is_empty() {
            return Err(EngineError::configuration(
                "aging_bucket_bounds",
                "at least one bound is required",
            ));
        }
        if bounds[0] < 1 || bounds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(EngineError::configuration(
                "aging_bucket_bounds",
                "bounds must be positive and strictly increasing",
            ));
        }
        Ok(Self { bounds })
    }

    pub fn from_config(config: &EngineConfig) -> EngineResult<Self> {
        Self::new(config.aging_bucket_bounds.clone())
    }

    /// Empty buckets labelled "0-7", "8-30", "31-60", "61+" for the defaults
    fn empty_buckets(&self) -> Vec<AgingBucket> {
        let mut buckets = Vec::with_capacity(self.bounds.len() + 1);
        let mut min_days = 0;
        for bound in &self.bounds {
            buckets.push(AgingBucket {
                label: format!("{}-{}", min_days, bound),
                min_days,
                max_days: Some(*bound),
                amount: BigDecimal::from(0),
                documents: 0,
            });
            min_days = bound + 1;
        }
        buckets.push(AgingBucket {
            label: format!("{}+", min_days),
            min_days,
            max_days: None,
            amount: BigDecimal::from(0),
            documents: 0,
        });
        buckets
    }

    fn index_for(&self, days_overdue: i64) -> usize {
        self.bounds
            .iter()
            .position(|bound| days_overdue <= *bound)
            .unwrap_or(self.bounds.len())
    }

    /// Bucket every item due before `today` that still carries a balance
    pub fn classify(
        &self,
        party_id: &str,
        today: NaiveDate,
        items: &[OpenItem],
    ) -> OverdueExposure {
        let mut buckets = self.empty_buckets();
        let mut overdue = Vec::new();
        let mut total = BigDecimal::from(0);

        for item in items {
            let balance_amount = item.balance_amount();
            if item.due_date >= today || balance_amount <= BigDecimal::from(0) {
                continue;
            }

            let days_overdue = (today - item.due_date).num_days();
            let bucket = &mut buckets[self.index_for(days_overdue)];
            bucket.amount += &balance_amount;
            bucket.documents += 1;
            total += &balance_amount;

            overdue.push(OverdueItem {
                document_id: item.document_id.clone(),
                document_type: item.document_type,
                due_date: item.due_date,
                days_overdue,
                balance_amount,
                bucket: bucket.label.clone(),
            });
        }

        overdue.sort_by(|a, b| b.days_overdue.cmp(&a.days_overdue));

        OverdueExposure {
            party_id: party_id.to_string(),
            as_of: today,
            total,
            buckets,
            items: overdue,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgingBucket {
    pub label: String,
    pub min_days: i64,
    /// `None` for the open-ended last bucket
    pub max_days: Option<i64>,
    pub amount: BigDecimal,
    pub documents: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverdueItem {
    pub document_id: String,
    pub document_type: DocumentType,
    pub due_date: NaiveDate,
    pub days_overdue: i64,
    pub balance_amount: BigDecimal,
    pub bucket: String,
}

/// Overdue bills or invoices of one party, most overdue first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverdueExposure {
    pub party_id: String,
    pub as_of: NaiveDate,
    pub total: BigDecimal,
    pub buckets: Vec<AgingBucket>,
    pub items: Vec<OverdueItem>,
}

impl OverdueExposure {
    pub fn bucket(&self, label: &str) -> Option<&AgingBucket> {
        self.buckets.iter().find(|b| b.label == label)
    }
}
