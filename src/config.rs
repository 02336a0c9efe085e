//! Engine configuration
//!
//! Defaults suit a paise-precise GST ledger. Every field can be supplied by
//! deserializing an [`EngineConfig`] from the host application's own config
//! source, or overridden from the environment with [`EngineConfig::from_env`]:
//!
//! | Variable | Field |
//! |---|---|
//! | `GST_LEDGER_HOME_STATE` | `home_state_code` |
//! | `GST_LEDGER_ROUNDING_SCALE` | `rounding.scale` |
//! | `GST_LEDGER_ROUNDING_MODE` | `rounding.mode` (`half_even` / `half_up`) |
//! | `GST_LEDGER_ALLOW_SETTLED_RETURNS` | `allow_returns_on_settled_documents` |
//! | `GST_LEDGER_ENFORCE_CREDIT_LIMIT` | `enforce_credit_limit` |

use bigdecimal::{BigDecimal, RoundingMode};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

use crate::ledger::aging::AgingBuckets;
use crate::types::{EngineError, EngineResult};
use crate::utils::validation::validate_state_code;

/// How a pre-rounding grand total is rounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingRule {
    /// Banker's rounding
    #[default]
    HalfEven,
    /// Commercial rounding, ties away from zero
    HalfUp,
}

impl RoundingRule {
    pub fn mode(&self) -> RoundingMode {
        match self {
            RoundingRule::HalfEven => RoundingMode::HalfEven,
            RoundingRule::HalfUp => RoundingMode::HalfUp,
        }
    }
}

impl FromStr for RoundingRule {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "half_even" | "bankers" => Ok(RoundingRule::HalfEven),
            "half_up" | "commercial" => Ok(RoundingRule::HalfUp),
            other => Err(EngineError::configuration(
                "rounding.mode",
                format!("unknown rounding mode '{}'; expected half_even or half_up", other),
            )),
        }
    }
}

/// Rounding applied to a document's grand total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundingPolicy {
    /// Decimal places kept: 2 rounds to the paisa, 0 to the rupee
    pub scale: i64,
    pub mode: RoundingRule,
}

impl Default for RoundingPolicy {
    fn default() -> Self {
        Self {
            scale: 2,
            mode: RoundingRule::HalfEven,
        }
    }
}

impl RoundingPolicy {
    /// Round to the whole rupee
    pub fn rupee(mode: RoundingRule) -> Self {
        Self { scale: 0, mode }
    }

    pub fn round(&self, amount: &BigDecimal) -> BigDecimal {
        amount.with_scale_round(self.scale, self.mode.mode())
    }
}

/// Tunables for tax computation, returns and the party ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// GST state code of the business running the ledger
    pub home_state_code: Option<String>,
    /// Allowed drift between a tax rate's total and its components
    pub rate_tolerance: BigDecimal,
    pub rounding: RoundingPolicy,
    /// Inclusive upper bounds (in days overdue) of the aging buckets
    pub aging_bucket_bounds: Vec<i64>,
    pub allow_returns_on_settled_documents: bool,
    pub enforce_credit_limit: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            home_state_code: None,
            rate_tolerance: BigDecimal::new(1.into(), 2),
            rounding: RoundingPolicy::default(),
            aging_bucket_bounds: vec![7, 30, 60],
            allow_returns_on_settled_documents: false,
            enforce_credit_limit: false,
        }
    }
}

impl EngineConfig {
    /// Defaults for a business registered in the given state
    pub fn for_home_state(state_code: impl Into<String>) -> Self {
        Self {
            home_state_code: Some(state_code.into()),
            ..Self::default()
        }
    }

    /// Defaults overlaid with `GST_LEDGER_*` environment variables
    pub fn from_env() -> EngineResult<Self> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup; split out so tests need not touch
    /// the process environment
    pub fn overlay<F>(mut self, lookup: F) -> EngineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(state) = lookup("GST_LEDGER_HOME_STATE") {
            debug!(state = %state, "Home state from environment");
            self.home_state_code = Some(state);
        }

        if let Some(scale) = lookup("GST_LEDGER_ROUNDING_SCALE") {
            self.rounding.scale = scale.parse().map_err(|_| {
                EngineError::configuration(
                    "rounding.scale",
                    format!("'{}' is not an integer", scale),
                )
            })?;
        }

        if let Some(mode) = lookup("GST_LEDGER_ROUNDING_MODE") {
            self.rounding.mode = mode.parse()?;
        }

        if let Some(flag) = lookup("GST_LEDGER_ALLOW_SETTLED_RETURNS") {
            self.allow_returns_on_settled_documents =
                parse_flag("allow_returns_on_settled_documents", &flag)?;
        }

        if let Some(flag) = lookup("GST_LEDGER_ENFORCE_CREDIT_LIMIT") {
            self.enforce_credit_limit = parse_flag("enforce_credit_limit", &flag)?;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if let Some(state) = &self.home_state_code {
            validate_state_code(state).map_err(|e| {
                EngineError::configuration("home_state_code", e.to_string())
            })?;
        }

        if self.rate_tolerance < BigDecimal::from(0) {
            return Err(EngineError::configuration(
                "rate_tolerance",
                "must not be negative",
            ));
        }

        if !(0..=4).contains(&self.rounding.scale) {
            return Err(EngineError::configuration(
                "rounding.scale",
                format!("{} is outside 0..=4", self.rounding.scale),
            ));
        }

        AgingBuckets::new(self.aging_bucket_bounds.clone())?;

        Ok(())
    }
}

fn parse_flag(subject: &str, value: &str) -> EngineResult<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(EngineError::configuration(
            subject,
            format!("'{}' is not a boolean", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rate_tolerance, BigDecimal::from_str("0.01").unwrap());
        assert_eq!(config.rounding.scale, 2);
        assert_eq!(config.aging_bucket_bounds, vec![7, 30, 60]);
    }

    #[test]
    fn test_overlay_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("GST_LEDGER_HOME_STATE", "29"),
            ("GST_LEDGER_ROUNDING_SCALE", "0"),
            ("GST_LEDGER_ROUNDING_MODE", "half_up"),
            ("GST_LEDGER_ENFORCE_CREDIT_LIMIT", "yes"),
        ]
        .into_iter()
        .collect();

        let config = EngineConfig::default()
            .overlay(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.home_state_code.as_deref(), Some("29"));
        assert_eq!(config.rounding, RoundingPolicy::rupee(RoundingRule::HalfUp));
        assert!(config.enforce_credit_limit);
        assert!(!config.allow_returns_on_settled_documents);
    }

    #[test]
    fn test_malformed_overlay_is_rejected() {
        let result = EngineConfig::default().overlay(|key| {
            (key == "GST_LEDGER_ROUNDING_MODE").then(|| "ceiling".to_string())
        });
        assert!(matches!(result, Err(EngineError::Configuration { .. })));

        let result = EngineConfig::default()
            .overlay(|key| (key == "GST_LEDGER_HOME_STATE").then(|| "XX".to_string()));
        assert!(matches!(result, Err(EngineError::Configuration { .. })));
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: EngineConfig = serde_json::from_str(
            r#"{"home_state_code": "27", "aging_bucket_bounds": [15, 45]}"#,
        )
        .unwrap();
        assert_eq!(config.home_state_code.as_deref(), Some("27"));
        assert_eq!(config.aging_bucket_bounds, vec![15, 45]);
        assert_eq!(config.rounding, RoundingPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unsorted_bucket_bounds_are_rejected() {
        let config = EngineConfig {
            aging_bucket_bounds: vec![30, 7],
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rounding_policy() {
        let amount = BigDecimal::from_str("1062.505").unwrap();
        let paise = RoundingPolicy::default();
        assert_eq!(paise.round(&amount), BigDecimal::from_str("1062.50").unwrap());

        let rupee = RoundingPolicy::rupee(RoundingRule::HalfUp);
        assert_eq!(
            rupee.round(&BigDecimal::from_str("424.5").unwrap()),
            BigDecimal::from(425)
        );
    }
}
