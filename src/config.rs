use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{AmortizationError, Result};
use crate::interest::DayCountConvention;

/// library configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmortizationConfig {
    /// tolerance for balance cross-checks (final balance, principal conservation)
    pub balance_tolerance: Money,
    /// upper bound on generated rows when the term is derived from a fixed payment
    pub max_periods: u32,
    /// day count used for daily accrual and prorated interest
    pub day_count_convention: DayCountConvention,
    pub cache: CacheConfig,
    pub scenarios: ScenarioConfig,
}

/// cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub default_ttl_seconds: i64,
}

/// parameters for the alternative scenario generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// balloon as a percentage of principal (20 for 20%)
    pub balloon_percentage: Decimal,
    /// rate increase applied per block in the stepped variable-rate scenario
    pub rate_step: Rate,
    /// number of steps after which the stepped rate stops increasing
    pub max_rate_steps: u32,
}

impl Default for AmortizationConfig {
    fn default() -> Self {
        Self {
            balance_tolerance: Money::from_decimal(dec!(0.02)),
            max_periods: 20_000,
            day_count_convention: DayCountConvention::Actual365,
            cache: CacheConfig::default(),
            scenarios: ScenarioConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 3600,
        }
    }
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            balloon_percentage: dec!(20),
            rate_step: Rate::from_bps(50),
            max_rate_steps: 4,
        }
    }
}

impl AmortizationConfig {
    /// parse from json; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: AmortizationConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.balance_tolerance.is_negative() {
            return Err(AmortizationError::InvalidConfiguration {
                message: format!("balance tolerance must not be negative, got {}", self.balance_tolerance),
            });
        }

        if self.max_periods == 0 {
            return Err(AmortizationError::InvalidConfiguration {
                message: "max periods must be positive".to_string(),
            });
        }

        if self.cache.default_ttl_seconds <= 0 {
            return Err(AmortizationError::InvalidConfiguration {
                message: format!("default ttl must be positive, got {}", self.cache.default_ttl_seconds),
            });
        }

        let balloon = self.scenarios.balloon_percentage;
        if balloon < Decimal::ZERO || balloon >= dec!(100) {
            return Err(AmortizationError::InvalidConfiguration {
                message: format!("balloon percentage must be in [0, 100), got {}", balloon),
            });
        }

        if self.scenarios.rate_step.is_negative() {
            return Err(AmortizationError::InvalidConfiguration {
                message: format!("rate step must not be negative, got {}", self.scenarios.rate_step),
            });
        }

        Ok(())
    }
}
