//! Ledger Configuration
//!
//! Runtime parameters chosen by the host when a ledger is created.
//! Protocol constants that never change live in [`crate::constants`].

use serde::{Deserialize, Serialize};

use crate::constants::{issuance::DEFAULT_SUPPLY_CAP, limits::DEFAULT_MIN_DEPOSIT};
use crate::errors::{LedgerError, LedgerResult};
use crate::types::Amount;

/// Reward token emission schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleConfig {
    /// No reward token is issued
    None,
    /// Half of the remaining supply is issued every year
    Halving { supply_cap: Amount },
    /// Constant rate per second until the cap is reached
    Linear {
        rate_per_second: Amount,
        supply_cap: Amount,
    },
}

/// Parameters of one ledger instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Smallest accepted deposit in base units
    pub min_deposit: Amount,
    /// Time emission starts counting from
    pub reward_start_time: u64,
    /// Reward emission schedule
    pub schedule: ScheduleConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            min_deposit: DEFAULT_MIN_DEPOSIT,
            reward_start_time: 0,
            schedule: ScheduleConfig::Halving {
                supply_cap: DEFAULT_SUPPLY_CAP,
            },
        }
    }
}

impl LedgerConfig {
    /// Configuration without reward emission
    pub fn without_rewards() -> Self {
        Self {
            schedule: ScheduleConfig::None,
            ..Self::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> LedgerResult<()> {
        if self.min_deposit == 0 {
            return Err(LedgerError::InvalidConfig {
                reason: "min_deposit must be at least one base unit",
            });
        }
        match self.schedule {
            ScheduleConfig::None => {}
            ScheduleConfig::Halving { supply_cap } => {
                if supply_cap == 0 {
                    return Err(LedgerError::InvalidConfig {
                        reason: "halving schedule needs a non-zero supply cap",
                    });
                }
            }
            ScheduleConfig::Linear {
                rate_per_second,
                supply_cap,
            } => {
                if rate_per_second == 0 || supply_cap == 0 {
                    return Err(LedgerError::InvalidConfig {
                        reason: "linear schedule needs a non-zero rate and cap",
                    });
                }
            }
        }
        Ok(())
    }

    /// Encode as CBOR
    pub fn to_cbor(&self) -> LedgerResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(self, &mut bytes).map_err(|_| LedgerError::InvalidConfig {
            reason: "config could not be encoded",
        })?;
        Ok(bytes)
    }

    /// Decode from CBOR and validate
    pub fn from_cbor(bytes: &[u8]) -> LedgerResult<Self> {
        let config: Self = ciborium::de::from_reader(bytes).map_err(|_| LedgerError::InvalidConfig {
            reason: "config is not valid CBOR",
        })?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(LedgerConfig::default().validate().is_ok());
        assert!(LedgerConfig::without_rewards().validate().is_ok());
    }

    #[test]
    fn test_zero_min_deposit_rejected() {
        let config = LedgerConfig {
            min_deposit: 0,
            ..LedgerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(LedgerError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_linear_needs_rate() {
        let config = LedgerConfig {
            schedule: ScheduleConfig::Linear {
                rate_per_second: 0,
                supply_cap: 100,
            },
            ..LedgerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cbor_round_trip() {
        let config = LedgerConfig {
            min_deposit: 5,
            reward_start_time: 1_700_000_000,
            schedule: ScheduleConfig::Linear {
                rate_per_second: 1_000,
                supply_cap: 1_000_000,
            },
        };
        let bytes = config.to_cbor().unwrap();
        assert_eq!(LedgerConfig::from_cbor(&bytes).unwrap(), config);
    }

    #[test]
    fn test_cbor_garbage_rejected() {
        assert!(LedgerConfig::from_cbor(&[0xff, 0x00, 0x13]).is_err());
    }
}
