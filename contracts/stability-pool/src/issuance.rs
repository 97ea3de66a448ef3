//! Reward Token Emission
//!
//! A schedule answers one question: how many reward tokens should have
//! been issued between `start` and `now`. The ledger issues the difference
//! between that figure and what it already issued into G.

use std::fmt;

use decimal_wad::{common::TrySub, rate::Rate};

use pool_ledger_common::{
    config::ScheduleConfig,
    constants::{
        issuance::{HALVING_ISSUANCE_FACTOR, SECONDS_PER_MINUTE},
        precision::ONE,
    },
    errors::{LedgerError, LedgerResult},
    math::mul_div_floor,
    types::Amount,
};

/// Source of the cumulative reward emission curve
pub trait RewardSchedule: fmt::Debug + Send + Sync {
    /// Total tokens due between `start` and `now`; zero when `now <= start`
    fn cumulative_issuance(&self, start: u64, now: u64) -> LedgerResult<Amount>;
}

/// Issues nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRewards;

impl RewardSchedule for NoRewards {
    fn cumulative_issuance(&self, _start: u64, _now: u64) -> LedgerResult<Amount> {
        Ok(0)
    }
}

/// `supply_cap * (1 - F^minutes)`: half of the remaining supply per year
#[derive(Debug, Clone, Copy)]
pub struct HalvingSchedule {
    pub supply_cap: Amount,
}

impl RewardSchedule for HalvingSchedule {
    fn cumulative_issuance(&self, start: u64, now: u64) -> LedgerResult<Amount> {
        // F^525600 = 0.5 with minutes as the time unit
        let minutes = now.saturating_sub(start) / SECONDS_PER_MINUTE;

        let one = Rate::one();
        let factor = Rate::from_scaled_val(HALVING_ISSUANCE_FACTOR);

        let rate = factor.try_pow(minutes).map_err(|_| LedgerError::Overflow)?;
        let fraction = one.try_sub(rate).map_err(|_| LedgerError::Overflow)?;

        let fraction = fraction
            .to_scaled_val::<u128>()
            .map_err(|_| LedgerError::Overflow)?;

        mul_div_floor(self.supply_cap, fraction, ONE)
    }
}

/// `rate_per_second * elapsed`, capped at `supply_cap`
#[derive(Debug, Clone, Copy)]
pub struct LinearSchedule {
    pub rate_per_second: Amount,
    pub supply_cap: Amount,
}

impl RewardSchedule for LinearSchedule {
    fn cumulative_issuance(&self, start: u64, now: u64) -> LedgerResult<Amount> {
        let elapsed = u128::from(now.saturating_sub(start));
        Ok(self
            .rate_per_second
            .saturating_mul(elapsed)
            .min(self.supply_cap))
    }
}

/// Build the schedule a configuration names
pub fn schedule_from_config(config: &ScheduleConfig) -> Box<dyn RewardSchedule> {
    match *config {
        ScheduleConfig::None => Box::new(NoRewards),
        ScheduleConfig::Halving { supply_cap } => Box::new(HalvingSchedule { supply_cap }),
        ScheduleConfig::Linear {
            rate_per_second,
            supply_cap,
        } => Box::new(LinearSchedule {
            rate_per_second,
            supply_cap,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pool_ledger_common::{
        assert_fuzzy_eq,
        constants::{issuance::SECONDS_PER_YEAR, token},
    };

    const CAP: Amount = 32_000_000 * token::ONE;

    #[test]
    fn test_halving_starts_at_zero() {
        let schedule = HalvingSchedule { supply_cap: CAP };
        assert_eq!(schedule.cumulative_issuance(1_000, 1_000).unwrap(), 0);
        // Less than a minute issues nothing
        assert_eq!(schedule.cumulative_issuance(1_000, 1_059).unwrap(), 0);
    }

    #[test]
    fn test_halving_issues_half_in_first_year() {
        let schedule = HalvingSchedule { supply_cap: CAP };
        let issued = schedule.cumulative_issuance(0, SECONDS_PER_YEAR).unwrap();
        // Within 0.001% of 16M
        assert_fuzzy_eq!(issued, CAP / 2, CAP / 100_000);
    }

    #[test]
    fn test_halving_two_years_is_three_quarters() {
        let schedule = HalvingSchedule { supply_cap: CAP };
        let issued = schedule.cumulative_issuance(0, 2 * SECONDS_PER_YEAR).unwrap();
        assert_fuzzy_eq!(issued, CAP / 4 * 3, CAP / 100_000);
    }

    #[test]
    fn test_halving_never_exceeds_cap() {
        let schedule = HalvingSchedule { supply_cap: CAP };
        let issued = schedule.cumulative_issuance(0, 50 * SECONDS_PER_YEAR).unwrap();
        assert!(issued <= CAP);
        assert_fuzzy_eq!(issued, CAP, CAP / 1_000_000_000);
    }

    #[test]
    fn test_backwards_time_issues_nothing() {
        let schedule = HalvingSchedule { supply_cap: CAP };
        assert_eq!(schedule.cumulative_issuance(5_000, 1_000).unwrap(), 0);

        let linear = LinearSchedule {
            rate_per_second: 10,
            supply_cap: 1_000,
        };
        assert_eq!(linear.cumulative_issuance(5_000, 1_000).unwrap(), 0);
    }

    #[test]
    fn test_linear_caps() {
        let linear = LinearSchedule {
            rate_per_second: 10,
            supply_cap: 1_000,
        };
        assert_eq!(linear.cumulative_issuance(0, 50).unwrap(), 500);
        assert_eq!(linear.cumulative_issuance(0, 500).unwrap(), 1_000);
    }

    #[test]
    fn test_schedule_from_config() {
        let schedule = schedule_from_config(&ScheduleConfig::None);
        assert_eq!(schedule.cumulative_issuance(0, u64::MAX).unwrap(), 0);

        let schedule = schedule_from_config(&ScheduleConfig::Linear {
            rate_per_second: 2,
            supply_cap: 100,
        });
        assert_eq!(schedule.cumulative_issuance(0, 10).unwrap(), 20);
    }

    #[quickcheck_macros::quickcheck]
    fn prop_halving_monotonic(a: u32, b: u32) -> bool {
        let schedule = HalvingSchedule { supply_cap: CAP };
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let lo = schedule.cumulative_issuance(0, u64::from(lo)).unwrap();
        let hi = schedule.cumulative_issuance(0, u64::from(hi)).unwrap();
        lo <= hi && hi <= CAP
    }
}
