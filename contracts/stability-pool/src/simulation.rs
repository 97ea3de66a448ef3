//! Stress Simulation
//!
//! Drives a seeded random sequence of deposits, withdrawals, claims and
//! liquidation offsets through a [`PoolLedger`] and an [`AssetBook`],
//! checking pool invariants after every step. Two thirds of the depositors
//! come through one of two registered front ends.
//!
//! ## Invariants
//!
//! 1. Pooled asset held by the book equals the ledger's total deposits
//! 2. Sum of compounded balances never exceeds total deposits
//! 3. Collateral and reward paid or held never exceed what entered the pool
//! 4. Collateral held for depositors is covered by the book's reserve
//! 5. (epoch, scale) only moves forward

use rand::{rngs::StdRng, Rng, SeedableRng};

use pool_ledger_common::{
    config::{LedgerConfig, ScheduleConfig},
    constants::{precision::ONE, token},
    errors::{LedgerError, LedgerResult},
    types::{
        depositor_id, Amount, ClaimRequest, DepositRequest, DepositorId, FrontEndClaimRequest,
        FrontEndId, Gains, OffsetRequest, PoolStats, RegisterFrontEndRequest, WithdrawRequest,
    },
};

use crate::interfaces::{
    settle_claim, settle_deposit, settle_front_end_claim, settle_withdrawal, AssetBook, AssetMover,
    LiquidationSource,
};
use crate::ledger::PoolLedger;

// ============================================================================
// Constants
// ============================================================================

/// Seed for deterministic randomness
pub const DEFAULT_SEED: u64 = 42;

/// Default number of simulated operations
pub const DEFAULT_STEPS: u64 = 2_000;

/// Wallet funding per depositor, in multiples of the maximum deposit
const WALLET_MULTIPLE: Amount = 100;

/// Kickback rates of the simulated front ends
const FRONT_END_KICKBACKS: [u128; 2] = [ONE / 2, ONE / 10 * 9];

// ============================================================================
// Types
// ============================================================================

/// Simulation configuration
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Random seed
    pub seed: u64,
    /// Operations to run
    pub steps: u64,
    /// Number of distinct depositors
    pub depositors: u64,
    /// Largest single deposit
    pub max_deposit: Amount,
    /// Seconds between operations
    pub seconds_per_step: u64,
    /// Percentage of steps that are offsets
    pub offset_percent: u32,
    /// Reward emission
    pub schedule: ScheduleConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            steps: DEFAULT_STEPS,
            depositors: 20,
            max_deposit: 10_000 * token::ONE,
            seconds_per_step: 600,
            offset_percent: 30,
            schedule: LedgerConfig::default().schedule,
        }
    }
}

/// Types of pool invariants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantType {
    /// Book holdings equal ledger total deposits
    HoldingsMatchLedger,
    /// Sum of balances never above total deposits
    DepositsConserved,
    /// Collateral paid plus held never exceeds collateral absorbed
    CollateralPayoutBounded,
    /// Reward paid plus held never exceeds reward issued
    RewardPayoutBounded,
    /// Collateral held for depositors is in the reserve
    HeldCollateralCovered,
    /// Epoch and scale never move backwards
    CountersMonotonic,
    /// Asset mover refused a settlement the ledger approved
    SettlementFailed,
}

/// Invariant violation detected during simulation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    /// Step where violation occurred
    pub step: u64,
    /// Type of invariant violated
    pub invariant: InvariantType,
    /// Bound that should have held
    pub expected: Amount,
    /// Observed value
    pub actual: Amount,
}

/// Result of a simulation run
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub steps: u64,
    pub deposits: u64,
    pub withdrawals: u64,
    pub claims: u64,
    pub front_end_claims: u64,
    pub offsets: u64,
    /// Operations refused with a recoverable error
    pub rejected: u64,
    /// Highest scale observed in any epoch
    pub max_scale: u64,
    pub final_stats: PoolStats,
    pub collateral_absorbed: Amount,
    pub collateral_paid: Amount,
    pub reward_paid: Amount,
    /// Reward paid out to front ends
    pub front_end_reward_paid: Amount,
    /// Gains realized by the ledger across all operations
    pub gains_realized: Gains,
    /// Largest observed shortfall of summed balances below total deposits
    pub max_rounding_loss: Amount,
    pub violations: Vec<InvariantViolation>,
}

impl SimulationReport {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Random liquidations sized against the current pool
#[derive(Debug)]
pub struct RandomLiquidations {
    rng: StdRng,
}

impl RandomLiquidations {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl LiquidationSource for RandomLiquidations {
    fn next_offset(&mut self, stats: &PoolStats, timestamp: u64) -> Option<OffsetRequest> {
        let total = stats.total_deposits;
        if total == 0 {
            return None;
        }

        let roll = self.rng.gen_range(0..100u32);
        let debt = if roll < 70 {
            // Ordinary liquidation: up to half the pool
            total / 100 * self.rng.gen_range(1..=50u128)
        } else if roll < 92 {
            // Deep liquidation leaving 1e-3 to 1e-7 of the pool
            total - total / 10u128.pow(self.rng.gen_range(3..=7u32))
        } else {
            total
        };
        // Collateral worth 100% to 120% of the debt
        let collateral = debt / 100 * self.rng.gen_range(100..=120u128);

        Some(OffsetRequest {
            debt_to_absorb: debt,
            collateral_to_add: collateral,
            timestamp,
        })
    }
}

/// Highest values seen so far in a run
#[derive(Debug, Clone, Copy, Default)]
struct Watermark {
    epoch: u64,
    scale: u64,
}

// ============================================================================
// Core Simulation Functions
// ============================================================================

/// Run a stress simulation
pub fn run(config: &SimulationConfig) -> LedgerResult<SimulationReport> {
    let ledger_config = LedgerConfig {
        schedule: config.schedule,
        ..LedgerConfig::default()
    };
    let mut ledger = PoolLedger::new(ledger_config)?;
    let mut book = AssetBook::new(supply_cap(&config.schedule));
    let mut liquidations = RandomLiquidations::new(config.seed.wrapping_add(1));
    let mut rng = StdRng::seed_from_u64(config.seed);

    let depositors: Vec<DepositorId> = (0..config.depositors.max(1))
        .map(|i| depositor_id(&i.to_le_bytes()))
        .collect();
    for depositor in &depositors {
        book.fund_wallet(*depositor, config.max_deposit.saturating_mul(WALLET_MULTIPLE));
    }
    let mut front_ends: Vec<FrontEndId> = Vec::with_capacity(FRONT_END_KICKBACKS.len());
    for (i, kickback_rate) in FRONT_END_KICKBACKS.iter().enumerate() {
        let front_end = depositor_id(format!("front end {}", i).as_bytes());
        ledger.register_front_end(&RegisterFrontEndRequest {
            front_end,
            kickback_rate: *kickback_rate,
            timestamp: 0,
        })?;
        front_ends.push(front_end);
    }

    let mut report = SimulationReport {
        steps: config.steps,
        deposits: 0,
        withdrawals: 0,
        claims: 0,
        front_end_claims: 0,
        offsets: 0,
        rejected: 0,
        max_scale: 0,
        final_stats: ledger.pool_stats(),
        collateral_absorbed: 0,
        collateral_paid: 0,
        reward_paid: 0,
        front_end_reward_paid: 0,
        gains_realized: Gains::ZERO,
        max_rounding_loss: 0,
        violations: Vec::new(),
    };
    let mut watermark = Watermark::default();

    for step in 0..config.steps {
        let timestamp = step.saturating_mul(config.seconds_per_step);
        let index = rng.gen_range(0..depositors.len());
        let depositor = depositors[index];
        let tag = match index % 3 {
            0 => None,
            n => Some(front_ends[n - 1]),
        };
        let roll = rng.gen_range(0..100u32);

        let outcome = if roll < config.offset_percent {
            match liquidations.next_offset(&ledger.pool_stats(), timestamp) {
                Some(request) => ledger.offset(&request).map(|result| {
                    report.offsets += 1;
                    book.absorb_offset(result.debt_absorbed, request.collateral_to_add)
                }),
                None => Ok(Ok(())),
            }
        } else if roll < config.offset_percent + 35 {
            let wallet = book.wallet_balance(&depositor);
            if wallet == 0 {
                Ok(Ok(()))
            } else {
                let amount = rng.gen_range(1..=config.max_deposit.max(1)).min(wallet);
                let request = DepositRequest {
                    depositor,
                    amount,
                    front_end: tag,
                    timestamp,
                };
                ledger.deposit(&request).map(|result| {
                    report.deposits += 1;
                    report.gains_realized = report.gains_realized.saturating_add(&result.gains);
                    settle_deposit(&mut book, &depositor, amount, &result)
                })
            }
        } else if roll < config.offset_percent + 55 {
            let request = WithdrawRequest {
                depositor,
                amount: rng.gen_range(1..=config.max_deposit.saturating_mul(2).max(1)),
                timestamp,
            };
            ledger.withdraw(&request).map(|result| {
                report.withdrawals += 1;
                report.gains_realized = report.gains_realized.saturating_add(&result.gains);
                settle_withdrawal(&mut book, &depositor, &result)
            })
        } else if roll % 4 == 0 {
            let front_end = front_ends[index % front_ends.len()];
            let request = FrontEndClaimRequest {
                front_end,
                timestamp,
            };
            ledger.claim_front_end_reward(&request).map(|reward| {
                report.front_end_claims += 1;
                report.front_end_reward_paid = report.front_end_reward_paid.saturating_add(reward);
                settle_front_end_claim(&mut book, &front_end, reward)
            })
        } else {
            let request = ClaimRequest {
                depositor,
                timestamp,
            };
            ledger.claim_gains(&request).map(|gains| {
                report.claims += 1;
                report.gains_realized = report.gains_realized.saturating_add(&gains);
                settle_claim(&mut book, &depositor, &gains)
            })
        };

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(settlement)) => {
                log::warn!("step {}: settlement failed: {}", step, settlement);
                report.violations.push(InvariantViolation {
                    step,
                    invariant: InvariantType::SettlementFailed,
                    expected: 0,
                    actual: 1,
                });
            }
            Err(err) if err.is_recoverable() => report.rejected += 1,
            Err(err) => return Err(err),
        }

        check_invariants(step, &ledger, &book, &mut watermark, &mut report)?;
    }

    report.final_stats = ledger.pool_stats();
    report.collateral_absorbed = book.collateral_absorbed;
    report.collateral_paid = book.collateral_paid;
    report.reward_paid = book.reward_paid;

    log::info!(
        "simulation seed={} steps={} offsets={} epoch={} max_scale={} violations={}",
        config.seed,
        config.steps,
        report.offsets,
        report.final_stats.epoch,
        report.max_scale,
        report.violations.len()
    );

    Ok(report)
}

/// Reward tokens the schedule can ever issue
fn supply_cap(schedule: &ScheduleConfig) -> Amount {
    match *schedule {
        ScheduleConfig::None => 0,
        ScheduleConfig::Halving { supply_cap } | ScheduleConfig::Linear { supply_cap, .. } => supply_cap,
    }
}

fn check_invariants(
    step: u64,
    ledger: &PoolLedger,
    book: &AssetBook,
    watermark: &mut Watermark,
    report: &mut SimulationReport,
) -> LedgerResult<()> {
    let stats = ledger.pool_stats();
    let mut violate = |invariant, expected, actual| {
        report.violations.push(InvariantViolation {
            step,
            invariant,
            expected,
            actual,
        });
    };

    // 1. Holdings match the ledger
    if book.pool_holdings != stats.total_deposits {
        violate(InvariantType::HoldingsMatchLedger, stats.total_deposits, book.pool_holdings);
    }

    // 2. Rounding only ever loses deposits
    let mut sum: Amount = 0;
    for (depositor, _) in ledger.snapshots().iter() {
        sum = sum
            .checked_add(ledger.compounded_balance(depositor)?)
            .ok_or(LedgerError::Overflow)?;
    }
    if sum > stats.total_deposits {
        violate(InvariantType::DepositsConserved, stats.total_deposits, sum);
    }

    // 3. Payouts and held gains bounded by inputs
    let collateral_owed = book.collateral_paid.saturating_add(stats.pending_collateral);
    if collateral_owed > book.collateral_absorbed {
        violate(
            InvariantType::CollateralPayoutBounded,
            book.collateral_absorbed,
            collateral_owed,
        );
    }
    let reward_owed = book.reward_paid.saturating_add(stats.pending_reward);
    if reward_owed > stats.total_reward_issued {
        violate(
            InvariantType::RewardPayoutBounded,
            stats.total_reward_issued,
            reward_owed,
        );
    }

    // 4. Held collateral is in the reserve
    if stats.pending_collateral > book.collateral_reserve {
        violate(
            InvariantType::HeldCollateralCovered,
            book.collateral_reserve,
            stats.pending_collateral,
        );
    }

    // 5. Counters only move forward
    if (stats.epoch, stats.scale) < (watermark.epoch, watermark.scale) {
        violate(
            InvariantType::CountersMonotonic,
            u128::from(watermark.epoch),
            u128::from(stats.epoch),
        );
    }

    watermark.epoch = stats.epoch;
    watermark.scale = stats.scale;
    report.max_scale = report.max_scale.max(stats.scale);
    report.max_rounding_loss = report
        .max_rounding_loss
        .max(stats.total_deposits.saturating_sub(sum));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_simulation_passes() {
        let report = run(&SimulationConfig::default()).unwrap();
        assert!(report.passed(), "violations: {:?}", report.violations);
        assert!(report.offsets > 0);
        assert!(report.deposits > 0);
        assert!(report.collateral_paid <= report.collateral_absorbed);
        assert!(report.reward_paid <= report.final_stats.total_reward_issued);
        assert_eq!(report.gains_realized.collateral, report.collateral_paid);
        assert_eq!(
            report.gains_realized.reward + report.front_end_reward_paid,
            report.reward_paid
        );
        assert!(report.front_end_claims > 0);
    }

    #[test]
    fn test_simulation_is_deterministic() {
        let config = SimulationConfig {
            steps: 300,
            ..SimulationConfig::default()
        };
        let a = run(&config).unwrap();
        let b = run(&config).unwrap();
        assert_eq!(a.final_stats, b.final_stats);
        assert_eq!(a.collateral_paid, b.collateral_paid);
    }

    #[test]
    fn test_offset_heavy_run_crosses_scales_and_epochs() {
        let config = SimulationConfig {
            seed: 7,
            steps: 1_500,
            offset_percent: 45,
            schedule: ScheduleConfig::Linear {
                rate_per_second: token::ONE,
                supply_cap: 1_000_000 * token::ONE,
            },
            ..SimulationConfig::default()
        };
        let report = run(&config).unwrap();
        assert!(report.passed(), "violations: {:?}", report.violations);
        assert!(report.final_stats.epoch > 0);
        assert!(report.max_scale > 0);
    }

    #[test]
    fn test_no_liquidations_no_collateral() {
        let config = SimulationConfig {
            steps: 200,
            offset_percent: 0,
            schedule: ScheduleConfig::None,
            ..SimulationConfig::default()
        };
        let report = run(&config).unwrap();
        assert!(report.passed());
        assert_eq!(report.offsets, 0);
        assert_eq!(report.collateral_paid, 0);
        assert_eq!(report.reward_paid, 0);
    }
}
