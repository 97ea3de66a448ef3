//! Pool State
//!
//! Global accumulators owned by the ledger: total deposits, the product
//! factor P, epoch/scale counters, the S and G sum tables, rounding error
//! carries and reward emission bookkeeping.

use borsh::{BorshDeserialize, BorshSerialize};

use pool_ledger_common::{
    constants::{precision::ONE, scale::P_FLOOR},
    errors::{LedgerError, LedgerResult},
    math::ScaledSum,
    types::Amount,
};

use crate::sum_table::{EpochToScaleToSum, TableMark};

/// Global state of one pool
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PoolState {
    /// Sum of all compounded balances
    pub total_deposits: Amount,
    /// Product factor P, scaled by 1e18
    pub p: u128,
    /// Incremented when an offset empties the pool
    pub current_epoch: u64,
    /// Incremented when P is renormalized
    pub current_scale: u64,
    /// Collateral gain sums (S)
    pub s_table: EpochToScaleToSum,
    /// Reward token gain sums (G)
    pub g_table: EpochToScaleToSum,
    /// Remainder of the last collateral-per-unit division
    pub last_coll_error: u128,
    /// Remainder of the last reward-per-unit division
    pub last_reward_error: u128,
    /// Excess of the last rounded-up loss-per-unit
    pub last_loss_error: u128,
    /// Reward tokens issued into G so far
    pub last_reward_sum: Amount,
    /// Time of the last issuance
    pub last_reward_time: u64,
    /// Emission schedule origin
    pub reward_start_time: u64,
    /// Collateral credited to depositors and not yet paid out
    pub pending_collateral: Amount,
    /// Reward tokens credited to depositors and not yet paid out
    pub pending_reward: Amount,
    /// Depositors with a recorded deposit
    pub depositor_count: u64,
}

/// Everything an aborted operation may have touched, captured in O(1)
#[derive(Debug, Clone, Copy)]
pub struct Checkpoint {
    total_deposits: Amount,
    p: u128,
    current_epoch: u64,
    current_scale: u64,
    s_mark: TableMark,
    g_mark: TableMark,
    last_coll_error: u128,
    last_reward_error: u128,
    last_loss_error: u128,
    last_reward_sum: Amount,
    last_reward_time: u64,
    pending_collateral: Amount,
    pending_reward: Amount,
    depositor_count: u64,
}

impl PoolState {
    /// Create an empty pool
    pub fn new(reward_start_time: u64) -> Self {
        Self {
            total_deposits: 0,
            p: ONE,
            current_epoch: 0,
            current_scale: 0,
            s_table: EpochToScaleToSum::new(),
            g_table: EpochToScaleToSum::new(),
            last_coll_error: 0,
            last_reward_error: 0,
            last_loss_error: 0,
            last_reward_sum: 0,
            last_reward_time: reward_start_time,
            reward_start_time,
            pending_collateral: 0,
            pending_reward: 0,
            depositor_count: 0,
        }
    }

    /// Current head of the S table
    pub fn current_s(&self) -> ScaledSum {
        self.s_table.head()
    }

    /// Current head of the G table
    pub fn current_g(&self) -> ScaledSum {
        self.g_table.head()
    }

    pub fn is_empty(&self) -> bool {
        self.total_deposits == 0
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            total_deposits: self.total_deposits,
            p: self.p,
            current_epoch: self.current_epoch,
            current_scale: self.current_scale,
            s_mark: self.s_table.mark(),
            g_mark: self.g_table.mark(),
            last_coll_error: self.last_coll_error,
            last_reward_error: self.last_reward_error,
            last_loss_error: self.last_loss_error,
            last_reward_sum: self.last_reward_sum,
            last_reward_time: self.last_reward_time,
            pending_collateral: self.pending_collateral,
            pending_reward: self.pending_reward,
            depositor_count: self.depositor_count,
        }
    }

    pub fn rollback(&mut self, cp: &Checkpoint) {
        self.total_deposits = cp.total_deposits;
        self.p = cp.p;
        self.current_epoch = cp.current_epoch;
        self.current_scale = cp.current_scale;
        self.s_table.restore(&cp.s_mark);
        self.g_table.restore(&cp.g_mark);
        self.last_coll_error = cp.last_coll_error;
        self.last_reward_error = cp.last_reward_error;
        self.last_loss_error = cp.last_loss_error;
        self.last_reward_sum = cp.last_reward_sum;
        self.last_reward_time = cp.last_reward_time;
        self.pending_collateral = cp.pending_collateral;
        self.pending_reward = cp.pending_reward;
        self.depositor_count = cp.depositor_count;
    }

    /// Structural checks applied to restored state
    pub fn validate(&self) -> LedgerResult<()> {
        if self.p < P_FLOOR || self.p > ONE {
            return Err(LedgerError::CorruptImage {
                reason: "product factor out of range",
            });
        }
        self.s_table.validate_head(self.current_epoch, self.current_scale)?;
        self.g_table.validate_head(self.current_epoch, self.current_scale)?;
        if self.last_reward_time < self.reward_start_time {
            return Err(LedgerError::CorruptImage {
                reason: "last issuance precedes emission start",
            });
        }
        Ok(())
    }
}

impl Default for PoolState {
    fn default() -> Self {
        Self::new(0)
    }
}
