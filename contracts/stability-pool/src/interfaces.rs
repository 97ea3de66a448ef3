//! Collaborator Interfaces
//!
//! The ledger computes amounts; moving balances and deciding liquidations
//! belong to collaborators. Settlement helpers apply a ledger result
//! through an [`AssetMover`] after the ledger call has returned, outside
//! any lock held on the ledger.

use std::collections::HashMap;

use pool_ledger_common::{
    errors::{LedgerError, LedgerResult},
    types::{
        Amount, DepositResult, DepositorId, FrontEndId, Gains, OffsetRequest, PoolStats,
        WithdrawResult,
    },
};

/// Moves the pooled asset, the collateral asset and the reward token
pub trait AssetMover {
    /// Pull the pooled asset from a depositor into the pool
    fn transfer_pooled_in(&mut self, from: &DepositorId, amount: Amount) -> LedgerResult<()>;

    /// Return the pooled asset from the pool to a depositor
    fn transfer_pooled_out(&mut self, to: &DepositorId, amount: Amount) -> LedgerResult<()>;

    /// Pay collateral gains
    fn pay_collateral(&mut self, to: &DepositorId, amount: Amount) -> LedgerResult<()>;

    /// Pay reward token gains
    fn pay_reward(&mut self, to: &DepositorId, amount: Amount) -> LedgerResult<()>;

    /// Burn absorbed debt from the pool and take in the liquidated collateral
    fn absorb_offset(&mut self, debt: Amount, collateral: Amount) -> LedgerResult<()>;
}

/// Decides when and how much debt the pool absorbs
pub trait LiquidationSource {
    /// Next offset to apply given the current pool view, if any
    fn next_offset(&mut self, stats: &PoolStats, timestamp: u64) -> Option<OffsetRequest>;
}

/// Pay realized gains
pub fn settle_gains<M: AssetMover + ?Sized>(
    mover: &mut M,
    depositor: &DepositorId,
    gains: &Gains,
) -> LedgerResult<()> {
    if gains.collateral > 0 {
        mover.pay_collateral(depositor, gains.collateral)?;
    }
    if gains.reward > 0 {
        mover.pay_reward(depositor, gains.reward)?;
    }
    Ok(())
}

/// Apply a deposit: pull `amount` in, pay the gains it realized
pub fn settle_deposit<M: AssetMover + ?Sized>(
    mover: &mut M,
    depositor: &DepositorId,
    amount: Amount,
    result: &DepositResult,
) -> LedgerResult<()> {
    mover.transfer_pooled_in(depositor, amount)?;
    settle_gains(mover, depositor, &result.gains)
}

/// Apply a withdrawal: return the withdrawn amount, pay the gains
pub fn settle_withdrawal<M: AssetMover + ?Sized>(
    mover: &mut M,
    depositor: &DepositorId,
    result: &WithdrawResult,
) -> LedgerResult<()> {
    if result.amount_withdrawn > 0 {
        mover.transfer_pooled_out(depositor, result.amount_withdrawn)?;
    }
    settle_gains(mover, depositor, &result.gains)
}

/// Apply a claim
pub fn settle_claim<M: AssetMover + ?Sized>(
    mover: &mut M,
    depositor: &DepositorId,
    gains: &Gains,
) -> LedgerResult<()> {
    settle_gains(mover, depositor, gains)
}

/// Pay a front end the reward it claimed
pub fn settle_front_end_claim<M: AssetMover + ?Sized>(
    mover: &mut M,
    front_end: &FrontEndId,
    reward: Amount,
) -> LedgerResult<()> {
    if reward > 0 {
        mover.pay_reward(front_end, reward)?;
    }
    Ok(())
}

/// In-memory balances for every asset the pool touches
#[derive(Debug, Clone, Default)]
pub struct AssetBook {
    wallets: HashMap<DepositorId, Amount>,
    collateral_received: HashMap<DepositorId, Amount>,
    reward_received: HashMap<DepositorId, Amount>,
    /// Pooled asset held by the pool
    pub pool_holdings: Amount,
    /// Collateral held by the pool for depositors
    pub collateral_reserve: Amount,
    /// Reward tokens available for payouts
    pub reward_reserve: Amount,
    /// Total pooled asset burned by offsets
    pub debt_burned: Amount,
    /// Total collateral taken in by offsets
    pub collateral_absorbed: Amount,
    /// Total collateral paid out
    pub collateral_paid: Amount,
    /// Total reward tokens paid out
    pub reward_paid: Amount,
}

impl AssetBook {
    /// Book with a funded reward reserve
    pub fn new(reward_reserve: Amount) -> Self {
        Self {
            reward_reserve,
            ..Self::default()
        }
    }

    /// Credit a depositor's wallet with the pooled asset
    pub fn fund_wallet(&mut self, depositor: DepositorId, amount: Amount) {
        let balance = self.wallets.entry(depositor).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    pub fn wallet_balance(&self, depositor: &DepositorId) -> Amount {
        self.wallets.get(depositor).copied().unwrap_or(0)
    }

    pub fn collateral_of(&self, depositor: &DepositorId) -> Amount {
        self.collateral_received.get(depositor).copied().unwrap_or(0)
    }

    pub fn reward_of(&self, depositor: &DepositorId) -> Amount {
        self.reward_received.get(depositor).copied().unwrap_or(0)
    }
}

impl AssetMover for AssetBook {
    fn transfer_pooled_in(&mut self, from: &DepositorId, amount: Amount) -> LedgerResult<()> {
        let balance = self.wallets.entry(*from).or_insert(0);
        *balance = balance.checked_sub(amount).ok_or(LedgerError::TransferFailed {
            depositor: *from,
            amount,
        })?;
        self.pool_holdings = self
            .pool_holdings
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        Ok(())
    }

    fn transfer_pooled_out(&mut self, to: &DepositorId, amount: Amount) -> LedgerResult<()> {
        self.pool_holdings = self
            .pool_holdings
            .checked_sub(amount)
            .ok_or(LedgerError::TransferFailed {
                depositor: *to,
                amount,
            })?;
        self.fund_wallet(*to, amount);
        Ok(())
    }

    fn pay_collateral(&mut self, to: &DepositorId, amount: Amount) -> LedgerResult<()> {
        self.collateral_reserve = self
            .collateral_reserve
            .checked_sub(amount)
            .ok_or(LedgerError::TransferFailed {
                depositor: *to,
                amount,
            })?;
        self.collateral_paid = self.collateral_paid.saturating_add(amount);
        let received = self.collateral_received.entry(*to).or_insert(0);
        *received = received.saturating_add(amount);
        Ok(())
    }

    fn pay_reward(&mut self, to: &DepositorId, amount: Amount) -> LedgerResult<()> {
        self.reward_reserve = self
            .reward_reserve
            .checked_sub(amount)
            .ok_or(LedgerError::TransferFailed {
                depositor: *to,
                amount,
            })?;
        self.reward_paid = self.reward_paid.saturating_add(amount);
        let received = self.reward_received.entry(*to).or_insert(0);
        *received = received.saturating_add(amount);
        Ok(())
    }

    fn absorb_offset(&mut self, debt: Amount, collateral: Amount) -> LedgerResult<()> {
        self.pool_holdings = self
            .pool_holdings
            .checked_sub(debt)
            .ok_or(LedgerError::InsufficientPoolDeposits {
                available: self.pool_holdings,
                required: debt,
            })?;
        self.debt_burned = self.debt_burned.saturating_add(debt);
        self.collateral_reserve = self
            .collateral_reserve
            .checked_add(collateral)
            .ok_or(LedgerError::Overflow)?;
        self.collateral_absorbed = self.collateral_absorbed.saturating_add(collateral);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: DepositorId = [1u8; 32];

    #[test]
    fn test_pooled_round_trip() {
        let mut book = AssetBook::new(0);
        book.fund_wallet(ALICE, 100);

        book.transfer_pooled_in(&ALICE, 60).unwrap();
        assert_eq!(book.wallet_balance(&ALICE), 40);
        assert_eq!(book.pool_holdings, 60);

        book.transfer_pooled_out(&ALICE, 60).unwrap();
        assert_eq!(book.wallet_balance(&ALICE), 100);
        assert_eq!(book.pool_holdings, 0);
    }

    #[test]
    fn test_insufficient_wallet_fails() {
        let mut book = AssetBook::new(0);
        book.fund_wallet(ALICE, 10);
        assert!(matches!(
            book.transfer_pooled_in(&ALICE, 11),
            Err(LedgerError::TransferFailed { amount: 11, .. })
        ));
        assert_eq!(book.wallet_balance(&ALICE), 10);
    }

    #[test]
    fn test_settle_withdrawal_pays_gains() {
        let mut book = AssetBook::new(50);
        book.fund_wallet(ALICE, 100);
        book.transfer_pooled_in(&ALICE, 100).unwrap();
        book.absorb_offset(40, 8).unwrap();

        let result = WithdrawResult {
            amount_withdrawn: 60,
            gains: Gains::new(8, 5),
            remaining_balance: 0,
            pool_total: 0,
        };
        settle_withdrawal(&mut book, &ALICE, &result).unwrap();

        assert_eq!(book.wallet_balance(&ALICE), 60);
        assert_eq!(book.collateral_of(&ALICE), 8);
        assert_eq!(book.reward_of(&ALICE), 5);
        assert_eq!(book.collateral_reserve, 0);
        assert_eq!(book.reward_reserve, 45);
    }

    #[test]
    fn test_collateral_payout_cannot_exceed_reserve() {
        let mut book = AssetBook::new(0);
        book.absorb_offset(0, 3).unwrap();
        assert!(book.pay_collateral(&ALICE, 4).is_err());
    }
}
