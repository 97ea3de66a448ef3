//! Depositor Snapshot Store
//!
//! Maps each depositor to the accumulator values seen at their last
//! interaction. Balances and gains are computed lazily from one snapshot
//! and the pool state; no operation reads another depositor's record.
//!
//! Registered front ends live alongside the deposits. A front end's stake
//! is one more snapshot, so reading a tagged depositor's gains touches at
//! most two records.

use std::collections::HashMap;

use pool_ledger_common::{
    constants::precision::ONE,
    errors::{FrontEndErrorReason, LedgerError, LedgerResult},
    math::{compounded_deposit, depositor_gain, mul_div_floor},
    types::{
        Amount, DepositorId, DepositorPosition, DepositorSnapshot, FrontEnd, FrontEndId,
        FrontEndPosition, Gains,
    },
};

use crate::pool_state::PoolState;

/// Snapshot rows keyed by depositor identity, plus registered front ends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotStore {
    snapshots: HashMap<DepositorId, DepositorSnapshot>,
    front_ends: HashMap<FrontEndId, FrontEnd>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, depositor: &DepositorId) -> Option<&DepositorSnapshot> {
        self.snapshots.get(depositor)
    }

    /// Write a depositor's snapshot; a zero deposit clears the row
    pub fn put(&mut self, depositor: DepositorId, snapshot: DepositorSnapshot) {
        if snapshot.is_empty() {
            self.snapshots.remove(&depositor);
        } else {
            self.snapshots.insert(depositor, snapshot);
        }
    }

    pub fn remove(&mut self, depositor: &DepositorId) -> Option<DepositorSnapshot> {
        self.snapshots.remove(depositor)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DepositorId, &DepositorSnapshot)> {
        self.snapshots.iter()
    }

    /// Rows sorted by identity, for deterministic encoding
    pub fn to_sorted_vec(&self) -> Vec<(DepositorId, DepositorSnapshot)> {
        let mut rows: Vec<_> = self.snapshots.iter().map(|(id, snap)| (*id, *snap)).collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    pub fn from_rows(
        rows: Vec<(DepositorId, DepositorSnapshot)>,
        front_ends: Vec<(FrontEndId, FrontEnd)>,
    ) -> Self {
        Self {
            snapshots: rows.into_iter().collect(),
            front_ends: front_ends.into_iter().collect(),
        }
    }

    // ============ Front Ends ============

    pub fn front_end(&self, front_end: &FrontEndId) -> Option<&FrontEnd> {
        self.front_ends.get(front_end)
    }

    pub fn is_front_end(&self, account: &FrontEndId) -> bool {
        self.front_ends.contains_key(account)
    }

    pub fn put_front_end(&mut self, id: FrontEndId, front_end: FrontEnd) {
        self.front_ends.insert(id, front_end);
    }

    pub fn front_end_count(&self) -> usize {
        self.front_ends.len()
    }

    /// Front ends sorted by identity, for deterministic encoding
    pub fn front_ends_sorted(&self) -> Vec<(FrontEndId, FrontEnd)> {
        let mut rows: Vec<_> = self.front_ends.iter().map(|(id, fe)| (*id, *fe)).collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    /// Depositors' share of reward gains for a snapshot; untagged keeps all
    pub fn kickback_rate_for(&self, snapshot: &DepositorSnapshot) -> u128 {
        snapshot
            .front_end
            .and_then(|tag| self.front_ends.get(&tag))
            .map_or(ONE, |front_end| front_end.kickback_rate)
    }

    /// Stake and unclaimed reward of a registered front end
    pub fn front_end_position(
        &self,
        id: &FrontEndId,
        state: &PoolState,
    ) -> LedgerResult<FrontEndPosition> {
        let front_end = self.front_end(id).ok_or(LedgerError::InvalidFrontEnd {
            front_end: *id,
            reason: FrontEndErrorReason::NotRegistered,
        })?;
        let pending_reward = front_end
            .accrued_reward
            .checked_add(front_end_reward_of(front_end, state)?)
            .ok_or(LedgerError::Overflow)?;
        Ok(FrontEndPosition {
            kickback_rate: front_end.kickback_rate,
            stake: front_end_stake_of(front_end, state)?,
            pending_reward,
        })
    }

    // ============ Depositors ============

    /// Current compounded balance of `depositor`
    pub fn compounded_balance(&self, depositor: &DepositorId, state: &PoolState) -> LedgerResult<Amount> {
        match self.get(depositor) {
            Some(snapshot) => compounded_balance_of(snapshot, state),
            None => Ok(0),
        }
    }

    /// Gains accrued by `depositor` since their last interaction, after the
    /// front end's cut of the reward
    pub fn pending_gains(&self, depositor: &DepositorId, state: &PoolState) -> LedgerResult<Gains> {
        match self.get(depositor) {
            Some(snapshot) => self.depositor_gains_of(snapshot, state),
            None => Ok(Gains::ZERO),
        }
    }

    /// Gains of one snapshot with its front end's kickback applied
    pub fn depositor_gains_of(&self, snapshot: &DepositorSnapshot, state: &PoolState) -> LedgerResult<Gains> {
        let gains = pending_gains_of(snapshot, state)?;
        let reward = mul_div_floor(gains.reward, self.kickback_rate_for(snapshot), ONE)?;
        Ok(Gains::new(gains.collateral, reward))
    }

    /// Balance and gains together
    pub fn position(&self, depositor: &DepositorId, state: &PoolState) -> LedgerResult<DepositorPosition> {
        Ok(DepositorPosition {
            compounded_balance: self.compounded_balance(depositor, state)?,
            pending_gains: self.pending_gains(depositor, state)?,
        })
    }
}

/// Compounded balance of one snapshot against the current pool state
pub fn compounded_balance_of(snapshot: &DepositorSnapshot, state: &PoolState) -> LedgerResult<Amount> {
    compounded_deposit(snapshot, state.p, state.current_scale, state.current_epoch)
}

/// Compounded stake of a front end
pub fn front_end_stake_of(front_end: &FrontEnd, state: &PoolState) -> LedgerResult<Amount> {
    compounded_balance_of(&front_end.stake, state)
}

/// Reward earned by a front end's stake since its last snapshot, net of
/// the kickback paid to its depositors
pub fn front_end_reward_of(front_end: &FrontEnd, state: &PoolState) -> LedgerResult<Amount> {
    let earned = pending_gains_of(&front_end.stake, state)?.reward;
    mul_div_floor(earned, ONE.saturating_sub(front_end.kickback_rate), ONE)
}

/// Collateral and reward gains of one snapshot, before any kickback
///
/// Reads the snapshot's own (epoch, scale) page and the page one scale
/// later. Sums recorded in a past epoch stay readable, so gains accrued
/// before a wipeout remain claimable.
pub fn pending_gains_of(snapshot: &DepositorSnapshot, state: &PoolState) -> LedgerResult<Gains> {
    if snapshot.is_empty() {
        return Ok(Gains::ZERO);
    }

    let missing_page = LedgerError::CorruptImage {
        reason: "snapshot references a missing sum page",
    };
    let next_scale = snapshot.scale.saturating_add(1);

    let s_page = state
        .s_table
        .get_sum(snapshot.epoch, snapshot.scale)
        .ok_or(missing_page.clone())?;
    let g_page = state
        .g_table
        .get_sum(snapshot.epoch, snapshot.scale)
        .ok_or(missing_page)?;

    let collateral = depositor_gain(
        snapshot.initial_deposit,
        snapshot.s,
        snapshot.p,
        s_page,
        state.s_table.get_sum(snapshot.epoch, next_scale),
    )?;
    let reward = depositor_gain(
        snapshot.initial_deposit,
        snapshot.g,
        snapshot.p,
        g_page,
        state.g_table.get_sum(snapshot.epoch, next_scale),
    )?;

    Ok(Gains::new(collateral, reward))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pool_ledger_common::{
        constants::precision::ONE,
        math::{ScaledSum, U256},
        types::depositor_id,
    };

    fn fresh_snapshot(initial: Amount, state: &PoolState) -> DepositorSnapshot {
        DepositorSnapshot {
            initial_deposit: initial,
            p: state.p,
            s: state.current_s(),
            g: state.current_g(),
            scale: state.current_scale,
            epoch: state.current_epoch,
            last_updated: 0,
            front_end: None,
        }
    }

    #[test]
    fn test_missing_depositor_is_zero() {
        let store = SnapshotStore::new();
        let state = PoolState::new(0);
        let alice = depositor_id(b"alice");

        let position = store.position(&alice, &state).unwrap();
        assert_eq!(position.compounded_balance, 0);
        assert!(position.pending_gains.is_zero());
    }

    #[test]
    fn test_put_empty_clears_row() {
        let mut store = SnapshotStore::new();
        let state = PoolState::new(0);
        let alice = depositor_id(b"alice");

        store.put(alice, fresh_snapshot(100, &state));
        assert_eq!(store.len(), 1);

        store.put(alice, DepositorSnapshot::empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_balance_follows_p() {
        let mut store = SnapshotStore::new();
        let mut state = PoolState::new(0);
        let alice = depositor_id(b"alice");

        store.put(alice, fresh_snapshot(1_000, &state));
        state.p = ONE / 4;
        assert_eq!(store.compounded_balance(&alice, &state).unwrap(), 250);
    }

    #[test]
    fn test_gains_survive_epoch_rollover() {
        let mut store = SnapshotStore::new();
        let mut state = PoolState::new(0);
        let alice = depositor_id(b"alice");

        store.put(alice, fresh_snapshot(1_000 * ONE, &state));

        // 0.01 collateral per unit at P = 1, then the pool is wiped out
        state.s_table.set_head(ScaledSum::ZERO.accrue(U256::from(ONE / 100), ONE).unwrap());
        state.s_table.push_epoch();
        state.g_table.push_epoch();
        state.current_epoch = 1;

        assert_eq!(store.compounded_balance(&alice, &state).unwrap(), 0);
        let gains = store.pending_gains(&alice, &state).unwrap();
        assert_eq!(gains.collateral, 10 * ONE);
        assert_eq!(gains.reward, 0);
    }

    #[test]
    fn test_kickback_splits_reward() {
        let mut store = SnapshotStore::new();
        let mut state = PoolState::new(0);
        let alice = depositor_id(b"alice");
        let shop = depositor_id(b"shop");

        // A quarter of the reward goes to the depositor
        let mut front_end = FrontEnd::new(ONE / 4, 0);
        front_end.stake = fresh_snapshot(1_000 * ONE, &state);
        store.put_front_end(shop, front_end);
        store.put(
            alice,
            DepositorSnapshot {
                front_end: Some(shop),
                ..fresh_snapshot(1_000 * ONE, &state)
            },
        );

        // 0.02 reward per unit at P = 1
        state.g_table.set_head(ScaledSum::ZERO.accrue(U256::from(ONE / 50), ONE).unwrap());

        assert_eq!(store.pending_gains(&alice, &state).unwrap().reward, 5 * ONE);
        let position = store.front_end_position(&shop, &state).unwrap();
        assert_eq!(position.stake, 1_000 * ONE);
        assert_eq!(position.pending_reward, 15 * ONE);
    }

    #[test]
    fn test_untagged_keeps_full_reward() {
        let mut store = SnapshotStore::new();
        let mut state = PoolState::new(0);
        let bob = depositor_id(b"bob");

        store.put(bob, fresh_snapshot(1_000 * ONE, &state));
        state.g_table.set_head(ScaledSum::ZERO.accrue(U256::from(ONE / 50), ONE).unwrap());

        assert_eq!(store.pending_gains(&bob, &state).unwrap().reward, 20 * ONE);
        assert!(store.front_end_position(&bob, &state).is_err());
    }

    #[test]
    fn test_sorted_rows() {
        let state = PoolState::new(0);
        let mut store = SnapshotStore::new();
        store.put([9u8; 32], fresh_snapshot(1, &state));
        store.put([1u8; 32], fresh_snapshot(2, &state));

        let rows = store.to_sorted_vec();
        assert_eq!(rows[0].0, [1u8; 32]);
        assert_eq!(SnapshotStore::from_rows(rows, Vec::new()), store);
    }
}
