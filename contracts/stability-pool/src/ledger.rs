//! Pool Ledger
//!
//! Single-writer owner of the pool accumulators and the snapshot store.
//!
//! ## Operations
//!
//! - **Deposit/Withdraw**: realize the depositor's compounded balance and
//!   gains, apply the change, write a fresh snapshot
//! - **Claim**: realize gains without moving principal
//! - **Front ends**: register, tag new deposits, split reward gains by the
//!   kickback rate and pay out the front end's share on request
//! - **Offset**: absorb liquidated debt and spread its collateral through
//!   P and S, rescaling P or opening a new epoch when needed
//!
//! Every mutator issues pending reward tokens into G first and is
//! all-or-nothing: on error the pool state and event log are rolled back
//! to a checkpoint and no snapshot is written.

use pool_ledger_common::{
    config::LedgerConfig,
    constants::precision::ONE,
    errors::{AmountErrorReason, FrontEndErrorReason, LedgerError, LedgerResult},
    events::{EventLog, LedgerEvent},
    math::{gain_per_unit_staked, loss_per_unit_staked, rescale_product, safe_add, safe_sub},
    types::{
        short_id, Amount, ClaimRequest, DepositRequest, DepositResult, DepositorId,
        DepositorPosition, DepositorSnapshot, FrontEnd, FrontEndClaimRequest, FrontEndId,
        FrontEndPosition, Gains, OffsetRequest, OffsetResult, PoolStats, RegisterFrontEndRequest,
        WithdrawRequest, WithdrawResult,
    },
};

use crate::issuance::{schedule_from_config, RewardSchedule};
use crate::persistence::LedgerImage;
use crate::pool_state::PoolState;
use crate::snapshot_store::{
    compounded_balance_of, front_end_reward_of, front_end_stake_of, SnapshotStore,
};

/// The pooled-deposit ledger
#[derive(Debug)]
pub struct PoolLedger {
    config: LedgerConfig,
    schedule: Box<dyn RewardSchedule>,
    state: PoolState,
    snapshots: SnapshotStore,
    events: EventLog,
}

/// A front end's record after a tagged deposit changed, not yet written
#[derive(Debug, Clone, Copy)]
struct FrontEndUpdate {
    id: FrontEndId,
    record: FrontEnd,
    reward_accrued: Amount,
}

impl PoolLedger {
    /// Create an empty ledger
    pub fn new(config: LedgerConfig) -> LedgerResult<Self> {
        config.validate()?;
        let schedule = schedule_from_config(&config.schedule);
        Ok(Self::with_schedule(config, schedule))
    }

    /// Create an empty ledger driven by a custom emission schedule
    pub fn with_schedule(config: LedgerConfig, schedule: Box<dyn RewardSchedule>) -> Self {
        Self {
            state: PoolState::new(config.reward_start_time),
            config,
            schedule,
            snapshots: SnapshotStore::new(),
            events: EventLog::new(),
        }
    }

    // ============ Mutators ============

    /// Deposit the pooled asset
    ///
    /// Realizes pending gains and compounds the existing balance into the
    /// new snapshot.
    pub fn deposit(&mut self, request: &DepositRequest) -> LedgerResult<DepositResult> {
        if request.amount == 0 {
            return Err(LedgerError::InvalidAmount {
                amount: 0,
                reason: AmountErrorReason::Zero,
            });
        }
        self.atomically(|ledger| ledger.apply_deposit(request))
    }

    /// Withdraw up to `amount` of the depositor's compounded balance
    pub fn withdraw(&mut self, request: &WithdrawRequest) -> LedgerResult<WithdrawResult> {
        if request.amount == 0 {
            return Err(LedgerError::InvalidAmount {
                amount: 0,
                reason: AmountErrorReason::Zero,
            });
        }
        self.atomically(|ledger| ledger.apply_withdraw(request))
    }

    /// Realize pending gains without moving principal
    pub fn claim_gains(&mut self, request: &ClaimRequest) -> LedgerResult<Gains> {
        self.atomically(|ledger| ledger.apply_claim(request))
    }

    /// Register an account as a front end with its kickback rate
    pub fn register_front_end(&mut self, request: &RegisterFrontEndRequest) -> LedgerResult<()> {
        self.atomically(|ledger| ledger.apply_register_front_end(request))
    }

    /// Pay out a front end's share of reward gains
    pub fn claim_front_end_reward(&mut self, request: &FrontEndClaimRequest) -> LedgerResult<Amount> {
        self.atomically(|ledger| ledger.apply_front_end_claim(request))
    }

    /// Absorb liquidated debt and distribute its collateral
    pub fn offset(&mut self, request: &OffsetRequest) -> LedgerResult<OffsetResult> {
        self.atomically(|ledger| ledger.apply_offset(request))
    }

    /// Take the events emitted since the last drain
    pub fn drain_events(&mut self) -> Vec<LedgerEvent> {
        self.events.drain()
    }

    // ============ Queries ============

    /// Compounded balance and pending gains of one depositor
    pub fn query_balance(&self, depositor: &DepositorId) -> LedgerResult<DepositorPosition> {
        self.snapshots.position(depositor, &self.state)
    }

    pub fn compounded_balance(&self, depositor: &DepositorId) -> LedgerResult<Amount> {
        self.snapshots.compounded_balance(depositor, &self.state)
    }

    pub fn pending_gains(&self, depositor: &DepositorId) -> LedgerResult<Gains> {
        self.snapshots.pending_gains(depositor, &self.state)
    }

    pub fn front_end_position(&self, front_end: &FrontEndId) -> LedgerResult<FrontEndPosition> {
        self.snapshots.front_end_position(front_end, &self.state)
    }

    /// Aggregate pool statistics
    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            total_deposits: self.state.total_deposits,
            depositor_count: self.state.depositor_count,
            front_end_count: self.snapshots.front_end_count() as u64,
            epoch: self.state.current_epoch,
            scale: self.state.current_scale,
            product_p: self.state.p,
            pending_collateral: self.state.pending_collateral,
            pending_reward: self.state.pending_reward,
            total_reward_issued: self.state.last_reward_sum,
        }
    }

    pub fn state(&self) -> &PoolState {
        &self.state
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    // ============ Persistence ============

    /// Encode the pool state and every snapshot
    pub fn export_image(&self) -> LedgerResult<Vec<u8>> {
        LedgerImage {
            state: self.state.clone(),
            snapshots: self.snapshots.to_sorted_vec(),
            front_ends: self.snapshots.front_ends_sorted(),
        }
        .encode()
    }

    /// Rebuild a ledger from an exported image
    pub fn restore(config: LedgerConfig, bytes: &[u8]) -> LedgerResult<Self> {
        config.validate()?;
        let image = LedgerImage::decode(bytes)?;
        image.validate()?;

        let mut ledger = Self::new(config)?;
        ledger.state = image.state;
        ledger.snapshots = SnapshotStore::from_rows(image.snapshots, image.front_ends);
        log::info!(
            "restored ledger: {} depositors, {} front ends, total {}, epoch {}, scale {}",
            ledger.snapshots.len(),
            ledger.snapshots.front_end_count(),
            ledger.state.total_deposits,
            ledger.state.current_epoch,
            ledger.state.current_scale
        );
        Ok(ledger)
    }

    // ============ Internals ============

    /// Run `op`, rolling state and events back if it fails
    fn atomically<T>(&mut self, op: impl FnOnce(&mut Self) -> LedgerResult<T>) -> LedgerResult<T> {
        let checkpoint = self.state.checkpoint();
        let events_len = self.events.len();

        let result = op(self);
        if let Err(ref err) = result {
            self.state.rollback(&checkpoint);
            self.events.truncate(events_len);
            if err.is_recoverable() {
                log::debug!("operation rejected: {} ({})", err, err.code());
            } else {
                log::warn!("operation aborted: {} ({})", err, err.code());
            }
        }
        result
    }

    fn apply_deposit(&mut self, request: &DepositRequest) -> LedgerResult<DepositResult> {
        let depositor = request.depositor;

        // 1. Front ends cannot deposit; a tag must name a registered one
        if self.snapshots.is_front_end(&depositor) {
            return Err(LedgerError::InvalidFrontEnd {
                front_end: depositor,
                reason: FrontEndErrorReason::DepositByFrontEnd,
            });
        }
        if let Some(front_end) = request.front_end {
            self.registered_front_end(&front_end)?;
        }

        // 2. Bring G up to date
        self.trigger_issuance(request.timestamp)?;

        // 3. Realize balance and gains against the current state
        let existing = self.snapshots.get(&depositor).copied();
        let (compounded, gains) = self.realize(existing.as_ref())?;
        let tag = match existing {
            Some(snapshot) => snapshot.front_end,
            None => request.front_end,
        };

        // 4. New balance must clear the minimum
        let new_balance = compounded
            .checked_add(request.amount)
            .ok_or(LedgerError::InvalidAmount {
                amount: request.amount,
                reason: AmountErrorReason::TooLarge,
            })?;
        if new_balance < self.config.min_deposit {
            return Err(LedgerError::InvalidAmount {
                amount: request.amount,
                reason: AmountErrorReason::TooSmall,
            });
        }

        let front_end = self.restake_front_end(tag, request.timestamp, |stake| {
            safe_add(stake, request.amount)
        })?;

        // 5. Update pool totals
        self.state.total_deposits = self
            .state
            .total_deposits
            .checked_add(request.amount)
            .ok_or(LedgerError::InvalidAmount {
                amount: request.amount,
                reason: AmountErrorReason::TooLarge,
            })?;
        self.release_gains(&gains);
        if existing.is_none() {
            self.state.depositor_count = safe_add_u64(self.state.depositor_count, 1)?;
        }

        // 6. Emit events
        self.emit_gains(depositor, &gains, request.timestamp);
        self.events.emit(LedgerEvent::Deposit {
            depositor,
            amount: request.amount,
            new_balance,
            pool_total: self.state.total_deposits,
            timestamp: request.timestamp,
        });

        // 7. Write the fresh snapshots
        let snapshot = self.fresh_snapshot(new_balance, tag, request.timestamp);
        self.snapshots.put(depositor, snapshot);
        self.commit_front_end(front_end, request.timestamp);

        log::debug!(
            "deposit {} amount={} balance={} pool={}",
            short_id(&depositor),
            request.amount,
            new_balance,
            self.state.total_deposits
        );

        Ok(DepositResult {
            gains,
            new_balance,
            pool_total: self.state.total_deposits,
        })
    }

    fn apply_withdraw(&mut self, request: &WithdrawRequest) -> LedgerResult<WithdrawResult> {
        let depositor = request.depositor;

        // 1. Bring G up to date
        self.trigger_issuance(request.timestamp)?;

        // 2. Depositor must have a recorded deposit
        let existing = self
            .snapshots
            .get(&depositor)
            .copied()
            .ok_or(LedgerError::NoActiveDeposit { depositor })?;
        let (compounded, gains) = self.realize(Some(&existing))?;

        // 3. Clamp to the compounded balance and the pool total
        let amount_withdrawn = request
            .amount
            .min(compounded)
            .min(self.state.total_deposits);
        let remaining_balance = safe_sub(compounded, amount_withdrawn)?;
        let front_end = self.restake_front_end(existing.front_end, request.timestamp, |stake| {
            Ok(stake.saturating_sub(amount_withdrawn))
        })?;

        // 4. Update pool totals
        self.state.total_deposits = safe_sub(self.state.total_deposits, amount_withdrawn)?;
        self.release_gains(&gains);
        if remaining_balance == 0 {
            self.state.depositor_count = self.state.depositor_count.saturating_sub(1);
        }

        // 5. Emit events
        self.emit_gains(depositor, &gains, request.timestamp);
        self.events.emit(LedgerEvent::Withdrawal {
            depositor,
            amount: amount_withdrawn,
            remaining_balance,
            pool_total: self.state.total_deposits,
            timestamp: request.timestamp,
        });

        // 6. Write or clear the snapshot
        if remaining_balance == 0 {
            self.snapshots.remove(&depositor);
        } else {
            let snapshot = self.fresh_snapshot(remaining_balance, existing.front_end, request.timestamp);
            self.snapshots.put(depositor, snapshot);
        }
        self.commit_front_end(front_end, request.timestamp);

        log::debug!(
            "withdraw {} requested={} withdrawn={} remaining={} pool={}",
            short_id(&depositor),
            request.amount,
            amount_withdrawn,
            remaining_balance,
            self.state.total_deposits
        );

        Ok(WithdrawResult {
            amount_withdrawn,
            gains,
            remaining_balance,
            pool_total: self.state.total_deposits,
        })
    }

    fn apply_claim(&mut self, request: &ClaimRequest) -> LedgerResult<Gains> {
        let depositor = request.depositor;

        self.trigger_issuance(request.timestamp)?;

        let existing = self
            .snapshots
            .get(&depositor)
            .copied()
            .ok_or(LedgerError::NoActiveDeposit { depositor })?;
        let (compounded, gains) = self.realize(Some(&existing))?;
        let front_end = self.restake_front_end(existing.front_end, request.timestamp, Ok)?;

        self.release_gains(&gains);
        if compounded == 0 {
            self.state.depositor_count = self.state.depositor_count.saturating_sub(1);
        }

        self.emit_gains(depositor, &gains, request.timestamp);

        // A wiped-out deposit is cleared once its frozen gains are paid
        if compounded == 0 {
            self.snapshots.remove(&depositor);
        } else {
            let snapshot = self.fresh_snapshot(compounded, existing.front_end, request.timestamp);
            self.snapshots.put(depositor, snapshot);
        }
        self.commit_front_end(front_end, request.timestamp);

        log::debug!(
            "claim {} collateral={} reward={} balance={}",
            short_id(&depositor),
            gains.collateral,
            gains.reward,
            compounded
        );

        Ok(gains)
    }

    fn apply_register_front_end(&mut self, request: &RegisterFrontEndRequest) -> LedgerResult<()> {
        let front_end = request.front_end;
        let reject = |reason| LedgerError::InvalidFrontEnd { front_end, reason };

        if request.kickback_rate > ONE {
            return Err(reject(FrontEndErrorReason::KickbackAboveOne));
        }
        if self.snapshots.is_front_end(&front_end) {
            return Err(reject(FrontEndErrorReason::AlreadyRegistered));
        }
        if self.snapshots.get(&front_end).is_some() {
            return Err(reject(FrontEndErrorReason::HasDeposit));
        }

        self.snapshots
            .put_front_end(front_end, FrontEnd::new(request.kickback_rate, request.timestamp));
        self.events.emit(LedgerEvent::FrontEndRegistered {
            front_end,
            kickback_rate: request.kickback_rate,
            timestamp: request.timestamp,
        });
        log::info!(
            "front end {} registered, kickback {}",
            short_id(&front_end),
            request.kickback_rate
        );
        Ok(())
    }

    fn apply_front_end_claim(&mut self, request: &FrontEndClaimRequest) -> LedgerResult<Amount> {
        self.registered_front_end(&request.front_end)?;
        self.trigger_issuance(request.timestamp)?;

        let mut update = match self.restake_front_end(Some(request.front_end), request.timestamp, Ok)? {
            Some(update) => update,
            None => return Ok(0),
        };
        let reward = update.record.accrued_reward;
        update.record.accrued_reward = 0;

        self.release_gains(&Gains::new(0, reward));
        self.commit_front_end(Some(update), request.timestamp);
        if reward > 0 {
            self.events.emit(LedgerEvent::FrontEndRewardPaid {
                front_end: request.front_end,
                reward,
                timestamp: request.timestamp,
            });
        }

        log::debug!("front end claim {} reward={}", short_id(&request.front_end), reward);
        Ok(reward)
    }

    fn apply_offset(&mut self, request: &OffsetRequest) -> LedgerResult<OffsetResult> {
        // 1. Pool must be able to absorb the debt
        if self.state.is_empty() {
            return Err(LedgerError::EmptyPool);
        }
        if request.debt_to_absorb > self.state.total_deposits {
            return Err(LedgerError::InsufficientPoolDeposits {
                available: self.state.total_deposits,
                required: request.debt_to_absorb,
            });
        }

        // 2. Issue pending rewards against the pre-offset deposits
        let reward_issued = self.trigger_issuance(request.timestamp)?;
        let total = self.state.total_deposits;

        // 3. Per-unit collateral gain and debt loss, with error feedback
        let (coll, collateral_distributed) =
            gain_per_unit_staked(request.collateral_to_add, total, self.state.last_coll_error)?;
        let loss = loss_per_unit_staked(request.debt_to_absorb, total, self.state.last_loss_error)?;

        // 4. S grows by the gain scaled by the current P
        let new_s = self.state.current_s().accrue(coll.per_unit, self.state.p)?;
        self.state.s_table.set_head(new_s);
        self.state.last_coll_error = coll.error;
        self.state.last_loss_error = loss.error;
        self.state.pending_collateral = safe_add(self.state.pending_collateral, collateral_distributed)?;

        // 5. Update P, opening a new epoch or scale when needed
        if loss.per_unit == ONE {
            self.open_epoch(request.timestamp)?;
        } else {
            let (new_p, bumps) = rescale_product(self.state.p, ONE - loss.per_unit)?;
            for _ in 0..bumps {
                self.open_scale(request.timestamp)?;
            }
            self.state.p = new_p;
        }

        // 6. Burn the absorbed debt
        self.state.total_deposits = safe_sub(total, request.debt_to_absorb)?;

        self.events.emit(LedgerEvent::Offset {
            debt_absorbed: request.debt_to_absorb,
            collateral_distributed,
            pool_total: self.state.total_deposits,
            timestamp: request.timestamp,
        });

        log::debug!(
            "offset debt={} collateral={} P={} epoch={} scale={} pool={}",
            request.debt_to_absorb,
            collateral_distributed,
            self.state.p,
            self.state.current_epoch,
            self.state.current_scale,
            self.state.total_deposits
        );

        Ok(OffsetResult {
            debt_absorbed: request.debt_to_absorb,
            collateral_distributed,
            reward_issued,
            new_product_p: self.state.p,
            epoch: self.state.current_epoch,
            scale: self.state.current_scale,
            pool_total: self.state.total_deposits,
        })
    }

    /// Issue reward tokens due since the last touch into G
    ///
    /// Emission due while the pool is empty is deferred: the schedule is
    /// cumulative, so the backlog is issued on the first touch with
    /// deposits present.
    fn trigger_issuance(&mut self, timestamp: u64) -> LedgerResult<Amount> {
        if timestamp < self.state.last_reward_time {
            log::warn!(
                "timestamp {} precedes last issuance at {}; issuing nothing",
                timestamp,
                self.state.last_reward_time
            );
        }
        let now = timestamp.max(self.state.last_reward_time);
        self.state.last_reward_time = now;

        if self.state.is_empty() {
            return Ok(0);
        }

        let due = self
            .schedule
            .cumulative_issuance(self.state.reward_start_time, now)?;
        let issuance = due.saturating_sub(self.state.last_reward_sum);
        if issuance == 0 {
            return Ok(0);
        }

        let (reward, distributed) = gain_per_unit_staked(
            issuance,
            self.state.total_deposits,
            self.state.last_reward_error,
        )?;
        let new_g = self.state.current_g().accrue(reward.per_unit, self.state.p)?;
        self.state.g_table.set_head(new_g);
        self.state.last_reward_error = reward.error;
        self.state.last_reward_sum = safe_add(self.state.last_reward_sum, issuance)?;
        self.state.pending_reward = safe_add(self.state.pending_reward, distributed)?;

        self.events.emit(LedgerEvent::RewardIssued {
            amount: issuance,
            total_issued: self.state.last_reward_sum,
            timestamp: now,
        });
        Ok(issuance)
    }

    /// Full wipeout: every existing snapshot belongs to a past epoch
    fn open_epoch(&mut self, timestamp: u64) -> LedgerResult<()> {
        self.state.current_epoch = safe_add_u64(self.state.current_epoch, 1)?;
        self.state.current_scale = 0;
        self.state.p = ONE;
        self.state.s_table.push_epoch();
        self.state.g_table.push_epoch();

        log::info!("pool emptied by offset; epoch {} begins", self.state.current_epoch);
        self.events.emit(LedgerEvent::EpochChanged {
            epoch: self.state.current_epoch,
            timestamp,
        });
        Ok(())
    }

    fn open_scale(&mut self, timestamp: u64) -> LedgerResult<()> {
        self.state.current_scale = safe_add_u64(self.state.current_scale, 1)?;
        self.state.s_table.push_scale();
        self.state.g_table.push_scale();

        log::info!(
            "P rescaled; epoch {} scale {}",
            self.state.current_epoch,
            self.state.current_scale
        );
        self.events.emit(LedgerEvent::ScaleChanged {
            epoch: self.state.current_epoch,
            scale: self.state.current_scale,
            timestamp,
        });
        Ok(())
    }

    fn realize(&self, snapshot: Option<&DepositorSnapshot>) -> LedgerResult<(Amount, Gains)> {
        match snapshot {
            Some(snapshot) => Ok((
                compounded_balance_of(snapshot, &self.state)?,
                self.snapshots.depositor_gains_of(snapshot, &self.state)?,
            )),
            None => Ok((0, Gains::ZERO)),
        }
    }

    fn registered_front_end(&self, front_end: &FrontEndId) -> LedgerResult<FrontEnd> {
        self.snapshots
            .front_end(front_end)
            .copied()
            .ok_or(LedgerError::InvalidFrontEnd {
                front_end: *front_end,
                reason: FrontEndErrorReason::NotRegistered,
            })
    }

    /// Realize a front end's reward and move its stake to `new_stake(compounded)`
    ///
    /// Computes the update without writing it, so a later failure in the
    /// same operation leaves the front end untouched.
    fn restake_front_end(
        &self,
        front_end: Option<FrontEndId>,
        timestamp: u64,
        new_stake: impl FnOnce(Amount) -> LedgerResult<Amount>,
    ) -> LedgerResult<Option<FrontEndUpdate>> {
        let id = match front_end {
            Some(id) => id,
            None => return Ok(None),
        };
        let record = self.registered_front_end(&id)?;
        let reward_accrued = front_end_reward_of(&record, &self.state)?;
        let stake = new_stake(front_end_stake_of(&record, &self.state)?)?;

        Ok(Some(FrontEndUpdate {
            id,
            record: FrontEnd {
                kickback_rate: record.kickback_rate,
                stake: self.fresh_snapshot(stake, None, timestamp),
                accrued_reward: safe_add(record.accrued_reward, reward_accrued)?,
            },
            reward_accrued,
        }))
    }

    fn commit_front_end(&mut self, update: Option<FrontEndUpdate>, timestamp: u64) {
        if let Some(update) = update {
            self.events.emit(LedgerEvent::FrontEndStakeChanged {
                front_end: update.id,
                stake: update.record.stake.initial_deposit,
                reward_accrued: update.reward_accrued,
                timestamp,
            });
            self.snapshots.put_front_end(update.id, update.record);
        }
    }

    /// Remove paid gains from the amounts held for depositors and front ends
    fn release_gains(&mut self, gains: &Gains) {
        if gains.collateral > self.state.pending_collateral {
            log::warn!(
                "collateral payout {} exceeds held {}",
                gains.collateral,
                self.state.pending_collateral
            );
        }
        if gains.reward > self.state.pending_reward {
            log::warn!(
                "reward payout {} exceeds held {}",
                gains.reward,
                self.state.pending_reward
            );
        }
        self.state.pending_collateral = self.state.pending_collateral.saturating_sub(gains.collateral);
        self.state.pending_reward = self.state.pending_reward.saturating_sub(gains.reward);
    }

    fn emit_gains(&mut self, depositor: DepositorId, gains: &Gains, timestamp: u64) {
        if gains.is_zero() {
            return;
        }
        self.events.emit(LedgerEvent::GainsPaid {
            depositor,
            collateral: gains.collateral,
            reward: gains.reward,
            timestamp,
        });
    }

    fn fresh_snapshot(&self, balance: Amount, front_end: Option<FrontEndId>, timestamp: u64) -> DepositorSnapshot {
        DepositorSnapshot {
            initial_deposit: balance,
            p: self.state.p,
            s: self.state.current_s(),
            g: self.state.current_g(),
            scale: self.state.current_scale,
            epoch: self.state.current_epoch,
            last_updated: timestamp,
            front_end,
        }
    }
}

fn safe_add_u64(a: u64, b: u64) -> LedgerResult<u64> {
    a.checked_add(b).ok_or(LedgerError::Overflow)
}
