//! Core Types for the Pool Ledger
//!
//! Depositor identities, snapshots and the request/result records that
//! flow between the ledger and its collaborators.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::precision::ONE;
use crate::math::ScaledSum;

/// Type alias for depositor identities (32-byte hash)
pub type DepositorId = [u8; 32];

/// Front ends are accounts too; the two roles never overlap
pub type FrontEndId = DepositorId;

/// Integer amount in base units (1e-18 of a token)
pub type Amount = u128;

/// Derive a deterministic depositor identity from an external account label
pub fn depositor_id(label: &[u8]) -> DepositorId {
    let mut hasher = Sha256::new();
    hasher.update(b"pool-ledger/depositor");
    hasher.update(label);
    let result = hasher.finalize();
    let mut id = [0u8; 32];
    id.copy_from_slice(&result);
    id
}

/// First four bytes of an identity as hex, for log lines
pub fn short_id(id: &DepositorId) -> String {
    id[..4].iter().map(|b| format!("{:02x}", b)).collect()
}

// ============ Snapshot Types ============

/// Accumulator values observed by one depositor at their last interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct DepositorSnapshot {
    /// Compounded balance recorded at the last interaction
    pub initial_deposit: Amount,
    /// Product factor P at the last interaction
    pub p: u128,
    /// Collateral sum S of the (epoch, scale) page at the last interaction
    pub s: ScaledSum,
    /// Reward sum G of the (epoch, scale) page at the last interaction
    pub g: ScaledSum,
    /// Scale at the last interaction
    pub scale: u64,
    /// Epoch at the last interaction
    pub epoch: u64,
    /// Timestamp of the last interaction
    pub last_updated: u64,
    /// Front end the deposit was made through, fixed when the deposit opens
    pub front_end: Option<FrontEndId>,
}

impl DepositorSnapshot {
    /// A zeroed snapshot (no deposit)
    pub fn empty() -> Self {
        Self {
            initial_deposit: 0,
            p: ONE,
            s: ScaledSum::ZERO,
            g: ScaledSum::ZERO,
            scale: 0,
            epoch: 0,
            last_updated: 0,
            front_end: None,
        }
    }

    /// True when the snapshot records no deposit
    pub fn is_empty(&self) -> bool {
        self.initial_deposit == 0
    }
}

impl Default for DepositorSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// A registered front end
///
/// Its stake is the compounded sum of the deposits tagged with it and is
/// snapshotted exactly like a deposit. Of the reward gains earned by that
/// stake, `kickback_rate` goes to the depositors and the rest to the front
/// end. Front ends earn no collateral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct FrontEnd {
    /// Depositors' share of reward gains, scaled by 1e18
    pub kickback_rate: u128,
    /// Stake snapshot; `initial_deposit` holds the stake
    pub stake: DepositorSnapshot,
    /// Reward realized for the front end and not yet claimed
    pub accrued_reward: Amount,
}

impl FrontEnd {
    pub fn new(kickback_rate: u128, registered_at: u64) -> Self {
        Self {
            kickback_rate,
            stake: DepositorSnapshot {
                last_updated: registered_at,
                ..DepositorSnapshot::empty()
            },
            accrued_reward: 0,
        }
    }
}

/// Collateral and reward token amounts owed to a depositor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Gains {
    /// Collateral asset gained from offsets
    pub collateral: Amount,
    /// Incentive token gained from emission
    pub reward: Amount,
}

impl Gains {
    pub const ZERO: Gains = Gains {
        collateral: 0,
        reward: 0,
    };

    pub fn new(collateral: Amount, reward: Amount) -> Self {
        Self { collateral, reward }
    }

    pub fn is_zero(&self) -> bool {
        self.collateral == 0 && self.reward == 0
    }

    /// Component-wise saturating sum
    pub fn saturating_add(&self, other: &Gains) -> Gains {
        Gains {
            collateral: self.collateral.saturating_add(other.collateral),
            reward: self.reward.saturating_add(other.reward),
        }
    }
}

// ============ Requests ============

/// Request to deposit the pooled asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositRequest {
    /// Depositor identity
    pub depositor: DepositorId,
    /// Amount to deposit
    pub amount: Amount,
    /// Front end to tag a new deposit with; top-ups keep the original tag
    pub front_end: Option<FrontEndId>,
    /// Current time in seconds
    pub timestamp: u64,
}

/// Request to withdraw the pooled asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawRequest {
    /// Depositor identity
    pub depositor: DepositorId,
    /// Requested amount (clamped to the compounded balance)
    pub amount: Amount,
    /// Current time in seconds
    pub timestamp: u64,
}

/// Request to realize gains without moving principal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimRequest {
    /// Depositor identity
    pub depositor: DepositorId,
    /// Current time in seconds
    pub timestamp: u64,
}

/// Request to register a front end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterFrontEndRequest {
    pub front_end: FrontEndId,
    /// Depositors' share of reward gains, scaled by 1e18 (at most 1.0)
    pub kickback_rate: u128,
    pub timestamp: u64,
}

/// Request to pay out a front end's accrued reward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontEndClaimRequest {
    pub front_end: FrontEndId,
    pub timestamp: u64,
}

/// Liquidation offset issued by the liquidation engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetRequest {
    /// Debt cancelled against pool deposits
    pub debt_to_absorb: Amount,
    /// Collateral distributed to depositors
    pub collateral_to_add: Amount,
    /// Current time in seconds
    pub timestamp: u64,
}

// ============ Results ============

/// Result of a deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositResult {
    /// Gains realized by the deposit
    pub gains: Gains,
    /// Depositor balance after the deposit
    pub new_balance: Amount,
    /// Pool total after the deposit
    pub pool_total: Amount,
}

/// Result of a withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawResult {
    /// Amount actually withdrawn (may be less than requested)
    pub amount_withdrawn: Amount,
    /// Gains realized by the withdrawal
    pub gains: Gains,
    /// Depositor balance left in the pool
    pub remaining_balance: Amount,
    /// Pool total after the withdrawal
    pub pool_total: Amount,
}

/// Result of a liquidation offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetResult {
    /// Debt absorbed by the pool
    pub debt_absorbed: Amount,
    /// Collateral credited to depositors after precision loss
    pub collateral_distributed: Amount,
    /// Reward tokens issued into the pool by this call
    pub reward_issued: Amount,
    /// Product factor after the offset
    pub new_product_p: u128,
    /// Epoch after the offset
    pub epoch: u64,
    /// Scale after the offset
    pub scale: u64,
    /// Pool total after the offset
    pub pool_total: Amount,
}

/// Read-only view of one depositor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositorPosition {
    /// Current compounded balance
    pub compounded_balance: Amount,
    /// Gains not yet realized
    pub pending_gains: Gains,
}

/// Read-only view of one front end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontEndPosition {
    pub kickback_rate: u128,
    /// Current compounded stake
    pub stake: Amount,
    /// Accrued plus not yet realized reward
    pub pending_reward: Amount,
}

/// Aggregate pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Sum of all compounded balances
    pub total_deposits: Amount,
    /// Depositors with a non-zero recorded deposit
    pub depositor_count: u64,
    /// Registered front ends
    pub front_end_count: u64,
    /// Current epoch
    pub epoch: u64,
    /// Current scale
    pub scale: u64,
    /// Product factor P
    pub product_p: u128,
    /// Collateral held for depositors, not yet paid out
    pub pending_collateral: Amount,
    /// Reward tokens held for depositors and front ends, not yet paid out
    pub pending_reward: Amount,
    /// Total reward tokens issued so far
    pub total_reward_issued: Amount,
}
