//! Pool Ledger
//!
//! Pooled-deposit ledger in the style of a stability pool. Depositors
//! pool a stable asset; liquidations burn part of the pool and distribute
//! the seized collateral pro rata, and a reward token is issued to
//! depositors on a fixed schedule.
//!
//! ## O(1) Accounting
//!
//! Nothing iterates over depositors. The pool keeps three accumulators:
//! - **P**: running product of `(1 - loss per unit)`, rescaled by 1e9 when
//!   it falls below 1e-9 and reset when an offset empties the pool
//! - **S**: collateral gain per unit deposited, one sum per (epoch, scale)
//! - **G**: reward gain per unit deposited, one sum per (epoch, scale)
//!
//! Each depositor stores a snapshot of P, S and G from their last
//! interaction; balances and gains follow from the snapshot alone.
//!
//! ## Modules
//!
//! - [`ledger`]: the single-writer [`PoolLedger`]
//! - [`shared`]: [`SharedLedger`], a lock-guarded handle for many threads
//! - [`issuance`]: reward emission schedules
//! - [`persistence`]: checksummed ledger images
//! - [`interfaces`]: asset movement and liquidation collaborators
//! - [`simulation`]: seeded stress runs with invariant checks

pub mod sum_table;
pub mod pool_state;
pub mod snapshot_store;
pub mod issuance;
pub mod interfaces;
pub mod ledger;
pub mod persistence;
pub mod shared;
pub mod simulation;


pub use interfaces::{AssetBook, AssetMover, LiquidationSource};
pub use issuance::{HalvingSchedule, LinearSchedule, NoRewards, RewardSchedule};
pub use ledger::PoolLedger;
pub use persistence::LedgerImage;
pub use pool_state::PoolState;
pub use shared::SharedLedger;
pub use snapshot_store::SnapshotStore;
pub use sum_table::EpochToScaleToSum;

pub use pool_ledger_common as common;
