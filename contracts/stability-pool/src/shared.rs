//! Shared Ledger Handle
//!
//! Linearizes mutators behind one write lock held for the whole
//! operation; balance queries share a read lock and observe a consistent
//! pool state.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use pool_ledger_common::{
    errors::{LedgerError, LedgerResult},
    events::LedgerEvent,
    types::{
        Amount, ClaimRequest, DepositRequest, DepositResult, DepositorId, DepositorPosition,
        FrontEndClaimRequest, FrontEndId, FrontEndPosition, Gains, OffsetRequest, OffsetResult,
        PoolStats, RegisterFrontEndRequest, WithdrawRequest, WithdrawResult,
    },
};

use crate::ledger::PoolLedger;

/// Cloneable handle to one ledger
#[derive(Debug, Clone)]
pub struct SharedLedger {
    inner: Arc<RwLock<PoolLedger>>,
}

impl SharedLedger {
    pub fn new(ledger: PoolLedger) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ledger)),
        }
    }

    fn read(&self) -> LedgerResult<RwLockReadGuard<'_, PoolLedger>> {
        self.inner.read().map_err(|_| LedgerError::LockPoisoned)
    }

    fn write(&self) -> LedgerResult<RwLockWriteGuard<'_, PoolLedger>> {
        self.inner.write().map_err(|_| LedgerError::LockPoisoned)
    }

    pub fn deposit(&self, request: &DepositRequest) -> LedgerResult<DepositResult> {
        self.write()?.deposit(request)
    }

    pub fn withdraw(&self, request: &WithdrawRequest) -> LedgerResult<WithdrawResult> {
        self.write()?.withdraw(request)
    }

    pub fn claim_gains(&self, request: &ClaimRequest) -> LedgerResult<Gains> {
        self.write()?.claim_gains(request)
    }

    pub fn offset(&self, request: &OffsetRequest) -> LedgerResult<OffsetResult> {
        self.write()?.offset(request)
    }

    pub fn register_front_end(&self, request: &RegisterFrontEndRequest) -> LedgerResult<()> {
        self.write()?.register_front_end(request)
    }

    pub fn claim_front_end_reward(&self, request: &FrontEndClaimRequest) -> LedgerResult<Amount> {
        self.write()?.claim_front_end_reward(request)
    }

    pub fn drain_events(&self) -> LedgerResult<Vec<LedgerEvent>> {
        Ok(self.write()?.drain_events())
    }

    pub fn query_balance(&self, depositor: &DepositorId) -> LedgerResult<DepositorPosition> {
        self.read()?.query_balance(depositor)
    }

    pub fn front_end_position(&self, front_end: &FrontEndId) -> LedgerResult<FrontEndPosition> {
        self.read()?.front_end_position(front_end)
    }

    pub fn pool_stats(&self) -> LedgerResult<PoolStats> {
        Ok(self.read()?.pool_stats())
    }

    pub fn export_image(&self) -> LedgerResult<Vec<u8>> {
        self.read()?.export_image()
    }

    /// Run a read-only closure against a consistent view
    pub fn with_read<T>(&self, f: impl FnOnce(&PoolLedger) -> T) -> LedgerResult<T> {
        Ok(f(&*self.read()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pool_ledger_common::{config::LedgerConfig, types::depositor_id};
    use std::thread;

    #[test]
    fn test_concurrent_deposits_linearize() {
        let shared = SharedLedger::new(PoolLedger::new(LedgerConfig::without_rewards()).unwrap());

        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let shared = shared.clone();
                thread::spawn(move || {
                    let depositor = depositor_id(&[i]);
                    for t in 0..50u64 {
                        shared
                            .deposit(&DepositRequest {
                                depositor,
                                amount: 10,
                                front_end: None,
                                timestamp: t,
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = shared.pool_stats().unwrap();
        assert_eq!(stats.total_deposits, 8 * 50 * 10);
        assert_eq!(stats.depositor_count, 8);
        assert_eq!(
            shared.query_balance(&depositor_id(&[3])).unwrap().compounded_balance,
            500
        );
    }

    #[test]
    fn test_with_read_sees_one_state() {
        let shared = SharedLedger::new(PoolLedger::new(LedgerConfig::without_rewards()).unwrap());
        shared
            .deposit(&DepositRequest {
                depositor: depositor_id(b"alice"),
                amount: 700,
                front_end: None,
                timestamp: 0,
            })
            .unwrap();

        let (total, rows) = shared
            .with_read(|ledger| (ledger.pool_stats().total_deposits, ledger.snapshots().len()))
            .unwrap();
        assert_eq!((total, rows), (700, 1));
    }

    #[test]
    fn test_front_end_through_handle() {
        let shared = SharedLedger::new(PoolLedger::new(LedgerConfig::without_rewards()).unwrap());
        let web = depositor_id(b"web");
        shared
            .register_front_end(&RegisterFrontEndRequest {
                front_end: web,
                kickback_rate: 0,
                timestamp: 0,
            })
            .unwrap();
        shared
            .deposit(&DepositRequest {
                depositor: depositor_id(b"alice"),
                amount: 700,
                front_end: Some(web),
                timestamp: 0,
            })
            .unwrap();

        assert_eq!(shared.front_end_position(&web).unwrap().stake, 700);
        let request = FrontEndClaimRequest {
            front_end: web,
            timestamp: 1,
        };
        assert_eq!(shared.claim_front_end_reward(&request), Ok(0));
        assert_eq!(shared.pool_stats().unwrap().front_end_count, 1);
    }

    #[test]
    fn test_poisoned_lock_reported() {
        let shared = SharedLedger::new(PoolLedger::new(LedgerConfig::without_rewards()).unwrap());
        let poisoner = shared.clone();
        let _ = thread::spawn(move || {
            let _guard = poisoner.inner.write().unwrap();
            panic!("writer died");
        })
        .join();

        assert_eq!(shared.pool_stats(), Err(LedgerError::LockPoisoned));
    }
}
