//! Ledger Events
//!
//! Events are emitted by every state transition and collected in an
//! `EventLog` that the host drains and indexes. Each emission is also
//! mirrored to the `log` facade at debug level.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::types::{short_id, Amount, DepositorId, FrontEndId};

/// Event types for indexing and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Depositor Events (0x20 - 0x2F)
    Deposit = 0x20,
    Withdrawal = 0x21,
    GainsPaid = 0x22,

    // Pool Events (0x30 - 0x3F)
    Offset = 0x30,
    RewardIssued = 0x31,
    ScaleChanged = 0x32,
    EpochChanged = 0x33,

    // Front End Events (0x40 - 0x4F)
    FrontEndRegistered = 0x40,
    FrontEndStakeChanged = 0x41,
    FrontEndRewardPaid = 0x42,
}

/// Main event enum containing all ledger events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum LedgerEvent {
    // ============ Depositor Events ============

    /// Emitted when the pooled asset is deposited
    Deposit {
        depositor: DepositorId,
        amount: Amount,
        new_balance: Amount,
        pool_total: Amount,
        timestamp: u64,
    },

    /// Emitted when the pooled asset is withdrawn
    Withdrawal {
        depositor: DepositorId,
        amount: Amount,
        remaining_balance: Amount,
        pool_total: Amount,
        timestamp: u64,
    },

    /// Emitted when collateral and reward gains are realized
    GainsPaid {
        depositor: DepositorId,
        collateral: Amount,
        reward: Amount,
        timestamp: u64,
    },

    // ============ Pool Events ============

    /// Emitted when the pool absorbs a liquidation
    Offset {
        debt_absorbed: Amount,
        collateral_distributed: Amount,
        pool_total: Amount,
        timestamp: u64,
    },

    /// Emitted when reward tokens are issued into G
    RewardIssued {
        amount: Amount,
        total_issued: Amount,
        timestamp: u64,
    },

    /// Emitted when P is renormalized
    ScaleChanged {
        epoch: u64,
        scale: u64,
        timestamp: u64,
    },

    /// Emitted when the pool is fully emptied by an offset
    EpochChanged {
        epoch: u64,
        timestamp: u64,
    },

    // ============ Front End Events ============

    FrontEndRegistered {
        front_end: FrontEndId,
        kickback_rate: u128,
        timestamp: u64,
    },

    /// Emitted when a tagged deposit moves a front end's stake
    FrontEndStakeChanged {
        front_end: FrontEndId,
        stake: Amount,
        reward_accrued: Amount,
        timestamp: u64,
    },

    FrontEndRewardPaid {
        front_end: FrontEndId,
        reward: Amount,
        timestamp: u64,
    },
}

impl LedgerEvent {
    /// Get the event type for filtering
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Deposit { .. } => EventType::Deposit,
            Self::Withdrawal { .. } => EventType::Withdrawal,
            Self::GainsPaid { .. } => EventType::GainsPaid,
            Self::Offset { .. } => EventType::Offset,
            Self::RewardIssued { .. } => EventType::RewardIssued,
            Self::ScaleChanged { .. } => EventType::ScaleChanged,
            Self::EpochChanged { .. } => EventType::EpochChanged,
            Self::FrontEndRegistered { .. } => EventType::FrontEndRegistered,
            Self::FrontEndStakeChanged { .. } => EventType::FrontEndStakeChanged,
            Self::FrontEndRewardPaid { .. } => EventType::FrontEndRewardPaid,
        }
    }

    /// Get the timestamp when the event occurred
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::Deposit { timestamp, .. }
            | Self::Withdrawal { timestamp, .. }
            | Self::GainsPaid { timestamp, .. }
            | Self::Offset { timestamp, .. }
            | Self::RewardIssued { timestamp, .. }
            | Self::ScaleChanged { timestamp, .. }
            | Self::EpochChanged { timestamp, .. }
            | Self::FrontEndRegistered { timestamp, .. }
            | Self::FrontEndStakeChanged { timestamp, .. }
            | Self::FrontEndRewardPaid { timestamp, .. } => *timestamp,
        }
    }

    /// Account the event concerns, if any (a depositor or a front end)
    pub fn depositor(&self) -> Option<&DepositorId> {
        match self {
            Self::Deposit { depositor, .. }
            | Self::Withdrawal { depositor, .. }
            | Self::GainsPaid { depositor, .. } => Some(depositor),
            Self::FrontEndRegistered { front_end, .. }
            | Self::FrontEndStakeChanged { front_end, .. }
            | Self::FrontEndRewardPaid { front_end, .. } => Some(front_end),
            _ => None,
        }
    }

    /// Serialize event to bytes for storage/transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    /// Deserialize event from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

/// Event log for collecting events between drains
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<LedgerEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Emit an event (add to log)
    pub fn emit(&mut self, event: LedgerEvent) {
        match event.depositor() {
            Some(depositor) => log::debug!(
                target: "pool_ledger::events",
                "{:?} depositor={} {:?}",
                event.event_type(),
                short_id(depositor),
                event
            ),
            None => log::debug!(target: "pool_ledger::events", "{:?} {:?}", event.event_type(), event),
        }
        self.events.push(event);
    }

    /// Get all events
    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Take all events, leaving the log empty
    pub fn drain(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    /// Drop events emitted after `len`; used when an operation is rolled back
    pub fn truncate(&mut self, len: usize) {
        self.events.truncate(len);
    }

    /// Filter events by type
    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&LedgerEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Check if any events were emitted
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Get number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type() {
        let event = LedgerEvent::Deposit {
            depositor: [1u8; 32],
            amount: 100,
            new_balance: 100,
            pool_total: 100,
            timestamp: 7,
        };

        assert_eq!(event.event_type(), EventType::Deposit);
        assert_eq!(event.timestamp(), 7);
        assert_eq!(event.depositor(), Some(&[1u8; 32]));
    }

    #[test]
    fn test_event_serialization() {
        let event = LedgerEvent::Offset {
            debt_absorbed: 500,
            collateral_distributed: 10,
            pool_total: 500,
            timestamp: 200,
        };

        let bytes = event.to_bytes();
        let restored = LedgerEvent::from_bytes(&bytes).unwrap();

        assert_eq!(event, restored);
    }

    #[test]
    fn test_event_log_drain_and_truncate() {
        let mut log = EventLog::new();

        log.emit(LedgerEvent::EpochChanged {
            epoch: 1,
            timestamp: 1,
        });
        log.emit(LedgerEvent::ScaleChanged {
            epoch: 1,
            scale: 1,
            timestamp: 2,
        });
        log.emit(LedgerEvent::ScaleChanged {
            epoch: 1,
            scale: 2,
            timestamp: 3,
        });

        assert_eq!(log.filter_by_type(EventType::ScaleChanged).len(), 2);

        log.truncate(1);
        assert_eq!(log.len(), 1);

        let drained = log.drain();
        assert_eq!(drained.len(), 1);
        assert!(!log.has_events());
    }
}
