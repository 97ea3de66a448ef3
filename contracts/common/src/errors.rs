//! Error Types for the Pool Ledger
//!
//! Typed errors with stable codes. User-facing kinds are marked
//! recoverable; the rest are defects in the calling system and must be
//! propagated as hard failures rather than clamped.

use core::fmt;

use crate::types::{Amount, DepositorId, FrontEndId};

/// Result type alias for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Main error enum for all ledger errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    // ============ Input Errors ============
    /// Invalid amount provided
    InvalidAmount { amount: Amount, reason: AmountErrorReason },

    /// Withdraw or claim attempted with no recorded deposit
    NoActiveDeposit { depositor: DepositorId },

    /// Front end registration or tagging rejected
    InvalidFrontEnd {
        front_end: FrontEndId,
        reason: FrontEndErrorReason,
    },

    // ============ Pool Errors ============
    /// Offset debt exceeds total deposits in the pool
    InsufficientPoolDeposits { available: Amount, required: Amount },

    /// Offset attempted against an empty pool
    EmptyPool,

    // ============ Math Errors ============
    /// A rescale of P would itself underflow to zero
    PrecisionUnderflow,

    /// Arithmetic overflow occurred
    Overflow,

    /// Division by zero
    DivisionByZero,

    // ============ Persistence Errors ============
    /// Ledger image could not be decoded
    CorruptImage { reason: &'static str },

    /// Ledger image payload does not match its checksum
    ChecksumMismatch,

    // ============ Configuration Errors ============
    /// Configuration rejected at construction
    InvalidConfig { reason: &'static str },

    // ============ Collaborator Errors ============
    /// Asset mover refused a transfer
    TransferFailed { depositor: DepositorId, amount: Amount },

    /// Shared ledger lock was poisoned by a panicking writer
    LockPoisoned,
}

/// Reasons for amount-related errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountErrorReason {
    /// Amount is zero when non-zero required
    Zero,
    /// Amount below configured minimum
    TooSmall,
    /// Amount exceeds representable range
    TooLarge,
}

/// Reasons a front end is rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontEndErrorReason {
    /// Tag names an account that never registered
    NotRegistered,
    /// Account is already a front end
    AlreadyRegistered,
    /// Account holds a deposit and cannot become a front end
    HasDeposit,
    /// Registered front ends cannot deposit
    DepositByFrontEnd,
    /// Kickback rate above 1.0
    KickbackAboveOne,
}

impl LedgerError {
    /// Returns a stable error code for logging/debugging
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount { .. } => "E010_INVALID_AMOUNT",
            Self::NoActiveDeposit { .. } => "E011_NO_ACTIVE_DEPOSIT",
            Self::InvalidFrontEnd { .. } => "E012_INVALID_FRONT_END",
            Self::InsufficientPoolDeposits { .. } => "E050_POOL_INSUFFICIENT",
            Self::EmptyPool => "E051_POOL_EMPTY",
            Self::PrecisionUnderflow => "E080_PRECISION_UNDERFLOW",
            Self::Overflow => "E081_OVERFLOW",
            Self::DivisionByZero => "E082_DIV_ZERO",
            Self::CorruptImage { .. } => "E090_CORRUPT_IMAGE",
            Self::ChecksumMismatch => "E091_CHECKSUM",
            Self::InvalidConfig { .. } => "E100_INVALID_CONFIG",
            Self::TransferFailed { .. } => "E110_TRANSFER_FAILED",
            Self::LockPoisoned => "E120_LOCK_POISONED",
        }
    }

    /// Returns true if this error is recoverable (user can fix it)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidAmount { .. } | Self::NoActiveDeposit { .. } | Self::InvalidFrontEnd { .. }
        )
    }
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAmount { amount, reason } => {
                write!(f, "{}: invalid amount {} ({:?})", self.code(), amount, reason)
            }
            Self::NoActiveDeposit { depositor } => write!(
                f,
                "{}: no active deposit for {}",
                self.code(),
                crate::types::short_id(depositor)
            ),
            Self::InvalidFrontEnd { front_end, reason } => write!(
                f,
                "{}: front end {} rejected ({:?})",
                self.code(),
                crate::types::short_id(front_end),
                reason
            ),
            Self::InsufficientPoolDeposits { available, required } => write!(
                f,
                "{}: pool holds {} but offset requires {}",
                self.code(),
                available,
                required
            ),
            Self::CorruptImage { reason } | Self::InvalidConfig { reason } => {
                write!(f, "{}: {}", self.code(), reason)
            }
            Self::TransferFailed { depositor, amount } => write!(
                f,
                "{}: transfer of {} for {} failed",
                self.code(),
                amount,
                crate::types::short_id(depositor)
            ),
            _ => f.write_str(self.code()),
        }
    }
}

impl std::error::Error for LedgerError {}
