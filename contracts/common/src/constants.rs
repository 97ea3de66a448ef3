//! Ledger Constants
//!
//! Fixed-point widths, rescale thresholds and reward emission parameters.
//! The values follow Liquity's stability pool.

/// Token metadata for the pooled asset
pub mod token {
    /// Decimal places of every amount handled by the ledger
    pub const DECIMALS: u8 = 18;
    /// One whole token in base units
    pub const ONE: u128 = 1_000_000_000_000_000_000;
}

/// Fixed-point precision
pub mod precision {
    /// Denominator representing logical 1.0 (1e18)
    pub const DECIMAL_PRECISION: u128 = 1_000_000_000_000_000_000;

    /// Logical 1.0 for P and per-unit ratios
    pub const ONE: u128 = DECIMAL_PRECISION;
}

/// Product factor rescaling
pub mod scale {
    /// Factor applied to P on every scale change (1e9)
    pub const SCALE_FACTOR: u128 = 1_000_000_000;

    /// P below this value (logical 1e-9) triggers a rescale
    pub const P_FLOOR: u128 = SCALE_FACTOR;

    /// Compounded deposits below initial / DUST_DIVISOR are treated as zero
    pub const DUST_DIVISOR: u128 = 1_000_000_000;

    /// Upper bound on scale bumps in a single offset.
    /// P * factor is at least 1e9 in 1e36 units, so two bumps always suffice.
    pub const MAX_RESCALES_PER_OFFSET: u64 = 4;
}

/// Reward token emission
pub mod issuance {
    /// Seconds per minute (emission is computed in whole minutes)
    pub const SECONDS_PER_MINUTE: u64 = 60;

    /// Seconds per year (no leap years)
    pub const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;

    /// Per-minute decay factor F with F^525600 = 0.5
    ///
    /// Half of the remaining supply is issued every year.
    pub const HALVING_ISSUANCE_FACTOR: u64 = 999_998_681_227_695_000;

    /// Default reward supply routed to depositors (32M tokens)
    pub const DEFAULT_SUPPLY_CAP: u128 = 32_000_000 * super::token::ONE;
}

/// Deposit limits
pub mod limits {
    /// Default minimum deposit (one base unit)
    pub const DEFAULT_MIN_DEPOSIT: u128 = 1;
}

/// Persisted ledger image framing
pub mod image {
    /// Magic prefix of an encoded ledger image
    pub const MAGIC: [u8; 4] = *b"PLDG";

    /// Current image format version
    pub const VERSION: u16 = 2;

    /// Header length: magic + version + sha256 digest
    pub const HEADER_LEN: usize = 4 + 2 + 32;
}
