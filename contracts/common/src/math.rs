//! Fixed-Point Math for the Pool Ledger
//!
//! Checked 128-bit arithmetic with 256-bit intermediates, plus the
//! Liquity scaled-sum formulas used to compound deposits and price gains
//! lazily from snapshots.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::constants::precision::{DECIMAL_PRECISION, ONE};
use crate::constants::scale::{DUST_DIVISOR, MAX_RESCALES_PER_OFFSET, P_FLOOR, SCALE_FACTOR};
use crate::errors::{LedgerError, LedgerResult};
use crate::types::{Amount, DepositorSnapshot};

#[allow(clippy::assign_op_pattern, clippy::ptr_offset_with_cast, clippy::manual_range_contains)]
mod bn {
    uint::construct_uint! {
        /// 256-bit unsigned integer for intermediate products
        pub struct U256(4);
    }
}

pub use bn::U256;

/// Cumulative per-unit-staked sum (an S or G table entry)
///
/// Entries are `gain_per_unit * P`, both scaled by 1e18, so they need
/// more than 128 bits once rewards accumulate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScaledSum(pub U256);

impl ScaledSum {
    pub const ZERO: ScaledSum = ScaledSum(U256([0; 4]));

    /// Add `per_unit * product` to the sum
    pub fn accrue(&self, per_unit: U256, product: u128) -> LedgerResult<ScaledSum> {
        let marginal = per_unit
            .checked_mul(U256::from(product))
            .ok_or(LedgerError::Overflow)?;
        self.0
            .checked_add(marginal)
            .map(ScaledSum)
            .ok_or(LedgerError::Overflow)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl From<u128> for ScaledSum {
    fn from(value: u128) -> Self {
        ScaledSum(U256::from(value))
    }
}

impl BorshSerialize for ScaledSum {
    fn serialize<W: borsh::io::Write>(&self, writer: &mut W) -> borsh::io::Result<()> {
        self.0 .0.serialize(writer)
    }
}

impl BorshDeserialize for ScaledSum {
    fn deserialize_reader<R: borsh::io::Read>(reader: &mut R) -> borsh::io::Result<Self> {
        let limbs = <[u64; 4]>::deserialize_reader(reader)?;
        Ok(ScaledSum(U256(limbs)))
    }
}

/// Narrow a 256-bit value back to u128
pub fn narrow(value: U256) -> LedgerResult<u128> {
    if value > U256::from(u128::MAX) {
        return Err(LedgerError::Overflow);
    }
    Ok(value.as_u128())
}

/// Compute `a * b / denominator`, rounding down
pub fn mul_div_floor(a: u128, b: u128, denominator: u128) -> LedgerResult<u128> {
    if denominator == 0 {
        return Err(LedgerError::DivisionByZero);
    }
    let product = U256::from(a)
        .checked_mul(U256::from(b))
        .ok_or(LedgerError::Overflow)?;
    narrow(product / U256::from(denominator))
}

/// Safe addition with overflow check
pub fn safe_add(a: Amount, b: Amount) -> LedgerResult<Amount> {
    a.checked_add(b).ok_or(LedgerError::Overflow)
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: Amount, b: Amount) -> LedgerResult<Amount> {
    a.checked_sub(b).ok_or(LedgerError::Overflow)
}

/// A per-unit-staked ratio and the division remainder carried forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerUnit {
    /// Ratio scaled by DECIMAL_PRECISION
    pub per_unit: u128,
    /// Remainder to feed into the next computation
    pub error: u128,
}

/// Loss per unit staked for an offset of `debt` against `total` deposits
///
/// Rounds the ratio up by one so compounded deposits err in the pool's
/// favour; the excess is carried in `error` and subtracted next time.
/// The carried excess never pulls the ratio below `ceil(debt * 1e18 / total)`,
/// so P always shrinks by at least the debt's share of the pool.
/// A full offset (`debt == total`) is exactly 1.0 with no error.
pub fn loss_per_unit_staked(debt: Amount, total: Amount, last_error: u128) -> LedgerResult<PerUnit> {
    if total == 0 {
        return Err(LedgerError::DivisionByZero);
    }
    if debt > total {
        return Err(LedgerError::InsufficientPoolDeposits {
            available: total,
            required: debt,
        });
    }
    if debt == total {
        return Ok(PerUnit { per_unit: ONE, error: 0 });
    }
    if debt == 0 {
        return Ok(PerUnit { per_unit: 0, error: last_error });
    }

    let exact = U256::from(debt)
        .checked_mul(U256::from(DECIMAL_PRECISION))
        .ok_or(LedgerError::Overflow)?;
    let total = U256::from(total);

    let ceiling = (exact + total - U256::one()) / total;
    let per_unit = (exact.saturating_sub(U256::from(last_error)) / total + U256::one()).max(ceiling);
    // Excess of this offset alone, at most `total`
    let error = per_unit * total - exact;

    let per_unit = narrow(per_unit)?;
    if per_unit >= ONE {
        return Ok(PerUnit { per_unit: ONE, error: 0 });
    }
    Ok(PerUnit {
        per_unit,
        error: narrow(error)?,
    })
}

/// A gain-per-unit-staked ratio; unbounded, so kept at 256 bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GainPerUnit {
    /// Ratio scaled by DECIMAL_PRECISION
    pub per_unit: U256,
    /// Remainder to feed into the next computation
    pub error: u128,
}

/// Gain per unit staked when `amount` is spread over `total` deposits
///
/// Returns the ratio, the carried remainder, and the amount actually
/// distributed after precision loss.
pub fn gain_per_unit_staked(
    amount: Amount,
    total: Amount,
    last_error: u128,
) -> LedgerResult<(GainPerUnit, Amount)> {
    if total == 0 {
        return Err(LedgerError::DivisionByZero);
    }
    if amount == 0 {
        return Ok((
            GainPerUnit {
                per_unit: U256::zero(),
                error: last_error,
            },
            0,
        ));
    }

    let numerator = U256::from(amount)
        .checked_mul(U256::from(DECIMAL_PRECISION))
        .ok_or(LedgerError::Overflow)?
        .checked_add(U256::from(last_error))
        .ok_or(LedgerError::Overflow)?;
    let total = U256::from(total);

    let per_unit = numerator / total;
    let error = numerator - per_unit * total;
    let distributed = (numerator - error) / U256::from(DECIMAL_PRECISION);

    Ok((
        GainPerUnit {
            per_unit,
            error: narrow(error)?,
        },
        narrow(distributed)?,
    ))
}

/// Multiply P by `product_factor`, rescaling while it falls below the floor
///
/// Returns the new P and the number of scale bumps applied.
pub fn rescale_product(current_p: u128, product_factor: u128) -> LedgerResult<(u128, u64)> {
    let mut raw = U256::from(current_p)
        .checked_mul(U256::from(product_factor))
        .ok_or(LedgerError::Overflow)?;
    let mut bumps = 0u64;

    loop {
        let candidate = raw / U256::from(DECIMAL_PRECISION);
        if candidate >= U256::from(P_FLOOR) {
            return Ok((narrow(candidate)?, bumps));
        }
        if bumps == MAX_RESCALES_PER_OFFSET {
            return Err(LedgerError::PrecisionUnderflow);
        }
        raw = raw
            .checked_mul(U256::from(SCALE_FACTOR))
            .ok_or(LedgerError::PrecisionUnderflow)?;
        bumps += 1;
    }
}

/// Calculate a depositor's compounded balance from their snapshot
///
/// Zero when the pool was wiped out since the snapshot (epoch moved),
/// when more than one scale change happened, or when the result is
/// below a billionth of the recorded deposit.
pub fn compounded_deposit(
    snapshot: &DepositorSnapshot,
    current_p: u128,
    current_scale: u64,
    current_epoch: u64,
) -> LedgerResult<Amount> {
    let initial = snapshot.initial_deposit;
    if initial == 0 || snapshot.epoch != current_epoch {
        return Ok(0);
    }
    if snapshot.p == 0 {
        return Err(LedgerError::DivisionByZero);
    }

    let compounded = match current_scale.saturating_sub(snapshot.scale) {
        0 => mul_div_floor(initial, current_p, snapshot.p)?,
        1 => mul_div_floor(initial, current_p, snapshot.p)? / SCALE_FACTOR,
        _ => 0,
    };

    if compounded < initial / DUST_DIVISOR {
        return Ok(0);
    }
    Ok(compounded)
}

/// Calculate a depositor's gain on one reward series (S or G)
///
/// `page_sum` is the series value at the snapshot's (epoch, scale);
/// `next_page_sum` is the value one scale later, if that page exists.
pub fn depositor_gain(
    initial_deposit: Amount,
    snapshot_sum: ScaledSum,
    snapshot_p: u128,
    page_sum: ScaledSum,
    next_page_sum: Option<ScaledSum>,
) -> LedgerResult<Amount> {
    if initial_deposit == 0 {
        return Ok(0);
    }
    if snapshot_p == 0 {
        return Err(LedgerError::DivisionByZero);
    }

    let first_portion = page_sum.0.saturating_sub(snapshot_sum.0);
    let second_portion = next_page_sum.unwrap_or_default().0 / U256::from(SCALE_FACTOR);

    let gain = U256::from(initial_deposit)
        .checked_mul(
            first_portion
                .checked_add(second_portion)
                .ok_or(LedgerError::Overflow)?,
        )
        .ok_or(LedgerError::Overflow)?
        / U256::from(snapshot_p)
        / U256::from(DECIMAL_PRECISION);

    narrow(gain)
}

/// True when `a` and `b` differ by at most `epsilon`
pub fn fuzzy_eq(a: u128, b: u128, epsilon: u128) -> bool {
    a.abs_diff(b) <= epsilon
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::token;

    fn snapshot(initial: Amount, p: u128, scale: u64, epoch: u64) -> DepositorSnapshot {
        DepositorSnapshot {
            initial_deposit: initial,
            p,
            s: ScaledSum::ZERO,
            g: ScaledSum::ZERO,
            scale,
            epoch,
            last_updated: 0,
            front_end: None,
        }
    }

    #[test]
    fn test_mul_div_floor_wide_intermediate() {
        // 1e30 * 1e18 overflows u128 but the quotient fits
        let r = mul_div_floor(1_000_000_000_000 * token::ONE, ONE, ONE).unwrap();
        assert_eq!(r, 1_000_000_000_000 * token::ONE);
        assert_eq!(mul_div_floor(7, 3, 2).unwrap(), 10);
        assert_eq!(mul_div_floor(1, 1, 0), Err(LedgerError::DivisionByZero));
        assert_eq!(mul_div_floor(u128::MAX, 2, 1), Err(LedgerError::Overflow));
    }

    #[test]
    fn test_loss_per_unit_rounds_up() {
        let r = loss_per_unit_staked(500 * token::ONE, 1000 * token::ONE, 0).unwrap();
        assert_eq!(r.per_unit, ONE / 2 + 1);
        assert_eq!(r.error, 1000 * token::ONE);
    }

    #[test]
    fn test_loss_per_unit_ignores_excess_from_larger_pool() {
        // An excess carried from a 1e24 pool would cancel the whole loss
        let r = loss_per_unit_staked(999, 1000, 999_999 * token::ONE * 1_000_000).unwrap();
        assert_eq!(r.per_unit, 999 * ONE / 1000);
        assert_eq!(r.error, 0);
    }

    #[test]
    fn test_loss_per_unit_feedback_cancels_round_up() {
        // 500/1000 divides exactly; a carried excess drops the extra unit
        let r = loss_per_unit_staked(500, 1000, 1).unwrap();
        assert_eq!(r.per_unit, ONE / 2);
        assert_eq!(r.error, 0);
    }

    #[test]
    fn test_loss_per_unit_full_offset() {
        let r = loss_per_unit_staked(1000, 1000, 12345).unwrap();
        assert_eq!(r, PerUnit { per_unit: ONE, error: 0 });
    }

    #[test]
    fn test_loss_per_unit_rejects_excess_debt() {
        assert!(matches!(
            loss_per_unit_staked(1001, 1000, 0),
            Err(LedgerError::InsufficientPoolDeposits { .. })
        ));
    }

    #[test]
    fn test_gain_per_unit_carries_remainder() {
        let (r, distributed) = gain_per_unit_staked(10, 3, 0).unwrap();
        // 10e18 / 3 = 3.333..e18, remainder 1
        assert_eq!(r.per_unit, U256::from(3_333_333_333_333_333_333u128));
        assert_eq!(r.error, 1);
        assert_eq!(distributed, 9);

        // The remainder is folded into the next computation
        let (r2, _) = gain_per_unit_staked(10, 3, r.error).unwrap();
        assert_eq!(r2.error, 2);
    }

    #[test]
    fn test_gain_per_unit_exceeds_u128() {
        // 600 tokens over 1 base unit
        let (r, distributed) = gain_per_unit_staked(600 * token::ONE, 1, 0).unwrap();
        assert!(r.per_unit > U256::from(u128::MAX));
        assert_eq!(r.error, 0);
        assert_eq!(distributed, 600 * token::ONE);
    }

    #[test]
    fn test_rescale_product_no_bump() {
        let (p, bumps) = rescale_product(ONE, ONE / 2).unwrap();
        assert_eq!(p, ONE / 2);
        assert_eq!(bumps, 0);
    }

    #[test]
    fn test_rescale_product_single_bump() {
        // 1e-6 * 1e-6 = 1e-12 < 1e-9 -> rescaled to 1e-3
        let (p, bumps) = rescale_product(ONE / 1_000_000, ONE / 1_000_000).unwrap();
        assert_eq!(bumps, 1);
        assert_eq!(p, ONE / 1_000);
    }

    #[test]
    fn test_rescale_product_double_bump() {
        // P at the floor times the smallest factor needs two bumps
        let (p, bumps) = rescale_product(P_FLOOR, 1).unwrap();
        assert_eq!(bumps, 2);
        assert_eq!(p, P_FLOOR);
    }

    #[test]
    fn test_rescale_product_zero_underflows() {
        assert_eq!(rescale_product(0, ONE), Err(LedgerError::PrecisionUnderflow));
    }

    #[test]
    fn test_compounded_same_scale() {
        let snap = snapshot(1000 * token::ONE, ONE, 0, 0);
        let c = compounded_deposit(&snap, ONE / 4, 0, 0).unwrap();
        assert_eq!(c, 250 * token::ONE);
    }

    #[test]
    fn test_compounded_one_scale_change() {
        let snap = snapshot(1000 * token::ONE, ONE / 1_000_000, 0, 0);
        // P fell by a further 1e-6 then was rescaled by 1e9: 1e-12 -> 1e-3
        let c = compounded_deposit(&snap, ONE / 1_000, 1, 0).unwrap();
        assert_eq!(c, token::ONE / 1_000);
    }

    #[test]
    fn test_compounded_two_scale_changes_is_zero() {
        let snap = snapshot(1000 * token::ONE, ONE, 0, 0);
        assert_eq!(compounded_deposit(&snap, ONE, 2, 0).unwrap(), 0);
    }

    #[test]
    fn test_compounded_epoch_change_is_zero() {
        let snap = snapshot(1000 * token::ONE, ONE, 0, 0);
        assert_eq!(compounded_deposit(&snap, ONE, 0, 1).unwrap(), 0);
    }

    #[test]
    fn test_compounded_dust_is_zero() {
        let snap = snapshot(1000 * token::ONE, ONE, 0, 0);
        // Remaining fraction 1e-10 is below the 1e-9 dust boundary
        let c = compounded_deposit(&snap, P_FLOOR / 10, 0, 0).unwrap();
        assert_eq!(c, 0);
    }

    #[test]
    fn test_depositor_gain_single_page() {
        // S grew by 0.01 * 1e18 per unit at P = 1
        let s = ScaledSum::ZERO.accrue(U256::from(ONE / 100), ONE).unwrap();
        let gain = depositor_gain(1000 * token::ONE, ScaledSum::ZERO, ONE, s, None).unwrap();
        assert_eq!(gain, 10 * token::ONE);
    }

    #[test]
    fn test_depositor_gain_includes_next_page() {
        // A page one scale later counts at 1 / SCALE_FACTOR of its face value
        let s = ScaledSum::ZERO.accrue(U256::from(ONE / 100), ONE).unwrap();
        let next = ScaledSum::ZERO.accrue(U256::from(ONE / 100), ONE * SCALE_FACTOR).unwrap();
        let zero = ScaledSum::ZERO;
        let same_page = depositor_gain(1000 * token::ONE, zero, ONE, s, None).unwrap();
        let next_page = depositor_gain(1000 * token::ONE, zero, ONE, zero, Some(next)).unwrap();
        assert_eq!(same_page, next_page);
        assert_eq!(same_page, 10 * token::ONE);
    }

    #[test]
    fn test_scaled_sum_exceeds_u128() {
        // 1e21 per unit at P = 1 overflows a u128 sum but not a ScaledSum
        let s = ScaledSum::ZERO.accrue(U256::from(1_000 * ONE), ONE).unwrap();
        let s = s.accrue(U256::from(1_000 * ONE), ONE).unwrap();
        assert!(s.0 > U256::from(u128::MAX));

        let bytes = borsh::to_vec(&s).unwrap();
        assert_eq!(bytes.len(), 32);
        assert_eq!(borsh::from_slice::<ScaledSum>(&bytes).unwrap(), s);
    }

    #[test]
    fn test_fuzzy_eq() {
        assert!(fuzzy_eq(100, 103, 3));
        assert!(!fuzzy_eq(100, 104, 3));
        assert!(fuzzy_eq(104, 100, 4));
    }

    #[quickcheck_macros::quickcheck]
    fn prop_compounded_never_exceeds_initial(initial: u64, p_snap: u64, p_now: u64) -> bool {
        let p_snap = (p_snap as u128).max(P_FLOOR).min(ONE);
        let p_now = (p_now as u128).max(P_FLOOR).min(p_snap);
        let snap = snapshot(initial as u128, p_snap, 0, 0);
        compounded_deposit(&snap, p_now, 0, 0).unwrap() <= initial as u128
    }

    #[quickcheck_macros::quickcheck]
    fn prop_loss_per_unit_bounded(debt: u64, extra: u64) -> bool {
        let total = debt as u128 + extra as u128 + 1;
        let r = loss_per_unit_staked(debt as u128, total, 0).unwrap();
        r.per_unit <= ONE
    }

    #[quickcheck_macros::quickcheck]
    fn prop_loss_per_unit_covers_debt(debt: u64, extra: u64, last_error: u128) -> bool {
        let total = debt as u128 + extra as u128 + 1;
        let r = loss_per_unit_staked(debt as u128, total, last_error).unwrap();
        let absorbed = U256::from(r.per_unit) * U256::from(total);
        // A zero debt passes the carried excess through untouched
        absorbed >= U256::from(debt) * U256::from(ONE) && (debt == 0 || r.error <= total)
    }
}
