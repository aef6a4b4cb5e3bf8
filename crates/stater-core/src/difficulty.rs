//! Compact difficulty targets, per-block work, and retargeting.
//!
//! A compact target packs a 256-bit threshold into 32 bits: the high byte
//! is a base-256 exponent, the low 23 bits a mantissa, and bit 23 a sign
//! bit that must never be set. Headers whose hash, read as a big-endian
//! integer, does not exceed the decoded target satisfy proof of work.
//!
//! Work per block is `⌊2^256 / (target + 1)⌋`; cumulative work over a
//! chain is the quantity the fork resolver maximizes.

use primitive_types::{U256, U512};

use crate::error::DifficultyError;
use crate::params::Params;
use crate::types::Hash256;

const SIGN_BIT: u32 = 0x0080_0000;
const MANTISSA_MASK: u32 = 0x007f_ffff;

/// Decode a compact target into its 256-bit form.
pub fn target_from_compact(bits: u32) -> Result<U256, DifficultyError> {
    if bits & SIGN_BIT != 0 {
        return Err(DifficultyError::NegativeTarget);
    }
    let exponent = bits >> 24;
    let mantissa = bits & MANTISSA_MASK;

    if exponent <= 3 {
        return Ok(U256::from(mantissa >> (8 * (3 - exponent))));
    }

    // A nonzero mantissa shifted past 256 bits cannot be represented.
    let overflow = mantissa != 0
        && (exponent > 34
            || (mantissa > 0xff && exponent > 33)
            || (mantissa > 0xffff && exponent > 32));
    if overflow {
        return Err(DifficultyError::TargetOverflow);
    }

    Ok(U256::from(mantissa) << (8 * (exponent - 3)))
}

/// Encode a 256-bit target into compact form.
///
/// The mantissa is normalized so its top bit never collides with the sign
/// bit; a zero target encodes to zero (which no decoder accepts).
pub fn compact_from_target(target: U256) -> u32 {
    if target.is_zero() {
        return 0;
    }

    let mut size = (target.bits() + 7) / 8;
    let mut compact = if size <= 3 {
        (target.low_u64() << (8 * (3 - size))) as u32
    } else {
        (target >> (8 * (size - 3))).low_u32()
    };

    if compact & SIGN_BIT != 0 {
        compact >>= 8;
        size += 1;
    }

    (compact & MANTISSA_MASK) | ((size as u32) << 24)
}

/// Work contributed by one block at the given compact target:
/// `⌊2^256 / (target + 1)⌋`.
pub fn block_work(bits: u32) -> Result<U256, DifficultyError> {
    let target = target_from_compact(bits)?;
    if target.is_zero() {
        return Err(DifficultyError::ZeroTarget);
    }
    // (~target / (target + 1)) + 1 equals 2^256 / (target + 1) without
    // needing the 257-bit numerator.
    match target.checked_add(U256::one()) {
        Some(denom) => Ok((!target / denom) + U256::one()),
        None => Ok(U256::one()),
    }
}

/// The easiest permitted target, encoded by the genesis bits.
pub fn pow_limit(params: &Params) -> Result<U256, DifficultyError> {
    target_from_compact(params.genesis_bits)
}

/// Check a block hash against its compact target.
///
/// Rejects targets that are zero, negative, malformed, or easier than the
/// parameter-configured limit.
pub fn check_proof_of_work(hash: &Hash256, bits: u32, params: &Params) -> bool {
    let (Ok(target), Ok(limit)) = (target_from_compact(bits), pow_limit(params)) else {
        return false;
    };
    if target.is_zero() || target > limit {
        return false;
    }
    U256::from_big_endian(hash.as_bytes()) <= target
}

/// Compute the compact target for the block after a retarget boundary.
///
/// `actual_timespan` is the elapsed time between the window endpoints; it
/// is clamped to `[T/4, T·5/4]` around the configured timespan `T` before
/// scaling the previous target proportionally. The result never exceeds
/// the proof-of-work limit and never collapses to the invalid zero target.
pub fn next_work_required(
    last_bits: u32,
    actual_timespan: i64,
    params: &Params,
) -> Result<u32, DifficultyError> {
    let target_timespan = i64::from(params.pow_target_timespan);
    if target_timespan == 0 {
        return Err(DifficultyError::ZeroTimespan);
    }

    let clamped = actual_timespan.clamp(target_timespan / 4, target_timespan * 5 / 4);

    let last_target = target_from_compact(last_bits)?;
    let limit = pow_limit(params)?;

    let scaled: U512 =
        last_target.full_mul(U256::from(clamped as u64)) / U512::from(target_timespan as u64);
    let mut next = U256::try_from(scaled).unwrap_or(limit);

    if next > limit {
        next = limit;
    }
    if next.is_zero() {
        next = U256::one();
    }

    Ok(compact_from_target(next))
}

/// Compact target required for the next block.
///
/// Outside retarget boundaries the target carries over unchanged, except
/// on networks permitting minimum-difficulty recovery: a block arriving
/// more than twice the target spacing after its parent may use the
/// proof-of-work limit.
pub fn required_bits(
    params: &Params,
    height: u32,
    prev_bits: u32,
    prev_time: u32,
    window_first_time: u32,
    new_block_time: u32,
) -> Result<u32, DifficultyError> {
    if params.allow_min_difficulty_blocks
        && u64::from(new_block_time) > u64::from(prev_time) + 2 * u64::from(params.pow_target_spacing)
    {
        return Ok(params.genesis_bits);
    }

    if params.difficulty_adjustment_interval == 0 || height % params.difficulty_adjustment_interval != 0
    {
        return Ok(prev_bits);
    }

    let actual = i64::from(prev_time) - i64::from(window_first_time);
    next_work_required(prev_bits, actual, params)
}
