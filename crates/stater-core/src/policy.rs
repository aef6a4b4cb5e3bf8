//! Relay fee policy consulted during mempool admission.

use std::time::Duration;

use crate::error::MempoolError;

/// Default minimum fee rate in lepta per kilobyte.
pub const DEFAULT_MIN_FEE_RATE: u64 = 1_000;

/// Default maximum transaction size accepted for relay.
pub const DEFAULT_MAX_TX_BYTES: usize = 100_000;

/// Default mempool entry cap.
pub const DEFAULT_MAX_ENTRIES: usize = 5_000;

/// Default mempool byte budget (5 MiB of serialized transactions).
pub const DEFAULT_TARGET_BYTES: usize = 5 * 1024 * 1024;

/// Default entry lifetime before expiry.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(72 * 60 * 60);

/// Relay limits and the minimum acceptable fee.
#[derive(Clone, Debug)]
pub struct FeePolicy {
    /// Minimum fee rate in lepta per kB, rounded up per started kB.
    pub min_fee_rate: u64,
    /// Transactions larger than this are refused relay outright.
    pub max_tx_bytes: usize,
    /// Maximum number of pool entries.
    pub max_entries: usize,
    /// Approximate serialized-byte budget for the whole pool.
    pub target_bytes: usize,
    /// Entries older than this are dropped on every admission attempt.
    pub max_age: Duration,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            min_fee_rate: DEFAULT_MIN_FEE_RATE,
            max_tx_bytes: DEFAULT_MAX_TX_BYTES,
            max_entries: DEFAULT_MAX_ENTRIES,
            target_bytes: DEFAULT_TARGET_BYTES,
            max_age: DEFAULT_MAX_AGE,
        }
    }
}

impl FeePolicy {
    /// Minimum fee for a transaction of `size` bytes.
    pub fn required_fee(&self, size: usize) -> u64 {
        (size as u64).div_ceil(1_000) * self.min_fee_rate
    }

    /// Check a transaction's size and fee against the policy.
    pub fn check(&self, size: usize, fee: u64) -> Result<(), MempoolError> {
        if size > self.max_tx_bytes {
            return Err(MempoolError::Oversized {
                size,
                max: self.max_tx_bytes,
            });
        }
        let required = self.required_fee(size);
        if fee < required {
            return Err(MempoolError::FeeTooLow { fee, required });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_fee_rounds_up_per_kb() {
        let policy = FeePolicy::default();
        assert_eq!(policy.required_fee(1), DEFAULT_MIN_FEE_RATE);
        assert_eq!(policy.required_fee(1_000), DEFAULT_MIN_FEE_RATE);
        assert_eq!(policy.required_fee(1_001), 2 * DEFAULT_MIN_FEE_RATE);
    }

    #[test]
    fn check_rejects_low_fee() {
        let policy = FeePolicy::default();
        assert!(matches!(
            policy.check(500, DEFAULT_MIN_FEE_RATE - 1).unwrap_err(),
            MempoolError::FeeTooLow { .. }
        ));
        policy.check(500, DEFAULT_MIN_FEE_RATE).unwrap();
    }

    #[test]
    fn check_rejects_oversized() {
        let policy = FeePolicy::default();
        assert!(matches!(
            policy.check(DEFAULT_MAX_TX_BYTES + 1, u64::MAX).unwrap_err(),
            MempoolError::Oversized { .. }
        ));
    }
}
