//! Monetary amounts and fee rates.

use std::fmt;

/// Amount in the smallest unit.
pub type Amount = i64;

/// Base units per coin.
pub const COIN: Amount = 100_000_000;

/// Protocol floor for relayed free transactions, as a fee rate.
///
/// This is a constant of the protocol tier, not a per-call option.
pub const MIN_RELAY_FEE_RATE: FeeRate = FeeRate { per_kb: 5000 };

/// Format an amount as a decimal coin value.
pub fn format_amount(amount: Amount) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:08}", sign, abs / COIN as u64, abs % COIN as u64)
}

/// Fee per 1000 bytes of serialized transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct FeeRate {
    per_kb: Amount,
}

impl FeeRate {
    /// Fee rate from a raw per-kilobyte amount.
    pub fn per_kb(per_kb: Amount) -> Self {
        Self { per_kb }
    }

    /// Fee rate implied by paying `fee` for `size_bytes` serialized bytes.
    pub fn from_fee(fee: Amount, size_bytes: usize) -> Self {
        if size_bytes == 0 {
            return Self { per_kb: 0 };
        }
        Self {
            per_kb: fee * 1000 / size_bytes as Amount,
        }
    }

    /// The raw per-kilobyte amount.
    pub fn as_per_kb(&self) -> Amount {
        self.per_kb
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/kB", format_amount(self.per_kb))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_rate_from_fee() {
        assert_eq!(FeeRate::from_fee(10_000, 250), FeeRate::per_kb(40_000));
        assert_eq!(FeeRate::from_fee(0, 250), FeeRate::per_kb(0));
        assert_eq!(FeeRate::from_fee(5000, 0), FeeRate::per_kb(0));
    }

    #[test]
    fn test_fee_rate_ordering() {
        assert!(FeeRate::from_fee(10_000, 250) > MIN_RELAY_FEE_RATE);
        assert!(FeeRate::per_kb(4999) < MIN_RELAY_FEE_RATE);
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(COIN), "1.00000000");
        assert_eq!(format_amount(COIN / 4), "0.25000000");
        assert_eq!(format_amount(-COIN), "-1.00000000");
    }
}
