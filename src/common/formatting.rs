use alloy::primitives::U256;

use crate::types::{ScannerError, ScannerResult};

const DIVIDER_6: u64 = 1_000_000;
const DIVIDER_8: u64 = 100_000_000;
const DIVIDER_9: u64 = 1_000_000_000;
const DIVIDER_18: u64 = 1_000_000_000_000_000_000;

/// Render a raw token amount as whole units of the underlying token.
///
/// Only the precisions used by the protocol's underlyings are supported
/// (6, 8, 9 and 18). The fractional part is dropped: `1.9 WETH` renders
/// as `"1"`.
pub fn format_balance(raw: U256, decimals: u8) -> ScannerResult<String> {
    let divider = match decimals {
        6 => DIVIDER_6,
        8 => DIVIDER_8,
        9 => DIVIDER_9,
        18 => DIVIDER_18,
        other => return Err(ScannerError::UnsupportedDecimals(other)),
    };

    Ok((raw / U256::from(divider)).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncates_fractional_part() {
        let raw = U256::from(1_234_567_890_123_456_789u128);
        assert_eq!(format_balance(raw, 18).unwrap(), "1");
        assert_eq!(format_balance(U256::from(999_999u64), 6).unwrap(), "0");
    }

    #[test]
    fn test_supported_precisions() {
        assert_eq!(format_balance(U256::from(2_500_000u64), 6).unwrap(), "2");
        assert_eq!(format_balance(U256::from(150_000_000u64), 8).unwrap(), "1");
        assert_eq!(format_balance(U256::from(42_000_000_000u64), 9).unwrap(), "42");

        // Values well beyond u128
        let huge = U256::from(10u64).pow(U256::from(60u64));
        assert_eq!(format_balance(huge, 18).unwrap(), format!("1{}", "0".repeat(42)));
    }

    #[test]
    fn test_unsupported_decimals() {
        let err = format_balance(U256::from(10_000u64), 4).unwrap_err();
        assert!(matches!(err, ScannerError::UnsupportedDecimals(4)));

        // A failed call does not poison later ones
        assert_eq!(format_balance(U256::from(10_000_000u64), 6).unwrap(), "10");
    }
}
