//! Share/block target and pool difficulty.

use num_bigint::BigUint;
use num_traits::{Num, ToPrimitive, Zero};

use crate::config::Algorithm;
use crate::error::PoolError;

/// Difficulty-1 target of the Bitcoin-like family (`bdiff`).
pub const DEFAULT_DIFF1: &str = "00000000ffff0000000000000000000000000000000000000000000000000000";

/// Difficulty-1 target of the Equihash family.
pub const EQUIHASH_DIFF1: &str = "0007ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff";

/// Difficulty-1 target for `algorithm`.
pub fn diff1(algorithm: Algorithm) -> BigUint {
    let hex = match algorithm {
        Algorithm::Default => DEFAULT_DIFF1,
        Algorithm::Equihash => EQUIHASH_DIFF1,
    };
    // Both constants are valid hex.
    BigUint::from_str_radix(hex, 16).unwrap_or_default()
}

/// Parse a big-endian hex target.
pub fn parse_target(hex: &str) -> Result<BigUint, PoolError> {
    BigUint::from_str_radix(hex, 16).map_err(|e| PoolError::validation("target", e.to_string()))
}

/// Expand a compact `bits` value: `mantissa * 256^(exponent - 3)`.
///
/// The sign bit is not interpreted; daemons never hand out negative targets.
pub fn target_from_bits(bits: u32) -> BigUint {
    let exponent = bits >> 24;
    let mantissa = BigUint::from(bits & 0x00ff_ffff);
    if exponent >= 3 {
        mantissa << (8 * (exponent - 3) as usize)
    } else {
        mantissa >> (8 * (3 - exponent) as usize)
    }
}

/// `diff1 / target`, rounded to nine decimal places.
pub fn difficulty(diff1: &BigUint, target: &BigUint) -> Result<f64, PoolError> {
    if target.is_zero() {
        return Err(PoolError::validation("target", "target is zero"));
    }
    let numerator = diff1
        .to_f64()
        .ok_or_else(|| PoolError::validation("target", "diff1 out of range"))?;
    let denominator = target
        .to_f64()
        .ok_or_else(|| PoolError::validation("target", "target out of range"))?;
    Ok(round9(numerator / denominator))
}

fn round9(value: f64) -> f64 {
    (value * 1e9).round() / 1e9
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_expansion() {
        assert_eq!(target_from_bits(0x1d00ffff), diff1(Algorithm::Default));
        assert_eq!(target_from_bits(0x03123456), BigUint::from(0x123456u32));
        assert_eq!(target_from_bits(0x02123456), BigUint::from(0x1234u32));
        assert_eq!(target_from_bits(0x04000001), BigUint::from(0x100u32));
    }

    #[test]
    fn test_difficulty_one() {
        let d1 = diff1(Algorithm::Default);
        assert_eq!(difficulty(&d1, &target_from_bits(0x1d00ffff)).unwrap(), 1.0);
        let e1 = diff1(Algorithm::Equihash);
        assert_eq!(difficulty(&e1, &e1).unwrap(), 1.0);
    }

    #[test]
    fn test_difficulty_rounding() {
        let d1 = diff1(Algorithm::Default);
        let target = &d1 * BigUint::from(3u32);
        assert_eq!(difficulty(&d1, &target).unwrap(), 0.333333333);
    }

    #[test]
    fn test_mainnet_scale_difficulty() {
        let d1 = diff1(Algorithm::Default);
        let d = difficulty(&d1, &target_from_bits(0x170e2632)).unwrap();
        assert!((d - 19_893_045_048_575.13).abs() < 0.05, "{}", d);
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("00ff").unwrap(), BigUint::from(255u32));
        assert!(parse_target("xyz").is_err());
        assert!(difficulty(&BigUint::from(1u32), &BigUint::zero()).is_err());
    }
}
