//! Amount resolution: operator amounts → exact base-unit integers.
//!
//! An [`AmountSpec`] is an absolute decimal quantity, a percentage of some
//! on-chain reference balance, or "all" of it. [`resolve`] turns it into a
//! base-unit `U256` plus, for percentages, a basis-point value.
//!
//! Rounding policy:
//! - absolute amounts round to nearest (the operator stated an exact target)
//! - proportional amounts floor, so a request never exceeds what is held
//! - basis points are derived from the same percentage value as the base
//!   amount, never from each other

use alloy::primitives::U256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const MIN_BPS: u16 = 1;
pub const MAX_BPS: u16 = 10_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("invalid amount {0}: must be a positive decimal")]
    InvalidAmount(String),
    #[error("invalid percentage {0}: must be greater than zero")]
    InvalidPercentage(String),
    #[error("cannot parse {0:?} as an amount, percentage or \"all\"")]
    Parse(String),
    #[error("amount {value} does not fit in 256 bits at {decimals} decimals")]
    Overflow { value: String, decimals: u8 },
}

/// What the operator asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountSpec {
    Absolute(Decimal),
    /// Percent in (0, 100]; out-of-range values are clamped at resolution.
    Percentage(Decimal),
    All,
}

/// Exact on-chain quantity for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAmount {
    pub base: U256,
    /// Present only for percentage specs, in [1, 10000].
    pub bps: Option<u16>,
}

impl FromStr for AmountSpec {
    type Err = AmountError;

    /// `"all"`, `"30%"`, or a plain decimal such as `"250.5"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(AmountSpec::All);
        }
        if let Some(pct) = trimmed.strip_suffix('%') {
            return parse_decimal(pct.trim()).map(AmountSpec::Percentage);
        }
        parse_decimal(trimmed).map(AmountSpec::Absolute)
    }
}

impl fmt::Display for AmountSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmountSpec::Absolute(v) => write!(f, "{v}"),
            AmountSpec::Percentage(p) => write!(f, "{p}%"),
            AmountSpec::All => write!(f, "all"),
        }
    }
}

impl AmountSpec {
    /// Reject non-positive quantities up front, before any chain read.
    pub fn validate(&self) -> Result<(), AmountError> {
        match self {
            AmountSpec::Absolute(v) if *v <= Decimal::ZERO => {
                Err(AmountError::InvalidAmount(v.to_string()))
            }
            AmountSpec::Percentage(p) if *p <= Decimal::ZERO => {
                Err(AmountError::InvalidPercentage(p.to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// A percentage written either as `"30%"` or bare `"30"`.
pub fn parse_percentage(s: &str) -> Result<Decimal, AmountError> {
    let trimmed = s.trim();
    let pct = parse_decimal(trimmed.strip_suffix('%').unwrap_or(trimmed).trim())?;
    if pct <= Decimal::ZERO {
        return Err(AmountError::InvalidPercentage(pct.to_string()));
    }
    Ok(pct)
}

fn parse_decimal(s: &str) -> Result<Decimal, AmountError> {
    Decimal::from_str(s).map_err(|_| AmountError::Parse(s.to_string()))
}

/// Resolve `spec` against an asset with `decimals` precision and the
/// current `reference` balance (only consulted for percentage/all).
///
/// A zero `reference` yields `base == 0` for percentage/all; callers that
/// must not send no-op transactions check for that themselves.
pub fn resolve(spec: AmountSpec, decimals: u8, reference: U256) -> Result<ResolvedAmount, AmountError> {
    match spec {
        AmountSpec::Absolute(value) => Ok(ResolvedAmount {
            base: to_base_units(value, decimals)?,
            bps: None,
        }),
        AmountSpec::Percentage(raw) => {
            let pct = clamp_percentage(raw)?;
            Ok(ResolvedAmount {
                base: proportion_floor(reference, pct),
                bps: Some(percentage_to_bps(pct)),
            })
        }
        AmountSpec::All => Ok(ResolvedAmount {
            base: reference,
            bps: None,
        }),
    }
}

/// `round(value * 10^decimals)`, half away from zero.
pub fn to_base_units(value: Decimal, decimals: u8) -> Result<U256, AmountError> {
    if value <= Decimal::ZERO {
        return Err(AmountError::InvalidAmount(value.to_string()));
    }
    let overflow = || AmountError::Overflow {
        value: value.to_string(),
        decimals,
    };

    let mantissa = U256::from(value.mantissa().unsigned_abs());
    let scale = value.scale();
    let decimals_u32 = u32::from(decimals);

    if decimals_u32 >= scale {
        let factor = pow10(decimals_u32 - scale).ok_or_else(overflow)?;
        mantissa.checked_mul(factor).ok_or_else(overflow)
    } else {
        let divisor = pow10(scale - decimals_u32).ok_or_else(overflow)?;
        let quotient = mantissa / divisor;
        let remainder = mantissa % divisor;
        if remainder * U256::from(2u8) >= divisor {
            Ok(quotient + U256::from(1u8))
        } else {
            Ok(quotient)
        }
    }
}

/// Exact decimal rendering of a base-unit quantity, trailing zeros trimmed.
pub fn format_units(value: U256, decimals: u8) -> String {
    let digits = value.to_string();
    let decimals = usize::from(decimals);
    if decimals == 0 {
        return digits;
    }

    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals - digits.len() + 1), digits)
    } else {
        digits
    };
    let (int_part, frac_part) = padded.split_at(padded.len() - decimals);
    let frac_part = frac_part.trim_end_matches('0');
    if frac_part.is_empty() {
        int_part.to_string()
    } else {
        format!("{int_part}.{frac_part}")
    }
}

/// Allocation cap for an absolute buy: the share of `reference` that `base`
/// represents, floored to bps and clamped to [1, 10000]. An empty reference
/// imposes no cap.
pub fn allocation_bps(base: U256, reference: U256) -> u16 {
    if reference.is_zero() {
        return MAX_BPS;
    }
    let Some(scaled) = base.checked_mul(U256::from(MAX_BPS)) else {
        return MAX_BPS;
    };
    let bps = u16::try_from(scaled / reference).unwrap_or(MAX_BPS);
    bps.clamp(MIN_BPS, MAX_BPS)
}

/// Clamp to [0.01, 100]. Non-positive input is rejected, not clamped.
fn clamp_percentage(pct: Decimal) -> Result<Decimal, AmountError> {
    if pct <= Decimal::ZERO {
        return Err(AmountError::InvalidPercentage(pct.to_string()));
    }
    let min = Decimal::new(1, 2);
    let max = Decimal::ONE_HUNDRED;
    Ok(pct.max(min).min(max))
}

/// `round(pct * 100)` clamped to [1, 10000].
fn percentage_to_bps(pct: Decimal) -> u16 {
    let bps = (pct * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u16()
        .unwrap_or(MAX_BPS);
    bps.clamp(MIN_BPS, MAX_BPS)
}

/// `floor(reference * pct / 100)` without overflowing on large references.
fn proportion_floor(reference: U256, pct: Decimal) -> U256 {
    // pct = m / 10^s, so the divisor is 100 * 10^s (s <= 28, always fits).
    let m = U256::from(pct.mantissa().unsigned_abs());
    let divisor = U256::from(100u8) * pow10(pct.scale()).unwrap_or(U256::MAX);
    let quotient = reference / divisor;
    let remainder = reference % divisor;
    quotient * m + remainder * m / divisor
}

fn pow10(exp: u32) -> Option<U256> {
    U256::from(10u8).checked_pow(U256::from(exp))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_specs() {
        assert_eq!("all".parse::<AmountSpec>().unwrap(), AmountSpec::All);
        assert_eq!("ALL".parse::<AmountSpec>().unwrap(), AmountSpec::All);
        assert_eq!(
            "30%".parse::<AmountSpec>().unwrap(),
            AmountSpec::Percentage(dec("30"))
        );
        assert_eq!(
            " 12.5 % ".parse::<AmountSpec>().unwrap(),
            AmountSpec::Percentage(dec("12.5"))
        );
        assert_eq!(
            "250.5".parse::<AmountSpec>().unwrap(),
            AmountSpec::Absolute(dec("250.5"))
        );
        assert!(matches!(
            "lots".parse::<AmountSpec>(),
            Err(AmountError::Parse(_))
        ));
        assert!("%".parse::<AmountSpec>().is_err());
    }

    #[test]
    fn test_validate_rejects_non_positive() {
        assert!(AmountSpec::Absolute(dec("0.1")).validate().is_ok());
        assert!(AmountSpec::All.validate().is_ok());
        assert!(matches!(
            AmountSpec::Absolute(dec("-1")).validate(),
            Err(AmountError::InvalidAmount(_))
        ));
        assert!(matches!(
            AmountSpec::Percentage(Decimal::ZERO).validate(),
            Err(AmountError::InvalidPercentage(_))
        ));
    }

    #[test]
    fn test_parse_percentage_with_or_without_sign() {
        assert_eq!(parse_percentage("30%").unwrap(), dec("30"));
        assert_eq!(parse_percentage("12.5").unwrap(), dec("12.5"));
        assert!(parse_percentage("0").is_err());
        assert!(parse_percentage("abc%").is_err());
    }

    #[test]
    fn test_absolute_scales_to_base_units() {
        let resolved = resolve(AmountSpec::Absolute(dec("250.5")), 18, U256::ZERO).unwrap();
        assert_eq!(
            resolved.base,
            U256::from_str("250500000000000000000").unwrap()
        );
        assert_eq!(resolved.bps, None);

        let usdc = resolve(AmountSpec::Absolute(dec("1.5")), 6, U256::ZERO).unwrap();
        assert_eq!(usdc.base, U256::from(1_500_000u64));
    }

    #[test]
    fn test_absolute_rounds_to_nearest() {
        assert_eq!(to_base_units(dec("1.2345"), 2).unwrap(), U256::from(123u64));
        assert_eq!(to_base_units(dec("1.235"), 2).unwrap(), U256::from(124u64));
        assert_eq!(to_base_units(dec("0.004"), 2).unwrap(), U256::ZERO);
    }

    #[test]
    fn test_absolute_rejects_non_positive() {
        assert!(matches!(
            resolve(AmountSpec::Absolute(Decimal::ZERO), 18, U256::ZERO),
            Err(AmountError::InvalidAmount(_))
        ));
        assert!(matches!(
            resolve(AmountSpec::Absolute(dec("-3")), 18, U256::ZERO),
            Err(AmountError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_absolute_overflow_is_an_error() {
        assert!(matches!(
            to_base_units(dec("1"), 80),
            Err(AmountError::Overflow { decimals: 80, .. })
        ));
    }

    #[test]
    fn test_percentage_scenario() {
        let resolved = resolve(
            AmountSpec::Percentage(dec("30")),
            18,
            U256::from(1_000_000_000u64),
        )
        .unwrap();
        assert_eq!(resolved.bps, Some(3000));
        assert_eq!(resolved.base, U256::from(300_000_000u64));
    }

    #[test]
    fn test_percentage_floors_base() {
        // 33.33% of 10 = 3.333 → 3
        let resolved = resolve(AmountSpec::Percentage(dec("33.33")), 0, U256::from(10u64)).unwrap();
        assert_eq!(resolved.base, U256::from(3u64));
        assert_eq!(resolved.bps, Some(3333));
    }

    #[test]
    fn test_percentage_clamping() {
        let over = resolve(AmountSpec::Percentage(dec("150")), 18, U256::from(1_000u64)).unwrap();
        assert_eq!(over.bps, Some(MAX_BPS));
        assert_eq!(over.base, U256::from(1_000u64));

        let tiny = resolve(AmountSpec::Percentage(dec("0.001")), 18, U256::from(1_000_000u64)).unwrap();
        assert_eq!(tiny.bps, Some(MIN_BPS));
        assert_eq!(tiny.base, U256::from(100u64));

        assert!(matches!(
            resolve(AmountSpec::Percentage(Decimal::ZERO), 18, U256::from(1u64)),
            Err(AmountError::InvalidPercentage(_))
        ));
    }

    #[test]
    fn test_bps_in_range_and_increasing() {
        let mut previous = 0u16;
        for hundredths in 1..=10_000i64 {
            let pct = Decimal::new(hundredths, 2);
            let resolved = resolve(AmountSpec::Percentage(pct), 18, U256::from(7u64)).unwrap();
            let bps = resolved.bps.unwrap();
            assert!((MIN_BPS..=MAX_BPS).contains(&bps));
            assert!(bps > previous, "bps not increasing at {pct}");
            previous = bps;
        }
    }

    #[test]
    fn test_percentage_of_huge_reference_does_not_overflow() {
        let resolved = resolve(AmountSpec::Percentage(dec("50")), 18, U256::MAX).unwrap();
        assert_eq!(resolved.base, U256::MAX / U256::from(2u8));
    }

    #[test]
    fn test_all_returns_reference_without_bps() {
        for reference in [U256::ZERO, U256::from(1u64), U256::from(123_456_789u64), U256::MAX] {
            let resolved = resolve(AmountSpec::All, 6, reference).unwrap();
            assert_eq!(resolved.base, reference);
            assert_eq!(resolved.bps, None);
        }
    }

    #[test]
    fn test_zero_reference_resolves_to_zero() {
        let pct = resolve(AmountSpec::Percentage(dec("40")), 18, U256::ZERO).unwrap();
        assert_eq!(pct.base, U256::ZERO);
        assert_eq!(pct.bps, Some(4000));
    }

    #[test]
    fn test_format_units_roundtrip() {
        for (input, decimals) in [("250.5", 18u8), ("0.000001", 6), ("42", 0), ("1.23", 2), ("0.1", 18)] {
            let base = to_base_units(dec(input), decimals).unwrap();
            let rendered = format_units(base, decimals);
            assert_eq!(rendered, input);
            assert_eq!(to_base_units(dec(&rendered), decimals).unwrap(), base);
        }
        assert_eq!(format_units(U256::ZERO, 18), "0");
    }

    #[test]
    fn test_allocation_bps() {
        let reference = U256::from(1_000u64);
        assert_eq!(allocation_bps(U256::from(250u64), reference), 2500);
        assert_eq!(allocation_bps(U256::from(5_000u64), reference), MAX_BPS);
        assert_eq!(allocation_bps(U256::from(1u64), U256::from(1_000_000u64)), MIN_BPS);
        assert_eq!(allocation_bps(U256::from(10u64), U256::ZERO), MAX_BPS);
    }
}
