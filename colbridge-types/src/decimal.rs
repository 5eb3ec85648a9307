//! Fixed-point decimal values shared by both sides of the type bridge.
//!
//! Values are stored as an unscaled `i128` plus a scale, the same layout Arrow's
//! `Decimal128` uses, so a value can move into an output page without any
//! arithmetic. Every scale change goes through [`DecimalValue::rescale`], which
//! refuses to drop non-zero digits.

use std::fmt;
use std::str::FromStr;

use arrow::datatypes::DECIMAL128_MAX_PRECISION;
use arrow_buffer::i256;
use serde::{Deserialize, Serialize};

/// Maximum precision supported by `DecimalValue` (aligns with Arrow's Decimal128).
pub const MAX_DECIMAL_PRECISION: u8 = DECIMAL128_MAX_PRECISION;
const POW10_BASE: i256 = i256::from_i128(10);

/// Errors that can occur while manipulating decimal values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecimalError {
    /// Requested scale falls outside the supported range.
    ScaleOutOfRange { scale: u8 },
    /// Value needs more digits than the requested precision allows.
    PrecisionOverflow { value: i128, precision: u8 },
    /// Scaling the unscaled value overflowed `i128`.
    Overflow,
    /// Rescale operation attempted to lower scale without exact divisibility.
    InexactRescale { from: u8, to: u8 },
    /// Text could not be parsed as a decimal literal.
    Parse(String),
}

impl fmt::Display for DecimalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecimalError::ScaleOutOfRange { scale } => {
                write!(f, "decimal scale {scale} outside supported range")
            }
            DecimalError::PrecisionOverflow { value, precision } => {
                write!(
                    f,
                    "unscaled decimal value {value} does not fit in precision {precision}"
                )
            }
            DecimalError::Overflow => write!(f, "decimal arithmetic overflow"),
            DecimalError::InexactRescale { from, to } => {
                write!(
                    f,
                    "cannot rescale decimal from scale {from} to {to} without losing precision"
                )
            }
            DecimalError::Parse(text) => write!(f, "invalid decimal literal '{text}'"),
        }
    }
}

impl std::error::Error for DecimalError {}

impl From<DecimalError> for colbridge_result::Error {
    fn from(err: DecimalError) -> Self {
        colbridge_result::Error::type_mapping(err)
    }
}

/// Runtime representation of a Decimal128 value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecimalValue {
    value: i128,
    scale: u8,
}

impl DecimalValue {
    /// Create a decimal from its raw parts, validating precision bounds.
    pub fn new(value: i128, scale: u8) -> Result<Self, DecimalError> {
        if scale > MAX_DECIMAL_PRECISION {
            return Err(DecimalError::ScaleOutOfRange { scale });
        }
        if digit_count(value) > MAX_DECIMAL_PRECISION {
            return Err(DecimalError::PrecisionOverflow {
                value,
                precision: MAX_DECIMAL_PRECISION,
            });
        }
        Ok(Self { value, scale })
    }

    /// Construct a decimal from integer value with zero scale.
    pub fn from_i64(value: i64) -> Self {
        Self {
            value: value as i128,
            scale: 0,
        }
    }

    /// Return the scaled integer backing this decimal.
    #[inline]
    pub fn raw_value(self) -> i128 {
        self.value
    }

    /// Return the scale (number of fractional digits).
    #[inline]
    pub fn scale(self) -> u8 {
        self.scale
    }

    /// Return the decimal precision (total digit count).
    #[inline]
    pub fn precision(self) -> u8 {
        digit_count(self.value)
    }

    /// Move the value to `scale`, failing rather than dropping digits.
    ///
    /// Raising the scale multiplies the unscaled value; lowering it is only
    /// allowed when the discarded digits are all zero.
    pub fn rescale(self, scale: u8) -> Result<Self, DecimalError> {
        if scale > MAX_DECIMAL_PRECISION {
            return Err(DecimalError::ScaleOutOfRange { scale });
        }
        if scale == self.scale {
            return Ok(self);
        }
        if scale > self.scale {
            let factor = pow10(scale - self.scale)?;
            let value = self
                .value
                .checked_mul(factor)
                .ok_or(DecimalError::Overflow)?;
            return Self::new(value, scale);
        }
        let factor = pow10(self.scale - scale)?;
        if self.value % factor != 0 {
            return Err(DecimalError::InexactRescale {
                from: self.scale,
                to: scale,
            });
        }
        Self::new(self.value / factor, scale)
    }

    /// Rescale to `scale` and check the result fits in `precision` digits.
    pub fn to_precision_and_scale(self, precision: u8, scale: u8) -> Result<Self, DecimalError> {
        let rescaled = self.rescale(scale)?;
        if rescaled.precision() > precision {
            return Err(DecimalError::PrecisionOverflow {
                value: rescaled.value,
                precision,
            });
        }
        Ok(rescaled)
    }

    /// Convert the decimal into an `f64` (lossy for high precision inputs).
    pub fn to_f64(self) -> f64 {
        if self.value == 0 {
            return 0.0;
        }
        let denominator = 10_f64.powi(self.scale as i32);
        (self.value as f64) / denominator
    }
}

impl fmt::Display for DecimalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.value);
        }
        let negative = self.value < 0;
        let digits = self.value.unsigned_abs().to_string();
        let scale = self.scale as usize;
        if negative {
            f.write_str("-")?;
        }
        if digits.len() <= scale {
            f.write_str("0.")?;
            for _ in digits.len()..scale {
                f.write_str("0")?;
            }
            return f.write_str(&digits);
        }
        let split = digits.len() - scale;
        f.write_str(&digits[..split])?;
        f.write_str(".")?;
        f.write_str(&digits[split..])
    }
}

impl FromStr for DecimalValue {
    type Err = DecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };

        let scale = frac_part.len();
        if scale > MAX_DECIMAL_PRECISION as usize {
            return Err(DecimalError::ScaleOutOfRange {
                scale: scale.min(u8::MAX as usize) as u8,
            });
        }
        if !frac_part.chars().all(|c| c.is_ascii_digit()) {
            return Err(DecimalError::Parse(s.to_string()));
        }

        let combined = format!("{int_part}{frac_part}");
        let value = combined
            .parse::<i128>()
            .map_err(|_| DecimalError::Parse(s.to_string()))?;

        Self::new(value, scale as u8)
    }
}

impl PartialOrd for DecimalValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DecimalValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        if self.scale == other.scale {
            return self.value.cmp(&other.value);
        }

        let max_scale = std::cmp::max(self.scale, other.scale);
        let scale_diff_self = (max_scale - self.scale) as u32;
        let scale_diff_other = (max_scale - other.scale) as u32;

        // Both sides fit in i128 with at most 38 digits of scaling, so the
        // widened products cannot overflow i256.
        let l_scaled =
            i256::from_i128(self.value).wrapping_mul(POW10_BASE.wrapping_pow(scale_diff_self));
        let r_scaled =
            i256::from_i128(other.value).wrapping_mul(POW10_BASE.wrapping_pow(scale_diff_other));

        l_scaled.cmp(&r_scaled)
    }
}

fn pow10(exp: u8) -> Result<i128, DecimalError> {
    10_i128
        .checked_pow(exp as u32)
        .ok_or(DecimalError::Overflow)
}

fn digit_count(value: i128) -> u8 {
    let mut magnitude = value.unsigned_abs();
    if magnitude == 0 {
        return 1;
    }
    let mut count: u8 = 0;
    while magnitude != 0 {
        magnitude /= 10;
        count += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_pads_to_scale() {
        let tenth = DecimalValue::new(10_000, 5).unwrap();
        assert_eq!(tenth.to_string(), "0.10000");
        assert_eq!(DecimalValue::new(-5, 3).unwrap().to_string(), "-0.005");
        assert_eq!(DecimalValue::new(12345, 2).unwrap().to_string(), "123.45");
        assert_eq!(DecimalValue::from_i64(-42).to_string(), "-42");
    }

    #[test]
    fn rescale_up_is_exact() {
        let value: DecimalValue = "0.1".parse().unwrap();
        let widened = value.rescale(5).unwrap();
        assert_eq!(widened.raw_value(), 10_000);
        assert_eq!(widened.to_string(), "0.10000");
    }

    #[test]
    fn rescale_down_refuses_to_drop_digits() {
        let value: DecimalValue = "1.25".parse().unwrap();
        assert_eq!(
            value.rescale(1),
            Err(DecimalError::InexactRescale { from: 2, to: 1 })
        );
        let trailing_zero: DecimalValue = "1.50".parse().unwrap();
        assert_eq!(trailing_zero.rescale(1).unwrap().to_string(), "1.5");
    }

    #[test]
    fn precision_is_checked_after_rescale() {
        let value: DecimalValue = "123.4".parse().unwrap();
        assert!(value.to_precision_and_scale(5, 2).is_ok());
        assert!(matches!(
            value.to_precision_and_scale(4, 2),
            Err(DecimalError::PrecisionOverflow { precision: 4, .. })
        ));
    }

    #[test]
    fn ordering_spans_scales() {
        let a: DecimalValue = "0.1".parse().unwrap();
        let b: DecimalValue = "0.10000".parse().unwrap();
        let c: DecimalValue = "0.09999".parse().unwrap();
        assert_eq!(a.cmp(&b), std::cmp::Ordering::Equal);
        assert!(c < a);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("1.2x".parse::<DecimalValue>().is_err());
        assert!("abc".parse::<DecimalValue>().is_err());
    }
}
