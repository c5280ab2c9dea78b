//! Strict ASCII decimal parsing and fixed-point formatting
//!
//! Every real number on the wire is written with exactly [`FRACTION_DIGITS`]
//! fraction digits and parsed back with the same grammar on both ends:
//!
//! ```text
//! decimal = ["-"] digit+ ["." digit{0,7}]
//! integer = ["-"] digit+
//! ```
//!
//! Parsing never clamps or partially consumes input. Anything outside the
//! grammar (exponents, a leading `+`, surrounding whitespace, a second dot)
//! is rejected as a whole.

use std::fmt;
use thiserror::Error;

/// Number of fraction digits used for every decimal on the wire
pub const FRACTION_DIGITS: usize = 7;

const SCALE: f64 = 1e7;

/// Reasons a token was not accepted as a number
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecimalError {
    #[error("empty number")]
    Empty,
    #[error("malformed number `{0}`")]
    Malformed(String),
    #[error("more than 7 fraction digits in `{0}`")]
    TooManyFractionDigits(String),
    #[error("number `{0}` is out of range")]
    OutOfRange(String),
}

/// Splits an optional leading minus sign and checks that the rest starts
/// with at least one digit.
fn split_sign(s: &str) -> Result<&str, DecimalError> {
    if s.is_empty() {
        return Err(DecimalError::Empty);
    }
    let unsigned = s.strip_prefix('-').unwrap_or(s);
    if !unsigned.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(DecimalError::Malformed(s.to_string()));
    }
    Ok(unsigned)
}

/// Parses a decimal with at most seven fraction digits.
pub fn parse_decimal(s: &str) -> Result<f64, DecimalError> {
    let unsigned = split_sign(s)?;

    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (unsigned, None),
    };

    if !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecimalError::Malformed(s.to_string()));
    }

    if let Some(frac) = frac_part {
        if !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DecimalError::Malformed(s.to_string()));
        }
        if frac.len() > FRACTION_DIGITS {
            return Err(DecimalError::TooManyFractionDigits(s.to_string()));
        }
    }

    // The grammar above is a strict subset of what `f64::from_str` accepts.
    let value: f64 = s
        .parse()
        .map_err(|_| DecimalError::Malformed(s.to_string()))?;

    if !value.is_finite() {
        return Err(DecimalError::OutOfRange(s.to_string()));
    }
    Ok(value)
}

/// A sample index as written on the wire.
///
/// Integers too large for `i64` are still well-formed. They keep their digits
/// so a reply can echo them, and they are never a valid index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Point {
    Index(i64),
    Unrepresentable(String),
}

impl Point {
    /// The index as `usize` if it lies in `0..=max`.
    pub fn index_within(&self, max: usize) -> Option<usize> {
        match self {
            Point::Index(point) => usize::try_from(*point).ok().filter(|&index| index <= max),
            Point::Unrepresentable(_) => None,
        }
    }
}

impl From<i64> for Point {
    fn from(point: i64) -> Self {
        Point::Index(point)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Point::Index(point) => write!(f, "{}", point),
            Point::Unrepresentable(digits) => f.write_str(digits),
        }
    }
}

/// Parses a signed integer (a sample index on the wire).
pub fn parse_point(s: &str) -> Result<Point, DecimalError> {
    let unsigned = split_sign(s)?;
    if !unsigned.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecimalError::Malformed(s.to_string()));
    }
    match s.parse() {
        Ok(point) => Ok(Point::Index(point)),
        Err(_) => Ok(Point::Unrepresentable(s.to_string())),
    }
}

/// Renders `x` fixed-point with exactly seven fraction digits.
///
/// Negative zero is written as `0.0000000` so both ends produce identical
/// bytes for values that round to zero.
pub fn format_decimal(x: f64) -> String {
    let formatted = format!("{:.*}", FRACTION_DIGITS, x);
    match formatted.strip_prefix('-') {
        Some(rest) if rest.bytes().all(|b| b == b'0' || b == b'.') => rest.to_string(),
        _ => formatted,
    }
}

/// Rounds to seven fraction digits, half away from zero.
pub fn round7(x: f64) -> f64 {
    (x * SCALE).round() / SCALE
}
