//! Operator put requests read from stdin in interactive mode
//!
//! Each line holds exactly two whitespace-separated tokens, a point and a
//! value: `3 -1.25`. Invalid lines are reported and skipped; they never end
//! the session.

use shared::{parse_point, Point};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("expected `<point> <value>`, got {0} fields")]
    FieldCount(usize),
    #[error("invalid point `{0}`")]
    Point(String),
    #[error("invalid value `{0}`")]
    Value(String),
}

/// Parses one operator line into a point and a value.
///
/// The value is sent with seven fraction digits, so any finite number is
/// accepted here and rounded on the wire.
pub fn parse_put_request(line: &str) -> Result<(Point, f64), InputError> {
    let tokens: Vec<&str> = line.split_ascii_whitespace().collect();
    let [point, value] = tokens[..] else {
        return Err(InputError::FieldCount(tokens.len()));
    };

    let point = parse_point(point).map_err(|_| InputError::Point(point.to_string()))?;
    let value = value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| InputError::Value(value.to_string()))?;
    Ok((point, value))
}
