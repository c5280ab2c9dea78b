//! Wire-level building blocks shared by the approximation game server and client
//!
//! - [`decimal`]: strict fixed-point number grammar
//! - [`framer`]: CRLF line reassembly per connection
//! - [`protocol`]: typed messages and their line grammar

pub mod decimal;
pub mod framer;
pub mod protocol;

pub use decimal::{format_decimal, parse_decimal, parse_point, round7, DecimalError, Point};
pub use framer::{FillStatus, FramerError, LineFramer};
pub use protocol::{ClientMessage, Expectations, ProtocolError, ScoreEntry, ServerMessage};

pub const MIN_DEGREE: usize = 1;
pub const MAX_DEGREE: usize = 8;
pub const MAX_POINT_LIMIT: usize = 10_000;
pub const MAX_COEFF_MAGNITUDE: f64 = 100.0;

/// Accepted range for a single put's value
pub const MIN_PUT_VALUE: f64 = -5.0;
pub const MAX_PUT_VALUE: f64 = 5.0;

/// Reassembly capacity for messages read by the server
pub const SERVER_LINE_CAPACITY: usize = 4096;
/// Reassembly capacity for messages read by the client (long STATE and SCORING lines)
pub const CLIENT_LINE_CAPACITY: usize = 1 << 20;

/// Player ids are one or more ASCII letters or digits.
pub fn is_valid_player_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// `Σ coeffs[k] * x^k` with integer powers of the sample index.
pub fn evaluate_polynomial(coeffs: &[f64], x: usize) -> f64 {
    let x = x as f64;
    let mut power = 1.0;
    let mut sum = 0.0;
    for coeff in coeffs {
        sum += coeff * power;
        power *= x;
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_player_id_validation() {
        assert!(is_valid_player_id("p1"));
        assert!(is_valid_player_id("ABCxyz0123"));
        assert!(!is_valid_player_id(""));
        assert!(!is_valid_player_id("p 1"));
        assert!(!is_valid_player_id("p-1"));
        assert!(!is_valid_player_id("gracz\u{105}"));
    }

    #[test]
    fn test_polynomial_evaluation() {
        let coeffs = [1.0, 0.0, 1.0];
        assert_eq!(evaluate_polynomial(&coeffs, 0), 1.0);
        assert_eq!(evaluate_polynomial(&coeffs, 2), 5.0);
        assert_eq!(evaluate_polynomial(&coeffs, 10), 101.0);

        let cubic = [0.5, -1.25, 0.0, 2.0];
        assert_approx_eq!(evaluate_polynomial(&cubic, 3), 0.5 - 3.75 + 54.0, 1e-12);
    }
}
