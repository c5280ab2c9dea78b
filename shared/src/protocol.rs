//! Line-level message grammar for the approximation game
//!
//! A message is one CRLF-terminated ASCII line: a case-sensitive command
//! token followed by whitespace-separated fields. Parsing is all-or-nothing;
//! a message with the wrong number of fields, a malformed number or trailing
//! garbage is rejected as a unit and nothing of it is applied.
//!
//! | Command   | Direction | Fields                         |
//! |-----------|-----------|--------------------------------|
//! | `HELLO`   | C→S       | `player_id`                    |
//! | `PUT`     | C→S       | `point value`                  |
//! | `COEFF`   | S→C       | `c0 … cN`                      |
//! | `STATE`   | S→C       | `s0 … sK`                      |
//! | `PENALTY` | S→C       | `point value`                  |
//! | `BAD_PUT` | S→C       | `point value`                  |
//! | `SCORING` | S→C       | `(player_id score)*`           |

use crate::decimal::{format_decimal, parse_decimal, parse_point, DecimalError, Point};
use crate::{is_valid_player_id, MAX_COEFF_MAGNITUDE, MAX_DEGREE, MAX_POINT_LIMIT, MIN_DEGREE};
use std::fmt;
use thiserror::Error;

pub const HELLO: &str = "HELLO";
pub const PUT: &str = "PUT";
pub const COEFF: &str = "COEFF";
pub const STATE: &str = "STATE";
pub const PENALTY: &str = "PENALTY";
pub const BAD_PUT: &str = "BAD_PUT";
pub const SCORING: &str = "SCORING";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty message")]
    Empty,
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("command `{0}` is not valid in this direction")]
    UnexpectedCommand(String),
    #[error("{command} expects {expected} fields, got {found}")]
    Arity {
        command: &'static str,
        expected: String,
        found: usize,
    },
    #[error("invalid player id `{0}`")]
    InvalidPlayerId(String),
    #[error("invalid number in {command}: {source}")]
    Number {
        command: &'static str,
        #[source]
        source: DecimalError,
    },
    #[error("coefficient `{0}` exceeds magnitude 100")]
    CoefficientOutOfRange(String),
}

/// Messages sent by players
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Hello { player_id: String },
    Put { point: Point, value: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreEntry {
    pub player_id: String,
    pub score: f64,
}

/// Messages sent by the server
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Coeff(Vec<f64>),
    State(Vec<f64>),
    Penalty { point: Point, value: f64 },
    BadPut { point: Point, value: f64 },
    Scoring(Vec<ScoreEntry>),
}

/// Vector lengths already established for a session.
///
/// A `None` length accepts any count the game configuration could produce
/// and is meant to be pinned by the caller after the first occurrence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Expectations {
    pub coefficients: Option<usize>,
    pub state_len: Option<usize>,
}

impl Expectations {
    pub fn with_coefficients(count: usize) -> Self {
        Self {
            coefficients: Some(count),
            state_len: None,
        }
    }
}

fn split_command(line: &str) -> Result<(&str, Vec<&str>), ProtocolError> {
    let mut tokens = line.split_ascii_whitespace();
    let command = tokens.next().ok_or(ProtocolError::Empty)?;
    Ok((command, tokens.collect()))
}

fn expect_exact(command: &'static str, fields: &[&str], count: usize) -> Result<(), ProtocolError> {
    if fields.len() != count {
        return Err(ProtocolError::Arity {
            command,
            expected: count.to_string(),
            found: fields.len(),
        });
    }
    Ok(())
}

fn expect_length(
    command: &'static str,
    fields: &[&str],
    fixed: Option<usize>,
    min: usize,
    max: usize,
) -> Result<(), ProtocolError> {
    match fixed {
        Some(count) => expect_exact(command, fields, count),
        None if (min..=max).contains(&fields.len()) => Ok(()),
        None => Err(ProtocolError::Arity {
            command,
            expected: format!("{}..={}", min, max),
            found: fields.len(),
        }),
    }
}

fn decimal(command: &'static str, token: &str) -> Result<f64, ProtocolError> {
    parse_decimal(token).map_err(|source| ProtocolError::Number { command, source })
}

fn point_and_value(command: &'static str, fields: &[&str]) -> Result<(Point, f64), ProtocolError> {
    expect_exact(command, fields, 2)?;
    let point = parse_point(fields[0]).map_err(|source| ProtocolError::Number { command, source })?;
    let value = decimal(command, fields[1])?;
    Ok((point, value))
}

fn player_id(token: &str) -> Result<String, ProtocolError> {
    if !is_valid_player_id(token) {
        return Err(ProtocolError::InvalidPlayerId(token.to_string()));
    }
    Ok(token.to_string())
}

impl ClientMessage {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let (command, fields) = split_command(line)?;
        match command {
            HELLO => {
                expect_exact(HELLO, &fields, 1)?;
                Ok(ClientMessage::Hello {
                    player_id: player_id(fields[0])?,
                })
            }
            PUT => {
                let (point, value) = point_and_value(PUT, &fields)?;
                Ok(ClientMessage::Put { point, value })
            }
            COEFF | STATE | PENALTY | BAD_PUT | SCORING => {
                Err(ProtocolError::UnexpectedCommand(command.to_string()))
            }
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }

    /// The message followed by `\r\n`
    pub fn to_wire(&self) -> String {
        format!("{}\r\n", self)
    }
}

impl ServerMessage {
    pub fn parse(line: &str, expect: &Expectations) -> Result<Self, ProtocolError> {
        let (command, fields) = split_command(line)?;
        match command {
            COEFF => {
                expect_length(
                    COEFF,
                    &fields,
                    expect.coefficients,
                    MIN_DEGREE + 1,
                    MAX_DEGREE + 1,
                )?;
                let mut coefficients = Vec::with_capacity(fields.len());
                for token in &fields {
                    let value = decimal(COEFF, token)?;
                    if value.abs() > MAX_COEFF_MAGNITUDE {
                        return Err(ProtocolError::CoefficientOutOfRange(token.to_string()));
                    }
                    coefficients.push(value);
                }
                Ok(ServerMessage::Coeff(coefficients))
            }
            STATE => {
                expect_length(STATE, &fields, expect.state_len, 2, MAX_POINT_LIMIT + 1)?;
                let state = fields
                    .iter()
                    .map(|token| decimal(STATE, token))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ServerMessage::State(state))
            }
            PENALTY => {
                let (point, value) = point_and_value(PENALTY, &fields)?;
                Ok(ServerMessage::Penalty { point, value })
            }
            BAD_PUT => {
                let (point, value) = point_and_value(BAD_PUT, &fields)?;
                Ok(ServerMessage::BadPut { point, value })
            }
            SCORING => {
                if fields.len() % 2 != 0 {
                    return Err(ProtocolError::Arity {
                        command: SCORING,
                        expected: "an even number of".to_string(),
                        found: fields.len(),
                    });
                }
                let entries = fields
                    .chunks(2)
                    .map(|pair| -> Result<ScoreEntry, ProtocolError> {
                        Ok(ScoreEntry {
                            player_id: player_id(pair[0])?,
                            score: decimal(SCORING, pair[1])?,
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ServerMessage::Scoring(entries))
            }
            HELLO | PUT => Err(ProtocolError::UnexpectedCommand(command.to_string())),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }

    /// The message followed by `\r\n`
    pub fn to_wire(&self) -> String {
        format!("{}\r\n", self)
    }
}

fn write_values(f: &mut fmt::Formatter<'_>, command: &str, values: &[f64]) -> fmt::Result {
    f.write_str(command)?;
    for value in values {
        write!(f, " {}", format_decimal(*value))?;
    }
    Ok(())
}

impl fmt::Display for ClientMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientMessage::Hello { player_id } => write!(f, "{} {}", HELLO, player_id),
            ClientMessage::Put { point, value } => {
                write!(f, "{} {} {}", PUT, point, format_decimal(*value))
            }
        }
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Coeff(values) => write_values(f, COEFF, values),
            ServerMessage::State(values) => write_values(f, STATE, values),
            ServerMessage::Penalty { point, value } => {
                write!(f, "{} {} {}", PENALTY, point, format_decimal(*value))
            }
            ServerMessage::BadPut { point, value } => {
                write!(f, "{} {} {}", BAD_PUT, point, format_decimal(*value))
            }
            ServerMessage::Scoring(entries) => {
                f.write_str(SCORING)?;
                for entry in entries {
                    write!(f, " {} {}", entry.player_id, format_decimal(entry.score))?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hello() {
        assert_eq!(
            ClientMessage::parse("HELLO Player42"),
            Ok(ClientMessage::Hello {
                player_id: "Player42".to_string()
            })
        );
    }

    #[test]
    fn test_hello_rejects_bad_ids_and_trailing_fields() {
        assert!(matches!(
            ClientMessage::parse("HELLO p_1"),
            Err(ProtocolError::InvalidPlayerId(_))
        ));
        assert!(matches!(
            ClientMessage::parse("HELLO p1 extra"),
            Err(ProtocolError::Arity { found: 2, .. })
        ));
        assert!(matches!(
            ClientMessage::parse("HELLO"),
            Err(ProtocolError::Arity { found: 0, .. })
        ));
    }

    #[test]
    fn test_commands_are_case_sensitive() {
        assert_eq!(
            ClientMessage::parse("hello p1"),
            Err(ProtocolError::UnknownCommand("hello".to_string()))
        );
        assert_eq!(ClientMessage::parse(""), Err(ProtocolError::Empty));
    }

    #[test]
    fn test_parse_put() {
        assert_eq!(
            ClientMessage::parse("PUT 3 -1.25"),
            Ok(ClientMessage::Put {
                point: Point::Index(3),
                value: -1.25
            })
        );
        assert!(ClientMessage::parse("PUT 3").is_err());
        assert!(ClientMessage::parse("PUT 3 1.0 2").is_err());
        assert!(ClientMessage::parse("PUT 3.5 1").is_err());
        assert!(ClientMessage::parse("PUT 3 1.123456789").is_err());
    }

    #[test]
    fn test_put_with_huge_point_is_well_formed() {
        let message = ClientMessage::parse("PUT 99999999999999999999 1").unwrap();
        assert_eq!(
            message,
            ClientMessage::Put {
                point: Point::Unrepresentable("99999999999999999999".to_string()),
                value: 1.0
            }
        );
        assert_eq!(message.to_string(), "PUT 99999999999999999999 1.0000000");
    }

    #[test]
    fn test_client_rejects_server_commands() {
        assert_eq!(
            ClientMessage::parse("COEFF 1 2"),
            Err(ProtocolError::UnexpectedCommand("COEFF".to_string()))
        );
    }

    #[test]
    fn test_coeff_arity_and_magnitude() {
        let expect = Expectations::with_coefficients(3);
        assert_eq!(
            ServerMessage::parse("COEFF 1 0 1", &expect),
            Ok(ServerMessage::Coeff(vec![1.0, 0.0, 1.0]))
        );
        assert!(matches!(
            ServerMessage::parse("COEFF 1 0", &expect),
            Err(ProtocolError::Arity { .. })
        ));
        assert_eq!(
            ServerMessage::parse("COEFF 1 0 100.0000001", &expect),
            Err(ProtocolError::CoefficientOutOfRange("100.0000001".to_string()))
        );
        assert!(ServerMessage::parse("COEFF -100 100 0", &expect).is_ok());
    }

    #[test]
    fn test_coeff_without_known_degree_uses_degree_bounds() {
        let expect = Expectations::default();
        assert!(ServerMessage::parse("COEFF 1", &expect).is_err());
        assert!(ServerMessage::parse("COEFF 1 2", &expect).is_ok());
        assert!(ServerMessage::parse("COEFF 1 2 3 4 5 6 7 8 9", &expect).is_ok());
        assert!(ServerMessage::parse("COEFF 1 2 3 4 5 6 7 8 9 10", &expect).is_err());
    }

    #[test]
    fn test_state_length_is_pinned_once_known() {
        let mut expect = Expectations::default();
        assert_eq!(
            ServerMessage::parse("STATE 0 1.5 0", &expect),
            Ok(ServerMessage::State(vec![0.0, 1.5, 0.0]))
        );
        expect.state_len = Some(3);
        assert!(ServerMessage::parse("STATE 0 1.5", &expect).is_err());
        assert!(ServerMessage::parse("STATE 0 1.5 0 0", &expect).is_err());
        assert!(ServerMessage::parse("STATE 0 x 0", &expect).is_err());
    }

    #[test]
    fn test_parse_scoring() {
        let expect = Expectations::default();
        assert_eq!(
            ServerMessage::parse("SCORING a 1.5 b 20.0000000", &expect),
            Ok(ServerMessage::Scoring(vec![
                ScoreEntry {
                    player_id: "a".to_string(),
                    score: 1.5
                },
                ScoreEntry {
                    player_id: "b".to_string(),
                    score: 20.0
                },
            ]))
        );
        assert_eq!(
            ServerMessage::parse("SCORING", &expect),
            Ok(ServerMessage::Scoring(Vec::new()))
        );
        assert!(ServerMessage::parse("SCORING a", &expect).is_err());
        assert!(ServerMessage::parse("SCORING a 1 b", &expect).is_err());
        assert!(ServerMessage::parse("SCORING a! 1", &expect).is_err());
        assert!(ServerMessage::parse("SCORING a one", &expect).is_err());
    }

    #[test]
    fn test_penalty_and_bad_put() {
        let expect = Expectations::default();
        assert_eq!(
            ServerMessage::parse("PENALTY 4 2.0000000", &expect),
            Ok(ServerMessage::Penalty {
                point: Point::Index(4),
                value: 2.0
            })
        );
        assert_eq!(
            ServerMessage::parse("BAD_PUT -1 7", &expect),
            Ok(ServerMessage::BadPut {
                point: Point::Index(-1),
                value: 7.0
            })
        );
        assert!(ServerMessage::parse("BAD_PUT 1", &expect).is_err());
    }

    #[test]
    fn test_wire_format() {
        assert_eq!(
            ClientMessage::Put {
                point: Point::Index(1),
                value: 2.5
            }
            .to_wire(),
            "PUT 1 2.5000000\r\n"
        );
        assert_eq!(
            ServerMessage::State(vec![0.0, -0.5]).to_wire(),
            "STATE 0.0000000 -0.5000000\r\n"
        );
        let scoring = ServerMessage::Scoring(vec![ScoreEntry {
            player_id: "p1".to_string(),
            score: 26114.0,
        }]);
        assert_eq!(scoring.to_string(), "SCORING p1 26114.0000000");
    }

    #[test]
    fn test_formatted_messages_parse_back() {
        let expect = Expectations::default();
        let message = ServerMessage::BadPut {
            point: Point::Index(10001),
            value: -5.5,
        };
        assert_eq!(
            ServerMessage::parse(&message.to_string(), &expect),
            Ok(message)
        );
    }
}
