//! Forward-only source of polynomial coefficients
//!
//! Every successful HELLO consumes exactly one line. Lines are never reused,
//! so running out of lines is fatal for the server.

use shared::protocol::COEFF;
use shared::{Expectations, ProtocolError, ServerMessage};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoefficientError {
    #[error("cannot read coefficients from {source_name}: {source}")]
    Io {
        source_name: String,
        #[source]
        source: io::Error,
    },
    #[error("coefficient source exhausted after {served} lines")]
    Exhausted { served: usize },
    #[error("malformed coefficient line {line_no}: {source}")]
    Malformed {
        line_no: usize,
        #[source]
        source: ProtocolError,
    },
}

/// One polynomial and the `COEFF` line announcing it
#[derive(Debug, Clone, PartialEq)]
pub struct Coefficients {
    pub values: Vec<f64>,
    pub line: String,
}

pub trait CoefficientFeed {
    fn next_coefficients(&mut self) -> Result<Coefficients, CoefficientError>;
}

/// Feed owned by the server loop
pub type BoxedFeed = Box<dyn CoefficientFeed + Send + Sync>;

/// Coefficient lines read lazily from a file or any other buffered reader.
///
/// Lines may be written as `COEFF c0 … cN` or as bare `c0 … cN`. Blank lines
/// are skipped.
pub struct CoefficientFile<R> {
    reader: R,
    source_name: String,
    count: usize,
    line_no: usize,
    served: usize,
}

impl CoefficientFile<BufReader<File>> {
    pub fn open(path: &Path, degree: usize) -> Result<Self, CoefficientError> {
        let file = File::open(path).map_err(|source| CoefficientError::Io {
            source_name: path.display().to_string(),
            source,
        })?;
        Ok(Self::from_reader(
            BufReader::new(file),
            path.display().to_string(),
            degree,
        ))
    }
}

impl<R: BufRead> CoefficientFile<R> {
    pub fn from_reader(reader: R, source_name: impl Into<String>, degree: usize) -> Self {
        Self {
            reader,
            source_name: source_name.into(),
            count: degree + 1,
            line_no: 0,
            served: 0,
        }
    }

    pub fn served(&self) -> usize {
        self.served
    }

    fn read_line(&mut self) -> Result<Option<String>, CoefficientError> {
        let mut raw = String::new();
        loop {
            raw.clear();
            let n = self
                .reader
                .read_line(&mut raw)
                .map_err(|source| CoefficientError::Io {
                    source_name: self.source_name.clone(),
                    source,
                })?;
            if n == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let tokens: Vec<&str> = raw.split_ascii_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }
            let line = if tokens[0] == COEFF {
                tokens.join(" ")
            } else {
                format!("{} {}", COEFF, tokens.join(" "))
            };
            return Ok(Some(line));
        }
    }
}

impl<R: BufRead> CoefficientFeed for CoefficientFile<R> {
    fn next_coefficients(&mut self) -> Result<Coefficients, CoefficientError> {
        let line = self.read_line()?.ok_or(CoefficientError::Exhausted {
            served: self.served,
        })?;

        let expect = Expectations::with_coefficients(self.count);
        let values = ServerMessage::parse(&line, &expect)
            .and_then(|message| match message {
                ServerMessage::Coeff(values) => Ok(values),
                _ => Err(ProtocolError::UnexpectedCommand(COEFF.to_string())),
            })
            .map_err(|source| CoefficientError::Malformed {
                line_no: self.line_no,
                source,
            })?;

        self.served += 1;
        Ok(Coefficients { values, line })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn feed(text: &str, degree: usize) -> CoefficientFile<Cursor<String>> {
        CoefficientFile::from_reader(Cursor::new(text.to_string()), "test", degree)
    }

    #[test]
    fn test_lines_are_served_in_order() {
        let mut source = feed("COEFF 1 0 1\nCOEFF 2 0.5 -3\n", 2);

        let first = source.next_coefficients().unwrap();
        assert_eq!(first.values, vec![1.0, 0.0, 1.0]);
        assert_eq!(first.line, "COEFF 1 0 1");

        let second = source.next_coefficients().unwrap();
        assert_eq!(second.values, vec![2.0, 0.5, -3.0]);
        assert_eq!(source.served(), 2);
    }

    #[test]
    fn test_exhaustion() {
        let mut source = feed("COEFF 1 0 1\n", 2);
        source.next_coefficients().unwrap();
        assert!(matches!(
            source.next_coefficients(),
            Err(CoefficientError::Exhausted { served: 1 })
        ));
    }

    #[test]
    fn test_bare_lines_crlf_and_blank_lines() {
        let mut source = feed("\r\n1  0\t1\r\n\nCOEFF 4 4 4", 2);
        let coefficients = source.next_coefficients().unwrap();
        assert_eq!(coefficients.line, "COEFF 1 0 1");
        let coefficients = source.next_coefficients().unwrap();
        assert_eq!(coefficients.values, vec![4.0, 4.0, 4.0]);
    }

    #[test]
    fn test_wrong_arity_is_malformed() {
        let mut source = feed("COEFF 1 0 1\n", 3);
        assert!(matches!(
            source.next_coefficients(),
            Err(CoefficientError::Malformed { line_no: 1, .. })
        ));
    }

    #[test]
    fn test_out_of_range_coefficient_is_malformed() {
        let mut source = feed("COEFF 1 0 101\n", 2);
        assert!(matches!(
            source.next_coefficients(),
            Err(CoefficientError::Malformed {
                source: ProtocolError::CoefficientOutOfRange(_),
                ..
            })
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = CoefficientFile::open(Path::new("/nonexistent/coefficients.txt"), 4);
        assert!(matches!(result, Err(CoefficientError::Io { .. })));
    }
}
