use std::fmt;
use std::num::IntErrorKind;
use std::str::FromStr;
use thiserror::Error;

/// A single instruction of the stack language.
///
/// The set is closed. Every consumer matches on it without a wildcard arm, so a
/// new variant does not compile until the simulator and every code generator
/// handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    // --- Data ---
    Push(i64),

    // --- Arithmetic ---
    Add,
    Subtract,

    // --- Output ---
    Print,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Invalid token: '{0}'")]
    Invalid(String),
    #[error("Integer literal out of range: '{0}'")]
    Overflow(String),
}

impl Op {
    /// Parses one whitespace-free token into an operation.
    ///
    /// `+`, `-` and `.` are operators. Anything else must be a base-10 signed
    /// integer literal (optional leading sign, digits only) that fits in an `i64`.
    pub fn parse_token(token: &str) -> Result<Self, TokenError> {
        match token {
            "+" => Ok(Op::Add),
            "-" => Ok(Op::Subtract),
            "." => Ok(Op::Print),
            _ => parse_integer(token).map(Op::Push),
        }
    }

    /// Number of values the operation pops and pushes, as `(pops, pushes)`.
    pub fn stack_effect(&self) -> (usize, usize) {
        match self {
            Op::Push(_) => (0, 1),
            Op::Add | Op::Subtract => (2, 1),
            Op::Print => (1, 0),
        }
    }
}

fn parse_integer(token: &str) -> Result<i64, TokenError> {
    let digits = token.strip_prefix(['+', '-']).unwrap_or(token);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TokenError::Invalid(token.to_string()));
    }
    token.parse::<i64>().map_err(|e| match e.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
            TokenError::Overflow(token.to_string())
        }
        _ => TokenError::Invalid(token.to_string()),
    })
}

impl FromStr for Op {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Op::parse_token(s)
    }
}

impl fmt::Display for Op {
    /// Renders the operation back as its source token.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Push(value) => write!(f, "{}", value),
            Op::Add => f.write_str("+"),
            Op::Subtract => f.write_str("-"),
            Op::Print => f.write_str("."),
        }
    }
}
