use crate::program::Program;
use crate::vm::op::{Op, TokenError};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Unable to read file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("File {} is not valid UTF-8: {source}", .path.display())]
    Encoding {
        path: PathBuf,
        #[source]
        source: std::string::FromUtf8Error,
    },
    #[error("{line}:{column}: {source}")]
    Token {
        line: usize,
        column: usize,
        #[source]
        source: TokenError,
    },
}

/// A whitespace-delimited token and where it starts in the source (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub line: usize,
    pub column: usize,
}

/// Reads a source file and parses it into a `Program`.
///
/// # Arguments
/// * `path` - Path to the source file.
///
/// # Returns
/// * `Result<Program, LoadError>` - The parsed program, or the first read, decode or token error.
pub fn load(path: &Path) -> Result<Program, LoadError> {
    let bytes = fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let source = String::from_utf8(bytes).map_err(|source| LoadError::Encoding {
        path: path.to_path_buf(),
        source,
    })?;
    let program = parse_source(&source)?;
    debug!(
        "Loaded {} operation(s) from '{}'",
        program.len(),
        path.display()
    );
    Ok(program)
}

/// Parses every token of `source` in order. Stops at the first bad token, so a
/// partially parsed program is never returned.
pub fn parse_source(source: &str) -> Result<Program, LoadError> {
    let ops = tokenize(source)
        .map(|token| {
            Op::parse_token(token.text).map_err(|source| LoadError::Token {
                line: token.line,
                column: token.column,
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Program::new(ops))
}

/// Splits `source` on runs of whitespace. No comments, quoting or escapes.
pub fn tokenize(source: &str) -> impl Iterator<Item = Token<'_>> {
    source.lines().enumerate().flat_map(|(line_idx, line)| {
        let mut rest = line;
        let mut offset = 0;
        std::iter::from_fn(move || {
            let trimmed = rest.trim_start();
            offset += rest.len() - trimmed.len();
            if trimmed.is_empty() {
                return None;
            }
            let len = trimmed
                .find(char::is_whitespace)
                .unwrap_or(trimmed.len());
            let column = line[..offset].chars().count() + 1;
            let token = Token {
                text: &trimmed[..len],
                line: line_idx + 1,
                column,
            };
            rest = &trimmed[len..];
            offset += len;
            Some(token)
        })
    })
}
