//! Centralised error hierarchy for the **Lox interpreter**.
//!
//! All subsystems (scanner, parser, resolver, runtime, CLI) must convert their
//! internal failure modes into one of the variants defined here.  This enables a
//! uniform `Result<T>` alias throughout the crate and ergonomic inter‑operation
//! with `anyhow`, while still preserving rich diagnostic detail.
//!
//! Static diagnostics are not returned one at a time: the scanner, parser and
//! resolver all keep going after a problem and push into a [`Diagnostics`]
//! collector that lives for one session.
//!
//! The module **does not** print diagnostics itself

use std::io;
use thiserror::Error;

use log::info;

use crate::token::{Symbol, TokenType};

/// Canonical error type used throughout the interpreter.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum LoxError {
    /// Lexical (scanner) error with source line information.
    #[error("[line {line}] Error: {message}")]
    Lex {
        /// Human‑readable description.
        message: String,

        /// 1‑based line where the error occurred.
        line: usize,
    },

    /// Syntactic (parser) error.  `location` is empty, ` at end` or ` at 'x'`.
    #[error("[line {line}] Error{location}: {message}")]
    Parse {
        message: String,
        location: String,
        line: usize,
    },

    /// Static‑analysis or resolution failure (e.g. early‑binding errors).
    #[error("[line {line}] Error{location}: {message}")]
    Resolve {
        message: String,
        location: String,
        line: usize,
    },

    /// Runtime evaluation error, pointing at the offending token's line.
    #[error("{message}\n[line {line}]")]
    Runtime { message: String, line: usize },

    /// Wrapper around `std::io::Error`.  Enables `?` on I/O ops.
    #[error("I/O error: {0}")]
    Io(String),

    /// UTF‑8 decoding failure when ingesting external text.
    #[error("Invalid UTF-8 input: {0}")]
    Utf8(String),
}

impl From<io::Error> for LoxError {
    fn from(err: io::Error) -> Self {
        LoxError::Io(err.to_string())
    }
}

impl From<std::str::Utf8Error> for LoxError {
    fn from(err: std::str::Utf8Error) -> Self {
        LoxError::Utf8(err.to_string())
    }
}

/// `" at 'x'"`, `" at end"`: where in the source a diagnostic points.
pub fn location_of(symbol: &Symbol) -> String {
    if symbol.token_type == TokenType::EOF {
        " at end".to_string()
    } else {
        format!(" at '{}'", symbol.lexeme)
    }
}

impl LoxError {
    /// Helper constructor for the **scanner**.
    pub fn lex<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Lex error: line={}, msg={}", line, message);

        LoxError::Lex { message, line }
    }

    /// Helper constructor for the **parser**.
    pub fn parse<S: Into<String>>(at: &Symbol, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Parse error: line={}, msg={}", at.line, message);

        LoxError::Parse {
            message,
            location: location_of(at),
            line: at.line,
        }
    }

    /// Helper constructor for the **resolver**.
    pub fn resolve<S: Into<String>>(at: &Symbol, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Resolve error: line={}, msg={}", at.line, message);

        LoxError::Resolve {
            message,
            location: location_of(at),
            line: at.line,
        }
    }

    /// Helper constructor for the **interpreter**.
    pub fn runtime<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Runtime error: line={}, msg={}", line, message);

        LoxError::Runtime { message, line }
    }

    /// Lex, parse and resolve errors stop a unit before it runs.
    pub fn is_static(&self) -> bool {
        matches!(
            self,
            LoxError::Lex { .. } | LoxError::Parse { .. } | LoxError::Resolve { .. }
        )
    }
}

/// Crate‑wide `Result` alias.
pub type Result<T> = std::result::Result<T, LoxError>;

/// A non-fatal static finding, e.g. an unused local.
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub message: String,
    pub location: String,
    pub line: usize,
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[line {}] Warning{}: {}",
            self.line, self.location, self.message
        )
    }
}

/// Per-session sink for everything the front end and the core report.
///
/// Replaces the usual process-wide "had error" flags: a [`crate::lox::Lox`]
/// session owns exactly one and resets it between REPL lines.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Vec<LoxError>,
    warnings: Vec<Warning>,
    runtime_error: Option<LoxError>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a lex, parse or resolve error.
    pub fn error(&mut self, err: LoxError) {
        info!("Diagnostic reported: {}", err);

        self.errors.push(err);
    }

    pub fn warning<S: Into<String>>(&mut self, at: &Symbol, msg: S) {
        let warning = Warning {
            message: msg.into(),
            location: location_of(at),
            line: at.line,
        };

        info!("Warning reported: {}", warning);

        self.warnings.push(warning);
    }

    pub fn runtime_error(&mut self, err: LoxError) {
        info!("Runtime error reported: {}", err);

        self.runtime_error = Some(err);
    }

    pub fn had_error(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn had_runtime_error(&self) -> bool {
        self.runtime_error.is_some()
    }

    pub fn errors(&self) -> &[LoxError] {
        &self.errors
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn runtime(&self) -> Option<&LoxError> {
        self.runtime_error.as_ref()
    }

    /// Forget everything reported so far (next REPL line).
    pub fn reset(&mut self) {
        self.errors.clear();
        self.warnings.clear();
        self.runtime_error = None;
    }

    /// Print every diagnostic to `out` in report order: warnings, errors,
    /// then the runtime error.
    pub fn emit(&self, out: &mut dyn io::Write) -> io::Result<()> {
        for warning in &self.warnings {
            writeln!(out, "{}", warning)?;
        }
        for err in &self.errors {
            writeln!(out, "{}", err)?;
        }
        if let Some(err) = &self.runtime_error {
            writeln!(out, "{}", err)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_locations() {
        let name = Symbol {
            token_type: TokenType::IDENTIFIER,
            lexeme: "a".into(),
            line: 3,
        };
        let eof = Symbol {
            token_type: TokenType::EOF,
            lexeme: String::new(),
            line: 9,
        };

        assert_eq!(
            LoxError::resolve(&name, "Boom.").to_string(),
            "[line 3] Error at 'a': Boom."
        );
        assert_eq!(
            LoxError::parse(&eof, "Expect expression.").to_string(),
            "[line 9] Error at end: Expect expression."
        );
        assert_eq!(LoxError::lex(1, "Bad.").to_string(), "[line 1] Error: Bad.");
        assert_eq!(
            LoxError::runtime(4, "Operand must be a number.").to_string(),
            "Operand must be a number.\n[line 4]"
        );

        assert!(LoxError::resolve(&name, "Boom.").is_static());
        assert!(!LoxError::runtime(1, "Boom.").is_static());
    }

    #[test]
    fn collector_tracks_and_resets() {
        let mut diagnostics = Diagnostics::new();
        let name = Symbol {
            token_type: TokenType::IDENTIFIER,
            lexeme: "x".into(),
            line: 1,
        };

        diagnostics.warning(&name, "Local variable is not used.");
        assert!(!diagnostics.had_error());

        diagnostics.error(LoxError::resolve(&name, "Nope."));
        diagnostics.runtime_error(LoxError::runtime(2, "Bad."));
        assert!(diagnostics.had_error());
        assert!(diagnostics.had_runtime_error());
        assert_eq!(diagnostics.runtime(), Some(&LoxError::runtime(2, "Bad.")));

        let mut out = Vec::new();
        diagnostics.emit(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "[line 1] Warning at 'x': Local variable is not used.\n\
             [line 1] Error at 'x': Nope.\n\
             Bad.\n[line 2]\n"
        );

        diagnostics.reset();
        assert!(!diagnostics.had_error());
        assert!(!diagnostics.had_runtime_error());
        assert!(diagnostics.warnings().is_empty());
    }
}
