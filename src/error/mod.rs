//! Error types for all pipeline phases.

use thiserror::Error;

/// Lexer errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexerError {
    #[error("unexpected character '{0}' on line {1}")]
    UnexpectedChar(char, usize),

    #[error("unterminated string on line {0}")]
    UnterminatedString(usize),

    #[error("invalid integer literal '{0}' on line {1}")]
    InvalidInteger(String, usize),
}

/// Parser errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParserError {
    #[error("unexpected token '{found}', expected {expected} on line {line}")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: usize,
    },

    #[error("no parse rule for '{found}' on line {line}")]
    NoParseRule { found: String, line: usize },

    #[error(transparent)]
    Lexer(#[from] LexerError),
}

impl ParserError {
    pub fn unexpected_token(
        expected: impl Into<String>,
        found: impl Into<String>,
        line: usize,
    ) -> Self {
        Self::UnexpectedToken {
            expected: expected.into(),
            found: found.into(),
            line,
        }
    }
}

/// Bytecode compilation errors.
///
/// The AST and operator types are closed enums, so the unsupported-node
/// and unknown-operator failures of a dynamically-typed front end cannot
/// occur here; what remains is name resolution and pool capacity.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("undefined identifier {0}")]
    UndefinedIdentifier(String),

    #[error("too many constants in one chunk")]
    TooManyConstants,
}

/// Runtime errors raised by the virtual machine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("stack overflow")]
    StackOverflow,

    #[error("unsupported types for binary operation: {0} {1}")]
    UnsupportedBinaryTypes(&'static str, &'static str),

    #[error("unsupported types for comparison: {0} {1}")]
    UnsupportedComparisonTypes(&'static str, &'static str),

    #[error("unsupported type for negation: {0}")]
    UnsupportedNegation(&'static str),

    #[error("unusable as hash key: {0}")]
    UnusableHashKey(&'static str),

    #[error("division by zero")]
    DivisionByZero,

    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),
}

/// A unified error type for the whole pipeline.
#[derive(Debug, Error)]
pub enum TamarinError {
    #[error("Lexer error: {0}")]
    Lexer(#[from] LexerError),

    #[error("Parser error: {0}")]
    Parser(#[from] ParserError),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
