use thiserror::Error;

use crate::allocator::AllocError;

/// What the reader choked on.
#[derive(Debug, Clone, PartialEq)]
pub enum SyntaxErrorKind {
    /// Input ended where a datum was required, e.g. after a quote.
    UnexpectedEof,
    /// `)` with no matching `(`.
    UnexpectedClose,
    /// Input ended inside a list; the offset is that of its `(`.
    UnclosedList,
    MalformedNumber(String),
    BadEscape(char),
    UnterminatedString,
    /// `.` outside a list, or more than one datum after it.
    BadDot,
    UnexpectedChar(char),
    /// Lists or quotes nested past the reader's limit.
    TooDeep,
}

impl std::fmt::Display for SyntaxErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyntaxErrorKind::UnexpectedEof => write!(f, "unexpected end of input"),
            SyntaxErrorKind::UnexpectedClose => write!(f, "unexpected ')'"),
            SyntaxErrorKind::UnclosedList => write!(f, "unclosed '('"),
            SyntaxErrorKind::MalformedNumber(text) => write!(f, "malformed number '{}'", text),
            SyntaxErrorKind::BadEscape(c) => write!(f, "unknown escape '\\{}'", c),
            SyntaxErrorKind::UnterminatedString => write!(f, "unterminated string"),
            SyntaxErrorKind::BadDot => write!(f, "misplaced '.'"),
            SyntaxErrorKind::UnexpectedChar(c) => write!(f, "unexpected character '{}'", c),
            SyntaxErrorKind::TooDeep => write!(f, "expression nested too deeply"),
        }
    }
}

/// Errors surfaced by the reader, evaluator and heap.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum YalError {
    #[error("syntax error at offset {offset}: {kind}")]
    Syntax { kind: SyntaxErrorKind, offset: usize },

    #[error("unbound symbol '{0}'")]
    Unbound(String),

    #[error("{name}: expected {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("not callable: {0}")]
    NotCallable(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("out of memory (requested {requested} bytes)")]
    OutOfMemory { requested: usize },

    /// A special form with the wrong shape, e.g. `(if)`.
    #[error("malformed {0}")]
    Malformed(String),

    #[error("division by zero")]
    DivideByZero,

    #[error("maximum evaluation depth {0} exceeded")]
    DepthExceeded(usize),

    /// Raised by the `error` primitive.
    #[error("{0}")]
    Raised(String),

    #[error("output error: {0}")]
    Output(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl YalError {
    pub fn syntax(kind: SyntaxErrorKind, offset: usize) -> Self {
        YalError::Syntax { kind, offset }
    }

    pub fn arity(name: &str, expected: impl Into<String>, got: usize) -> Self {
        YalError::Arity {
            name: name.to_string(),
            expected: expected.into(),
            got,
        }
    }

    /// True when more input could complete the expression.
    pub fn is_incomplete(&self) -> bool {
        matches!(
            self,
            YalError::Syntax {
                kind: SyntaxErrorKind::UnexpectedEof
                    | SyntaxErrorKind::UnclosedList
                    | SyntaxErrorKind::UnterminatedString,
                ..
            }
        )
    }
}

impl From<AllocError> for YalError {
    fn from(err: AllocError) -> Self {
        match err {
            AllocError::OutOfMemory { requested, .. } => YalError::OutOfMemory { requested },
            other => YalError::Internal(other.to_string()),
        }
    }
}

pub type YalResult<T> = Result<T, YalError>;
