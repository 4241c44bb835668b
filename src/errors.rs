//! Error types for the DBN pipeline
//!
//! Each stage fails fast with its own error type:
//! - `LexError` for unclassifiable source text
//! - `ParseError` for grammar violations
//! - `CompileError` for internal invariant violations during emission
//! - `AssembleError` for unresolved labels
//! - `RuntimeError` for faults inside the virtual machine
//! - `LoadError` when a `Load`ed module cannot be located or compiled
//!
//! `Error` combines them for callers that drive the whole pipeline.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// The tokenizer found a character no rule matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub line: usize,
    pub col: usize,
    /// The offending text, truncated for display
    pub text: String,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no token rule matches '{}' at {}:{}",
            self.text, self.line, self.col
        )
    }
}

impl std::error::Error for LexError {}

/// What kind of grammar violation the parser hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A token that cannot start or continue the current construct
    UnexpectedToken,
    /// The token stream ran out mid-construct
    UnexpectedEnd,
    /// A statement did not end with a newline
    MissingNewline,
    /// A `{` block was never closed
    UnterminatedBlock,
    /// A command invocation ran off the end of the input
    UnterminatedCommand,
    /// The first argument to `Set` was neither a word nor a dot
    BadSetTarget,
    /// A `[x y]` dot did not contain exactly two arguments
    BadBracketArity,
    /// A `Command` definition argument was not a word
    BadCommandDefinitionArg,
    /// A parenthesized expression could not be folded into operations
    BadArithmetic,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParseErrorKind::UnexpectedToken => "unexpected token",
            ParseErrorKind::UnexpectedEnd => "unexpected end of input",
            ParseErrorKind::MissingNewline => "missing newline",
            ParseErrorKind::UnterminatedBlock => "unterminated block",
            ParseErrorKind::UnterminatedCommand => "unterminated command",
            ParseErrorKind::BadSetTarget => "bad Set target",
            ParseErrorKind::BadBracketArity => "bad dot arity",
            ParseErrorKind::BadCommandDefinitionArg => "bad Command argument",
            ParseErrorKind::BadArithmetic => "bad arithmetic",
        };
        write!(f, "{name}")
    }
}

/// A grammar violation, with the source position that triggered it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub line: usize,
    pub col: usize,
    pub detail: String,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, line: usize, col: usize, detail: impl Into<String>) -> Self {
        Self {
            kind,
            line,
            col,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {}:{}: {}",
            self.kind, self.line, self.col, self.detail
        )
    }
}

impl std::error::Error for ParseError {}

/// The compiler hit a node it cannot emit code for
///
/// The parser upholds the structural invariants the compiler relies on, so
/// this indicates a bug rather than a user mistake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub line: usize,
    pub detail: String,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "compile error at line {}: {}", self.line, self.detail)
    }
}

impl std::error::Error for CompileError {}

/// A label survived to assembly without ever being bound
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembleError {
    pub label: String,
}

impl fmt::Display for AssembleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unresolved label '{}'", self.label)
    }
}

impl std::error::Error for AssembleError {}

/// A fault inside the virtual machine
///
/// Every variant carries the source line the machine was executing, as set
/// by the most recent `SET_LINE_NO`. The machine has no unwinding; any of
/// these halts execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    DivisionByZero {
        line: usize,
    },
    StackUnderflow {
        line: usize,
    },
    /// An instruction popped a value of the wrong type
    TypeError {
        line: usize,
        expected: &'static str,
    },
    /// `COMMAND` named something that is neither built-in nor defined
    UnknownCommand {
        line: usize,
        name: String,
    },
    ArityMismatch {
        line: usize,
        name: String,
        expected: usize,
        found: usize,
    },
    /// `RETURN` with no frame to return to
    FrameUnderflow {
        line: usize,
    },
    JumpOutOfBounds {
        line: usize,
        target: i64,
        len: usize,
    },
    /// An instruction the assembled program should never contain
    InvalidInstruction {
        line: usize,
        detail: String,
    },
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::DivisionByZero { line } => {
                write!(f, "division by zero at line {line}")
            }
            RuntimeError::StackUnderflow { line } => {
                write!(f, "value stack underflow at line {line}")
            }
            RuntimeError::TypeError { line, expected } => {
                write!(f, "expected {expected} on the stack at line {line}")
            }
            RuntimeError::UnknownCommand { line, name } => {
                write!(f, "unknown command '{name}' at line {line}")
            }
            RuntimeError::ArityMismatch {
                line,
                name,
                expected,
                found,
            } => {
                write!(
                    f,
                    "'{name}' takes {expected} argument{} but got {found} at line {line}",
                    if *expected == 1 { "" } else { "s" }
                )
            }
            RuntimeError::FrameUnderflow { line } => {
                write!(f, "Return outside of a command at line {line}")
            }
            RuntimeError::JumpOutOfBounds { line, target, len } => {
                write!(
                    f,
                    "jump target {target} outside code of length {len} at line {line}"
                )
            }
            RuntimeError::InvalidInstruction { line, detail } => {
                write!(f, "invalid instruction at line {line}: {detail}")
            }
        }
    }
}

impl std::error::Error for RuntimeError {}

/// A `Load`ed module could not be located or compiled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadError {
    pub path: PathBuf,
    pub detail: String,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot load '{}': {}", self.path.display(), self.detail)
    }
}

impl std::error::Error for LoadError {}

/// Combined error type for whole-pipeline callers
#[derive(Debug)]
pub enum Error {
    Lex(LexError),
    Parse(ParseError),
    Compile(CompileError),
    Assemble(AssembleError),
    Runtime(RuntimeError),
    Load(LoadError),
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Lex(e) => write!(f, "lex error: {e}"),
            Error::Parse(e) => write!(f, "parse error: {e}"),
            Error::Compile(e) => write!(f, "{e}"),
            Error::Assemble(e) => write!(f, "assemble error: {e}"),
            Error::Runtime(e) => write!(f, "runtime error: {e}"),
            Error::Load(e) => write!(f, "load error: {e}"),
            Error::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<LexError> for Error {
    fn from(err: LexError) -> Self {
        Error::Lex(err)
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::Parse(err)
    }
}

impl From<CompileError> for Error {
    fn from(err: CompileError) -> Self {
        Error::Compile(err)
    }
}

impl From<AssembleError> for Error {
    fn from(err: AssembleError) -> Self {
        Error::Assemble(err)
    }
}

impl From<RuntimeError> for Error {
    fn from(err: RuntimeError) -> Self {
        Error::Runtime(err)
    }
}

impl From<LoadError> for Error {
    fn from(err: LoadError) -> Self {
        Error::Load(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}
