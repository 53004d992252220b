//! Error types for compilation, chunk loading and execution.

use thiserror::Error;

/// Compilation errors. No chunk is produced when one is raised.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Undefined line {target} referenced at line {line}")]
    UndefinedLine { target: u32, line: u32 },

    #[error("Unknown function '{name}' at line {line}")]
    UnknownFunction { name: String, line: u32 },

    #[error("NEXT without FOR at line {0}")]
    NextWithoutFor(u32),

    #[error("NEXT {found} does not match FOR {expected} at line {line}")]
    NextMismatch {
        expected: String,
        found: String,
        line: u32,
    },

    #[error("FOR {variable} without NEXT at line {line}")]
    ForWithoutNext { variable: String, line: u32 },

    #[error("Invalid assignment target at line {0}")]
    InvalidAssignmentTarget(u32),

    #[error("Program too large: code offset {offset} exceeds 16-bit range at line {line}")]
    ProgramTooLarge { offset: usize, line: u32 },

    #[error("Too many {kind} (limit {limit}) at line {line}")]
    TooMany {
        kind: &'static str,
        limit: usize,
        line: u32,
    },
}

impl CompileError {
    pub fn undefined_line(target: u32, line: u32) -> Self {
        Self::UndefinedLine { target, line }
    }

    pub fn unknown_function(name: impl Into<String>, line: u32) -> Self {
        Self::UnknownFunction {
            name: name.into(),
            line,
        }
    }

    pub fn too_many(kind: &'static str, limit: usize, line: u32) -> Self {
        Self::TooMany { kind, limit, line }
    }

    pub fn line(&self) -> u32 {
        match self {
            Self::UndefinedLine { line, .. } => *line,
            Self::UnknownFunction { line, .. } => *line,
            Self::NextWithoutFor(line) => *line,
            Self::NextMismatch { line, .. } => *line,
            Self::ForWithoutNext { line, .. } => *line,
            Self::InvalidAssignmentTarget(line) => *line,
            Self::ProgramTooLarge { line, .. } => *line,
            Self::TooMany { line, .. } => *line,
        }
    }
}

/// Errors raised while reading the binary chunk format.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Bad magic: expected \"ZBC\", found {0:?}")]
    BadMagic([u8; 3]),

    #[error("Unsupported chunk format version {found} (expected {expected})")]
    UnsupportedVersion { found: u8, expected: u8 },

    #[error("Unknown constant tag {tag} at constant {index}")]
    UnknownConstantTag { tag: u8, index: usize },

    #[error("String constant {index} is not valid UTF-8")]
    InvalidUtf8 { index: usize },

    #[error("Line table has {lines} entries for {code} code bytes")]
    LineTableMismatch { code: usize, lines: usize },

    #[error("Truncated or unreadable chunk: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while writing a chunk.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("String constant {index} is {len} bytes, longer than 65535")]
    StringTooLong { index: usize, len: usize },

    #[error("{what} count {count} does not fit the chunk format")]
    CountOverflow { what: &'static str, count: usize },

    #[error("Failed to write chunk: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a builtin function; wrapped by [`RuntimeError::Builtin`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuiltinError {
    #[error("{name} requires {expected} argument(s), got {got}")]
    Arity {
        name: &'static str,
        expected: &'static str,
        got: usize,
    },

    #[error("{name}: {message}")]
    Domain {
        name: &'static str,
        message: &'static str,
    },
}

impl BuiltinError {
    pub fn domain(name: &'static str, message: &'static str) -> Self {
        Self::Domain { name, message }
    }
}

/// Runtime errors. Each carries the source line of the faulting instruction.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Division by zero at line {0}")]
    DivisionByZero(u32),

    #[error("Operand must be a number at line {0}")]
    NegateNonNumber(u32),

    #[error("Stack overflow (capacity {capacity}) at line {line}")]
    StackOverflow { capacity: usize, line: u32 },

    #[error("Internal fault: operand stack underflow at line {0}")]
    StackUnderflow(u32),

    #[error("GOSUB nesting exceeds {limit} at line {line}")]
    CallStackOverflow { limit: usize, line: u32 },

    #[error("RETURN without GOSUB at line {0}")]
    ReturnWithoutGosub(u32),

    #[error("NEXT without FOR at line {0}")]
    NextWithoutFor(u32),

    #[error("NEXT does not match the innermost FOR at line {0}")]
    LoopFrameMismatch(u32),

    #[error("FOR has no matching NEXT at line {0}")]
    ForWithoutNext(u32),

    #[error("Array not declared (slot {array}) at line {line}")]
    ArrayNotDeclared { array: u16, line: u32 },

    #[error("Array index {index} out of bounds for dimension of size {size} at line {line}")]
    IndexOutOfBounds { index: f64, size: usize, line: u32 },

    #[error("Array has {expected} dimension(s), accessed with {got} at line {line}")]
    DimensionMismatch {
        expected: usize,
        got: usize,
        line: u32,
    },

    #[error("Invalid array dimension {size} at line {line}")]
    InvalidDimension { size: f64, line: u32 },

    #[error("Array of {elements} elements exceeds limit {limit} at line {line}")]
    ArrayTooLarge {
        elements: usize,
        limit: usize,
        line: u32,
    },

    #[error("Unknown opcode {opcode} at offset {offset}, line {line}")]
    UnknownOpcode { opcode: u8, offset: usize, line: u32 },

    #[error("Unknown builtin function index {index} at line {line}")]
    UnknownBuiltin { index: u16, line: u32 },

    #[error("Truncated instruction at offset {offset}, line {line}")]
    TruncatedInstruction { offset: usize, line: u32 },

    #[error("Invalid {kind} index {index} at line {line}")]
    InvalidIndex {
        kind: &'static str,
        index: u16,
        line: u32,
    },

    #[error("Execution ran past the end of code without END")]
    RanPastEnd,

    #[error("VM has already stopped")]
    NotRunnable,

    #[error("{source} at line {line}")]
    Builtin { source: BuiltinError, line: u32 },

    #[error("I/O error at line {line}: {source}")]
    Io {
        source: std::io::Error,
        line: u32,
    },
}

impl RuntimeError {
    pub fn builtin(source: BuiltinError, line: u32) -> Self {
        Self::Builtin { source, line }
    }

    pub fn io(source: std::io::Error, line: u32) -> Self {
        Self::Io { source, line }
    }

    pub fn invalid_index(kind: &'static str, index: u16, line: u32) -> Self {
        Self::InvalidIndex { kind, index, line }
    }

    /// True for faults that indicate a compiler or VM defect rather than a
    /// problem in the user's program.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::StackUnderflow(_))
    }

    /// Source line of the failing instruction, when known.
    pub fn line(&self) -> Option<u32> {
        match self {
            Self::DivisionByZero(line)
            | Self::NegateNonNumber(line)
            | Self::StackUnderflow(line)
            | Self::ReturnWithoutGosub(line)
            | Self::NextWithoutFor(line)
            | Self::LoopFrameMismatch(line)
            | Self::ForWithoutNext(line) => Some(*line),
            Self::StackOverflow { line, .. }
            | Self::CallStackOverflow { line, .. }
            | Self::ArrayNotDeclared { line, .. }
            | Self::IndexOutOfBounds { line, .. }
            | Self::DimensionMismatch { line, .. }
            | Self::InvalidDimension { line, .. }
            | Self::ArrayTooLarge { line, .. }
            | Self::UnknownBuiltin { line, .. }
            | Self::InvalidIndex { line, .. }
            | Self::Builtin { line, .. }
            | Self::Io { line, .. }
            | Self::UnknownOpcode { line, .. }
            | Self::TruncatedInstruction { line, .. } => Some(*line),
            Self::RanPastEnd
            | Self::NotRunnable => None,
        }
    }
}

/// A unified error type for all phases.
#[derive(Debug, Error)]
pub enum ZbasicError {
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
