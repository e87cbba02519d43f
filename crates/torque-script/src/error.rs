//! Stage-separated error types for the parse/compile/execute pipeline.
//!
//! Lookup, assignment, and recursion failures are intentionally *not*
//! represented here: the specification classifies those as non-fatal, to be
//! logged through [`crate::platform::PlatformContext`] and resolved by
//! substituting zero, rather than aborting the pipeline.

use std::fmt;

/// Top-level error returned by the embedding API.
#[derive(Debug, Clone)]
pub enum TorqueError {
    /// The source did not match the grammar.
    Parse(ParseError),
    /// An internal compiler invariant was violated.
    Compile(CompileError),
    /// Malformed bytecode was encountered during execution.
    Bytecode(BytecodeError),
}

impl fmt::Display for TorqueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "parse error: {e}"),
            Self::Compile(e) => write!(f, "compile error: {e}"),
            Self::Bytecode(e) => write!(f, "bytecode error: {e}"),
        }
    }
}

impl std::error::Error for TorqueError {}

impl From<ParseError> for TorqueError {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

impl From<CompileError> for TorqueError {
    fn from(e: CompileError) -> Self {
        Self::Compile(e)
    }
}

impl From<BytecodeError> for TorqueError {
    fn from(e: BytecodeError) -> Self {
        Self::Bytecode(e)
    }
}

/// A single grammar mismatch, collected during parsing.
#[derive(Debug, Clone)]
pub struct ParseMessage {
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl fmt::Display for ParseMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

/// A compilation unit that failed to parse. Carries every collected message,
/// not just the first, mirroring the original engine's error-listener
/// collection behaviour.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub messages: Vec<ParseMessage>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, m) in self.messages.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{m}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Internal compiler invariant violations. These should never surface for
/// well-formed ASTs; they exist as a defensive boundary, not a user-facing
/// error channel.
#[derive(Debug, Clone)]
pub enum CompileError {
    /// A lowering routine was asked to compile a node shape it doesn't
    /// recognise (e.g. an lvalue target that isn't Local/Global/Subreference/
    /// Array).
    UnsupportedLvalue,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedLvalue => write!(f, "expression is not a valid assignment target"),
        }
    }
}

impl std::error::Error for CompileError {}

/// Fatal, implementer-only bytecode faults (spec §4.8/§7).
#[derive(Debug, Clone)]
pub enum BytecodeError {
    StackUnderflow,
    InvalidJumpTarget(isize),
    InvalidRegister(usize),
    Io(String),
}

impl fmt::Display for BytecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StackUnderflow => write!(f, "operand stack underflow"),
            Self::InvalidJumpTarget(off) => write!(f, "jump target {off} out of range"),
            Self::InvalidRegister(idx) => write!(f, "invalid register index {idx}"),
            Self::Io(msg) => write!(f, "io error: {msg}"),
        }
    }
}

impl std::error::Error for BytecodeError {}
