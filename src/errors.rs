//! Error types for the postfix-jit crate.
//!
//! This module defines the failure modes of every pipeline stage. The main error types are:
//!
//! - `LexicalError`: An unrecognized character in the token stream
//! - `SyntaxError`: Errors while building an expression tree from postfix tokens
//! - `UnsupportedDerivativeError`: The `f(x)^g(x)` case the differentiator does not model
//! - `MachineError`: An emitted routine that does not keep the register stack balanced
//! - `BuilderError`: Errors during JIT compilation with Cranelift
//! - `ProblemError`: A malformed problem file
//! - `CompileError`: High-level errors when compiling a whole problem unit
//!
//! Every failure is unrecoverable at the point of detection. None of them leave a partial
//! assembly unit behind.

use cranelift_codegen::CodegenError;
use cranelift_module::ModuleError;
use thiserror::Error;

use crate::codegen::Instruction;
use crate::lexer::Position;

/// An unrecognized character reached by the tokenizer.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("unknown token '{ch}' at {position}")]
pub struct LexicalError {
    pub ch: char,
    pub position: Position,
}

/// Errors that can occur while building an expression tree from a postfix token stream.
///
/// Each variant carries the source position of the token that triggered it. For
/// `LeftoverOperands` and `EmptyExpression` that is the end-of-input position.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyntaxError {
    /// A character the tokenizer could not classify
    #[error(transparent)]
    Lexical(#[from] LexicalError),
    /// A named constant other than `pi` or `e`
    #[error("unknown constant '{name}' at {position}")]
    UnknownConstant { name: String, position: Position },
    /// An identifier in function position that is not `sin`, `cos`, `tan` or `ctg`
    #[error("unknown function '{name}' at {position}")]
    UnknownFunction { name: String, position: Position },
    /// An operator or function applied with too few operands on the stack
    #[error("not enough operands for '{symbol}' at {position}: expected {expected}, found {found}")]
    MissingOperands {
        symbol: String,
        expected: usize,
        found: usize,
        position: Position,
    },
    /// More than one operand left once the stream ended
    #[error("{count} operands left at {position}, expected exactly one (missing operator?)")]
    LeftoverOperands { count: usize, position: Position },
    /// The stream ended without producing any operand
    #[error("empty expression at {position}")]
    EmptyExpression { position: Position },
}

impl SyntaxError {
    /// Returns the source position the error refers to.
    pub fn position(&self) -> Position {
        match self {
            SyntaxError::Lexical(err) => err.position,
            SyntaxError::UnknownConstant { position, .. }
            | SyntaxError::UnknownFunction { position, .. }
            | SyntaxError::MissingOperands { position, .. }
            | SyntaxError::LeftoverOperands { position, .. }
            | SyntaxError::EmptyExpression { position } => *position,
        }
    }
}

/// Raised when differentiating `f(x)^g(x)` with neither base nor exponent constant.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("derivative of a power with non-constant base and exponent is not supported: {expression}")]
pub struct UnsupportedDerivativeError {
    /// Infix rendering of the offending sub-expression
    pub expression: String,
}

/// Errors raised when a routine does not respect the register-stack discipline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MachineError {
    /// An instruction needed more operands than the stack held
    #[error("stack underflow at instruction {index} ({instruction})")]
    StackUnderflow {
        index: usize,
        instruction: Instruction,
    },
    /// The routine finished with a depth other than one
    #[error("routine leaves {depth} values on the register stack, expected 1")]
    UnbalancedStack { depth: usize },
    /// A constant load referencing a slot outside the data section
    #[error("constant slot {slot} is not in the data section")]
    InvalidConstantSlot { slot: usize },
}

/// Errors that can occur during JIT compilation of emitted routines.
///
/// This enum represents various failure modes in the process of lowering
/// stack-machine routines into machine code using Cranelift.
#[derive(Error, Debug)]
pub enum BuilderError {
    /// Error when the target machine architecture is not supported
    #[error("host machine is not supported: {0}")]
    HostMachineNotSupported(String),
    /// Error when a Cranelift flag cannot be set
    #[error("invalid codegen setting: {0}")]
    Setting(String),
    /// Error during Cranelift code generation
    #[error("codegen error: {0}")]
    CodegenError(CodegenError),
    /// Error in the Cranelift JIT module
    #[error("module error: {0}")]
    ModuleError(ModuleError),
    /// Error when defining the JIT function
    #[error("function error: {0}")]
    FunctionError(String),
    /// Error when declaring the JIT function
    #[error("declaration error: {0}")]
    DeclarationError(String),
    /// The routine being lowered is not stack-balanced
    #[error("cannot lower routine '{routine}': {source}")]
    Machine {
        routine: String,
        #[source]
        source: MachineError,
    },
}

/// Errors in the problem file layout.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProblemError {
    /// The first line does not hold two bounds
    #[error("could not read range from the first line")]
    MissingRange,
    /// A bound that is not a number
    #[error("invalid range bound '{0}'")]
    InvalidBound(String),
    /// Fewer than three expression lines
    #[error("could not read expression {0}")]
    MissingExpression(usize),
}

/// High-level errors that can occur when compiling a problem unit.
///
/// This enum wraps the lower-level errors of every stage. Expression-scoped
/// failures record the label of the routine whose source failed.
#[derive(Debug, Error)]
pub enum CompileError {
    /// Error reading or writing a file
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Error in the problem file layout
    #[error("invalid problem file: {0}")]
    Problem(#[from] ProblemError),
    /// Error when building the tree of one expression
    #[error("syntax error in {label}: {source}")]
    Syntax {
        label: String,
        #[source]
        source: SyntaxError,
    },
    /// Error when differentiating one expression
    #[error("cannot differentiate {label}: {source}")]
    Derivative {
        label: String,
        #[source]
        source: UnsupportedDerivativeError,
    },
    /// Error when an emitted routine fails verification
    #[error("code generation failed for {label}: {source}")]
    Codegen {
        label: String,
        #[source]
        source: MachineError,
    },
    /// Error when JIT compiling the routines
    #[error("failed to build JIT functions: {0}")]
    Builder(#[from] BuilderError),
    /// Error when a compiled routine disagrees with its tree
    #[error("{label} disagrees with its tree at x = {x}: compiled {compiled}, expected {expected}")]
    Mismatch {
        label: String,
        x: f64,
        compiled: f64,
        expected: f64,
    },
    /// Error when no sample point could check a compiled routine
    #[error("{label} could not be checked at any sample point")]
    Unverified { label: String },
}

impl CompileError {
    /// Returns the process exit status for this error class.
    ///
    /// I/O and problem-file errors exit with 1, syntax errors with 2,
    /// unsupported derivatives with 3 and code generation failures with 4.
    pub fn exit_code(&self) -> i32 {
        match self {
            CompileError::Io(_) | CompileError::Problem(_) => 1,
            CompileError::Syntax { .. } => 2,
            CompileError::Derivative { .. } => 3,
            CompileError::Codegen { .. }
            | CompileError::Builder(_)
            | CompileError::Mismatch { .. }
            | CompileError::Unverified { .. } => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_position() {
        let err = SyntaxError::Lexical(LexicalError {
            ch: '$',
            position: Position::new(3, 7),
        });
        assert_eq!(err.position(), Position::new(3, 7));
        assert_eq!(err.to_string(), "unknown token '$' at line 3, column 7");

        let err = SyntaxError::LeftoverOperands {
            count: 2,
            position: Position::new(1, 4),
        };
        assert_eq!(err.position(), Position::new(1, 4));
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let syntax = CompileError::Syntax {
            label: "f1".to_string(),
            source: SyntaxError::EmptyExpression {
                position: Position::new(1, 1),
            },
        };
        let derivative = CompileError::Derivative {
            label: "f2".to_string(),
            source: UnsupportedDerivativeError {
                expression: "(x ^ x)".to_string(),
            },
        };
        let problem = CompileError::Problem(ProblemError::MissingRange);

        assert_eq!(syntax.exit_code(), 2);
        assert_eq!(derivative.exit_code(), 3);
        assert_eq!(problem.exit_code(), 1);
        assert!(syntax.to_string().contains("f1"));
    }
}
