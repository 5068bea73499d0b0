//! Compiler for postfix scalar expressions and their symbolic derivatives.
//!
//! This crate turns expressions of one variable `x`, written in postfix (RPN) notation, into
//! routines for an x87-style floating-point stack machine. Every expression is also
//! differentiated symbolically, so one problem of three expressions yields six routines
//! sharing one deduplicated constant pool. The result is rendered as a NASM unit and can be
//! JIT-compiled with [Cranelift](https://github.com/bytecodealliance/wasmtime/tree/main/cranelift)
//! to check the emitted code against the trees it came from.
//!
//! # Pipeline
//!
//! - `lexer`: text to positioned tokens
//! - `convert`: tokens to an expression tree
//! - `expr`: symbolic differentiation
//! - `codegen`/`assembly`: trees to stack-machine routines and NASM text
//! - `machine`/`builder`: interpretation and native compilation of those routines
//!
//! # Example
//!
//! ```rust
//! use postfix_jit::prelude::*;
//!
//! let expr = build_ast("x 2 ^ 3 +").unwrap();
//! let derivative = expr.derivative().unwrap();
//! assert_eq!(derivative.eval(4.0), 8.0);
//!
//! let unit = Assembler::new()
//!     .assemble(&[("f1", &expr), ("df1", &*derivative)])
//!     .unwrap();
//! assert!(unit.to_string().contains("global df1"));
//! ```

pub use problem::{CompiledProblem, Problem};

pub mod prelude {
    pub use crate::assembly::{Assembler, AssemblyUnit};
    pub use crate::builder::compile_unit;
    pub use crate::convert::build_ast;
    pub use crate::expr::Expr;
    pub use crate::problem::Problem;
}

/// Two-pass emission of whole units and NASM rendering
pub mod assembly;
/// JIT compilation of emitted routines using Cranelift
pub mod builder;
/// Stack-machine instruction set and tree lowering
pub mod codegen;
/// Conversion from postfix text to the expression tree
pub mod convert;
/// Error types for the various failure modes
pub mod errors;
/// Expression tree representation and symbolic differentiation
pub mod expr;
/// Tokenizer for postfix source text
pub mod lexer;
/// Reference interpreter and stack verifier
pub mod machine;
/// Deduplicated constant table
pub mod pool;
/// Problem files and the compile pipeline
pub mod problem;
/// Functions for linking external math functions into JIT code
pub(crate) mod operators {
    pub(crate) mod exp2;
    pub(crate) mod log2;
    pub(crate) mod trigonometric;
}
/// Type aliases for compiled functions
pub mod types;
