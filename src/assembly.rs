//! Whole-unit emission and NASM rendering.
//!
//! An assembly unit is one data section of pooled constants followed by the routines that
//! reference them. Because the data section is written first, pool indices have to be final
//! before any routine is rendered. The [`Assembler`] therefore emits every tree twice:
//!
//! 1. a dry pass that only populates the constant pool
//! 2. the real pass, which finds every constant already interned and produces the routines
//!
//! The rendered text targets 32-bit NASM with the cdecl convention: the argument is read from
//! `[ebp + 8]` and the result is returned in `st0`.

use std::fmt;

use tracing::{debug, info};

use crate::{
    codegen::{self, Instruction, Routine},
    errors::CompileError,
    expr::Expr,
    pool::ConstantPool,
};

/// Label of the routine computing expression `index` (0-based), or its derivative.
///
/// Expressions are `f1`, `f2`, `f3`; derivatives are `df1`, `df2`, `df3`.
pub fn routine_label(index: usize, derivative: bool) -> String {
    if derivative {
        format!("df{}", index + 1)
    } else {
        format!("f{}", index + 1)
    }
}

/// A data section and the routines referencing it.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyUnit {
    pub constants: Vec<f64>,
    pub routines: Vec<Routine>,
}

impl AssemblyUnit {
    /// Looks up a routine by label.
    pub fn routine(&self, label: &str) -> Option<&Routine> {
        self.routines.iter().find(|routine| routine.label == label)
    }
}

impl fmt::Display for AssemblyUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "section .data")?;
        for (slot, value) in self.constants.iter().enumerate() {
            writeln!(f, "    const{slot} dq {}", format_constant(*value))?;
        }

        writeln!(f)?;
        writeln!(f, "section .text")?;
        for routine in &self.routines {
            writeln!(f, "    global {}", routine.label)?;
        }
        writeln!(f)?;

        for routine in &self.routines {
            write_routine(f, routine)?;
        }
        Ok(())
    }
}

fn write_routine(f: &mut fmt::Formatter<'_>, routine: &Routine) -> fmt::Result {
    writeln!(f, "{}:", routine.label)?;
    writeln!(f, "    push ebp")?;
    writeln!(f, "    mov ebp, esp")?;
    for instruction in &routine.body {
        writeln!(f, "    {instruction}")?;
    }
    writeln!(f, "    pop ebp")?;
    writeln!(f, "    ret")?;
    writeln!(f)
}

/// Renders a constant as a NASM floating-point literal.
///
/// Finite values keep full round-trip precision and always contain a `.`, which is what
/// makes NASM read them as floats. Non-finite values use NASM's special tokens.
pub fn format_constant(value: f64) -> String {
    if value.is_nan() {
        return "__QNaN__".to_string();
    }
    if value.is_infinite() {
        let sign = if value < 0.0 { "-" } else { "" };
        return format!("{sign}__Infinity__");
    }

    let mut text = format!("{value:?}");
    if !text.contains('.') {
        // Debug output omits the dot for exponent forms such as `1e-10`.
        match text.find('e') {
            Some(at) => text.insert(at, '.'),
            None => text.push_str(".0"),
        }
    }
    text
}

/// Two-pass emitter owning the constant pool of one emission run.
#[derive(Debug, Default)]
pub struct Assembler {
    pool: ConstantPool,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits one unit from labelled trees, in the given order.
    ///
    /// The pool is reset first, so an assembler can be reused for several units.
    ///
    /// # Errors
    /// Returns `CompileError::Codegen` naming the routine whose body failed verification.
    pub fn assemble(&mut self, trees: &[(&str, &Expr)]) -> Result<AssemblyUnit, CompileError> {
        self.pool.reset();

        let mut scratch: Vec<Instruction> = Vec::new();
        for (_, expr) in trees {
            codegen::emit(expr, &mut self.pool, &mut scratch);
            scratch.clear();
        }
        let pooled = self.pool.len();
        info!(constants = pooled, "constant pool populated");

        let mut routines = Vec::with_capacity(trees.len());
        for (label, expr) in trees {
            let routine = codegen::emit_routine(label, expr, &mut self.pool).map_err(|source| {
                CompileError::Codegen {
                    label: label.to_string(),
                    source,
                }
            })?;
            routines.push(routine);
        }
        debug_assert_eq!(pooled, self.pool.len(), "real pass added constants");
        debug!(routines = routines.len(), "assembled unit");

        Ok(AssemblyUnit {
            constants: std::mem::take(&mut self.pool).into_values(),
            routines,
        })
    }
}
