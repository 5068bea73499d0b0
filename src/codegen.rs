//! Lowering of expression trees into x87-style stack-machine instructions.
//!
//! Code generation is a post-order walk: children are emitted before their parent, the left
//! operand before the right one. Every instruction works on an implicit register stack whose
//! top is `st0`, so a well-formed routine leaves exactly one value behind.
//!
//! Constants are not embedded in the instruction stream. They are interned into a
//! [`ConstantPool`] owned by the current emission run and loaded by slot index.
//!
//! Two operations have no single native instruction:
//! - `pow` is synthesised as `2^(exponent * log2(base))`, splitting the exponent into integer
//!   and fractional parts because `f2xm1` only accepts arguments in `[-1, 1]`
//! - `tan`/`ctg` go through `fptan`, which pushes an extra `1.0` that must be consumed

use std::fmt;

use tracing::{trace, warn};

use crate::{
    errors::MachineError,
    expr::Expr,
    machine::{self, StackProfile, X87_STACK_DEPTH},
    pool::ConstantPool,
};

/// One stack-machine instruction.
///
/// Comments give the effect on the register stack, `st0` being the top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    /// `fld qword [constN]`: push pool slot N
    LoadConst(usize),
    /// `fld qword [ebp + 8]`: push the routine argument
    LoadArg,
    /// `fld1`: push 1.0
    LoadOne,
    /// `fld st0`: push a copy of st0
    Duplicate,
    /// `fxch st1`: swap st0 and st1
    Exchange,
    /// `faddp`: st1 = st1 + st0, pop
    AddPop,
    /// `fsubp`: st1 = st1 - st0, pop
    SubPop,
    /// `fmulp`: st1 = st1 * st0, pop
    MulPop,
    /// `fdivp`: st1 = st1 / st0, pop
    DivPop,
    /// `fyl2x`: st1 = st1 * log2(st0), pop
    Log2Mul,
    /// `frndint`: round st0 to an integer (nearest, ties to even)
    RoundInt,
    /// `fsub st0, st1`: st0 = st0 - st1
    SubSt1,
    /// `f2xm1`: st0 = 2^st0 - 1, for st0 in [-1, 1]
    Exp2Minus1,
    /// `fscale`: st0 = st0 * 2^trunc(st1)
    Scale,
    /// `fstp st1`: st1 = st0, pop
    StoreSt1Pop,
    /// `fstp st0`: pop
    Pop,
    /// `fsin`
    Sin,
    /// `fcos`
    Cos,
    /// `fptan`: st0 = tan(st0), then push 1.0
    PartialTan,
    /// `fdiv st0, st1`: st0 = st0 / st1
    DivSt1,
}

impl Instruction {
    /// Minimum stack depth the instruction needs.
    pub fn required_depth(self) -> usize {
        match self {
            Instruction::LoadConst(_) | Instruction::LoadArg | Instruction::LoadOne => 0,
            Instruction::Duplicate
            | Instruction::RoundInt
            | Instruction::Exp2Minus1
            | Instruction::Pop
            | Instruction::Sin
            | Instruction::Cos
            | Instruction::PartialTan => 1,
            Instruction::Exchange
            | Instruction::AddPop
            | Instruction::SubPop
            | Instruction::MulPop
            | Instruction::DivPop
            | Instruction::Log2Mul
            | Instruction::SubSt1
            | Instruction::Scale
            | Instruction::StoreSt1Pop
            | Instruction::DivSt1 => 2,
        }
    }

    /// Net change of the stack depth.
    pub fn depth_delta(self) -> isize {
        match self {
            Instruction::LoadConst(_)
            | Instruction::LoadArg
            | Instruction::LoadOne
            | Instruction::Duplicate
            | Instruction::PartialTan => 1,
            Instruction::Exchange
            | Instruction::RoundInt
            | Instruction::SubSt1
            | Instruction::Exp2Minus1
            | Instruction::Scale
            | Instruction::Sin
            | Instruction::Cos
            | Instruction::DivSt1 => 0,
            Instruction::AddPop
            | Instruction::SubPop
            | Instruction::MulPop
            | Instruction::DivPop
            | Instruction::Log2Mul
            | Instruction::StoreSt1Pop
            | Instruction::Pop => -1,
        }
    }
}

/// Renders the NASM mnemonic.
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::LoadConst(slot) => write!(f, "fld qword [const{slot}]"),
            Instruction::LoadArg => write!(f, "fld qword [ebp + 8]"),
            Instruction::LoadOne => write!(f, "fld1"),
            Instruction::Duplicate => write!(f, "fld st0"),
            Instruction::Exchange => write!(f, "fxch st1"),
            Instruction::AddPop => write!(f, "faddp"),
            Instruction::SubPop => write!(f, "fsubp"),
            Instruction::MulPop => write!(f, "fmulp"),
            Instruction::DivPop => write!(f, "fdivp"),
            Instruction::Log2Mul => write!(f, "fyl2x"),
            Instruction::RoundInt => write!(f, "frndint"),
            Instruction::SubSt1 => write!(f, "fsub st0, st1"),
            Instruction::Exp2Minus1 => write!(f, "f2xm1"),
            Instruction::Scale => write!(f, "fscale"),
            Instruction::StoreSt1Pop => write!(f, "fstp st1"),
            Instruction::Pop => write!(f, "fstp st0"),
            Instruction::Sin => write!(f, "fsin"),
            Instruction::Cos => write!(f, "fcos"),
            Instruction::PartialTan => write!(f, "fptan"),
            Instruction::DivSt1 => write!(f, "fdiv st0, st1"),
        }
    }
}

/// `base^exponent = 2^(exponent * log2(base))` with `exponent` in st0 and `base` in st1.
const POW_SEQUENCE: [Instruction; 14] = [
    Instruction::Exchange,    // st0 = base, st1 = exponent
    Instruction::LoadOne,     // 1, base, exponent
    Instruction::Exchange,    // base, 1, exponent
    Instruction::Log2Mul,     // log2(base), exponent
    Instruction::MulPop,      // t = exponent * log2(base)
    Instruction::Duplicate,   // t, t
    Instruction::RoundInt,    // int(t), t
    Instruction::Exchange,    // t, int(t)
    Instruction::SubSt1,      // frac(t), int(t)
    Instruction::Exp2Minus1,  // 2^frac - 1, int(t)
    Instruction::LoadOne,     // 1, 2^frac - 1, int(t)
    Instruction::AddPop,      // 2^frac, int(t)
    Instruction::Scale,       // 2^t, int(t)
    Instruction::StoreSt1Pop, // 2^t
];

const TAN_SEQUENCE: [Instruction; 2] = [Instruction::PartialTan, Instruction::Pop];

const COT_SEQUENCE: [Instruction; 3] = [
    Instruction::PartialTan,  // 1, tan
    Instruction::DivSt1,      // 1 / tan, tan
    Instruction::StoreSt1Pop, // 1 / tan
];

/// Emits the instructions computing `expr`, interning its constants into `pool`.
///
/// # Arguments
/// * `expr` - The expression tree to lower
/// * `pool` - The constant pool of the current emission run
/// * `out` - Instruction buffer to append to
pub fn emit(expr: &Expr, pool: &mut ConstantPool, out: &mut Vec<Instruction>) {
    match expr {
        Expr::Const(value) => out.push(Instruction::LoadConst(pool.intern(*value))),
        Expr::Var => out.push(Instruction::LoadArg),

        Expr::Add(left, right)
        | Expr::Sub(left, right)
        | Expr::Mul(left, right)
        | Expr::Div(left, right)
        | Expr::Pow(left, right) => {
            emit(left, pool, out);
            emit(right, pool, out);
            match expr {
                Expr::Add(..) => out.push(Instruction::AddPop),
                Expr::Sub(..) => out.push(Instruction::SubPop),
                Expr::Mul(..) => out.push(Instruction::MulPop),
                Expr::Div(..) => out.push(Instruction::DivPop),
                _ => out.extend_from_slice(&POW_SEQUENCE),
            }
        }

        Expr::Sin(arg) => {
            emit(arg, pool, out);
            out.push(Instruction::Sin);
        }
        Expr::Cos(arg) => {
            emit(arg, pool, out);
            out.push(Instruction::Cos);
        }
        Expr::Tan(arg) => {
            emit(arg, pool, out);
            out.extend_from_slice(&TAN_SEQUENCE);
        }
        Expr::Cot(arg) => {
            emit(arg, pool, out);
            out.extend_from_slice(&COT_SEQUENCE);
        }
    }
}

/// An externally callable routine: a label and the body between prologue and epilogue.
#[derive(Debug, Clone, PartialEq)]
pub struct Routine {
    pub label: String,
    pub body: Vec<Instruction>,
    /// Deepest register-stack use of the body
    pub max_depth: usize,
}

/// Emits and verifies one routine.
///
/// The body is checked for stack balance before it is returned, so a generation bug
/// surfaces here rather than at run time. Bodies deeper than the x87 register file are
/// still returned, with a warning.
///
/// # Errors
/// Returns `MachineError` if the body underflows or does not leave exactly one value.
pub fn emit_routine(
    label: &str,
    expr: &Expr,
    pool: &mut ConstantPool,
) -> Result<Routine, MachineError> {
    let mut body = Vec::new();
    emit(expr, pool, &mut body);
    let StackProfile { max_depth } = machine::verify(&body)?;

    if max_depth > X87_STACK_DEPTH {
        warn!(
            routine = label,
            max_depth, "routine needs more than the 8 x87 registers"
        );
    }
    trace!(routine = label, instructions = body.len(), max_depth, "emitted routine");

    Ok(Routine {
        label: label.to_string(),
        body,
        max_depth,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::build_ast;

    fn emit_source(source: &str, pool: &mut ConstantPool) -> Vec<Instruction> {
        let mut out = Vec::new();
        emit(&build_ast(source).unwrap(), pool, &mut out);
        out
    }

    #[test]
    fn test_post_order() {
        let mut pool = ConstantPool::new();
        let body = emit_source("3 x -", &mut pool);
        assert_eq!(
            body,
            vec![
                Instruction::LoadConst(0),
                Instruction::LoadArg,
                Instruction::SubPop
            ]
        );
        assert_eq!(pool.values(), &[3.0]);
    }

    #[test]
    fn test_constants_are_interned() {
        let mut pool = ConstantPool::new();
        let body = emit_source("2 x * 2 +", &mut pool);
        assert_eq!(body[0], Instruction::LoadConst(0));
        assert_eq!(body[3], Instruction::LoadConst(0));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_pow_sequence() {
        let mut pool = ConstantPool::new();
        let body = emit_source("x 2 ^", &mut pool);
        assert_eq!(&body[..2], &[Instruction::LoadArg, Instruction::LoadConst(0)]);
        assert_eq!(&body[2..], &POW_SEQUENCE);
    }

    #[test]
    fn test_tan_and_cot_sequences() {
        let mut pool = ConstantPool::new();
        assert_eq!(
            emit_source("x tan", &mut pool),
            vec![Instruction::LoadArg, Instruction::PartialTan, Instruction::Pop]
        );
        assert_eq!(
            emit_source("x ctg", &mut pool),
            vec![
                Instruction::LoadArg,
                Instruction::PartialTan,
                Instruction::DivSt1,
                Instruction::StoreSt1Pop
            ]
        );
    }

    #[test]
    fn test_synthesised_sequences_are_balanced() {
        // Each sequence consumes its operands and leaves one result.
        let pow: isize = POW_SEQUENCE.iter().map(|i| i.depth_delta()).sum();
        let tan: isize = TAN_SEQUENCE.iter().map(|i| i.depth_delta()).sum();
        let cot: isize = COT_SEQUENCE.iter().map(|i| i.depth_delta()).sum();
        assert_eq!(pow, -1);
        assert_eq!(tan, 0);
        assert_eq!(cot, 0);
    }

    #[test]
    fn test_emit_routine_reports_depth() {
        let mut pool = ConstantPool::new();
        let routine = emit_routine("f1", &build_ast("x 2 ^").unwrap(), &mut pool).unwrap();
        assert_eq!(routine.label, "f1");
        assert_eq!(routine.max_depth, 3);

        let routine = emit_routine("f2", &build_ast("x x x + +").unwrap(), &mut pool).unwrap();
        assert_eq!(routine.max_depth, 3);
    }

    #[test]
    fn test_display() {
        assert_eq!(Instruction::LoadConst(4).to_string(), "fld qword [const4]");
        assert_eq!(Instruction::LoadArg.to_string(), "fld qword [ebp + 8]");
        assert_eq!(Instruction::DivSt1.to_string(), "fdiv st0, st1");
    }
}
