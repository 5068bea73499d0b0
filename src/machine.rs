//! Reference semantics of the stack machine.
//!
//! Routines are checked and executed here without touching any native code:
//! - [`verify`] walks a body while tracking only the stack depth, the way a register allocator
//!   would, and rejects underflow or an unbalanced result
//! - [`StackMachine`] interprets a body on an `f64` stack using the x87 meaning of every
//!   instruction, so emitted code can be compared against the tree it came from
//!
//! The stack top is the last element of the vector. `st(i)` is the i-th element from the top.

use crate::{codegen::Instruction, errors::MachineError};

/// Number of data registers in the x87 register file.
pub const X87_STACK_DEPTH: usize = 8;

/// Depth statistics of a verified routine body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackProfile {
    pub max_depth: usize,
}

/// Checks that `body` never underflows and leaves exactly one value on an initially empty stack.
pub fn verify(body: &[Instruction]) -> Result<StackProfile, MachineError> {
    let mut depth: usize = 0;
    let mut max_depth = 0;

    for (index, &instruction) in body.iter().enumerate() {
        if depth < instruction.required_depth() {
            return Err(MachineError::StackUnderflow { index, instruction });
        }
        depth = depth.saturating_add_signed(instruction.depth_delta());
        max_depth = max_depth.max(depth);
    }

    if depth != 1 {
        return Err(MachineError::UnbalancedStack { depth });
    }
    Ok(StackProfile { max_depth })
}

/// Interpreter for routine bodies.
///
/// The register stack is unbounded; depth limits of the real register file are reported
/// by [`verify`] instead.
#[derive(Debug, Default)]
pub struct StackMachine {
    stack: Vec<f64>,
}

impl StackMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `body` with argument `x` and returns the value left in `st0`.
    ///
    /// # Arguments
    /// * `body` - Instructions between prologue and epilogue
    /// * `constants` - The data section, indexed by pool slot
    /// * `x` - The routine argument
    pub fn execute(
        &mut self,
        body: &[Instruction],
        constants: &[f64],
        x: f64,
    ) -> Result<f64, MachineError> {
        self.stack.clear();

        for (index, &instruction) in body.iter().enumerate() {
            if self.stack.len() < instruction.required_depth() {
                return Err(MachineError::StackUnderflow { index, instruction });
            }
            self.step(instruction, constants, x)?;
        }

        match self.stack.as_slice() {
            [result] => Ok(*result),
            rest => Err(MachineError::UnbalancedStack { depth: rest.len() }),
        }
    }

    /// Applies one instruction. The caller has checked the required depth.
    fn step(
        &mut self,
        instruction: Instruction,
        constants: &[f64],
        x: f64,
    ) -> Result<(), MachineError> {
        use Instruction::*;

        match instruction {
            LoadConst(slot) => {
                let value = constants
                    .get(slot)
                    .copied()
                    .ok_or(MachineError::InvalidConstantSlot { slot })?;
                self.stack.push(value);
            }
            LoadArg => self.stack.push(x),
            LoadOne => self.stack.push(1.0),
            Duplicate => {
                let top = self.st(0);
                self.stack.push(top);
            }
            Exchange => {
                let len = self.stack.len();
                self.stack.swap(len - 1, len - 2);
            }

            AddPop => self.pop_into_st1(|st1, st0| st1 + st0),
            SubPop => self.pop_into_st1(|st1, st0| st1 - st0),
            MulPop => self.pop_into_st1(|st1, st0| st1 * st0),
            DivPop => self.pop_into_st1(|st1, st0| st1 / st0),
            Log2Mul => self.pop_into_st1(|st1, st0| st1 * st0.log2()),
            StoreSt1Pop => self.pop_into_st1(|_, st0| st0),
            Pop => {
                self.stack.pop();
            }

            RoundInt => self.map_st0(f64::round_ties_even),
            Exp2Minus1 => self.map_st0(|v| v.exp2() - 1.0),
            Sin => self.map_st0(f64::sin),
            Cos => self.map_st0(f64::cos),
            SubSt1 => {
                let st1 = self.st(1);
                self.map_st0(|st0| st0 - st1);
            }
            DivSt1 => {
                let st1 = self.st(1);
                self.map_st0(|st0| st0 / st1);
            }
            Scale => {
                let st1 = self.st(1);
                self.map_st0(|st0| st0 * st1.trunc().exp2());
            }
            PartialTan => {
                self.map_st0(f64::tan);
                self.stack.push(1.0);
            }
        }
        Ok(())
    }

    fn st(&self, i: usize) -> f64 {
        self.stack[self.stack.len() - 1 - i]
    }

    fn map_st0(&mut self, f: impl FnOnce(f64) -> f64) {
        if let Some(top) = self.stack.last_mut() {
            *top = f(*top);
        }
    }

    /// `st1 = f(st1, st0)`, then pop.
    fn pop_into_st1(&mut self, f: impl FnOnce(f64, f64) -> f64) {
        if let Some(st0) = self.stack.pop() {
            self.map_st0(|st1| f(st1, st0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codegen::emit, convert::build_ast, pool::ConstantPool};
    use Instruction::*;

    fn run(source: &str, x: f64) -> f64 {
        let mut pool = ConstantPool::new();
        let mut body = Vec::new();
        emit(&build_ast(source).unwrap(), &mut pool, &mut body);
        StackMachine::new()
            .execute(&body, pool.values(), x)
            .unwrap()
    }

    #[test]
    fn test_verify_balanced() {
        let profile = verify(&[LoadArg, LoadConst(0), AddPop]).unwrap();
        assert_eq!(profile.max_depth, 2);
    }

    #[test]
    fn test_verify_underflow() {
        assert_eq!(
            verify(&[LoadArg, AddPop]),
            Err(MachineError::StackUnderflow {
                index: 1,
                instruction: AddPop
            })
        );
    }

    #[test]
    fn test_verify_unbalanced() {
        assert_eq!(
            verify(&[LoadArg, LoadOne]),
            Err(MachineError::UnbalancedStack { depth: 2 })
        );
        assert_eq!(verify(&[]), Err(MachineError::UnbalancedStack { depth: 0 }));
    }

    #[test]
    fn test_operand_order() {
        assert_eq!(run("3 4 -", 0.0), -1.0);
        assert_eq!(run("8 2 /", 0.0), 4.0);
        assert_eq!(run("x 1 -", 5.0), 4.0);
    }

    #[test]
    fn test_pow_sequence() {
        assert!((run("x 2 ^", 3.0) - 9.0).abs() < 1e-12);
        assert!((run("2 x ^", 10.0) - 1024.0).abs() < 1e-9);
        assert!((run("x 0.5 ^", 2.0) - 2.0_f64.sqrt()).abs() < 1e-12);
        // negative exponent: the integer part goes below zero
        assert!((run("x -1.5 ^", 4.0) - 0.125).abs() < 1e-12);
    }

    #[test]
    fn test_pow_of_non_positive_base_is_nan() {
        assert!(run("x 2 ^", -3.0).is_nan());
    }

    #[test]
    fn test_trigonometry() {
        let x = 0.7_f64;
        assert!((run("x sin", x) - x.sin()).abs() < 1e-15);
        assert!((run("x cos", x) - x.cos()).abs() < 1e-15);
        assert!((run("x tan", x) - x.tan()).abs() < 1e-15);
        assert!((run("x ctg", x) - 1.0 / x.tan()).abs() < 1e-14);
    }

    #[test]
    fn test_invalid_constant_slot() {
        let err = StackMachine::new()
            .execute(&[LoadConst(3)], &[1.0], 0.0)
            .unwrap_err();
        assert_eq!(err, MachineError::InvalidConstantSlot { slot: 3 });
    }

    #[test]
    fn test_machine_is_reusable() {
        let mut machine = StackMachine::new();
        assert_eq!(machine.execute(&[LoadArg], &[], 1.0), Ok(1.0));
        assert_eq!(machine.execute(&[LoadOne], &[], 9.0), Ok(1.0));
    }
}
