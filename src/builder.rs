//! This module provides JIT compilation of emitted stack-machine routines.
//! It uses Cranelift as the backend compiler to generate native machine code.
//!
//! The JIT lowers the very instruction sequences that are rendered as NASM text, so a
//! compiled routine is an executable witness of the assembly unit. The x87 register stack
//! is modelled at compile time as a stack of SSA values: stack shuffles (`fxch`, `fld st0`,
//! `fstp`) generate no code at all, arithmetic maps to native float instructions, and the
//! transcendental instructions call linked shims (`sin`, `cos`, `tan`, `log2`, `exp2`).
//!
//! The main entry point is `compile_unit()`.

use std::sync::Arc;

use crate::{
    assembly::AssemblyUnit,
    codegen::{Instruction, Routine},
    errors::{BuilderError, MachineError},
    machine,
    operators::{exp2, log2, trigonometric},
    types::{JITFunction, RawRoutine},
};
use cranelift::prelude::*;
use cranelift_codegen::Context;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{FuncId, Linkage, Module};
use isa::TargetIsa;
use tracing::{debug, info};

/// The six routines of a unit, compiled to native code.
#[derive(Clone)]
pub struct CompiledUnit {
    functions: Vec<(String, JITFunction)>,
}

impl CompiledUnit {
    /// Compiled routine with the given label.
    pub fn get(&self, label: &str) -> Option<&JITFunction> {
        self.functions
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, function)| function)
    }

    /// Calls the routine `label` with argument `x`.
    pub fn call(&self, label: &str, x: f64) -> Option<f64> {
        self.get(label).map(|function| function(x))
    }

    /// Labels in unit order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl std::fmt::Debug for CompiledUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledUnit")
            .field("labels", &self.labels().collect::<Vec<_>>())
            .finish()
    }
}

/// Linked transcendental shims of one module.
struct Shims {
    sin: FuncId,
    cos: FuncId,
    tan: FuncId,
    log2: FuncId,
    exp2: FuncId,
}

impl Shims {
    fn link(module: &mut dyn Module) -> Result<Self, BuilderError> {
        Ok(Self {
            sin: trigonometric::link_sin(module).map_err(BuilderError::DeclarationError)?,
            cos: trigonometric::link_cos(module).map_err(BuilderError::DeclarationError)?,
            tan: trigonometric::link_tan(module).map_err(BuilderError::DeclarationError)?,
            log2: log2::link_log2(module).map_err(BuilderError::DeclarationError)?,
            exp2: exp2::link_exp2(module).map_err(BuilderError::DeclarationError)?,
        })
    }
}

/// Compiles every routine of `unit` into one JIT module.
///
/// Constants are taken from the unit's data section and embedded as immediates.
///
/// # Arguments
/// * `unit` - The assembled unit to compile
///
/// # Returns
/// A `CompiledUnit` holding one callable per routine, in unit order.
///
/// # Errors
/// Returns a BuilderError if:
/// - The host machine architecture is not supported
/// - A routine is not stack-balanced or references a missing constant
/// - Cranelift fails to declare, define or finalize a function
pub fn compile_unit(unit: &AssemblyUnit) -> Result<CompiledUnit, BuilderError> {
    let isa = create_isa()?;
    let mut module = create_module(isa);
    let shims = Shims::link(&mut module)?;

    let mut ctx = module.make_context();
    let mut builder_ctx = FunctionBuilderContext::new();

    let mut declared = Vec::with_capacity(unit.routines.len());
    for routine in &unit.routines {
        let func_id = define_routine(
            &mut module,
            &mut ctx,
            &mut builder_ctx,
            &shims,
            routine,
            &unit.constants,
        )?;
        declared.push((routine.label.clone(), func_id));
    }

    module
        .finalize_definitions()
        .map_err(BuilderError::ModuleError)?;

    let functions: Vec<(String, JITFunction)> = declared
        .into_iter()
        .map(|(label, func_id)| {
            // SAFETY: the routine was defined with signature extern "C" fn(f64) -> f64 using the
            // module's default calling convention, and JITModule never releases code memory on
            // drop, so the pointer stays valid for the life of the process.
            let raw = unsafe {
                std::mem::transmute::<*const u8, RawRoutine>(module.get_finalized_function(func_id))
            };
            let function: JITFunction = Arc::new(move |x: f64| raw(x));
            (label, function)
        })
        .collect();

    info!(routines = functions.len(), "finalized JIT module");
    Ok(CompiledUnit { functions })
}

/// Creates an Instruction Set Architecture (ISA) target for code generation.
///
/// This function detects the host machine architecture and configures the compilation
/// flags for in-process execution. `cranelift-jit` places code and resolves imported
/// symbols at absolute addresses, so position-independent code and colocated libcalls
/// stay off on every architecture.
///
/// # Errors
/// Returns a BuilderError if:
/// - A codegen flag is rejected
/// - The host machine architecture is not supported
/// - Code generation configuration fails
pub(crate) fn create_isa() -> Result<Arc<dyn TargetIsa>, BuilderError> {
    let mut flag_builder = settings::builder();

    let mut set = |name: &str, value: &str| {
        flag_builder
            .set(name, value)
            .map_err(|e| BuilderError::Setting(format!("{name}={value}: {e}")))
    };
    set("use_colocated_libcalls", "false")?;
    set("is_pic", "false")?;
    set("opt_level", "speed")?;
    set("enable_verifier", if cfg!(debug_assertions) { "true" } else { "false" })?;

    let isa_builder = cranelift_native::builder()
        .map_err(|msg| BuilderError::HostMachineNotSupported(msg.to_string()))?;

    isa_builder
        .finish(settings::Flags::new(flag_builder))
        .map_err(BuilderError::CodegenError)
}

/// Creates a new JIT module with the transcendental shims registered as symbols.
pub(crate) fn create_module(isa: Arc<dyn TargetIsa>) -> JITModule {
    let mut builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());

    builder.symbol("sin", trigonometric::sin as *const u8);
    builder.symbol("cos", trigonometric::cos as *const u8);
    builder.symbol("tan", trigonometric::tan as *const u8);
    builder.symbol("log2", log2::log2 as *const u8);
    builder.symbol("exp2", exp2::exp2 as *const u8);

    JITModule::new(builder)
}

/// Builds, declares and defines one routine as an exported `f64 -> f64` function.
fn define_routine(
    module: &mut JITModule,
    ctx: &mut Context,
    builder_ctx: &mut FunctionBuilderContext,
    shims: &Shims,
    routine: &Routine,
    constants: &[f64],
) -> Result<FuncId, BuilderError> {
    let machine_error = |source: MachineError| BuilderError::Machine {
        routine: routine.label.clone(),
        source,
    };
    machine::verify(&routine.body).map_err(machine_error)?;

    let mut sig = module.make_signature();
    sig.params.push(AbiParam::new(types::F64));
    sig.returns.push(AbiParam::new(types::F64));
    ctx.func.signature = sig;

    {
        let mut func_builder = FunctionBuilder::new(&mut ctx.func, builder_ctx);
        let entry_block = func_builder.create_block();
        func_builder.append_block_params_for_function_params(entry_block);
        func_builder.switch_to_block(entry_block);
        func_builder.seal_block(entry_block);

        let arg = func_builder.block_params(entry_block)[0];
        let result = lower_body(&mut func_builder, module, shims, &routine.body, constants, arg)
            .map_err(machine_error)?;
        func_builder.ins().return_(&[result]);
        func_builder.finalize();
    }

    let func_id = module
        .declare_function(&routine.label, Linkage::Export, &ctx.func.signature)
        .map_err(|msg| BuilderError::DeclarationError(msg.to_string()))?;

    module
        .define_function(func_id, ctx)
        .map_err(|msg| BuilderError::FunctionError(msg.to_string()))?;

    module.clear_context(ctx);
    debug!(routine = %routine.label, "defined JIT function");
    Ok(func_id)
}

/// Translates a routine body into Cranelift IR, returning the value left in `st0`.
fn lower_body(
    builder: &mut FunctionBuilder,
    module: &mut dyn Module,
    shims: &Shims,
    body: &[Instruction],
    constants: &[f64],
    arg: Value,
) -> Result<Value, MachineError> {
    use Instruction::*;

    let mut stack: Vec<Value> = Vec::new();

    for (index, &instruction) in body.iter().enumerate() {
        let underflow = || MachineError::StackUnderflow { index, instruction };

        match instruction {
            LoadConst(slot) => {
                let value = constants
                    .get(slot)
                    .copied()
                    .ok_or(MachineError::InvalidConstantSlot { slot })?;
                stack.push(builder.ins().f64const(value));
            }
            LoadArg => stack.push(arg),
            LoadOne => stack.push(builder.ins().f64const(1.0)),
            Duplicate => {
                let st0 = *stack.last().ok_or_else(underflow)?;
                stack.push(st0);
            }
            Exchange => {
                let st0 = stack.pop().ok_or_else(underflow)?;
                let st1 = stack.pop().ok_or_else(underflow)?;
                stack.push(st0);
                stack.push(st1);
            }

            AddPop | SubPop | MulPop | DivPop | Log2Mul | StoreSt1Pop => {
                let st0 = stack.pop().ok_or_else(underflow)?;
                let st1 = stack.pop().ok_or_else(underflow)?;
                let result = match instruction {
                    AddPop => builder.ins().fadd(st1, st0),
                    SubPop => builder.ins().fsub(st1, st0),
                    MulPop => builder.ins().fmul(st1, st0),
                    DivPop => builder.ins().fdiv(st1, st0),
                    Log2Mul => {
                        let log = log2::call_log2(builder, module, shims.log2, st0);
                        builder.ins().fmul(st1, log)
                    }
                    _ => st0,
                };
                stack.push(result);
            }
            Pop => {
                stack.pop().ok_or_else(underflow)?;
            }

            RoundInt | Exp2Minus1 | Sin | Cos => {
                let st0 = stack.pop().ok_or_else(underflow)?;
                let result = match instruction {
                    RoundInt => builder.ins().nearest(st0),
                    Exp2Minus1 => {
                        let power = exp2::call_exp2(builder, module, shims.exp2, st0);
                        let one = builder.ins().f64const(1.0);
                        builder.ins().fsub(power, one)
                    }
                    Sin => trigonometric::call_trig(builder, module, shims.sin, st0),
                    _ => trigonometric::call_trig(builder, module, shims.cos, st0),
                };
                stack.push(result);
            }

            SubSt1 | DivSt1 | Scale => {
                let st0 = stack.pop().ok_or_else(underflow)?;
                let st1 = *stack.last().ok_or_else(underflow)?;
                let result = match instruction {
                    SubSt1 => builder.ins().fsub(st0, st1),
                    DivSt1 => builder.ins().fdiv(st0, st1),
                    _ => {
                        let exponent = builder.ins().trunc(st1);
                        let factor = exp2::call_exp2(builder, module, shims.exp2, exponent);
                        builder.ins().fmul(st0, factor)
                    }
                };
                stack.push(result);
            }

            PartialTan => {
                let st0 = stack.pop().ok_or_else(underflow)?;
                let tan = trigonometric::call_trig(builder, module, shims.tan, st0);
                stack.push(tan);
                stack.push(builder.ins().f64const(1.0));
            }
        }
    }

    match stack.as_slice() {
        [result] => Ok(*result),
        rest => Err(MachineError::UnbalancedStack { depth: rest.len() }),
    }
}
