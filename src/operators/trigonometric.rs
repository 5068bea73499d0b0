//! Functions for linking and calling trigonometric functions in JIT-compiled code.
//!
//! This module provides functionality to:
//! - Expose `sin`, `cos` and `tan` as C-ABI symbols the JIT module can resolve
//! - Link them into a Cranelift module
//! - Generate Cranelift IR instructions to call them within compiled functions
//!
//! These back the `fsin`, `fcos` and `fptan` instructions. All functions operate on
//! 64-bit floating point numbers (f64) and expect arguments in radians.

use cranelift::prelude::FunctionBuilder;
use cranelift_codegen::ir::types::F64;
use cranelift_codegen::ir::{AbiParam, InstBuilder};
use cranelift_module::{FuncId, Linkage, Module};

pub extern "C" fn sin(x: f64) -> f64 {
    x.sin()
}

pub extern "C" fn cos(x: f64) -> f64 {
    x.cos()
}

pub extern "C" fn tan(x: f64) -> f64 {
    x.tan()
}

/// Declares an imported `f64 -> f64` function named `name`.
fn link_unary(module: &mut dyn Module, name: &str) -> Result<FuncId, String> {
    let mut sig = module.make_signature();
    sig.params.push(AbiParam::new(F64));
    sig.returns.push(AbiParam::new(F64));

    module
        .declare_function(name, Linkage::Import, &sig)
        .map_err(|e| e.to_string())
}

/// Links the sine function to make it available for JIT compilation.
///
/// # Returns
/// * `Ok(FuncId)` - The function ID that can be used to call sin
/// * `Err(String)` - Error message if declaration fails
pub fn link_sin(module: &mut dyn Module) -> Result<FuncId, String> {
    link_unary(module, "sin")
}

/// Links the cosine function to make it available for JIT compilation.
pub fn link_cos(module: &mut dyn Module) -> Result<FuncId, String> {
    link_unary(module, "cos")
}

/// Links the tangent function to make it available for JIT compilation.
pub fn link_tan(module: &mut dyn Module) -> Result<FuncId, String> {
    link_unary(module, "tan")
}

/// Generates Cranelift IR instructions to call a linked trigonometric function.
///
/// # Arguments
/// * `builder` - The Cranelift function builder being used to construct the function
/// * `module` - The Cranelift module containing the function declaration
/// * `func_id` - The function ID returned by one of the `link_*` functions
/// * `arg` - The Cranelift IR value to pass as the argument (in radians)
///
/// # Returns
/// The Cranelift IR value containing the result of the call
pub fn call_trig(
    builder: &mut FunctionBuilder,
    module: &mut dyn Module,
    func_id: FuncId,
    arg: cranelift_codegen::ir::Value,
) -> cranelift_codegen::ir::Value {
    let func = module.declare_func_in_func(func_id, builder.func);
    let call = builder.ins().call(func, &[arg]);
    builder.inst_results(call)[0]
}
