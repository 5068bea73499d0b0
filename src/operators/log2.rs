//! Functions for linking and calling the base-2 logarithm in JIT-compiled code.
//!
//! Backs the `fyl2x` instruction, which computes `st1 * log2(st0)`. Only the logarithm is a
//! call; the multiplication is emitted inline. Non-positive arguments yield NaN or -inf, just
//! as `fyl2x` raises an invalid-operation for them.

use cranelift::prelude::FunctionBuilder;
use cranelift_codegen::ir::types::F64;
use cranelift_codegen::ir::{AbiParam, InstBuilder};
use cranelift_module::{FuncId, Linkage, Module};

pub extern "C" fn log2(x: f64) -> f64 {
    x.log2()
}

/// Links the base-2 logarithm to make it available for JIT compilation.
///
/// # Arguments
/// * `module` - The Cranelift module to declare the function in
///
/// # Returns
/// * `Ok(FuncId)` - The function ID that can be used to call log2
/// * `Err(String)` - Error message if declaration fails
pub fn link_log2(module: &mut dyn Module) -> Result<FuncId, String> {
    // Create signature for log2(f64) -> f64
    let mut sig = module.make_signature();
    sig.params.push(AbiParam::new(F64));
    sig.returns.push(AbiParam::new(F64));

    module
        .declare_function("log2", Linkage::Import, &sig)
        .map_err(|e| e.to_string())
}

/// Generates Cranelift IR instructions to call the base-2 logarithm.
pub fn call_log2(
    builder: &mut FunctionBuilder,
    module: &mut dyn Module,
    func_id: FuncId,
    value: cranelift_codegen::ir::Value,
) -> cranelift_codegen::ir::Value {
    let func = module.declare_func_in_func(func_id, builder.func);
    let call = builder.ins().call(func, &[value]);
    builder.inst_results(call)[0]
}
