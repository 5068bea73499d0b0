//! Functions for linking and calling the base-2 exponential in JIT-compiled code.
//!
//! Backs both `f2xm1` (`2^st0 - 1`) and `fscale` (`st0 * 2^trunc(st1)`). The subtraction,
//! truncation and multiplication are emitted inline around the call.

use cranelift::prelude::FunctionBuilder;
use cranelift_codegen::ir::types::F64;
use cranelift_codegen::ir::{AbiParam, InstBuilder};
use cranelift_module::{FuncId, Linkage, Module};

pub extern "C" fn exp2(x: f64) -> f64 {
    x.exp2()
}

/// Links the base-2 exponential to make it available for JIT compilation.
///
/// # Returns
/// * `Ok(FuncId)` - The function ID that can be used to call exp2
/// * `Err(String)` - Error message if declaration fails
pub fn link_exp2(module: &mut dyn Module) -> Result<FuncId, String> {
    // Create signature for exp2(f64) -> f64
    let mut sig = module.make_signature();
    sig.params.push(AbiParam::new(F64));
    sig.returns.push(AbiParam::new(F64));

    module
        .declare_function("exp2", Linkage::Import, &sig)
        .map_err(|e| e.to_string())
}

/// Generates Cranelift IR instructions to call the base-2 exponential.
///
/// # Arguments
/// * `builder` - The Cranelift function builder being used to construct the function
/// * `module` - The Cranelift module containing the function declaration
/// * `func_id` - The function ID returned by link_exp2()
/// * `value` - The Cranelift IR value to pass as the argument
///
/// # Returns
/// The Cranelift IR value containing `2^value`
pub fn call_exp2(
    builder: &mut FunctionBuilder,
    module: &mut dyn Module,
    func_id: FuncId,
    value: cranelift_codegen::ir::Value,
) -> cranelift_codegen::ir::Value {
    let func = module.declare_func_in_func(func_id, builder.func);
    let call = builder.ins().call(func, &[value]);
    builder.inst_results(call)[0]
}
