//! IR construction for `fib`.
//!
//! ```text
//! fib(x) = x                        if x <= 1
//!        = fib(x - 1) + fib(x - 2)  otherwise
//! ```
//!
//! The body has three blocks: `entry` compares `x` against 1 and branches,
//! `x_le_1` returns `x`, `x_gt_1` makes the two recursive calls and returns
//! their sum. Cranelift blocks carry no names, so they print as
//! `block0..block2` in that order.

use anyhow::{Context, Result};
use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::{types, AbiParam, Function, InstBuilder, UserFuncName};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_module::Linkage;
use log::debug;

use crate::config::GenConfig;
use crate::module::{FuncIndex, IrModule};

pub const FIB_SYMBOL: &str = "fib";

/// Build the whole module: an empty `IrModule` with `fib` declared and
/// defined in it.
pub fn build_module(config: &GenConfig) -> Result<IrModule> {
    let mut module = IrModule::new(config.module_name.clone(), config.triple.clone());
    let fib = declare_fib(&mut module, config.int_type)?;
    define_fib(&mut module, fib)?;
    debug!(
        "built module '{}' for {} ({} function)",
        module.name(),
        module.triple(),
        module.functions().len()
    );
    Ok(module)
}

/// Declare `fib: int_ty -> int_ty` with external linkage.
pub fn declare_fib(module: &mut IrModule, int_ty: types::Type) -> Result<FuncIndex> {
    let mut sig = module.make_signature();
    sig.params.push(AbiParam::new(int_ty));
    sig.returns.push(AbiParam::new(int_ty));
    module
        .declare_function(FIB_SYMBOL, Linkage::Export, sig)
        .context("failed to declare fib")
}

/// Populate the body of a declared `fib`.
pub fn define_fib(module: &mut IrModule, fib: FuncIndex) -> Result<()> {
    let sig = module.function(fib).signature().clone();
    let int_ty = sig
        .returns
        .first()
        .map(|r| r.value_type)
        .context("fib must return a value")?;

    let mut func = Function::with_name_signature(UserFuncName::testcase(FIB_SYMBOL), sig);
    // Self-reference for the recursive calls; import before creating the
    // builder (it borrows `func` mutably).
    let fib_ref = module.declare_func_in_func(fib, &mut func);

    let mut func_builder_ctx = FunctionBuilderContext::new();
    let mut builder = FunctionBuilder::new(&mut func, &mut func_builder_ctx);

    let entry_block = builder.create_block();
    let x_le_1_block = builder.create_block();
    let x_gt_1_block = builder.create_block();

    // entry
    builder.append_block_params_for_function_params(entry_block);
    builder.switch_to_block(entry_block);
    let x = builder.block_params(entry_block)[0];
    let is_base = builder.ins().icmp_imm(IntCC::SignedLessThanOrEqual, x, 1);
    builder
        .ins()
        .brif(is_base, x_le_1_block, &[], x_gt_1_block, &[]);

    // x <= 1
    builder.switch_to_block(x_le_1_block);
    builder.ins().return_(&[x]);

    // x > 1
    builder.switch_to_block(x_gt_1_block);
    let one = builder.ins().iconst(int_ty, 1);
    let two = builder.ins().iconst(int_ty, 2);
    let arg1 = builder.ins().isub(x, one);
    let arg2 = builder.ins().isub(x, two);
    let call1 = builder.ins().call(fib_ref, &[arg1]);
    let fib1 = builder.inst_results(call1)[0];
    let call2 = builder.ins().call(fib_ref, &[arg2]);
    let fib2 = builder.inst_results(call2)[0];
    let sum = builder.ins().iadd(fib1, fib2);
    builder.ins().return_(&[sum]);

    builder.seal_all_blocks();
    builder.finalize();

    module.define_function(fib, func)
}
