//! Cranelift code generation for the `fib` demo.
//!
//! Builds an in-memory Cranelift IR module holding one exported function,
//! `fib(i32) -> i32`, and lowers it to a native object file for the host.
//! A separate linker step (not part of this workspace) joins the object
//! with a caller.

pub mod builder;
pub mod config;
pub mod emit;
pub mod module;

pub use builder::build_module;
pub use config::{GenConfig, OptLevel};
pub use emit::{emit_object_bytes, emit_object_file, EmitSummary};
pub use module::{FuncIndex, FunctionDescriptor, IrModule};
