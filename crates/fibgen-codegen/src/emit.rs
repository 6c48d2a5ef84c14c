//! Lowering an `IrModule` to a native object file.
//!
//! Every Cranelift backend is compiled in (the `all-arch` feature), so the
//! only way target resolution fails is a triple Cranelift has no backend
//! for. The target machine uses default CPU features and position
//! independent code.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use cranelift_codegen::ir::{Function, UserExternalName};
use cranelift_codegen::isa::{self, OwnedTargetIsa};
use cranelift_codegen::settings::{self, Configurable};
use cranelift_module::{FuncId, Module};
use cranelift_object::{ObjectBuilder, ObjectModule, ObjectProduct};
use log::{debug, info};
use target_lexicon::Triple;

use crate::config::{GenConfig, OptLevel};
use crate::module::{IrModule, USER_FUNC_NAMESPACE};

/// What `emit_object_file` wrote.
#[derive(Debug, Clone)]
pub struct EmitSummary {
    pub path: PathBuf,
    pub triple: Triple,
    pub bytes: usize,
}

/// Lower `module` for `config.triple` and write the object to
/// `config.output_path`, overwriting any existing file.
///
/// Fails without touching the filesystem if the target cannot be resolved,
/// and with nothing written if the output file cannot be opened.
pub fn emit_object_file(module: &IrModule, config: &GenConfig) -> Result<EmitSummary> {
    let object_module = attach_target(module, config)?;

    let path = &config.output_path;
    let file = File::create(path)
        .with_context(|| format!("could not open file '{}'", path.display()))?;
    let mut out = BufWriter::new(file);

    let bytes = lower_module(module, object_module)?;
    out.write_all(&bytes)
        .and_then(|()| out.flush())
        .with_context(|| format!("failed to write '{}'", path.display()))?;

    info!("wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(EmitSummary {
        path: path.clone(),
        triple: config.triple.clone(),
        bytes: bytes.len(),
    })
}

/// Same lowering as `emit_object_file`, returning the object bytes instead
/// of writing them.
pub fn emit_object_bytes(module: &IrModule, config: &GenConfig) -> Result<Vec<u8>> {
    let object_module = attach_target(module, config)?;
    lower_module(module, object_module)
}

/// Build the target machine: default CPU, no extra features, PIC.
pub fn target_isa(triple: &Triple, opt_level: OptLevel) -> Result<OwnedTargetIsa> {
    let mut flag_builder = settings::builder();
    flag_builder
        .set("opt_level", opt_level.as_setting())
        .context("invalid cranelift setting opt_level")?;
    flag_builder
        .set("is_pic", "true")
        .context("invalid cranelift setting is_pic")?;
    let flags = settings::Flags::new(flag_builder);

    isa::lookup(triple.clone())
        .map_err(|e| anyhow!("unsupported target '{}': {}", triple, e))?
        .finish(flags)
        .map_err(|e| anyhow!("failed to build target machine for '{}': {}", triple, e))
}

/// Resolve the target and create the object module that will receive the
/// functions. This is the point where the data layout and triple become
/// fixed.
fn attach_target(module: &IrModule, config: &GenConfig) -> Result<ObjectModule> {
    if module.triple() != &config.triple {
        bail!(
            "module '{}' was built for '{}', not '{}'",
            module.name(),
            module.triple(),
            config.triple
        );
    }
    let isa = target_isa(&config.triple, config.opt_level)?;
    if isa.default_call_conv() != module.call_conv() {
        bail!(
            "module '{}' uses calling convention {}, target default is {}",
            module.name(),
            module.call_conv(),
            isa.default_call_conv()
        );
    }
    debug!(
        "target {}: {}-bit pointers, call conv {}",
        isa.triple(),
        isa.pointer_bits(),
        isa.default_call_conv()
    );

    let obj_builder = ObjectBuilder::new(
        isa,
        module.name(),
        cranelift_module::default_libcall_names(),
    )
    .context("failed to create object builder")?;
    Ok(ObjectModule::new(obj_builder))
}

/// Declare and define every function, then serialize the object.
fn lower_module(module: &IrModule, mut object_module: ObjectModule) -> Result<Vec<u8>> {
    let mut func_ids = Vec::with_capacity(module.functions().len());
    for desc in module.functions() {
        let id = object_module
            .declare_function(desc.name(), desc.linkage(), desc.signature())
            .with_context(|| format!("failed to declare function '{}'", desc.name()))?;
        func_ids.push(id);
    }

    for (desc, &id) in module.functions().iter().zip(&func_ids) {
        let Some(body) = desc.body() else {
            if desc.linkage().is_definable() {
                bail!("function '{}' was declared but never defined", desc.name());
            }
            continue;
        };
        debug!("defining '{}' as {}", desc.name(), id);
        let mut ctx = object_module.make_context();
        ctx.func = relink(body, &func_ids)
            .with_context(|| format!("failed to relink function '{}'", desc.name()))?;
        object_module
            .define_function(id, &mut ctx)
            .with_context(|| format!("failed to define function '{}'", desc.name()))?;
        object_module.clear_context(&mut ctx);
    }

    let product: ObjectProduct = object_module.finish();
    product
        .emit()
        .map_err(|e| anyhow!("failed to emit object file: {}", e))
}

/// Copy of `body` whose function references name object-module `FuncId`s
/// instead of `IrModule` indices. Every referenced index must have an id.
fn relink(body: &Function, func_ids: &[FuncId]) -> Result<Function> {
    let mut func = body.clone();
    let mut renames = Vec::new();
    for (name_ref, name) in func.params.user_named_funcs().iter() {
        if name.namespace != USER_FUNC_NAMESPACE {
            continue;
        }
        let id = func_ids
            .get(name.index as usize)
            .with_context(|| format!("unknown function index {}", name.index))?;
        renames.push((name_ref, UserExternalName::new(USER_FUNC_NAMESPACE, id.as_u32())));
    }
    for (name_ref, name) in renames {
        func.params.reset_user_func_name(name_ref, name);
    }
    Ok(func)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_module;
    use std::str::FromStr;

    #[test]
    fn host_target_resolves() {
        let isa = target_isa(&Triple::host(), OptLevel::None).unwrap();
        assert!(isa.flags().is_pic());
        assert_eq!(isa.flags().opt_level(), settings::OptLevel::None);
    }

    #[test]
    fn opt_level_is_applied() {
        let isa = target_isa(&Triple::host(), OptLevel::Speed).unwrap();
        assert_eq!(isa.flags().opt_level(), settings::OptLevel::Speed);
    }

    #[test]
    fn unsupported_target_is_reported() {
        let triple = Triple::from_str("thumbv7em-none-eabi").unwrap();
        let Err(err) = target_isa(&triple, OptLevel::None) else {
            panic!("thumbv7em-none-eabi should not resolve to an ISA");
        };
        assert!(err.to_string().contains("unsupported target 'thumbv7em-none-eabi'"));
    }

    #[test]
    fn module_triple_must_match_config() {
        let module = build_module(&GenConfig::default()).unwrap();
        let other = if Triple::host().to_string().starts_with("x86_64") {
            "aarch64-unknown-linux-gnu"
        } else {
            "x86_64-unknown-linux-gnu"
        };
        let config = GenConfig::default().with_triple(Triple::from_str(other).unwrap());
        let err = emit_object_bytes(&module, &config).unwrap_err();
        assert!(err.to_string().contains("was built for"));
    }

    #[test]
    fn cross_target_module_emits() {
        let triple = Triple::from_str("aarch64-unknown-linux-gnu").unwrap();
        let config = GenConfig::default().with_triple(triple);
        let module = build_module(&config).unwrap();
        let bytes = emit_object_bytes(&module, &config).unwrap();
        assert_eq!(&bytes[..4], b"\x7fELF");
    }

    #[test]
    fn relink_rewrites_self_reference() {
        let module = build_module(&GenConfig::default()).unwrap();
        let body = module.functions()[0].body().unwrap();
        let ids = [FuncId::from_u32(7)];
        let func = relink(body, &ids).unwrap();
        let names: Vec<_> = func.params.user_named_funcs().values().cloned().collect();
        assert_eq!(names, vec![UserExternalName::new(USER_FUNC_NAMESPACE, 7)]);
    }

    #[test]
    fn relink_rejects_unknown_function_index() {
        let module = build_module(&GenConfig::default()).unwrap();
        let body = module.functions()[0].body().unwrap();
        let err = relink(body, &[]).unwrap_err();
        assert!(err.to_string().contains("unknown function index 0"), "{:#}", err);
    }
}
