//! In-memory IR module: the functions we generate plus the target metadata
//! they were built for.
//!
//! Mirrors the declare-then-define flow of `cranelift_module::Module`, but
//! keeps bodies target-independent so the module can be printed before any
//! ISA exists. Emission (`crate::emit`) declares every function again in an
//! `ObjectModule` and rewrites self-references to the ids it hands out.

use std::fmt;

use anyhow::{bail, Result};
use cranelift_codegen::ir::{
    ExtFuncData, ExternalName, FuncRef, Function, Signature, UserExternalName,
};
use cranelift_codegen::isa::CallConv;
use cranelift_module::Linkage;
use target_lexicon::Triple;

/// `UserExternalName` namespace used for functions, matching what
/// `cranelift_module` uses for `FuncId`s.
pub(crate) const USER_FUNC_NAMESPACE: u32 = 0;

/// Position of a function within its `IrModule`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncIndex(u32);

impl FuncIndex {
    pub fn as_u32(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A callable signature paired with its generated body.
///
/// The body is filled in exactly once by `IrModule::define_function`;
/// after that the descriptor is read-only.
#[derive(Debug)]
pub struct FunctionDescriptor {
    name: String,
    linkage: Linkage,
    signature: Signature,
    body: Option<Function>,
}

impl FunctionDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn linkage(&self) -> Linkage {
        self.linkage
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// `None` for declarations that were never defined (imports).
    pub fn body(&self) -> Option<&Function> {
        self.body.as_ref()
    }
}

/// Named container owning function descriptors and target metadata.
#[derive(Debug)]
pub struct IrModule {
    name: String,
    triple: Triple,
    call_conv: CallConv,
    functions: Vec<FunctionDescriptor>,
}

impl IrModule {
    /// Create an empty module for `triple`. The calling convention every
    /// signature gets is the triple's C convention.
    pub fn new(name: impl Into<String>, triple: Triple) -> Self {
        let call_conv = CallConv::triple_default(&triple);
        IrModule {
            name: name.into(),
            triple,
            call_conv,
            functions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn triple(&self) -> &Triple {
        &self.triple
    }

    pub fn call_conv(&self) -> CallConv {
        self.call_conv
    }

    pub fn functions(&self) -> &[FunctionDescriptor] {
        &self.functions
    }

    pub fn function(&self, index: FuncIndex) -> &FunctionDescriptor {
        &self.functions[index.index()]
    }

    /// Look up a function by symbol name.
    pub fn find_function(&self, name: &str) -> Option<FuncIndex> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|i| FuncIndex(i as u32))
    }

    /// An empty signature using this module's calling convention.
    pub fn make_signature(&self) -> Signature {
        Signature::new(self.call_conv)
    }

    /// Declare a function (for forward references and recursion). Declaring
    /// the same name twice returns the existing index if the linkage and
    /// signature agree.
    pub fn declare_function(
        &mut self,
        name: &str,
        linkage: Linkage,
        signature: Signature,
    ) -> Result<FuncIndex> {
        if let Some(index) = self.find_function(name) {
            let existing = &self.functions[index.index()];
            if existing.linkage != linkage || existing.signature != signature {
                bail!("function '{name}' redeclared with a different linkage or signature");
            }
            return Ok(index);
        }
        let index = FuncIndex(self.functions.len() as u32);
        self.functions.push(FunctionDescriptor {
            name: name.to_string(),
            linkage,
            signature,
            body: None,
        });
        Ok(index)
    }

    /// Attach a body to a previously declared function.
    pub fn define_function(&mut self, index: FuncIndex, body: Function) -> Result<()> {
        let desc = &mut self.functions[index.index()];
        if !desc.linkage.is_definable() {
            bail!("function '{}' is an import and cannot be defined", desc.name);
        }
        if desc.body.is_some() {
            bail!("function '{}' is already defined", desc.name);
        }
        if body.signature != desc.signature {
            bail!(
                "body of '{}' has signature {}, declared {}",
                desc.name,
                body.signature,
                desc.signature
            );
        }
        desc.body = Some(body);
        Ok(())
    }

    /// Make `callee` callable from `func`: imports its signature and a
    /// user-named reference to it.
    pub fn declare_func_in_func(&self, callee: FuncIndex, func: &mut Function) -> FuncRef {
        let desc = &self.functions[callee.index()];
        let signature = func.import_signature(desc.signature.clone());
        let name = func.declare_imported_user_function(UserExternalName::new(
            USER_FUNC_NAMESPACE,
            callee.as_u32(),
        ));
        func.import_function(ExtFuncData {
            name: ExternalName::user(name),
            signature,
            colocated: desc.linkage.is_definable(),
        })
    }
}

impl fmt::Display for IrModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module '{}'", self.name)?;
        writeln!(f, "; target = {}", self.triple)?;
        for (i, desc) in self.functions.iter().enumerate() {
            writeln!(f)?;
            writeln!(f, "; fn{} = {:?} \"{}\"", i, desc.linkage, desc.name)?;
            match &desc.body {
                Some(body) => write!(f, "{}", body)?,
                None => writeln!(f, "; declared {}", desc.signature)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_codegen::ir::{types, AbiParam, UserFuncName};

    fn i32_sig(module: &IrModule) -> Signature {
        let mut sig = module.make_signature();
        sig.params.push(AbiParam::new(types::I32));
        sig.returns.push(AbiParam::new(types::I32));
        sig
    }

    #[test]
    fn redeclaring_returns_same_index() {
        let mut module = IrModule::new("m", Triple::host());
        let sig = i32_sig(&module);
        let a = module.declare_function("f", Linkage::Export, sig.clone()).unwrap();
        let b = module.declare_function("f", Linkage::Export, sig).unwrap();
        assert_eq!(a, b);
        assert_eq!(module.functions().len(), 1);
    }

    #[test]
    fn redeclaring_with_other_linkage_fails() {
        let mut module = IrModule::new("m", Triple::host());
        let sig = i32_sig(&module);
        module.declare_function("f", Linkage::Export, sig.clone()).unwrap();
        assert!(module.declare_function("f", Linkage::Local, sig).is_err());
    }

    #[test]
    fn define_twice_fails() {
        let mut module = IrModule::new("m", Triple::host());
        let sig = i32_sig(&module);
        let f = module.declare_function("f", Linkage::Export, sig.clone()).unwrap();
        let body = Function::with_name_signature(UserFuncName::testcase("f"), sig.clone());
        module.define_function(f, body.clone()).unwrap();
        let err = module.define_function(f, body).unwrap_err();
        assert!(err.to_string().contains("already defined"));
    }

    #[test]
    fn imports_cannot_be_defined() {
        let mut module = IrModule::new("m", Triple::host());
        let sig = i32_sig(&module);
        let f = module.declare_function("puts", Linkage::Import, sig.clone()).unwrap();
        let body = Function::with_name_signature(UserFuncName::testcase("puts"), sig);
        assert!(module.define_function(f, body).is_err());
    }

    #[test]
    fn body_signature_must_match_declaration() {
        let mut module = IrModule::new("m", Triple::host());
        let sig = i32_sig(&module);
        let f = module.declare_function("f", Linkage::Export, sig).unwrap();
        let body = Function::with_name_signature(
            UserFuncName::testcase("f"),
            module.make_signature(),
        );
        assert!(module.define_function(f, body).is_err());
    }

    #[test]
    fn display_lists_declarations() {
        let mut module = IrModule::new("m", Triple::host());
        let sig = i32_sig(&module);
        module.declare_function("puts", Linkage::Import, sig).unwrap();
        let text = module.to_string();
        assert!(text.contains("; module 'm'"));
        assert!(text.contains("Import \"puts\""));
    }
}
