//! Generator configuration.
//!
//! One `GenConfig` is built by the driver and passed down by reference.
//! Nothing here is read from the environment.

use std::path::PathBuf;

use cranelift_codegen::ir::types;
use target_lexicon::Triple;

/// Name of the IR module and of the object it becomes.
pub const MODULE_NAME: &str = "fibonacci";

/// Object file written to the working directory.
pub const DEFAULT_OUTPUT: &str = "fibonacci.obj";

/// Cranelift `opt_level` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptLevel {
    #[default]
    None,
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    /// Value accepted by `settings::builder().set("opt_level", ..)`.
    pub fn as_setting(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenConfig {
    pub module_name: String,
    /// The only value type `fib` uses, for both its parameter and result.
    pub int_type: types::Type,
    pub triple: Triple,
    pub output_path: PathBuf,
    pub opt_level: OptLevel,
}

impl Default for GenConfig {
    fn default() -> Self {
        GenConfig {
            module_name: MODULE_NAME.to_string(),
            int_type: types::I32,
            triple: Triple::host(),
            output_path: PathBuf::from(DEFAULT_OUTPUT),
            opt_level: OptLevel::default(),
        }
    }
}

impl GenConfig {
    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    pub fn with_triple(mut self, triple: Triple) -> Self {
        self.triple = triple;
        self
    }

    pub fn with_int_type(mut self, ty: types::Type) -> Self {
        self.int_type = ty;
        self
    }

    pub fn with_opt_level(mut self, opt_level: OptLevel) -> Self {
        self.opt_level = opt_level;
        self
    }
}
