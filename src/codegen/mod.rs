#[cfg(feature = "cranelift-backend")]
pub mod cranelift;
#[cfg(feature = "llvm-backend")]
pub mod llvm;

use std::any::Any;
use std::fmt;

use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::{Expr, FunctionDefinition};
use crate::runtime::registry::FunctionRegistry;

#[cfg(feature = "cranelift-backend")]
pub use cranelift::CraneliftBackend;
#[cfg(feature = "llvm-backend")]
pub use llvm::LlvmBackend;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodegenError {
    #[error(
        "`{function}` takes {arity} parameter(s); only nullary functions can be promoted to native entry points"
    )]
    UnsupportedEntry { function: String, arity: usize },
    #[error("unknown variable `{name}` in `{function}`")]
    UnknownVariable { function: String, name: String },
    #[error("`{caller}` calls unknown function `{callee}`")]
    UnknownCallee { caller: String, callee: String },
    #[error("`{callee}` expects {expected} argument(s) but `{caller}` passes {found}")]
    ArityMismatch {
        caller: String,
        callee: String,
        expected: usize,
        found: usize,
    },
    #[error("backend error: {0}")]
    Backend(String),
    #[error("failed to register compiled module: {0}")]
    ModuleRegistration(String),
    #[error("compiled symbol `{0}` could not be resolved")]
    SymbolLookup(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CodegenOptLevel {
    None,
    #[default]
    Default,
    Aggressive,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CodegenOptions {
    pub opt_level: CodegenOptLevel,
}

/// Codegen backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CodegenBackendType {
    Cranelift,
    Llvm,
}

impl CodegenBackendType {
    pub fn is_available(self) -> bool {
        match self {
            Self::Cranelift => cfg!(feature = "cranelift-backend"),
            Self::Llvm => cfg!(feature = "llvm-backend"),
        }
    }
}

/// Produces native routines for hot functions.
///
/// Implementations must not keep code-generation state alive between calls to
/// [`CodegenBackend::compile`]: every compilation starts from a fresh module and
/// hands ownership of the finished code to the returned [`NativeRoutine`].
pub trait CodegenBackend {
    fn name(&self) -> &'static str;

    fn compile(&mut self, ctx: &CompilationContext<'_>) -> Result<NativeRoutine, CodegenError>;
}

/// Everything a backend may look at while compiling one entry function.
pub struct CompilationContext<'a> {
    function: &'a FunctionDefinition,
    registry: &'a FunctionRegistry,
    options: CodegenOptions,
}

impl<'a> CompilationContext<'a> {
    pub fn new(
        function: &'a FunctionDefinition,
        registry: &'a FunctionRegistry,
        options: CodegenOptions,
    ) -> Self {
        Self {
            function,
            registry,
            options,
        }
    }

    pub fn function(&self) -> &'a FunctionDefinition {
        self.function
    }

    pub fn options(&self) -> CodegenOptions {
        self.options
    }

    /// Resolves the entry function plus every function it can reach through
    /// calls, entry first, checking variables and call arities on the way.
    pub fn compilation_unit(&self) -> Result<Vec<&'a FunctionDefinition>, CodegenError> {
        let entry = self.function;
        if !entry.params().is_empty() {
            return Err(CodegenError::UnsupportedEntry {
                function: entry.name().to_string(),
                arity: entry.params().len(),
            });
        }

        let mut unit = vec![entry];
        let mut seen = AHashSet::new();
        seen.insert(entry.name());

        let mut next = 0;
        while next < unit.len() {
            let caller = unit[next];
            next += 1;
            self.check_expr(caller, &caller.body)?;

            let mut callees = Vec::new();
            caller.body.callees(&mut callees);
            for callee in callees {
                if seen.insert(callee) {
                    // check_expr already proved every callee resolves
                    if let Some(definition) = self.resolve(callee) {
                        unit.push(definition);
                    }
                }
            }
        }

        Ok(unit)
    }

    /// The entry definition shadows whatever the registry holds under its name.
    pub fn resolve(&self, name: &str) -> Option<&'a FunctionDefinition> {
        if name == self.function.name() {
            Some(self.function)
        } else {
            self.registry.get(name)
        }
    }

    fn check_expr(&self, function: &FunctionDefinition, expr: &Expr) -> Result<(), CodegenError> {
        match expr {
            Expr::Number(_) => Ok(()),
            Expr::Variable(name) => {
                if function.params().iter().any(|param| param == name) {
                    Ok(())
                } else {
                    Err(CodegenError::UnknownVariable {
                        function: function.name().to_string(),
                        name: name.clone(),
                    })
                }
            }
            Expr::Binary { left, right, .. } => {
                self.check_expr(function, left)?;
                self.check_expr(function, right)
            }
            Expr::Call { callee, args } => {
                let definition =
                    self.resolve(callee)
                        .ok_or_else(|| CodegenError::UnknownCallee {
                            caller: function.name().to_string(),
                            callee: callee.clone(),
                        })?;
                if definition.params().len() != args.len() {
                    return Err(CodegenError::ArityMismatch {
                        caller: function.name().to_string(),
                        callee: callee.clone(),
                        expected: definition.params().len(),
                        found: args.len(),
                    });
                }
                args.iter()
                    .try_for_each(|arg| self.check_expr(function, arg))
            }
            Expr::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.check_expr(function, cond)?;
                self.check_expr(function, then_branch)?;
                match else_branch {
                    Some(else_branch) => self.check_expr(function, else_branch),
                    None => Ok(()),
                }
            }
        }
    }
}

type NativeEntry = extern "C" fn() -> f64;

/// A finished, callable native routine.
///
/// Owns the code memory it points into, so the entry stays valid for as long
/// as the routine is alive.
pub struct NativeRoutine {
    name: String,
    entry: NativeEntry,
    linked: Vec<String>,
    _code: Box<dyn Any>,
}

impl NativeRoutine {
    /// Wraps a raw entry address produced by a backend.
    ///
    /// # Safety
    ///
    /// `address` must be the start of a finalized function that takes no
    /// arguments, returns an `f64`, and follows the platform C calling
    /// convention. `code` must own the memory holding that function.
    pub unsafe fn from_raw(
        name: impl Into<String>,
        address: *const u8,
        linked: Vec<String>,
        code: Box<dyn Any>,
    ) -> Result<Self, CodegenError> {
        let name = name.into();
        if address.is_null() {
            return Err(CodegenError::SymbolLookup(name));
        }
        // SAFETY: non-null and, per the caller's contract, a nullary
        // `extern "C" fn() -> f64` kept alive by `code`.
        let entry = unsafe { std::mem::transmute::<*const u8, NativeEntry>(address) };
        Ok(Self {
            name,
            entry,
            linked,
            _code: code,
        })
    }

    /// Wraps an ordinary host function as a unit that links only itself.
    pub fn from_fn(name: impl Into<String>, entry: NativeEntry) -> Self {
        let name = name.into();
        Self {
            linked: vec![name.clone()],
            name,
            entry,
            _code: Box::new(()),
        }
    }

    pub fn invoke(&self) -> f64 {
        (self.entry)()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of every function compiled into this routine's unit.
    pub fn linked(&self) -> &[String] {
        &self.linked
    }

    pub fn entry_address(&self) -> usize {
        self.entry as usize
    }
}

impl fmt::Debug for NativeRoutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeRoutine")
            .field("name", &self.name)
            .field("entry", &format_args!("{:#x}", self.entry_address()))
            .field("linked", &self.linked)
            .finish()
    }
}

/// Stands in when the crate is built without any native backend.
#[derive(Debug, Default)]
pub struct UnavailableBackend;

impl CodegenBackend for UnavailableBackend {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn compile(&mut self, ctx: &CompilationContext<'_>) -> Result<NativeRoutine, CodegenError> {
        Err(CodegenError::Backend(format!(
            "cannot compile `{}`: no native backend was enabled at build time",
            ctx.function().name()
        )))
    }
}

pub fn create_backend(kind: CodegenBackendType) -> Result<Box<dyn CodegenBackend>, CodegenError> {
    match kind {
        #[cfg(feature = "cranelift-backend")]
        CodegenBackendType::Cranelift => Ok(Box::new(CraneliftBackend::new())),
        #[cfg(feature = "llvm-backend")]
        CodegenBackendType::Llvm => Ok(Box::new(LlvmBackend::new())),
        #[allow(unreachable_patterns)]
        other => Err(CodegenError::Backend(format!(
            "the {other:?} backend is not compiled in; rebuild with the matching cargo feature"
        ))),
    }
}

pub fn default_backend() -> Box<dyn CodegenBackend> {
    [CodegenBackendType::Cranelift, CodegenBackendType::Llvm]
        .into_iter()
        .find(|kind| kind.is_available())
        .and_then(|kind| create_backend(kind).ok())
        .unwrap_or_else(|| Box::new(UnavailableBackend))
}
